//! Element types of named tensors and their candle storage.

use std::fmt;

use candle_core::DType as CandleDType;
use serde::{Deserialize, Serialize};

use crate::error::{GTensorError, Result};

/// Element type of a [`NamedTensor`](super::NamedTensor).
///
/// `Int32` is held in candle as `I64` and `Bool` as `U8` (0 or 1).
/// `Complex64` is an `F32` buffer with one extra trailing axis of size 2
/// holding the real and imaginary parts. `String` exists only so that
/// serialization records can name it; no tensor ever has it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float32,
    Int32,
    Bool,
    Complex64,
    String,
}

impl DType {
    /// The candle dtype that stores elements of this type.
    pub fn storage(self) -> Result<CandleDType> {
        match self {
            DType::Float32 | DType::Complex64 => Ok(CandleDType::F32),
            DType::Int32 => Ok(CandleDType::I64),
            DType::Bool => Ok(CandleDType::U8),
            DType::String => Err(GTensorError::UnsupportedDType {
                op: "storage",
                dtype: self.to_string(),
            }),
        }
    }

    /// The named dtype for a real-valued candle tensor.
    ///
    /// `U32` (what candle's argmax produces) maps to `Int32`; callers convert
    /// the storage with [`DType::storage`] before wrapping.
    pub fn from_candle(dtype: CandleDType) -> Result<DType> {
        match dtype {
            CandleDType::F32 => Ok(DType::Float32),
            CandleDType::I64 | CandleDType::U32 => Ok(DType::Int32),
            CandleDType::U8 => Ok(DType::Bool),
            other => Err(GTensorError::UnsupportedDType {
                op: "wrap",
                dtype: format!("{other:?}"),
            }),
        }
    }

    /// Bytes per element in the serialized record.
    pub fn serialized_width(self) -> usize {
        match self {
            DType::Float32 | DType::Int32 => 4,
            DType::Bool => 1,
            DType::Complex64 => 8,
            DType::String => 0,
        }
    }

    pub fn is_complex(self) -> bool {
        self == DType::Complex64
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::Float32 => "float32",
            DType::Int32 => "int32",
            DType::Bool => "bool",
            DType::Complex64 => "complex64",
            DType::String => "string",
        };
        f.write_str(s)
    }
}
