//! Plain-data records for storing and transferring tensors.
//!
//! Buffers are little-endian: float32 as `f32`, int32 as `i32`, bool as one
//! byte per element and complex64 as interleaved `(re, im)` `f32` pairs.

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use super::dtype::DType;
use super::named::NamedTensor;
use crate::error::{GTensorError, Result};

/// A tensor as raw bytes plus everything needed to rebuild it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedTensor {
    pub buffer: Vec<u8>,
    pub shape: Vec<usize>,
    pub dim_names: Vec<String>,
    pub dtype: DType,
}

impl NamedTensor {
    /// Copy the values out into a [`SerializedTensor`].
    pub fn to_serialized(&self) -> Result<SerializedTensor> {
        let flat = self.tensor.flatten_all()?;
        let buffer: Vec<u8> = match self.dtype {
            DType::Float32 | DType::Complex64 => flat
                .to_vec1::<f32>()?
                .into_iter()
                .flat_map(f32::to_le_bytes)
                .collect(),
            DType::Int32 => {
                let mut bytes = Vec::with_capacity(flat.elem_count() * 4);
                for v in flat.to_vec1::<i64>()? {
                    let v = i32::try_from(v).map_err(|_| {
                        GTensorError::BadBuffer(format!("value {v} does not fit in int32"))
                    })?;
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
                bytes
            }
            DType::Bool => flat.to_vec1::<u8>()?,
            DType::String => {
                return Err(GTensorError::UnsupportedDType {
                    op: "to_serialized",
                    dtype: self.dtype.to_string(),
                })
            }
        };
        Ok(SerializedTensor {
            buffer,
            shape: self.shape().to_vec(),
            dim_names: self.dim_names.clone(),
            dtype: self.dtype,
        })
    }

    /// Rebuild a tensor from a [`SerializedTensor`].
    pub fn from_serialized(s: &SerializedTensor, device: &Device) -> Result<NamedTensor> {
        if s.dtype == DType::String {
            return Err(GTensorError::UnsupportedDType {
                op: "from_serialized",
                dtype: s.dtype.to_string(),
            });
        }
        if s.dim_names.len() != s.shape.len() {
            return Err(GTensorError::RankMismatch {
                names: s.dim_names.clone(),
                rank: s.shape.len(),
            });
        }
        let count: usize = s.shape.iter().product();
        let expected = count * s.dtype.serialized_width();
        if s.buffer.len() != expected {
            return Err(GTensorError::BadBuffer(format!(
                "{} bytes for {count} {} values, expected {expected}",
                s.buffer.len(),
                s.dtype
            )));
        }

        let mut storage_shape = s.shape.clone();
        let tensor = match s.dtype {
            DType::Float32 | DType::Complex64 => {
                if s.dtype.is_complex() {
                    storage_shape.push(2);
                }
                let values: Vec<f32> = s
                    .buffer
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                Tensor::from_vec(values, storage_shape, device)?
            }
            DType::Int32 => {
                let values: Vec<i64> = s
                    .buffer
                    .chunks_exact(4)
                    .map(|c| i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                    .collect();
                Tensor::from_vec(values, storage_shape, device)?
            }
            DType::Bool | DType::String => {
                if let Some(bad) = s.buffer.iter().find(|b| **b > 1) {
                    return Err(GTensorError::BadBuffer(format!(
                        "bool byte {bad} is neither 0 nor 1"
                    )));
                }
                Tensor::from_vec(s.buffer.clone(), storage_shape, device)?
            }
        };
        NamedTensor::from_parts(tensor, s.dim_names.clone(), s.dtype)
    }
}
