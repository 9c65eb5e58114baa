//! Constructors: constant fills, random initializers, ranges and literals.

use candle_core::{Device, Tensor, WithDType};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::dtype::DType;
use super::named::NamedTensor;
use crate::error::{GTensorError, Result};

fn default_stddev() -> f64 {
    0.05
}

fn default_gain() -> f64 {
    1.0
}

/// How to fill a freshly created tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitializerConfig {
    /// Normal samples, redrawn until within two standard deviations of the mean.
    TruncatedNormal {
        #[serde(default)]
        mean: f64,
        #[serde(default = "default_stddev")]
        stddev: f64,
        #[serde(default)]
        seed: Option<u64>,
    },
    Zeros,
    Ones,
    Constant { value: f64 },
    /// `gain` on the diagonal of a square two-dimensional tensor.
    Identity {
        #[serde(default = "default_gain")]
        gain: f64,
    },
}

impl Default for InitializerConfig {
    fn default() -> Self {
        InitializerConfig::TruncatedNormal {
            mean: 0.0,
            stddev: default_stddev(),
            seed: None,
        }
    }
}

fn split_dims<S: AsRef<str>>(dims: &[(S, usize)]) -> (Vec<&str>, Vec<usize>) {
    dims.iter().map(|(n, s)| (n.as_ref(), *s)).unzip()
}

impl NamedTensor {
    /// Wrap a flat row-major vector. The dtype follows the element type:
    /// `f32`, `i64`/`u32` (int32) or `u8` (bool).
    pub fn from_vec<D: WithDType, S: AsRef<str>>(
        data: Vec<D>,
        dims: &[(S, usize)],
        device: &Device,
    ) -> Result<Self> {
        let (names, shape) = split_dims(dims);
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(GTensorError::InvalidArgument(format!(
                "{} values for shape {shape:?}",
                data.len()
            )));
        }
        NamedTensor::new(Tensor::from_vec(data, shape, device)?, &names)
    }

    /// A rank-0 float32 tensor.
    pub fn scalar(value: f64, device: &Device) -> Result<Self> {
        let t = Tensor::new(value as f32, device)?;
        NamedTensor::new(t, &[] as &[&str])
    }

    /// Fill with a constant of the given dtype.
    pub fn constant<S: AsRef<str>>(
        dims: &[(S, usize)],
        value: f64,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        let (names, shape) = split_dims(dims);
        if dtype.is_complex() {
            let re = Self::constant(dims, value, DType::Float32, device)?;
            let im = re.zero()?;
            return Self::complex(&re, &im);
        }
        let t = Tensor::full(value as f32, shape, device)?.to_dtype(dtype.storage()?)?;
        NamedTensor::new(t, &names)
    }

    pub fn zeros<S: AsRef<str>>(dims: &[(S, usize)], dtype: DType, device: &Device) -> Result<Self> {
        Self::constant(dims, 0.0, dtype, device)
    }

    pub fn ones<S: AsRef<str>>(dims: &[(S, usize)], dtype: DType, device: &Device) -> Result<Self> {
        Self::constant(dims, 1.0, dtype, device)
    }

    /// Float32 samples from a normal distribution truncated at two standard
    /// deviations.
    pub fn truncated_normal<S: AsRef<str>>(
        dims: &[(S, usize)],
        mean: f64,
        stddev: f64,
        seed: Option<u64>,
        device: &Device,
    ) -> Result<Self> {
        if !mean.is_finite() || !stddev.is_finite() {
            return Err(GTensorError::InvalidArgument(format!(
                "truncated normal needs a finite mean and stddev, got {mean} and {stddev}"
            )));
        }
        let normal = Normal::new(mean, stddev)
            .map_err(|e| GTensorError::InvalidArgument(format!("truncated normal: {e}")))?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let count: usize = dims.iter().map(|(_, s)| s).product();
        let bound = 2.0 * stddev;
        let data: Vec<f32> = (0..count)
            .map(|_| loop {
                let x = normal.sample(&mut rng);
                if (x - mean).abs() <= bound {
                    break x as f32;
                }
            })
            .collect();
        Self::from_vec(data, dims, device)
    }

    /// `gain` on the diagonal of a square matrix.
    pub fn identity<S: AsRef<str>>(dims: &[(S, usize)], gain: f64, device: &Device) -> Result<Self> {
        let [(rows, n), (cols, m)] = dims else {
            return Err(GTensorError::InvalidArgument(format!(
                "identity needs exactly two dimensions, got {}",
                dims.len()
            )));
        };
        if n != m {
            return Err(GTensorError::NonSquare {
                dim1: rows.as_ref().to_string(),
                size1: *n,
                dim2: cols.as_ref().to_string(),
                size2: *m,
            });
        }
        let t = Tensor::eye(*n, candle_core::DType::F32, device)?.affine(gain, 0.0)?;
        NamedTensor::new(t, &[rows.as_ref(), cols.as_ref()])
    }

    /// `start, start + step, ...` below `end`, on a single named axis.
    pub fn range(
        name: &str,
        start: f64,
        end: f64,
        step: f64,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        if step <= 0.0 {
            return Err(GTensorError::InvalidArgument(format!(
                "range step must be positive, got {step}"
            )));
        }
        let values = crate::util::range(start, end, step)?;
        let n = values.len();
        match dtype {
            DType::Float32 => {
                Self::from_vec(values.into_iter().map(|v| v as f32).collect(), &[(name, n)], device)
            }
            DType::Int32 => {
                Self::from_vec(values.into_iter().map(|v| v as i64).collect(), &[(name, n)], device)
            }
            other => Err(GTensorError::UnsupportedDType {
                op: "range",
                dtype: other.to_string(),
            }),
        }
    }

    /// Create a tensor according to an [`InitializerConfig`].
    pub fn from_initializer<S: AsRef<str>>(
        dims: &[(S, usize)],
        config: &InitializerConfig,
        device: &Device,
    ) -> Result<Self> {
        tracing::debug!(?config, "initializing tensor");
        match *config {
            InitializerConfig::TruncatedNormal { mean, stddev, seed } => {
                Self::truncated_normal(dims, mean, stddev, seed, device)
            }
            InitializerConfig::Zeros => Self::zeros(dims, DType::Float32, device),
            InitializerConfig::Ones => Self::ones(dims, DType::Float32, device),
            InitializerConfig::Constant { value } => {
                Self::constant(dims, value, DType::Float32, device)
            }
            InitializerConfig::Identity { gain } => Self::identity(dims, gain, device),
        }
    }
}
