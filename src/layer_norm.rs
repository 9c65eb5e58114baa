//! Layer normalization over a named dimension.

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::error::{GTensorError, Result};
use crate::params::ParamTree;
use crate::tensor::NamedTensor;
use crate::tree::Tree;

fn default_epsilon() -> f64 {
    1e-5
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerNormConfig {
    #[serde(default)]
    pub include_bias: bool,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for LayerNormConfig {
    fn default() -> Self {
        Self {
            include_bias: false,
            epsilon: default_epsilon(),
        }
    }
}

/// Gain, optional bias and epsilon. Gain and bias may be scalars or tensors
/// over axes of the normalized input other than the normalized one.
#[derive(Debug, Clone)]
pub struct LayerNormParams {
    pub gain: NamedTensor,
    pub bias: Option<NamedTensor>,
    pub epsilon: NamedTensor,
}

impl LayerNormParams {
    /// Scalar gain 1, bias 0 (if enabled) and the configured epsilon.
    pub fn init(config: &LayerNormConfig, device: &Device) -> Result<Self> {
        Ok(Self {
            gain: NamedTensor::scalar(1.0, device)?,
            bias: if config.include_bias {
                Some(NamedTensor::scalar(0.0, device)?)
            } else {
                None
            },
            epsilon: NamedTensor::scalar(config.epsilon, device)?,
        })
    }

    /// As a parameter tree with keys `gain`, `epsilon` and optionally `bias`.
    pub fn to_tree(&self) -> ParamTree {
        let mut entries = vec![
            ("gain", Tree::leaf(self.gain.clone())),
            ("epsilon", Tree::leaf(self.epsilon.clone())),
        ];
        if let Some(bias) = &self.bias {
            entries.push(("bias", Tree::leaf(bias.clone())));
        }
        Tree::map_of(entries)
    }

    pub fn from_tree(tree: &ParamTree) -> Result<Self> {
        let field = |key: &str| tree.get(key).and_then(Tree::as_leaf).cloned();
        let missing = |key: &str| {
            GTensorError::TreeShapeMismatch(format!("layer norm parameters lack '{key}'"))
        };
        Ok(Self {
            gain: field("gain").ok_or_else(|| missing("gain"))?,
            bias: field("bias"),
            epsilon: field("epsilon").ok_or_else(|| missing("epsilon"))?,
        })
    }
}

/// `(g - mean) / sqrt(var + epsilon) * gain + bias`, with mean and variance
/// taken over `dim`. The result keeps `g`'s axis order; axes that only gain
/// or bias carry come after.
pub fn layer_norm(params: &LayerNormParams, g: &NamedTensor, dim: &str) -> Result<NamedTensor> {
    let size = g.size_of(dim)?;
    let n = NamedTensor::scalar(size as f64, g.device())?;

    let mean = g.sum_over_dims(&[dim])?.scalar_div(&n)?;
    let centered = g.pointwise_sub(&mean)?;
    let variance = centered.squared()?.sum_over_dims(&[dim])?.scalar_div(&n)?;
    let std = variance.scalar_add(&params.epsilon)?.sqrt()?;
    let mut out = centered.pointwise_div(&std)?.pointwise_mul(&params.gain)?;
    if let Some(bias) = &params.bias {
        out = out.pointwise_add(bias)?;
    }

    let mut order: Vec<&str> = g.dim_names().iter().map(String::as_str).collect();
    order.extend(
        out.dim_names()
            .iter()
            .map(String::as_str)
            .filter(|n| !g.has_dim(n)),
    );
    out.transpose_to(&order)
}
