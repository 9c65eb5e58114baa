//! gtensor: tensors with named dimensions
//!
//! Every axis of a [`NamedTensor`] has a name, and operations address axes
//! by name rather than position: broadcasting matches axes by name,
//! contraction sums over named shared axes, and reductions remove named
//! axes. Shape errors surface as [`GTensorError`]s naming the axes involved.
//!
//! # Example
//!
//! ```
//! use candle_core::Device;
//! use gtensor::{DType, NamedTensor};
//!
//! let dev = Device::Cpu;
//! let queries = NamedTensor::ones(&[("pos", 4), ("rep", 8)], DType::Float32, &dev)?;
//! let proj = NamedTensor::ones(&[("rep", 8), ("kq", 2)], DType::Float32, &dev)?;
//! let out = queries.contract(&proj, &["rep"])?;
//! assert_eq!(out.dim_names(), &["kq", "pos"]);
//! # Ok::<(), gtensor::GTensorError>(())
//! ```
//!
//! Buffers are candle tensors; [`Variable`]s are candle `Var`s, so candle's
//! backprop differentiates every named operation.

pub mod error;
pub mod layer_norm;
pub mod params;
pub mod tensor;
pub mod tree;
pub mod util;

use candle_core::Device;

pub use error::{GTensorError, Result};
pub use layer_norm::{layer_norm, LayerNormConfig, LayerNormParams};
pub use params::{
    assign_params, deserialize_params, dispose_params, loss_and_grads, params_of_vars,
    serialize_params, varify_params, ParamTree, SerializedParams, VarTree,
};
pub use tensor::{
    lift_map_over_dim, lift_over_dim, stack, BinaryOp, ContractSpec, DType, Dimension,
    InitializerConfig, NamedTensor, SerializedTensor, Triangle, Variable,
};
pub use tree::Tree;

/// Metal when built with the `metal` feature and a device is available,
/// otherwise CPU.
pub fn default_device() -> Device {
    #[cfg(feature = "metal")]
    let device = Device::new_metal(0).unwrap_or(Device::Cpu);
    #[cfg(not(feature = "metal"))]
    let device = Device::Cpu;
    device
}
