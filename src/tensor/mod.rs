//! Named tensors and the operations on them.
//!
//! This module provides [`NamedTensor`], the [`Variable`] parameter type,
//! and named contraction.

mod broadcast;
mod contract;
mod dimension;
mod dtype;
mod init;
mod named;
mod ops;
mod serial;
mod stack;
mod variable;

pub use broadcast::BinaryOp;
pub use contract::{ContractSpec, EINSUM_LETTERS};
pub use dimension::Dimension;
pub use dtype::DType;
pub use init::InitializerConfig;
pub use named::NamedTensor;
pub use ops::Triangle;
pub use serial::SerializedTensor;
pub use stack::{lift_map_over_dim, lift_over_dim, stack};
pub use variable::Variable;
