//! Error types for gtensor.

use thiserror::Error;

/// The main error type for named tensor operations.
#[derive(Debug, Error)]
pub enum GTensorError {
    /// Candle tensor operation failed
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Name list length does not match the buffer rank
    #[error("rank mismatch: {names:?} names given for a tensor of rank {rank}")]
    RankMismatch { names: Vec<String>, rank: usize },

    /// The same axis name appears twice
    #[error("duplicate dimension name '{name}' in {names:?}")]
    DuplicateName { name: String, names: Vec<String> },

    /// Axis name not present on the tensor
    #[error("unknown dimension '{name}': tensor has {names:?}")]
    UnknownName { name: String, names: Vec<String> },

    /// New axis name clashes with an axis that is being kept
    #[error("dimension name '{name}' already exists in {names:?}")]
    NameCollision { name: String, names: Vec<String> },

    /// Same axis name with different sizes in two tensors
    #[error("size mismatch on common dimension '{name}': {left} vs {right}")]
    SizeMismatch {
        name: String,
        left: usize,
        right: usize,
    },

    /// Argument to a transposition is not a permutation of the tensor's names
    #[error("{given:?} is not a permutation of {names:?}")]
    NotAPermutation {
        given: Vec<String>,
        names: Vec<String>,
    },

    /// Split sizes do not multiply to the size of the split dimension
    #[error("cannot split '{name}' of size {size} into sizes with product {product}")]
    SplitSizeMismatch {
        name: String,
        size: usize,
        product: usize,
    },

    /// Triangular masks need two axes of equal size
    #[error("triangular mask needs a square sub-matrix: '{dim1}'={size1}, '{dim2}'={size2}")]
    NonSquare {
        dim1: String,
        size1: usize,
        dim2: String,
        size2: usize,
    },

    /// Operation not defined for a rank-0 receiver
    #[error("{op}: a scalar cannot be the receiver")]
    ScalarReceiver { op: &'static str },

    /// Data type not supported by the operation
    #[error("{op}: unsupported dtype {dtype}")]
    UnsupportedDType { op: &'static str, dtype: String },

    /// Nothing to stack
    #[error("stack: empty list of tensors")]
    EmptyStack,

    /// Invalid argument to a helper
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A list node mixing leaves and maps
    #[error("tree list mixes leaves and maps")]
    MixedList,

    /// A list whose items are themselves lists
    #[error("tree lists hold leaves or maps, not lists")]
    NestedList,

    /// Flat list length does not match the tree's leaf count
    #[error("tree has {expected} leaves but {got} values were given")]
    LeafCountMismatch { expected: usize, got: usize },

    /// Two trees that must share a structure do not
    #[error("tree shape mismatch: {0}")]
    TreeShapeMismatch(String),

    /// Serialized buffer is malformed
    #[error("bad serialized buffer: {0}")]
    BadBuffer(String),
}

/// Result type for gtensor operations.
pub type Result<T> = std::result::Result<T, GTensorError>;
