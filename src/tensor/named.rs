//! Named tensors: a candle tensor plus one name per axis.
//!
//! Every axis of a [`NamedTensor`] is addressed by its name instead of its
//! position. Operations look axes up by name, check sizes of same-named axes,
//! and return new tensors; the underlying buffer is never written in place
//! (see [`Variable`](super::Variable) for that).
//!
//! Related work: PyTorch named tensors, harvardnlp's namedtensor ("Tensors
//! Considered Harmful"), and xarray.

use candle_core::{DType as CandleDType, Device, Tensor};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use super::dimension::Dimension;
use super::dtype::DType;
use crate::error::{GTensorError, Result};

/// A tensor whose axes are identified by name.
///
/// Invariants: one unique name per axis, `dim_names().len() == rank()`.
/// Cloning is cheap and shares the candle buffer.
#[derive(Debug, Clone)]
pub struct NamedTensor {
    pub(crate) tensor: Tensor,
    pub(crate) dim_names: Vec<String>,
    pub(crate) dtype: DType,
}

pub(crate) fn to_strings<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|n| n.as_ref().to_string()).collect()
}

pub(crate) fn check_unique(names: &[String]) -> Result<()> {
    let mut seen = FxHashSet::default();
    for name in names {
        if name.is_empty() {
            return Err(GTensorError::InvalidArgument(format!(
                "empty dimension name in {names:?}"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(GTensorError::DuplicateName {
                name: name.clone(),
                names: names.to_vec(),
            });
        }
    }
    Ok(())
}

impl NamedTensor {
    /// Name the axes of a real-valued candle tensor.
    ///
    /// Fails if the number of names differs from the rank or a name repeats.
    /// `U32` tensors are widened to the `Int32` storage type.
    pub fn new<S: AsRef<str>>(tensor: Tensor, names: &[S]) -> Result<Self> {
        let dtype = DType::from_candle(tensor.dtype())?;
        let tensor = if tensor.dtype() == CandleDType::U32 {
            tensor.to_dtype(CandleDType::I64)?
        } else {
            tensor
        };
        Self::from_parts(tensor, to_strings(names), dtype)
    }

    /// Build a complex64 tensor from its real and imaginary parts.
    ///
    /// Both parts must be float32 and carry the same axis names.
    pub fn complex(re: &NamedTensor, im: &NamedTensor) -> Result<Self> {
        if re.dtype != DType::Float32 || im.dtype != DType::Float32 {
            return Err(GTensorError::UnsupportedDType {
                op: "complex",
                dtype: format!("{}/{}", re.dtype, im.dtype),
            });
        }
        let im = im.transpose_like(re)?;
        let tensor = Tensor::stack(&[&re.tensor, &im.tensor], re.rank())?;
        Self::from_parts(tensor, re.dim_names.clone(), DType::Complex64)
    }

    pub(crate) fn from_parts(tensor: Tensor, dim_names: Vec<String>, dtype: DType) -> Result<Self> {
        let hidden = usize::from(dtype.is_complex());
        if tensor.rank() != dim_names.len() + hidden {
            return Err(GTensorError::RankMismatch {
                names: dim_names,
                rank: tensor.rank().saturating_sub(hidden),
            });
        }
        if dtype.is_complex() && tensor.dims().last() != Some(&2) {
            return Err(GTensorError::BadBuffer(
                "complex64 storage must end with an axis of size 2".to_string(),
            ));
        }
        check_unique(&dim_names)?;
        Ok(Self {
            tensor,
            dim_names,
            dtype,
        })
    }

    /// Same buffer, new name list.
    pub(crate) fn renamed(&self, dim_names: Vec<String>) -> Result<Self> {
        Self::from_parts(self.tensor.clone(), dim_names, self.dtype)
    }

    // ----------------------------------------------------------------------
    // Accessors
    // ----------------------------------------------------------------------

    /// The raw candle buffer.
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn dim_names(&self) -> &[String] {
        &self.dim_names
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> &Device {
        self.tensor.device()
    }

    pub fn rank(&self) -> usize {
        self.dim_names.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.dim_names.is_empty()
    }

    /// Axis sizes in axis order.
    pub fn shape(&self) -> &[usize] {
        &self.tensor.dims()[..self.rank()]
    }

    /// Number of elements.
    pub fn elem_count(&self) -> usize {
        self.shape().iter().product()
    }

    /// Axis name to size, in axis order.
    pub fn gshape(&self) -> IndexMap<String, usize> {
        self.dim_names
            .iter()
            .cloned()
            .zip(self.shape().iter().copied())
            .collect()
    }

    pub fn has_dim(&self, name: &str) -> bool {
        self.dim_names.iter().any(|n| n == name)
    }

    /// Position of a named axis.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.dim_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| GTensorError::UnknownName {
                name: name.to_string(),
                names: self.dim_names.clone(),
            })
    }

    /// Size of a named axis.
    pub fn size_of(&self, name: &str) -> Result<usize> {
        Ok(self.shape()[self.index_of(name)?])
    }

    /// View of one named axis.
    pub fn dim(&self, name: &str) -> Result<Dimension<'_>> {
        let index = self.index_of(name)?;
        Ok(Dimension::new(self, index))
    }

    /// Views of all axes, in axis order.
    pub fn dims(&self) -> Vec<Dimension<'_>> {
        (0..self.rank()).map(|i| Dimension::new(self, i)).collect()
    }

    pub(crate) fn require_real(&self, op: &'static str) -> Result<()> {
        match self.dtype {
            DType::Complex64 | DType::String => Err(GTensorError::UnsupportedDType {
                op,
                dtype: self.dtype.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Candle shape for a logical shape (adds the hidden complex axis).
    pub(crate) fn storage_shape(&self, logical: &[usize]) -> Vec<usize> {
        let mut shape = logical.to_vec();
        if self.dtype.is_complex() {
            shape.push(2);
        }
        shape
    }

    /// Permute the buffer by a logical permutation.
    pub(crate) fn permute_storage(&self, perm: &[usize]) -> Result<Tensor> {
        if perm.iter().enumerate().all(|(i, &p)| i == p) {
            return Ok(self.tensor.clone());
        }
        let mut perm = perm.to_vec();
        if self.dtype.is_complex() {
            perm.push(self.rank());
        }
        Ok(self.tensor.permute(perm)?)
    }

    // ----------------------------------------------------------------------
    // Renaming and reordering
    // ----------------------------------------------------------------------

    /// Rename a single dimension; the buffer is shared.
    pub fn rename(&self, from: &str, to: &str) -> Result<NamedTensor> {
        let i = self.index_of(from)?;
        if from == to {
            return Ok(self.clone());
        }
        if self.has_dim(to) {
            return Err(GTensorError::NameCollision {
                name: to.to_string(),
                names: self.dim_names.clone(),
            });
        }
        let mut names = self.dim_names.clone();
        names[i] = to.to_string();
        self.renamed(names)
    }

    /// Rename several dimensions at once.
    ///
    /// Each `(from, to)` pair replaces the name at `from`'s position; the
    /// resulting name list must still be unique.
    pub fn rename_many<S: AsRef<str>, T: AsRef<str>>(
        &self,
        renaming: &[(S, T)],
    ) -> Result<NamedTensor> {
        let mut names = self.dim_names.clone();
        for (from, to) in renaming {
            let i = self.index_of(from.as_ref())?;
            names[i] = to.as_ref().to_string();
        }
        self.renamed(names)
    }

    /// Replace the whole name list.
    pub fn with_new_names<S: AsRef<str>>(&self, names: &[S]) -> Result<NamedTensor> {
        self.renamed(to_strings(names))
    }

    /// Reverse the axis order.
    pub fn transpose(&self) -> Result<NamedTensor> {
        let perm: Vec<usize> = (0..self.rank()).rev().collect();
        let names = self.dim_names.iter().rev().cloned().collect();
        Self::from_parts(self.permute_storage(&perm)?, names, self.dtype)
    }

    /// Permute to an explicit order of all axis names.
    pub fn transpose_to<S: AsRef<str>>(&self, order: &[S]) -> Result<NamedTensor> {
        let given = to_strings(order);
        let not_a_permutation = || GTensorError::NotAPermutation {
            given: given.clone(),
            names: self.dim_names.clone(),
        };
        if given.len() != self.rank() {
            return Err(not_a_permutation());
        }
        let mut perm = Vec::with_capacity(given.len());
        for name in &given {
            let i = self.index_of(name).map_err(|_| not_a_permutation())?;
            if perm.contains(&i) {
                return Err(not_a_permutation());
            }
            perm.push(i);
        }
        Self::from_parts(self.permute_storage(&perm)?, given, self.dtype)
    }

    /// Permute to the axis order of `other`; both must have the same names.
    pub fn transpose_like(&self, other: &NamedTensor) -> Result<NamedTensor> {
        self.transpose_to(&other.dim_names)
    }

    // ----------------------------------------------------------------------
    // Reductions
    // ----------------------------------------------------------------------

    fn reduce_indexes<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        let mut indexes = Vec::with_capacity(names.len());
        for name in names {
            let i = self.index_of(name.as_ref())?;
            if indexes.contains(&i) {
                return Err(GTensorError::DuplicateName {
                    name: name.as_ref().to_string(),
                    names: to_strings(names),
                });
            }
            indexes.push(i);
        }
        Ok(indexes)
    }

    fn names_without(&self, indexes: &[usize]) -> Vec<String> {
        self.dim_names
            .iter()
            .enumerate()
            .filter(|(i, _)| !indexes.contains(i))
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Sum over the named dimensions, removing them.
    pub fn sum_over_dims<S: AsRef<str>>(&self, names: &[S]) -> Result<NamedTensor> {
        self.require_real("sum_over_dims")?;
        let indexes = self.reduce_indexes(names)?;
        if indexes.is_empty() {
            return Ok(self.clone());
        }
        let summed = self.tensor.sum(indexes.clone())?;
        Self::from_parts(summed, self.names_without(&indexes), self.dtype)
    }

    /// Product over the named dimensions, removing them.
    pub fn prod_over_dims<S: AsRef<str>>(&self, names: &[S]) -> Result<NamedTensor> {
        self.require_real("prod_over_dims")?;
        let mut indexes = self.reduce_indexes(names)?;
        // Reduce from the back so earlier positions stay valid.
        indexes.sort_unstable_by(|a, b| b.cmp(a));
        let mut tensor = self.tensor.clone();
        for &i in &indexes {
            tensor = prod_along(&tensor, i)?;
        }
        Self::from_parts(tensor, self.names_without(&indexes), self.dtype)
    }

    /// Index of the largest value along one dimension, which is removed.
    pub fn arg_max(&self, name: &str) -> Result<NamedTensor> {
        self.require_real("arg_max")?;
        let i = self.index_of(name)?;
        let indexes = self.tensor.argmax(i)?.to_dtype(CandleDType::I64)?;
        Self::from_parts(indexes, self.names_without(&[i]), DType::Int32)
    }

    // ----------------------------------------------------------------------
    // Reshaping
    // ----------------------------------------------------------------------

    /// Replace one dimension by several whose sizes multiply to its size.
    ///
    /// The new dimensions take the old one's position, in the given order.
    pub fn split_dim<S: AsRef<str>>(&self, name: &str, new_dims: &[(S, usize)]) -> Result<NamedTensor> {
        let i = self.index_of(name)?;
        let size = self.shape()[i];
        let product: usize = new_dims.iter().map(|(_, s)| s).product();
        if product != size {
            return Err(GTensorError::SplitSizeMismatch {
                name: name.to_string(),
                size,
                product,
            });
        }
        for (new_name, _) in new_dims {
            let new_name = new_name.as_ref();
            if new_name != name && self.has_dim(new_name) {
                return Err(GTensorError::NameCollision {
                    name: new_name.to_string(),
                    names: self.dim_names.clone(),
                });
            }
        }
        let mut names = self.dim_names.clone();
        names.splice(i..=i, new_dims.iter().map(|(n, _)| n.as_ref().to_string()));
        let mut shape = self.shape().to_vec();
        shape.splice(i..=i, new_dims.iter().map(|(_, s)| *s));
        let reshaped = self.tensor.reshape(self.storage_shape(&shape))?;
        Self::from_parts(reshaped, names, self.dtype)
    }

    /// Merge several dimensions into one, at the position of the first
    /// merged dimension.
    ///
    /// The merged dimensions need not be adjacent; they are combined in the
    /// order they appear in this tensor.
    pub fn merge_dims<S: AsRef<str>>(&self, names: &[S], new_name: &str) -> Result<NamedTensor> {
        if names.is_empty() {
            return Err(GTensorError::InvalidArgument(
                "merge_dims needs at least one dimension".to_string(),
            ));
        }
        let merged = self.reduce_indexes(names)?;
        let merged_names = to_strings(names);
        if self.has_dim(new_name) && !merged_names.iter().any(|n| n == new_name) {
            return Err(GTensorError::NameCollision {
                name: new_name.to_string(),
                names: self.dim_names.clone(),
            });
        }
        let first = merged.iter().copied().min().unwrap_or(0);

        let kept: Vec<usize> = (0..self.rank()).filter(|i| !merged.contains(i)).collect();
        let mut merged_in_order = merged.clone();
        merged_in_order.sort_unstable();

        let mut perm: Vec<usize> = kept[..first].to_vec();
        perm.extend(&merged_in_order);
        perm.extend(&kept[first..]);

        let shape = self.shape();
        let merged_size: usize = merged_in_order.iter().map(|&i| shape[i]).product();
        let mut new_shape: Vec<usize> = kept.iter().map(|&i| shape[i]).collect();
        new_shape.insert(first, merged_size);
        let mut new_names: Vec<String> = kept.iter().map(|&i| self.dim_names[i].clone()).collect();
        new_names.insert(first, new_name.to_string());

        tracing::trace!(?perm, ?new_shape, "merge_dims");
        let permuted = self.permute_storage(&perm)?;
        let reshaped = permuted.reshape(self.storage_shape(&new_shape))?;
        Self::from_parts(reshaped, new_names, self.dtype)
    }

    /// Split into one tensor per index of a dimension.
    pub fn unstack(&self, name: &str) -> Result<Vec<NamedTensor>> {
        let i = self.index_of(name)?;
        let names = self.names_without(&[i]);
        (0..self.shape()[i])
            .map(|k| {
                let slice = self.tensor.narrow(i, k, 1)?.squeeze(i)?;
                Self::from_parts(slice, names.clone(), self.dtype)
            })
            .collect()
    }

    /// Concatenate with a tensor of the same names along an existing dimension.
    pub fn concat(&self, other: &NamedTensor, name: &str) -> Result<NamedTensor> {
        let i = self.index_of(name)?;
        let other = other.transpose_like(self)?;
        for (n, (&a, &b)) in self
            .dim_names
            .iter()
            .zip(self.shape().iter().zip(other.shape()))
        {
            if n != name && a != b {
                return Err(GTensorError::SizeMismatch {
                    name: n.clone(),
                    left: a,
                    right: b,
                });
            }
        }
        let joined = Tensor::cat(&[&self.tensor, &other.tensor], i)?;
        Self::from_parts(joined, self.dim_names.clone(), self.dtype)
    }

    // ----------------------------------------------------------------------
    // Pointwise unary operations
    // ----------------------------------------------------------------------

    /// Apply a shape-preserving candle function; names are kept.
    pub fn map_tensor<F>(&self, f: F) -> Result<NamedTensor>
    where
        F: FnOnce(&Tensor) -> candle_core::Result<Tensor>,
    {
        let mapped = f(&self.tensor)?;
        if mapped.dims() != self.tensor.dims() {
            return Err(GTensorError::InvalidArgument(format!(
                "map_tensor changed shape {:?} to {:?}",
                self.tensor.dims(),
                mapped.dims()
            )));
        }
        NamedTensor::new(mapped, &self.dim_names)
    }

    pub fn squared(&self) -> Result<NamedTensor> {
        self.require_real("squared")?;
        self.map_tensor(|t| t.sqr())
    }

    pub fn sqrt(&self) -> Result<NamedTensor> {
        self.require_real("sqrt")?;
        self.map_tensor(|t| t.sqrt())
    }

    pub fn abs(&self) -> Result<NamedTensor> {
        self.require_real("abs")?;
        self.map_tensor(|t| t.abs())
    }

    pub fn log(&self) -> Result<NamedTensor> {
        self.require_real("log")?;
        self.map_tensor(|t| t.log())
    }

    pub fn exp(&self) -> Result<NamedTensor> {
        self.require_real("exp")?;
        self.map_tensor(|t| t.exp())
    }

    pub fn neg(&self) -> Result<NamedTensor> {
        self.require_real("neg")?;
        self.map_tensor(|t| t.neg())
    }

    /// `self * mul + add`, elementwise.
    pub fn affine(&self, mul: f64, add: f64) -> Result<NamedTensor> {
        self.require_real("affine")?;
        self.map_tensor(|t| t.affine(mul, add))
    }

    /// Same shape and names, filled with zeros.
    pub fn zero(&self) -> Result<NamedTensor> {
        Self::from_parts(self.tensor.zeros_like()?, self.dim_names.clone(), self.dtype)
    }

    /// Same shape and names, filled with ones.
    pub fn one(&self) -> Result<NamedTensor> {
        self.require_real("one")?;
        Self::from_parts(self.tensor.ones_like()?, self.dim_names.clone(), self.dtype)
    }

    // ----------------------------------------------------------------------
    // Conversion and readout
    // ----------------------------------------------------------------------

    /// Convert between real dtypes. Conversion to bool maps non-zero to 1.
    pub fn to_dtype(&self, dtype: DType) -> Result<NamedTensor> {
        self.require_real("to_dtype")?;
        if dtype == self.dtype {
            return Ok(self.clone());
        }
        let converted = match dtype {
            DType::Bool => self.tensor.ne(&self.tensor.zeros_like()?)?,
            DType::Float32 | DType::Int32 => self.tensor.to_dtype(dtype.storage()?)?,
            DType::Complex64 | DType::String => {
                return Err(GTensorError::UnsupportedDType {
                    op: "to_dtype",
                    dtype: dtype.to_string(),
                })
            }
        };
        Self::from_parts(converted, self.dim_names.clone(), dtype)
    }

    /// All values as f32, in row-major buffer order.
    ///
    /// Complex tensors yield interleaved (re, im) pairs.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        Ok(self
            .tensor
            .flatten_all()?
            .to_dtype(CandleDType::F32)?
            .to_vec1::<f32>()?)
    }

    /// The value of a rank-0 tensor.
    pub fn to_scalar(&self) -> Result<f32> {
        self.require_real("to_scalar")?;
        if !self.is_scalar() {
            return Err(GTensorError::InvalidArgument(format!(
                "to_scalar on a tensor with dimensions {:?}",
                self.dim_names
            )));
        }
        Ok(self.tensor.to_dtype(CandleDType::F32)?.to_scalar::<f32>()?)
    }

    /// Real part of a complex tensor.
    pub fn real(&self) -> Result<NamedTensor> {
        self.complex_part(0)
    }

    /// Imaginary part of a complex tensor.
    pub fn imag(&self) -> Result<NamedTensor> {
        self.complex_part(1)
    }

    fn complex_part(&self, part: usize) -> Result<NamedTensor> {
        if !self.dtype.is_complex() {
            return Err(GTensorError::UnsupportedDType {
                op: "complex_part",
                dtype: self.dtype.to_string(),
            });
        }
        let rank = self.rank();
        let values = self.tensor.narrow(rank, part, 1)?.squeeze(rank)?;
        Self::from_parts(values, self.dim_names.clone(), DType::Float32)
    }

    /// Same values, cut from the autodiff graph.
    pub fn detach(&self) -> NamedTensor {
        Self {
            tensor: self.tensor.detach(),
            dim_names: self.dim_names.clone(),
            dtype: self.dtype,
        }
    }

    /// Release the buffer. Any other clone sharing it keeps it alive.
    pub fn dispose(self) {
        drop(self)
    }
}

fn prod_along(tensor: &Tensor, dim: usize) -> Result<Tensor> {
    let n = tensor.dim(dim)?;
    if n == 0 {
        let mut shape = tensor.dims().to_vec();
        shape.remove(dim);
        return Ok(Tensor::ones(shape, tensor.dtype(), tensor.device())?);
    }
    let mut acc = tensor.narrow(dim, 0, 1)?;
    for k in 1..n {
        acc = acc.mul(&tensor.narrow(dim, k, 1)?)?;
    }
    Ok(acc.squeeze(dim)?)
}
