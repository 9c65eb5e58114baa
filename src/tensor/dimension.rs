use super::dtype::DType;
use super::named::NamedTensor;
use crate::error::Result;

/// A view of one named axis of a tensor.
#[derive(Debug, Clone, Copy)]
pub struct Dimension<'a> {
    pub name: &'a str,
    pub size: usize,
    pub index: usize,
    tensor: &'a NamedTensor,
}

impl<'a> Dimension<'a> {
    pub(crate) fn new(tensor: &'a NamedTensor, index: usize) -> Self {
        Self {
            name: &tensor.dim_names()[index],
            size: tensor.shape()[index],
            index,
            tensor,
        }
    }

    /// The tensor this axis belongs to.
    pub fn tensor(&self) -> &'a NamedTensor {
        self.tensor
    }

    pub fn dtype(&self) -> DType {
        self.tensor.dtype()
    }

    /// Sizes of every other axis, in order.
    pub fn external_shape(&self) -> Vec<usize> {
        self.tensor
            .shape()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.index)
            .map(|(_, s)| *s)
            .collect()
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.tensor.rank()
    }

    pub fn rename(&self, new_name: &str) -> Result<NamedTensor> {
        self.tensor.rename(self.name, new_name)
    }

    pub fn unstack(&self) -> Result<Vec<NamedTensor>> {
        self.tensor.unstack(self.name)
    }
}
