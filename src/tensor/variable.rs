//! Mutable, long-lived named tensors (model parameters).

use candle_core::Var;
use indexmap::IndexMap;

use super::dtype::DType;
use super::named::NamedTensor;
use crate::error::{GTensorError, Result};

/// A named tensor whose values can be replaced in place.
///
/// Backed by a candle [`Var`], so candle's backprop tracks it. Clones are
/// handles to the same storage: an [`assign`](Variable::assign) through one
/// clone is seen by all of them, and by every tensor previously obtained
/// from [`as_tensor`](Variable::as_tensor).
#[derive(Debug, Clone)]
pub struct Variable {
    var: Var,
    dim_names: Vec<String>,
    dtype: DType,
}

impl Variable {
    /// Copy `init` into fresh variable storage.
    pub fn new(init: &NamedTensor) -> Result<Self> {
        init.require_real("variable")?;
        // Var::from_tensor aliases tensors that are already variables.
        let src = if init.tensor.is_variable() {
            init.tensor.copy()?
        } else {
            init.tensor.clone()
        };
        let var = Var::from_tensor(&src)?;
        Ok(Self {
            var,
            dim_names: init.dim_names.clone(),
            dtype: init.dtype,
        })
    }

    /// The current value, as a tracked named tensor sharing this storage.
    pub fn as_tensor(&self) -> NamedTensor {
        NamedTensor {
            tensor: self.var.as_tensor().clone(),
            dim_names: self.dim_names.clone(),
            dtype: self.dtype,
        }
    }

    pub fn var(&self) -> &Var {
        &self.var
    }

    pub fn dim_names(&self) -> &[String] {
        &self.dim_names
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        self.var.dims()
    }

    pub fn gshape(&self) -> IndexMap<String, usize> {
        self.dim_names
            .iter()
            .cloned()
            .zip(self.shape().iter().copied())
            .collect()
    }

    /// Overwrite the values with `value`, keeping this variable's axis order.
    ///
    /// `value` must have the same set of names and sizes; it is transposed
    /// to match.
    pub fn assign(&self, value: &NamedTensor) -> Result<()> {
        let mut wanted = self.dim_names.clone();
        let mut given = value.dim_names().to_vec();
        wanted.sort();
        given.sort();
        if wanted != given {
            return Err(GTensorError::NotAPermutation {
                given: value.dim_names().to_vec(),
                names: self.dim_names.clone(),
            });
        }
        let aligned = value.transpose_to(&self.dim_names)?;
        for ((name, &want), &got) in self.dim_names.iter().zip(self.shape()).zip(aligned.shape()) {
            if want != got {
                return Err(GTensorError::SizeMismatch {
                    name: name.clone(),
                    left: want,
                    right: got,
                });
            }
        }
        // Var::set refuses a source backed by the variable's own storage, so
        // always hand it a fresh buffer.
        let src = aligned.tensor.to_dtype(self.var.dtype())?;
        let src = if src.is_contiguous() {
            src.copy()?
        } else {
            src.contiguous()?
        };
        tracing::trace!(names = ?self.dim_names, "assign");
        self.var.set(&src)?;
        Ok(())
    }

    /// Release this handle. Storage is freed once no clone or derived
    /// tensor refers to it.
    pub fn dispose(self) {
        drop(self)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    #[test]
    fn test_assign_transposes_to_variable_order() {
        let init = NamedTensor::zeros(&[("in", 2), ("out", 3)], DType::Float32, &Device::Cpu).unwrap();
        let v = Variable::new(&init).unwrap();
        let before = v.as_tensor();

        let update = NamedTensor::from_vec(
            vec![1f32, 2., 3., 4., 5., 6.],
            &[("out", 3), ("in", 2)],
            &Device::Cpu,
        )
        .unwrap();
        v.assign(&update).unwrap();

        let after = v.as_tensor();
        assert_eq!(after.dim_names(), &["in", "out"]);
        assert_eq!(after.to_vec().unwrap(), vec![1., 3., 5., 2., 4., 6.]);
        // Earlier views see the new values.
        assert_eq!(before.to_vec().unwrap(), after.to_vec().unwrap());
        // The initial tensor was copied, not aliased.
        assert_eq!(init.to_vec().unwrap(), vec![0.; 6]);
    }

    #[test]
    fn test_assign_own_value() {
        let init = NamedTensor::from_vec(vec![1f32, 2., 3.], &[("x", 3)], &Device::Cpu).unwrap();
        let v = Variable::new(&init).unwrap();
        v.assign(&v.as_tensor()).unwrap();
        assert_eq!(v.as_tensor().to_vec().unwrap(), vec![1., 2., 3.]);

        let m = Variable::new(
            &NamedTensor::from_vec(vec![1f32, 2., 3., 4.], &[("a", 2), ("b", 2)], &Device::Cpu)
                .unwrap(),
        )
        .unwrap();
        // A transposed view of the variable, assigned back in the other order.
        m.assign(&m.as_tensor().transpose().unwrap()).unwrap();
        assert_eq!(m.as_tensor().to_vec().unwrap(), vec![1., 2., 3., 4.]);

        // Transposing around a size-1 axis gives a contiguous view of the same storage.
        let row = Variable::new(
            &NamedTensor::from_vec(vec![5f32, 6., 7.], &[("one", 1), ("x", 3)], &Device::Cpu).unwrap(),
        )
        .unwrap();
        row.assign(&row.as_tensor().transpose().unwrap().detach()).unwrap();
        assert_eq!(row.as_tensor().to_vec().unwrap(), vec![5., 6., 7.]);
    }

    #[test]
    fn test_assign_rejects_other_names_and_sizes() {
        let init = NamedTensor::zeros(&[("x", 2)], DType::Float32, &Device::Cpu).unwrap();
        let v = Variable::new(&init).unwrap();
        let wrong_name = NamedTensor::zeros(&[("y", 2)], DType::Float32, &Device::Cpu).unwrap();
        assert!(matches!(
            v.assign(&wrong_name).unwrap_err(),
            GTensorError::NotAPermutation { .. }
        ));
        let wrong_size = NamedTensor::zeros(&[("x", 3)], DType::Float32, &Device::Cpu).unwrap();
        assert!(matches!(
            v.assign(&wrong_size).unwrap_err(),
            GTensorError::SizeMismatch { .. }
        ));
    }

    #[test]
    fn test_clones_share_storage() {
        let init = NamedTensor::zeros(&[("x", 2)], DType::Float32, &Device::Cpu).unwrap();
        let v = Variable::new(&init).unwrap();
        let alias = v.clone();
        let ones = NamedTensor::ones(&[("x", 2)], DType::Float32, &Device::Cpu).unwrap();
        alias.assign(&ones).unwrap();
        alias.dispose();
        assert_eq!(v.as_tensor().to_vec().unwrap(), vec![1., 1.]);
        assert_eq!(v.gshape()["x"], 2);
    }
}
