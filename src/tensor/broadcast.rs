//! Broadcasting and pointwise binary operations, matched by axis name.

use candle_core::Tensor;

use super::dtype::DType;
use super::named::NamedTensor;
use crate::error::{GTensorError, Result};

/// Elementwise binary operations on equally shaped buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    SquaredDifference,
    Equal,
}

impl BinaryOp {
    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::SquaredDifference => "squared_difference",
            BinaryOp::Equal => "equal",
        }
    }

    fn apply(self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        Ok(match self {
            BinaryOp::Add => a.add(b)?,
            BinaryOp::Sub => a.sub(b)?,
            BinaryOp::Mul => a.mul(b)?,
            BinaryOp::Div => a.div(b)?,
            BinaryOp::SquaredDifference => a.sub(b)?.sqr()?,
            BinaryOp::Equal => a.eq(b)?,
        })
    }

    fn result_dtype(self, input: DType) -> DType {
        match self {
            BinaryOp::Equal => DType::Bool,
            _ => input,
        }
    }
}

impl NamedTensor {
    /// Axes of `other` that this tensor lacks, in `other`'s order.
    ///
    /// Fails if a shared axis has different sizes in the two tensors.
    pub fn subtract_dims_from(&self, other: &NamedTensor) -> Result<Vec<(String, usize)>> {
        let mut missing = Vec::new();
        for (name, &size) in other.dim_names().iter().zip(other.shape()) {
            match self.dim_names().iter().position(|n| n == name) {
                Some(i) if self.shape()[i] != size => {
                    return Err(GTensorError::SizeMismatch {
                        name: name.clone(),
                        left: self.shape()[i],
                        right: size,
                    })
                }
                Some(_) => {}
                None => missing.push((name.clone(), size)),
            }
        }
        Ok(missing)
    }

    /// Prepend the axes this tensor lacks from `other`, so that the result
    /// holds the union of both name sets.
    pub fn broadcast_to_combined_shape(&self, other: &NamedTensor) -> Result<NamedTensor> {
        if self.is_scalar() {
            return Err(GTensorError::ScalarReceiver {
                op: "broadcast_to_combined_shape",
            });
        }
        let missing = self.subtract_dims_from(other)?;
        self.prepend_dims(&missing)
    }

    /// Prepend new axes with the given sizes.
    pub fn broadcast_to<S: AsRef<str>>(&self, new_dims: &[(S, usize)]) -> Result<NamedTensor> {
        for (name, _) in new_dims {
            if self.has_dim(name.as_ref()) {
                return Err(GTensorError::NameCollision {
                    name: name.as_ref().to_string(),
                    names: self.dim_names().to_vec(),
                });
            }
        }
        let owned: Vec<(String, usize)> = new_dims
            .iter()
            .map(|(n, s)| (n.as_ref().to_string(), *s))
            .collect();
        self.prepend_dims(&owned)
    }

    fn prepend_dims(&self, new_dims: &[(String, usize)]) -> Result<NamedTensor> {
        if new_dims.is_empty() {
            return Ok(self.clone());
        }
        let mut shape: Vec<usize> = new_dims.iter().map(|(_, s)| *s).collect();
        shape.extend_from_slice(self.shape());
        let mut names: Vec<String> = new_dims.iter().map(|(n, _)| n.clone()).collect();
        names.extend_from_slice(self.dim_names());
        let expanded = self.tensor.broadcast_as(self.storage_shape(&shape))?;
        NamedTensor::from_parts(expanded, names, self.dtype)
    }

    /// Apply a binary operation after aligning both operands by name.
    ///
    /// The result has the axes of `other` that this tensor lacks first, in
    /// `other`'s order, followed by all of this tensor's axes in its order.
    /// A scalar operand is broadcast over the other operand, whose names the
    /// result keeps.
    pub fn pointwise(&self, op: BinaryOp, other: &NamedTensor) -> Result<NamedTensor> {
        self.require_real(op.name())?;
        other.require_real(op.name())?;
        if self.dtype != other.dtype {
            return Err(GTensorError::UnsupportedDType {
                op: op.name(),
                dtype: format!("{} with {}", self.dtype, other.dtype),
            });
        }
        let dtype = op.result_dtype(self.dtype);

        if self.is_scalar() || other.is_scalar() {
            let (a, b, names) = if self.is_scalar() {
                let a = self.tensor.broadcast_as(other.tensor.shape())?;
                (a, other.tensor.clone(), other.dim_names.clone())
            } else {
                let b = other.tensor.broadcast_as(self.tensor.shape())?;
                (self.tensor.clone(), b, self.dim_names.clone())
            };
            return NamedTensor::from_parts(op.apply(&a, &b)?, names, dtype);
        }

        let self_big = self.broadcast_to_combined_shape(other)?;
        let other_big = other.broadcast_to_combined_shape(self)?.transpose_like(&self_big)?;
        tracing::trace!(op = op.name(), names = ?self_big.dim_names, "pointwise");
        NamedTensor::from_parts(
            op.apply(&self_big.tensor, &other_big.tensor)?,
            self_big.dim_names,
            dtype,
        )
    }

    pub fn pointwise_add(&self, other: &NamedTensor) -> Result<NamedTensor> {
        self.pointwise(BinaryOp::Add, other)
    }

    pub fn pointwise_sub(&self, other: &NamedTensor) -> Result<NamedTensor> {
        self.pointwise(BinaryOp::Sub, other)
    }

    pub fn pointwise_mul(&self, other: &NamedTensor) -> Result<NamedTensor> {
        self.pointwise(BinaryOp::Mul, other)
    }

    pub fn pointwise_div(&self, other: &NamedTensor) -> Result<NamedTensor> {
        self.pointwise(BinaryOp::Div, other)
    }

    /// 1 where the aligned elements are equal, 0 elsewhere; dtype bool.
    pub fn pointwise_equal(&self, other: &NamedTensor) -> Result<NamedTensor> {
        self.pointwise(BinaryOp::Equal, other)
    }

    /// `(self - other)^2`, aligned by name.
    pub fn squared_difference(&self, other: &NamedTensor) -> Result<NamedTensor> {
        self.pointwise(BinaryOp::SquaredDifference, other)
    }

    fn with_scalar(&self, op: BinaryOp, scalar: &NamedTensor, scalar_first: bool) -> Result<NamedTensor> {
        if !scalar.is_scalar() {
            return Err(GTensorError::InvalidArgument(format!(
                "scalar_{} expects a rank-0 operand, got {:?}",
                op.name(),
                scalar.dim_names()
            )));
        }
        if scalar_first {
            scalar.pointwise(op, self)
        } else {
            self.pointwise(op, scalar)
        }
    }

    pub fn scalar_add(&self, scalar: &NamedTensor) -> Result<NamedTensor> {
        self.with_scalar(BinaryOp::Add, scalar, false)
    }

    /// `self - scalar`
    pub fn scalar_sub(&self, scalar: &NamedTensor) -> Result<NamedTensor> {
        self.with_scalar(BinaryOp::Sub, scalar, false)
    }

    /// `scalar - self`
    pub fn scalar_sub_from(&self, scalar: &NamedTensor) -> Result<NamedTensor> {
        self.with_scalar(BinaryOp::Sub, scalar, true)
    }

    pub fn scalar_mul(&self, scalar: &NamedTensor) -> Result<NamedTensor> {
        self.with_scalar(BinaryOp::Mul, scalar, false)
    }

    /// `self / scalar`
    pub fn scalar_div(&self, scalar: &NamedTensor) -> Result<NamedTensor> {
        self.with_scalar(BinaryOp::Div, scalar, false)
    }

    /// `scalar / self`
    pub fn scalar_div_from(&self, scalar: &NamedTensor) -> Result<NamedTensor> {
        self.with_scalar(BinaryOp::Div, scalar, true)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    fn filled(dims: &[(&str, usize)], value: f32) -> NamedTensor {
        NamedTensor::constant(dims, value as f64, DType::Float32, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_broadcast_to_combined_shape() {
        let bar = filled(&[("example", 2), ("repSize", 3)], 1.);
        let foo = filled(&[("point_id", 4), ("repSize", 3)], 2.);
        let big = foo.broadcast_to_combined_shape(&bar).unwrap();
        assert_eq!(big.dim_names(), &["example", "point_id", "repSize"]);
        assert_eq!(big.shape(), &[2, 4, 3]);
        assert!(big.to_vec().unwrap().iter().all(|&v| v == 2.));
    }

    #[test]
    fn test_broadcast_size_mismatch() {
        let a = filled(&[("x", 2)], 1.);
        let b = filled(&[("x", 3)], 1.);
        assert!(matches!(
            a.broadcast_to_combined_shape(&b).unwrap_err(),
            GTensorError::SizeMismatch { left: 2, right: 3, .. }
        ));
        assert!(matches!(
            a.pointwise_add(&b).unwrap_err(),
            GTensorError::SizeMismatch { .. }
        ));
    }

    #[test]
    fn test_scalar_receiver_rejected() {
        let s = NamedTensor::scalar(1.0, &Device::Cpu).unwrap();
        let a = filled(&[("x", 2)], 1.);
        assert!(matches!(
            s.broadcast_to_combined_shape(&a).unwrap_err(),
            GTensorError::ScalarReceiver { .. }
        ));
    }

    #[test]
    fn test_pointwise_add_shared_axis() {
        let bar = filled(&[("example", 2), ("repSize", 3)], 1.);
        let foo = filled(&[("point_id", 4), ("repSize", 3)], 2.);
        let sum = bar.pointwise_add(&foo).unwrap();
        assert_eq!(sum.dim_names(), &["point_id", "example", "repSize"]);
        assert_eq!(sum.shape(), &[4, 2, 3]);
        assert!(sum.to_vec().unwrap().iter().all(|&v| v == 3.));
    }

    #[test]
    fn test_pointwise_add_disjoint() {
        let bar = filled(&[("example", 2), ("repSize", 3)], 1.);
        let foo = filled(&[("point_id", 4), ("repSize2", 5)], 2.);
        let sum = foo.pointwise_add(&bar).unwrap();
        assert_eq!(sum.dim_names(), &["example", "repSize", "point_id", "repSize2"]);
        assert_eq!(sum.shape(), &[2, 3, 4, 5]);
        let other_way = bar.pointwise_add(&foo).unwrap();
        assert_eq!(other_way.dim_names(), &["point_id", "repSize2", "example", "repSize"]);
    }

    #[test]
    fn test_pointwise_order_depends_on_receiver() {
        let bar = NamedTensor::from_vec(vec![1f32, 2., 3., 4., 5., 6.], &[("pos", 3), ("repSize", 2)], &Device::Cpu)
            .unwrap();
        let foo = NamedTensor::from_vec(vec![10f32, 20., 30.], &[("pos", 3)], &Device::Cpu).unwrap();

        let bf = bar.pointwise_add(&foo).unwrap();
        assert_eq!(bf.dim_names(), &["pos", "repSize"]);
        assert_eq!(bf.to_vec().unwrap(), vec![11., 12., 23., 24., 35., 36.]);

        let fb = foo.pointwise_add(&bar).unwrap();
        assert_eq!(fb.dim_names(), &["repSize", "pos"]);
        assert_eq!(fb.to_vec().unwrap(), vec![11., 23., 35., 12., 24., 36.]);
    }

    #[test]
    fn test_pointwise_sub_and_div() {
        let a = NamedTensor::from_vec(vec![6f32, 8.], &[("x", 2)], &Device::Cpu).unwrap();
        let b = NamedTensor::from_vec(vec![2f32, 4.], &[("x", 2)], &Device::Cpu).unwrap();
        assert_eq!(a.pointwise_sub(&b).unwrap().to_vec().unwrap(), vec![4., 4.]);
        assert_eq!(a.pointwise_div(&b).unwrap().to_vec().unwrap(), vec![3., 2.]);
        assert_eq!(a.pointwise_mul(&b).unwrap().to_vec().unwrap(), vec![12., 32.]);
    }

    #[test]
    fn test_scalar_ops() {
        let a = NamedTensor::from_vec(vec![1f32, 2., 4.], &[("x", 3)], &Device::Cpu).unwrap();
        let two = NamedTensor::scalar(2.0, &Device::Cpu).unwrap();
        assert_eq!(a.scalar_add(&two).unwrap().to_vec().unwrap(), vec![3., 4., 6.]);
        assert_eq!(a.scalar_sub(&two).unwrap().to_vec().unwrap(), vec![-1., 0., 2.]);
        assert_eq!(a.scalar_sub_from(&two).unwrap().to_vec().unwrap(), vec![1., 0., -2.]);
        assert_eq!(a.scalar_mul(&two).unwrap().to_vec().unwrap(), vec![2., 4., 8.]);
        assert_eq!(a.scalar_div(&two).unwrap().to_vec().unwrap(), vec![0.5, 1., 2.]);
        assert_eq!(a.scalar_div_from(&two).unwrap().to_vec().unwrap(), vec![2., 1., 0.5]);
        assert_eq!(a.scalar_add(&two).unwrap().dim_names(), &["x"]);
        assert!(a.scalar_add(&a).is_err());
    }

    #[test]
    fn test_squared_difference_distinct_axes() {
        let p = NamedTensor::from_vec(
            vec![1f32, 0., 0., 1., 1., 1.],
            &[("point_id", 3), ("inputRepSize", 2)],
            &Device::Cpu,
        )
        .unwrap();
        let q = p.rename("point_id", "point_id2").unwrap();
        let d = p.squared_difference(&q).unwrap();
        let shape = d.gshape();
        assert_eq!(shape["point_id"], 3);
        assert_eq!(shape["point_id2"], 3);
        assert_eq!(shape["inputRepSize"], 2);
        let dist = d.sum_over_dims(&["inputRepSize"]).unwrap().transpose_to(&["point_id", "point_id2"]).unwrap();
        assert_eq!(dist.to_vec().unwrap(), vec![0., 2., 1., 2., 0., 1., 1., 1., 0.]);
    }

    #[test]
    fn test_pointwise_equal() {
        let a = NamedTensor::from_vec(vec![1i64, 2, 3], &[("x", 3)], &Device::Cpu).unwrap();
        let b = NamedTensor::from_vec(vec![1i64, 5, 3], &[("x", 3)], &Device::Cpu).unwrap();
        let eq = a.pointwise_equal(&b).unwrap();
        assert_eq!(eq.dtype(), DType::Bool);
        assert_eq!(eq.to_vec().unwrap(), vec![1., 0., 1.]);
    }

    #[test]
    fn test_broadcast_to_prepends() {
        let a = filled(&[("x", 2)], 1.);
        let b = a.broadcast_to(&[("batch", 3)]).unwrap();
        assert_eq!(b.dim_names(), &["batch", "x"]);
        assert_eq!(b.shape(), &[3, 2]);
        assert!(a.broadcast_to(&[("x", 3)]).is_err());
    }
}
