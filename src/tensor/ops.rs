//! Axis-addressed neural-network operations: softmax, gather, masking.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use super::dtype::DType;
use super::named::NamedTensor;
use crate::error::{GTensorError, Result};

/// Which side of the diagonal a triangular mask fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Triangle {
    /// Fill where `j - i > offset` (future positions, for causal attention).
    #[default]
    Upper,
    /// Fill where `i - j > offset`.
    Lower,
}

impl NamedTensor {
    /// Softmax along the named dimension. Names and order are unchanged.
    pub fn softmax(&self, name: &str) -> Result<NamedTensor> {
        self.require_real("softmax")?;
        let i = self.index_of(name)?;
        let out = candle_nn::ops::softmax(&self.tensor, i)?;
        NamedTensor::from_parts(out, self.dim_names.clone(), self.dtype)
    }

    /// Log-softmax along the named dimension.
    pub fn log_softmax(&self, name: &str) -> Result<NamedTensor> {
        self.require_real("log_softmax")?;
        let i = self.index_of(name)?;
        let out = candle_nn::ops::log_softmax(&self.tensor, i)?;
        NamedTensor::from_parts(out, self.dim_names.clone(), self.dtype)
    }

    /// Look up slices of this tensor along `name` using integer indexes.
    ///
    /// The `name` axis is replaced, at its position, by all the axes of
    /// `indexes` in their order.
    pub fn gather(&self, indexes: &NamedTensor, name: &str) -> Result<NamedTensor> {
        if indexes.dtype != DType::Int32 {
            return Err(GTensorError::UnsupportedDType {
                op: "gather",
                dtype: indexes.dtype.to_string(),
            });
        }
        let i = self.index_of(name)?;
        let size = self.shape()[i];
        let flat = indexes.tensor.flatten_all()?;
        if flat.elem_count() > 0 {
            let hi = flat.max(0)?.to_scalar::<i64>()?;
            let lo = flat.min(0)?.to_scalar::<i64>()?;
            if lo < 0 || hi as usize >= size {
                return Err(GTensorError::InvalidArgument(format!(
                    "gather index out of range [{lo}, {hi}] for '{name}' of size {size}"
                )));
            }
        }
        let picked = self.tensor.index_select(&flat, i)?;

        let mut shape = self.shape()[..i].to_vec();
        shape.extend_from_slice(indexes.shape());
        shape.extend_from_slice(&self.shape()[i + 1..]);
        let mut names = self.dim_names[..i].to_vec();
        names.extend_from_slice(indexes.dim_names());
        names.extend_from_slice(&self.dim_names[i + 1..]);

        let reshaped = picked.reshape(self.storage_shape(&shape))?;
        NamedTensor::from_parts(reshaped, names, self.dtype)
    }

    /// Overwrite one triangle of the `dim1` x `dim2` sub-matrix with `fill`,
    /// for every index of the other axes.
    ///
    /// `i` indexes `dim1` and `j` indexes `dim2`; see [`Triangle`] for which
    /// cells are filled. Both axes must have the same size.
    pub fn triangular_mask(
        &self,
        dim1: &str,
        dim2: &str,
        fill: f64,
        offset: i64,
        triangle: Triangle,
    ) -> Result<NamedTensor> {
        self.require_real("triangular_mask")?;
        let size1 = self.size_of(dim1)?;
        let size2 = self.size_of(dim2)?;
        if size1 != size2 {
            return Err(GTensorError::NonSquare {
                dim1: dim1.to_string(),
                size1,
                dim2: dim2.to_string(),
                size2,
            });
        }
        let n = size1;
        let cells: Vec<u8> = (0..n * n)
            .map(|k| {
                let (i, j) = ((k / n) as i64, (k % n) as i64);
                let filled = match triangle {
                    Triangle::Upper => j - i > offset,
                    Triangle::Lower => i - j > offset,
                };
                u8::from(filled)
            })
            .collect();
        let mask = NamedTensor::from_vec(cells, &[(dim1, n), (dim2, n)], self.device())?
            .broadcast_to_combined_shape(self)?
            .transpose_like(self)?;
        let mask = mask.tensor.contiguous()?;

        let filler = Tensor::full(fill as f32, self.tensor.dims(), self.device())?
            .to_dtype(self.tensor.dtype())?;
        let out = mask.where_cond(&filler, &self.tensor)?;
        tracing::trace!(dim1, dim2, offset, ?triangle, "triangular_mask");
        NamedTensor::from_parts(out, self.dim_names.clone(), self.dtype)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    fn assert_close(got: &[f32], want: &[f32]) {
        assert_eq!(got.len(), want.len(), "got {got:?}, want {want:?}");
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-5, "got {got:?}, want {want:?}");
        }
    }

    #[test]
    fn test_softmax_keeps_names() {
        let g = NamedTensor::from_vec(
            vec![1f32, 2., 3., 1., 1., 1.],
            &[("row", 2), ("col", 3)],
            &Device::Cpu,
        )
        .unwrap();
        let s = g.softmax("row").unwrap();
        assert_eq!(s.dim_names(), g.dim_names());
        let cols = s.sum_over_dims(&["row"]).unwrap().to_vec().unwrap();
        assert_close(&cols, &[1., 1., 1.]);

        let s = g.softmax("col").unwrap();
        let v = s.to_vec().unwrap();
        assert_close(&v[3..], &[1. / 3., 1. / 3., 1. / 3.]);
        assert!(v[0] < v[1] && v[1] < v[2]);
    }

    #[test]
    fn test_log_softmax() {
        let g = NamedTensor::from_vec(vec![0f32, 0.], &[("x", 2)], &Device::Cpu).unwrap();
        let l = g.log_softmax("x").unwrap();
        let half = 0.5f32.ln();
        assert_close(&l.to_vec().unwrap(), &[half, half]);
    }

    #[test]
    fn test_gather_relative_positions() {
        let g = NamedTensor::from_vec(
            vec![1f32, 2., 3., 4., 5., 6., 7., 8.],
            &[("heads", 2), ("relativePos", 4)],
            &Device::Cpu,
        )
        .unwrap();
        let idx = NamedTensor::from_vec(
            vec![0i64, 1, 1, 2, 2, 3],
            &[("keyPos", 3), ("queryPos", 2)],
            &Device::Cpu,
        )
        .unwrap();
        let out = g.gather(&idx, "relativePos").unwrap();
        assert_eq!(out.dim_names(), &["heads", "keyPos", "queryPos"]);
        assert_eq!(out.shape(), &[2, 3, 2]);
        assert_close(
            &out.to_vec().unwrap(),
            &[1., 2., 2., 3., 3., 4., 5., 6., 6., 7., 7., 8.],
        );
    }

    #[test]
    fn test_gather_rejects_bad_indexes() {
        let g = NamedTensor::from_vec(vec![1f32, 2.], &[("x", 2)], &Device::Cpu).unwrap();
        let floats = NamedTensor::from_vec(vec![0f32], &[("i", 1)], &Device::Cpu).unwrap();
        assert!(matches!(
            g.gather(&floats, "x").unwrap_err(),
            GTensorError::UnsupportedDType { .. }
        ));
        let far = NamedTensor::from_vec(vec![5i64], &[("i", 1)], &Device::Cpu).unwrap();
        assert!(g.gather(&far, "x").is_err());
    }

    #[test]
    fn test_triangular_mask_causal() {
        let zeros = NamedTensor::zeros(
            &[("heads", 1), ("batch", 1), ("Pos1", 3), ("Pos2", 3)],
            DType::Float32,
            &Device::Cpu,
        )
        .unwrap();
        let masked = zeros
            .triangular_mask("Pos1", "Pos2", f64::NEG_INFINITY, 0, Triangle::Upper)
            .unwrap();
        assert_eq!(masked.dim_names(), zeros.dim_names());
        let inf = f32::NEG_INFINITY;
        assert_eq!(
            masked.to_vec().unwrap(),
            vec![0., inf, inf, 0., 0., inf, 0., 0., 0.]
        );
    }

    #[test]
    fn test_triangular_mask_lower_with_offset() {
        let ones = NamedTensor::ones(&[("q", 3), ("k", 3)], DType::Float32, &Device::Cpu).unwrap();
        let masked = ones.triangular_mask("q", "k", 0., 1, Triangle::Lower).unwrap();
        assert_eq!(masked.to_vec().unwrap(), vec![1., 1., 1., 1., 1., 1., 0., 1., 1.]);
    }

    #[test]
    fn test_triangular_mask_axes_in_any_order() {
        let ones = NamedTensor::ones(&[("k", 2), ("b", 2), ("q", 2)], DType::Float32, &Device::Cpu).unwrap();
        let masked = ones.triangular_mask("q", "k", 0., 0, Triangle::Upper).unwrap();
        // Filled where k > q; stored as [k][b][q].
        assert_eq!(masked.to_vec().unwrap(), vec![1., 1., 1., 1., 0., 1., 0., 1.]);
    }

    #[test]
    fn test_triangular_mask_non_square() {
        let ones = NamedTensor::ones(&[("q", 2), ("k", 3)], DType::Float32, &Device::Cpu).unwrap();
        assert!(matches!(
            ones.triangular_mask("q", "k", 0., 0, Triangle::Upper).unwrap_err(),
            GTensorError::NonSquare { .. }
        ));
    }
}
