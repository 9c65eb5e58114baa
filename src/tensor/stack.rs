//! Stacking, and lifting per-slice functions over a named dimension.

use std::collections::BTreeMap;

use candle_core::Tensor;

use super::named::NamedTensor;
use crate::error::{GTensorError, Result};

/// Stack tensors with the same names along a new leading dimension.
///
/// Each tensor is first transposed to the first tensor's axis order.
pub fn stack(new_name: &str, tensors: &[NamedTensor]) -> Result<NamedTensor> {
    let first = tensors.first().ok_or(GTensorError::EmptyStack)?;
    if first.has_dim(new_name) {
        return Err(GTensorError::NameCollision {
            name: new_name.to_string(),
            names: first.dim_names().to_vec(),
        });
    }
    let aligned = tensors
        .iter()
        .map(|t| t.transpose_like(first).map(|t| t.tensor))
        .collect::<Result<Vec<Tensor>>>()?;
    let stacked = Tensor::stack(&aligned, 0)?;
    let mut names = Vec::with_capacity(first.rank() + 1);
    names.push(new_name.to_string());
    names.extend_from_slice(first.dim_names());
    NamedTensor::from_parts(stacked, names, first.dtype())
}

/// Apply `f` to each slice along `name` and stack the results back on a
/// leading `name` dimension.
pub fn lift_over_dim<F>(name: &str, input: &NamedTensor, mut f: F) -> Result<NamedTensor>
where
    F: FnMut(NamedTensor) -> Result<NamedTensor>,
{
    let slices = input.unstack(name)?;
    let outputs = slices.into_iter().map(&mut f).collect::<Result<Vec<_>>>()?;
    stack(name, &outputs)
}

/// Like [`lift_over_dim`] for functions returning a map of tensors; each
/// entry is stacked separately.
pub fn lift_map_over_dim<F>(
    name: &str,
    input: &NamedTensor,
    mut f: F,
) -> Result<BTreeMap<String, NamedTensor>>
where
    F: FnMut(NamedTensor) -> Result<BTreeMap<String, NamedTensor>>,
{
    let slices = input.unstack(name)?;
    let outputs = slices.into_iter().map(&mut f).collect::<Result<Vec<_>>>()?;
    let Some(first) = outputs.first() else {
        return Err(GTensorError::EmptyStack);
    };
    let keys: Vec<String> = first.keys().cloned().collect();

    let mut stacked = BTreeMap::new();
    for key in keys {
        let column = outputs
            .iter()
            .map(|out| {
                out.get(&key).cloned().ok_or_else(|| {
                    GTensorError::InvalidArgument(format!("lifted output is missing key '{key}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        stacked.insert(key.clone(), stack(name, &column)?);
    }
    Ok(stacked)
}
