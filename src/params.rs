//! Parameter trees: creation, persistence, assignment and gradients.

use candle_core::Device;

use crate::error::{GTensorError, Result};
use crate::tensor::{NamedTensor, SerializedTensor, Variable};
use crate::tree::Tree;

pub type ParamTree = Tree<NamedTensor>;
pub type VarTree = Tree<Variable>;
pub type SerializedParams = Tree<SerializedTensor>;

/// Copy every tensor into a fresh [`Variable`].
pub fn varify_params(params: &ParamTree) -> Result<VarTree> {
    params.try_map(|t, _| Variable::new(t))
}

/// Current values of a variable tree, sharing the variables' storage.
pub fn params_of_vars(vars: &VarTree) -> ParamTree {
    vars.map(|v, _| v.as_tensor())
}

pub fn serialize_params(params: &ParamTree) -> Result<SerializedParams> {
    params.try_map(|t, _| t.to_serialized())
}

pub fn deserialize_params(params: &SerializedParams, device: &Device) -> Result<ParamTree> {
    params.try_map(|s, _| NamedTensor::from_serialized(s, device))
}

/// Overwrite each variable with the tensor at the same tree position.
pub fn assign_params(vars: &VarTree, values: &ParamTree) -> Result<()> {
    vars.try_for_each_zip(values, |v, t, _| v.assign(t))
}

/// Release every tensor in the tree.
pub fn dispose_params<T>(params: Tree<T>) {
    drop(params.into_flat())
}

/// Evaluate a scalar loss of the variables' current values and compute its
/// gradient with respect to every variable.
///
/// The gradient tree has the same structure as `vars` and each gradient has
/// its variable's axis names. Variables the loss does not depend on get
/// zero gradients. The returned loss is detached.
pub fn loss_and_grads<F>(vars: &VarTree, loss_fn: F) -> Result<(NamedTensor, ParamTree)>
where
    F: FnOnce(&ParamTree) -> Result<NamedTensor>,
{
    let params = params_of_vars(vars);
    let loss = loss_fn(&params)?;
    if !loss.is_scalar() {
        return Err(GTensorError::InvalidArgument(format!(
            "loss must be a scalar, got dimensions {:?}",
            loss.dim_names()
        )));
    }
    let grads = loss.tensor().backward()?;
    tracing::debug!(params = vars.num_leaves(), "computed gradients");

    let grad_tree = vars.try_map(|v, _| {
        let value = v.as_tensor();
        match grads.get(v.var().as_tensor()) {
            Some(g) => value.map_tensor(|_| Ok(g.clone())),
            None => value.zero(),
        }
    })?;
    Ok((loss.detach(), grad_tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DType;

    fn params() -> ParamTree {
        let dev = Device::Cpu;
        Tree::map_of([
            (
                "w",
                Tree::leaf(NamedTensor::from_vec(vec![1f32, 2., 3.], &[("in", 3)], &dev).unwrap()),
            ),
            (
                "b",
                Tree::leaf(NamedTensor::scalar(0.5, &dev).unwrap()),
            ),
            (
                "unused",
                Tree::leaf(NamedTensor::ones(&[("z", 2)], DType::Float32, &dev).unwrap()),
            ),
        ])
    }

    #[test]
    fn test_varify_and_read_back() {
        let p = params();
        let vars = varify_params(&p).unwrap();
        let back = params_of_vars(&vars);
        assert!(back.same_structure(&p));
        let w = back.get("w").and_then(Tree::as_leaf).unwrap();
        assert_eq!(w.dim_names(), &["in"]);
        assert_eq!(w.to_vec().unwrap(), vec![1., 2., 3.]);
    }

    #[test]
    fn test_serialize_round_trip() {
        let p = params();
        let s = serialize_params(&p).unwrap();
        let back = deserialize_params(&s, &Device::Cpu).unwrap();
        back.for_each_zip(&p, |a, b, _| {
            assert_eq!(a.dim_names(), b.dim_names());
            assert_eq!(a.to_vec().unwrap(), b.to_vec().unwrap());
        })
        .unwrap();
    }

    #[test]
    fn test_loss_and_grads() {
        let vars = varify_params(&params()).unwrap();
        let x = NamedTensor::from_vec(vec![1f32, 1., 2.], &[("in", 3)], &Device::Cpu).unwrap();
        let (loss, grads) = loss_and_grads(&vars, |p| {
            let w = p.get("w").and_then(Tree::as_leaf).ok_or(GTensorError::MixedList)?;
            let b = p.get("b").and_then(Tree::as_leaf).ok_or(GTensorError::MixedList)?;
            w.contract(&x, &["in"])?.pointwise_add(b)
        })
        .unwrap();
        // 1 + 2 + 6 + 0.5
        assert!((loss.to_scalar().unwrap() - 9.5).abs() < 1e-5);

        let flat = grads.flatten();
        // Sorted keys: b, unused, w.
        assert!((flat[0].to_scalar().unwrap() - 1.0).abs() < 1e-5);
        assert_eq!(flat[1].to_vec().unwrap(), vec![0., 0.]);
        assert_eq!(flat[2].dim_names(), &["in"]);
        assert_eq!(flat[2].to_vec().unwrap(), vec![1., 1., 2.]);
    }

    #[test]
    fn test_assign_params_step() {
        let vars = varify_params(&params()).unwrap();
        let (_, grads) = loss_and_grads(&vars, |p| {
            let w = p.get("w").and_then(Tree::as_leaf).ok_or(GTensorError::MixedList)?;
            w.squared()?.sum_over_dims(&["in"])
        })
        .unwrap();
        let lr = NamedTensor::scalar(0.5, &Device::Cpu).unwrap();
        let current = params_of_vars(&vars);
        let stepped = Tree::unflatten(
            &current,
            current
                .iter()
                .zip(grads.iter())
                .map(|(p, g)| p.pointwise_sub(&g.scalar_mul(&lr)?))
                .collect::<Result<Vec<_>>>()
                .unwrap(),
        )
        .unwrap();
        assign_params(&vars, &stepped).unwrap();
        // w - 0.5 * 2w = 0
        let w = params_of_vars(&vars);
        let w = w.get("w").and_then(Tree::as_leaf).unwrap();
        assert_eq!(w.to_vec().unwrap(), vec![0., 0., 0.]);

        // Writing back the current values leaves them unchanged.
        assign_params(&vars, &params_of_vars(&vars)).unwrap();
        let w = params_of_vars(&vars);
        assert_eq!(w.get("w").and_then(Tree::as_leaf).unwrap().to_vec().unwrap(), vec![0., 0., 0.]);

        let wrong = Tree::map_of([("w", Tree::leaf(NamedTensor::scalar(1.0, &Device::Cpu).unwrap()))]);
        assert!(assign_params(&vars, &wrong).is_err());
        dispose_params(stepped);
    }
}
