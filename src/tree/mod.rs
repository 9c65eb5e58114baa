//! Nested collections of leaves, traversed in a fixed order.
//!
//! A [`Tree`] holds the parameters (or gradients, or shapes) of a whole model
//! as one value. Maps are `BTreeMap`s, so traversal always visits keys in
//! sorted order; list nodes are either all leaves or all maps.
//!
//! The flat order of leaves is the contract between [`Tree::flatten`] and
//! [`Tree::unflatten`]: anything computed per leaf from a flattened tree can
//! be put back into the tree's shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GTensorError, Result};

/// A leaf, a list, or a string-keyed map of trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tree<T> {
    Leaf(T),
    /// A list of leaves.
    Leaves(Vec<T>),
    Map(BTreeMap<String, Tree<T>>),
    /// A list of maps.
    Maps(Vec<BTreeMap<String, Tree<T>>>),
}

impl<T> Tree<T> {
    pub fn leaf(value: T) -> Self {
        Tree::Leaf(value)
    }

    /// A map node from `(key, subtree)` pairs.
    pub fn map_of<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Tree<T>)>,
    {
        Tree::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// A list node from dynamically built parts.
    ///
    /// All parts must be leaves, or all must be maps. A part that is itself
    /// a list fails with [`GTensorError::NestedList`], since lists of lists
    /// have no representation; leaves mixed with maps fail with
    /// [`GTensorError::MixedList`]. An empty input gives an empty list of
    /// leaves.
    pub fn list(items: Vec<Tree<T>>) -> Result<Self> {
        if items
            .iter()
            .any(|t| matches!(t, Tree::Leaves(_) | Tree::Maps(_)))
        {
            return Err(GTensorError::NestedList);
        }
        if items.iter().all(|t| matches!(t, Tree::Leaf(_))) {
            let leaves = items
                .into_iter()
                .filter_map(|t| match t {
                    Tree::Leaf(v) => Some(v),
                    _ => None,
                })
                .collect();
            return Ok(Tree::Leaves(leaves));
        }
        if items.iter().all(|t| matches!(t, Tree::Map(_))) {
            let maps = items
                .into_iter()
                .filter_map(|t| match t {
                    Tree::Map(m) => Some(m),
                    _ => None,
                })
                .collect();
            return Ok(Tree::Maps(maps));
        }
        Err(GTensorError::MixedList)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Tree::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            Tree::Leaf(v) => Some(v),
            _ => None,
        }
    }

    /// Child of a map node.
    pub fn get(&self, key: &str) -> Option<&Tree<T>> {
        match self {
            Tree::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Leaves in traversal order: depth first, map keys sorted.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        match self {
            Tree::Leaf(v) => Box::new(std::iter::once(v)),
            Tree::Leaves(vs) => Box::new(vs.iter()),
            Tree::Map(m) => Box::new(m.values().flat_map(|t| t.iter())),
            Tree::Maps(ms) => Box::new(ms.iter().flat_map(|m| m.values().flat_map(|t| t.iter()))),
        }
    }

    pub fn flatten(&self) -> Vec<&T> {
        self.iter().collect()
    }

    /// Consume the tree, returning its leaves in traversal order.
    pub fn into_flat(self) -> Vec<T> {
        let mut out = Vec::new();
        self.push_leaves(&mut out);
        out
    }

    fn push_leaves(self, out: &mut Vec<T>) {
        match self {
            Tree::Leaf(v) => out.push(v),
            Tree::Leaves(vs) => out.extend(vs),
            Tree::Map(m) => m.into_values().for_each(|t| t.push_leaves(out)),
            Tree::Maps(ms) => ms
                .into_iter()
                .flat_map(BTreeMap::into_values)
                .for_each(|t| t.push_leaves(out)),
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.iter().count()
    }

    /// Apply `f(leaf, index)` to every leaf; `index` is the flat position.
    pub fn map<U, F>(&self, mut f: F) -> Tree<U>
    where
        F: FnMut(&T, usize) -> U,
    {
        let mut index = 0;
        self.map_inner(&mut |v| {
            let out = f(v, index);
            index += 1;
            out
        })
    }

    fn map_inner<U>(&self, f: &mut dyn FnMut(&T) -> U) -> Tree<U> {
        match self {
            Tree::Leaf(v) => Tree::Leaf(f(v)),
            Tree::Leaves(vs) => Tree::Leaves(vs.iter().map(|v| f(v)).collect()),
            Tree::Map(m) => Tree::Map(Self::map_node(m, f)),
            Tree::Maps(ms) => Tree::Maps(ms.iter().map(|m| Self::map_node(m, f)).collect()),
        }
    }

    fn map_node<U>(
        m: &BTreeMap<String, Tree<T>>,
        f: &mut dyn FnMut(&T) -> U,
    ) -> BTreeMap<String, Tree<U>> {
        m.iter().map(|(k, t)| (k.clone(), t.map_inner(f))).collect()
    }

    /// Like [`map`](Tree::map) with a fallible function; stops at the first error.
    pub fn try_map<U, E, F>(&self, mut f: F) -> std::result::Result<Tree<U>, E>
    where
        F: FnMut(&T, usize) -> std::result::Result<U, E>,
    {
        let mut index = 0;
        self.try_map_inner(&mut |v| {
            let out = f(v, index);
            index += 1;
            out
        })
    }

    fn try_map_inner<U, E>(
        &self,
        f: &mut dyn FnMut(&T) -> std::result::Result<U, E>,
    ) -> std::result::Result<Tree<U>, E> {
        Ok(match self {
            Tree::Leaf(v) => Tree::Leaf(f(v)?),
            Tree::Leaves(vs) => Tree::Leaves(vs.iter().map(|v| f(v)).collect::<std::result::Result<_, E>>()?),
            Tree::Map(m) => Tree::Map(Self::try_map_node(m, f)?),
            Tree::Maps(ms) => Tree::Maps(
                ms.iter()
                    .map(|m| Self::try_map_node(m, f))
                    .collect::<std::result::Result<_, E>>()?,
            ),
        })
    }

    fn try_map_node<U, E>(
        m: &BTreeMap<String, Tree<T>>,
        f: &mut dyn FnMut(&T) -> std::result::Result<U, E>,
    ) -> std::result::Result<BTreeMap<String, Tree<U>>, E> {
        m.iter()
            .map(|(k, t)| Ok((k.clone(), t.try_map_inner(f)?)))
            .collect()
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&T, usize),
    {
        self.iter().enumerate().for_each(|(i, v)| f(v, i));
    }

    /// Fold over the leaves in traversal order.
    pub fn reduce<A, F>(&self, init: A, mut f: F) -> A
    where
        F: FnMut(A, &T, usize) -> A,
    {
        self.iter().enumerate().fold(init, |acc, (i, v)| f(acc, v, i))
    }

    /// The same structure with every leaf replaced by `()`.
    pub fn nullify(&self) -> Tree<()> {
        self.map(|_, _| ())
    }

    /// True when both trees have the same nesting, keys and list lengths.
    pub fn same_structure<U>(&self, other: &Tree<U>) -> bool {
        fn same_maps<T, U>(a: &BTreeMap<String, Tree<T>>, b: &BTreeMap<String, Tree<U>>) -> bool {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, ta), (kb, tb))| ka == kb && ta.same_structure(tb))
        }
        match (self, other) {
            (Tree::Leaf(_), Tree::Leaf(_)) => true,
            (Tree::Leaves(a), Tree::Leaves(b)) => a.len() == b.len(),
            (Tree::Map(a), Tree::Map(b)) => same_maps(a, b),
            (Tree::Maps(a), Tree::Maps(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_maps(x, y))
            }
            _ => false,
        }
    }

    fn check_same_structure<U>(&self, other: &Tree<U>) -> Result<()> {
        if self.same_structure(other) {
            Ok(())
        } else {
            Err(GTensorError::TreeShapeMismatch(format!(
                "{} leaves vs {} leaves with different nesting",
                self.num_leaves(),
                other.num_leaves()
            )))
        }
    }

    /// Visit two trees of the same structure in lockstep.
    pub fn for_each_zip<U, F>(&self, other: &Tree<U>, mut f: F) -> Result<()>
    where
        F: FnMut(&T, &U, usize),
    {
        self.check_same_structure(other)?;
        for (i, (a, b)) in self.iter().zip(other.iter()).enumerate() {
            f(a, b, i);
        }
        Ok(())
    }

    /// [`for_each_zip`](Tree::for_each_zip) with a fallible visitor.
    pub fn try_for_each_zip<U, F>(&self, other: &Tree<U>, mut f: F) -> Result<()>
    where
        F: FnMut(&T, &U, usize) -> Result<()>,
    {
        self.check_same_structure(other)?;
        for (i, (a, b)) in self.iter().zip(other.iter()).enumerate() {
            f(a, b, i)?;
        }
        Ok(())
    }

    /// Build a tree shaped like `shape` whose leaves are taken from `values`
    /// in traversal order.
    pub fn unflatten<S>(shape: &Tree<S>, values: Vec<T>) -> Result<Tree<T>> {
        let expected = shape.num_leaves();
        let got = values.len();
        if expected != got {
            return Err(GTensorError::LeafCountMismatch { expected, got });
        }
        tracing::debug!(leaves = got, "unflatten");
        let mut values = values.into_iter();
        shape.try_map(|_, _| values.next().ok_or(GTensorError::LeafCountMismatch { expected, got }))
    }

    /// [`Tree::unflatten`] with this tree as the shape.
    pub fn copy_from_flattened<U>(&self, values: Vec<U>) -> Result<Tree<U>> {
        Tree::unflatten(self, values)
    }
}

impl<'a, T> IntoIterator for &'a Tree<T> {
    type Item = &'a T;
    type IntoIter = Box<dyn Iterator<Item = &'a T> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
