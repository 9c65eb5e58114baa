//! Contraction of two named tensors over shared axes.
//!
//! Every distinct axis name is given one einsum letter:
//! `A..Z` then `a..z`. Axes contracted away are summed; axes present in both
//! tensors but not contracted are batch axes and stay in the result.

use super::named::{check_unique, to_strings, NamedTensor};
use crate::error::{GTensorError, Result};

/// Number of distinct einsum letters.
pub const EINSUM_LETTERS: usize = 52;

fn letter(i: usize) -> char {
    match i {
        0..=25 => (b'A' + i as u8) as char,
        26..=51 => (b'a' + (i - 26) as u8) as char,
        _ => char::from_u32(0x100 + i as u32).unwrap_or('?'),
    }
}

/// Letter assignment for contracting `a` with `b`.
///
/// `result_names` are `b`'s axes that `a` lacks, in `b`'s order, followed by
/// `a`'s axes that are not contracted, in `a`'s order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSpec {
    pub a_names: Vec<String>,
    pub b_names: Vec<String>,
    pub contract_on: Vec<String>,
    pub result_names: Vec<String>,
    pub a_letters: Vec<char>,
    pub b_letters: Vec<char>,
    pub result_letters: Vec<char>,
}

impl ContractSpec {
    pub fn new<S: AsRef<str>, T: AsRef<str>, U: AsRef<str>>(
        a_names: &[S],
        b_names: &[T],
        contract_on: &[U],
    ) -> Result<Self> {
        let a_names = to_strings(a_names);
        let b_names = to_strings(b_names);
        let contract_on = to_strings(contract_on);
        check_unique(&a_names)?;
        check_unique(&b_names)?;
        check_unique(&contract_on)?;
        for name in &contract_on {
            for names in [&a_names, &b_names] {
                if !names.contains(name) {
                    return Err(GTensorError::UnknownName {
                        name: name.clone(),
                        names: names.clone(),
                    });
                }
            }
        }

        let mut all: Vec<&String> = a_names.iter().collect();
        all.extend(b_names.iter().filter(|n| !a_names.contains(n)));
        if all.len() > EINSUM_LETTERS {
            tracing::warn!(
                count = all.len(),
                "contraction uses more than {EINSUM_LETTERS} distinct dimension names"
            );
        }
        let letter_of = |name: &String| letter(all.iter().position(|n| *n == name).unwrap_or(0));

        let result_names: Vec<String> = b_names
            .iter()
            .filter(|n| !a_names.contains(n))
            .chain(a_names.iter().filter(|n| !contract_on.contains(n)))
            .cloned()
            .collect();

        Ok(Self {
            a_letters: a_names.iter().map(letter_of).collect(),
            b_letters: b_names.iter().map(letter_of).collect(),
            result_letters: result_names.iter().map(letter_of).collect(),
            a_names,
            b_names,
            contract_on,
            result_names,
        })
    }

    /// Forward einsum string, e.g. `ABC,ACD->DAB`.
    pub fn einsum_str(&self) -> String {
        format!(
            "{},{}->{}",
            String::from_iter(&self.a_letters),
            String::from_iter(&self.b_letters),
            String::from_iter(&self.result_letters)
        )
    }

    /// Einsum strings for the gradients with respect to `a` and `b`.
    pub fn cocontract_strs(&self) -> [String; 2] {
        let a = String::from_iter(&self.a_letters);
        let b = String::from_iter(&self.b_letters);
        let r = String::from_iter(&self.result_letters);
        [format!("{b},{r}->{a}"), format!("{a},{r}->{b}")]
    }
}

impl NamedTensor {
    /// Contract with `other` over the named axes.
    ///
    /// Contracted axes must exist in both tensors with equal sizes. Axes that
    /// are shared but not contracted are matched elementwise (batch axes).
    /// The result holds `other`'s remaining axes first, then this tensor's.
    pub fn contract<S: AsRef<str>>(&self, other: &NamedTensor, names: &[S]) -> Result<NamedTensor> {
        self.require_real("contract")?;
        other.require_real("contract")?;
        let spec = ContractSpec::new(self.dim_names(), other.dim_names(), names)?;

        // Shared axes (contracted or batch) must agree in size.
        other.subtract_dims_from(self)?;

        let batch: Vec<&String> = spec
            .a_names
            .iter()
            .filter(|n| spec.b_names.contains(n) && !spec.contract_on.contains(n))
            .collect();
        let a_free: Vec<&String> = spec.a_names.iter().filter(|n| !spec.b_names.contains(n)).collect();
        let b_free: Vec<&String> = spec.b_names.iter().filter(|n| !spec.a_names.contains(n)).collect();
        let contracted: Vec<&String> = spec.contract_on.iter().collect();

        let size = |t: &NamedTensor, ns: &[&String]| -> Result<(Vec<usize>, usize)> {
            let sizes = ns.iter().map(|n| t.size_of(n)).collect::<Result<Vec<_>>>()?;
            let total = sizes.iter().product();
            Ok((sizes, total))
        };
        let (batch_sizes, b) = size(self, &batch)?;
        let (a_free_sizes, m) = size(self, &a_free)?;
        let (_, k) = size(self, &contracted)?;
        let (b_free_sizes, n) = size(other, &b_free)?;

        let a_order: Vec<&String> = batch.iter().chain(&a_free).chain(&contracted).copied().collect();
        let b_order: Vec<&String> = batch.iter().chain(&contracted).chain(&b_free).copied().collect();
        let lhs = self
            .transpose_to(&a_order)?
            .tensor
            .contiguous()?
            .reshape((b, m, k))?;
        let rhs = other
            .transpose_to(&b_order)?
            .tensor
            .contiguous()?
            .reshape((b, k, n))?;

        tracing::debug!(
            einsum = %spec.einsum_str(),
            batch = b,
            m,
            k,
            n,
            "contract"
        );
        let product = lhs.matmul(&rhs)?;

        let mut shape = batch_sizes;
        shape.extend(a_free_sizes);
        shape.extend(b_free_sizes);
        let names: Vec<String> = batch.iter().chain(&a_free).chain(&b_free).map(|n| n.to_string()).collect();
        let grouped = NamedTensor::from_parts(product.reshape(shape)?, names, self.dtype)?;
        grouped.transpose_to(&spec.result_names)
    }
}
