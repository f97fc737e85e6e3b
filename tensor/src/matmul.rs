//! Matrix products built from movement, multiply and sum.
//!
//! `(M, K) @ (K, N)` becomes `(M, 1, K) * (1, N, K)` broadcast to
//! `(M, N, K)` and summed over the last axis, which the scheduler fuses into
//! a single reduce kernel.

use bon::bon;
use snafu::ensure;
use tessera_dtype::DType;

use crate::error::*;
use crate::Tensor;

#[bon]
impl Tensor {
    /// Dot product / matrix multiplication for 1-D and 2-D operands.
    ///
    /// - `[K] . [K]` -> `[]`
    /// - `[M, K] @ [K]` -> `[M]`
    /// - `[K] @ [K, N]` -> `[N]`
    /// - `[M, K] @ [K, N]` -> `[M, N]`
    ///
    /// # Errors
    ///
    /// Returns [`Error::DotShapeMismatch`] when an operand has another rank or
    /// the contracted dimensions differ.
    pub fn dot(&self, other: &Tensor) -> Result<Tensor> {
        self.dot_with().other(other).call()
    }

    /// Alias for [`Tensor::dot`].
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        self.dot(other)
    }

    /// Dot product accumulating in `dtype`.
    #[builder]
    pub fn dot_with(&self, other: &Tensor, dtype: Option<DType>) -> Result<Tensor> {
        let (lhs_ndim, rhs_ndim) = (self.ndim(), other.ndim());
        let mismatch = || DotShapeMismatchSnafu { lhs: self.shape().to_vec(), rhs: other.shape().to_vec() };
        ensure!((1..=2).contains(&lhs_ndim) && (1..=2).contains(&rhs_ndim), mismatch());

        let k_lhs = &self.shape()[lhs_ndim - 1];
        let k_rhs = &other.shape()[rhs_ndim.saturating_sub(2)];
        ensure!(k_lhs == k_rhs, mismatch());

        let lhs = if lhs_ndim == 1 { self.try_unsqueeze(0)? } else { self.clone() };
        let rhs = if rhs_ndim == 1 { other.try_unsqueeze(1)? } else { other.clone() };

        // (M, 1, K) * (1, N, K) -> (M, N, K) -> (M, N)
        let lhs = lhs.try_unsqueeze(1)?;
        let rhs = rhs.try_transpose(0, 1)?.try_unsqueeze(0)?;
        let mut result = lhs.try_mul(&rhs)?.sum_with().axes(-1isize).maybe_dtype(dtype).call()?;

        if lhs_ndim == 1 {
            result = result.try_squeeze(Some(0))?;
        }
        if rhs_ndim == 1 {
            result = result.try_squeeze(Some(-1))?;
        }
        Ok(result)
    }
}
