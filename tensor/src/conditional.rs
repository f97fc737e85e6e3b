//! Conditional and selection operations for tensors.

use bon::bon;
use snafu::OptionExt;
use tessera_dtype::DType;
use tessera_ir::{BinaryOp, TernaryOp};

use crate::arithmetic::promote;
use crate::broadcast::broadcast_shape;
use crate::error::*;
use crate::lazy::LazyKind;
use crate::{Result, Tensor};

#[bon]
impl Tensor {
    /// Element-wise conditional selection: `condition ? self : other`.
    ///
    /// All three tensors are broadcast to a common shape; `condition` is
    /// cast to `Bool` and the branches to their common dtype.
    ///
    /// ```ignore
    /// let x = Tensor::from_slice([1.0f32, 2.0, 3.0, 4.0])?;
    /// let zeros = Tensor::zeros(&[4], DType::Float32);
    /// let result = x.where_(&x.try_gt(&two)?, &zeros)?; // [0.0, 0.0, 3.0, 4.0]
    /// ```
    pub fn where_(&self, condition: &Tensor, other: &Tensor) -> Result<Self> {
        let mismatch = || BroadcastMismatchSnafu { lhs: self.shape().to_vec(), rhs: other.shape().to_vec() };
        let shape = broadcast_shape(self.shape(), other.shape()).context(mismatch())?;
        let shape = broadcast_shape(&shape, condition.shape())
            .context(BroadcastMismatchSnafu { lhs: shape.to_vec(), rhs: condition.shape().to_vec() })?;

        let dtype = promote(&self.dtype(), &other.dtype());
        let condition = condition.cast(DType::Bool).broadcast_to(&shape)?;
        let then = self.cast(dtype.clone()).broadcast_to(&shape)?;
        let otherwise = other.cast(dtype.clone()).broadcast_to(&shape)?;

        let kind =
            LazyKind::Ternary(TernaryOp::Where, condition.lazy.clone(), then.lazy.clone(), otherwise.lazy.clone());
        Ok(then.elementwise(kind, dtype))
    }

    /// Element-wise maximum of two tensors (not a reduction).
    pub fn maximum(&self, other: &Tensor) -> Result<Self> {
        self.binary_op(BinaryOp::Max, other, "maximum")
    }

    /// Element-wise minimum of two tensors, as `where(a < b, a, b)`.
    pub fn minimum(&self, other: &Tensor) -> Result<Self> {
        let condition = self.try_lt(other)?;
        self.where_(&condition, other)
    }

    /// Clamp into `[min, max]`; either bound may be omitted.
    ///
    /// ```ignore
    /// let clamped = t.clamp().min(&zero).max(&six).call()?;
    /// ```
    #[builder]
    pub fn clamp(&self, min: Option<&Tensor>, max: Option<&Tensor>) -> Result<Self> {
        let mut result = self.clone();
        if let Some(min) = min {
            result = result.maximum(min)?;
        }
        if let Some(max) = max {
            result = result.minimum(max)?;
        }
        Ok(result)
    }
}
