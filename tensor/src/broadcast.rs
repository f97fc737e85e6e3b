//! Broadcasting operations for tensors.
//!
//! NumPy-style rules:
//! - Shapes are aligned from the right (trailing dimensions)
//! - Missing dimensions are treated as 1
//! - For each dimension, sizes must either match or one must be 1
//!
//! Broadcasting is a reshape (explicit leading 1s) followed by an expand, so
//! it only ever produces views.

use snafu::OptionExt;
use tessera_ir::{SInt, Shape};

use crate::error::*;
use crate::Tensor;

/// Broadcast result of two shapes, or `None` when they are incompatible.
pub fn broadcast_shape(lhs: &[SInt], rhs: &[SInt]) -> Option<Shape> {
    let ndim = lhs.len().max(rhs.len());
    let one = SInt::from(1usize);
    let padded = |shape: &[SInt], i: usize| {
        let offset = ndim - shape.len();
        if i < offset { one.clone() } else { shape[i - offset].clone() }
    };

    (0..ndim)
        .map(|i| {
            let (l, r) = (padded(lhs, i), padded(rhs, i));
            if l == r || r == 1 {
                Some(l)
            } else if l == 1 {
                Some(r)
            } else {
                None
            }
        })
        .collect()
}

impl Tensor {
    /// Broadcast two tensors to a common shape for a binary operation.
    ///
    /// ```ignore
    /// // Matrix + Row: [2, 3] + [1, 3] -> [2, 3]
    /// let (a, b) = matrix.broadcast_for_binop(&row)?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::BroadcastMismatch`] if shapes are incompatible.
    pub(crate) fn broadcast_for_binop(&self, other: &Tensor) -> Result<(Tensor, Tensor)> {
        if self.shape() == other.shape() {
            return Ok((self.clone(), other.clone()));
        }
        let target = broadcast_shape(self.shape(), other.shape())
            .context(BroadcastMismatchSnafu { lhs: self.shape().to_vec(), rhs: other.shape().to_vec() })?;
        Ok((self.broadcast_to(&target)?, other.broadcast_to(&target)?))
    }

    /// Broadcast to `target_shape`: left-pad with unit dimensions, then expand.
    pub(crate) fn broadcast_to(&self, target_shape: &[SInt]) -> Result<Tensor> {
        let shape = self.shape();
        if shape == target_shape {
            return Ok(self.clone());
        }

        let mismatch = || BroadcastMismatchSnafu { lhs: shape.to_vec(), rhs: target_shape.to_vec() };
        if shape.len() > target_shape.len() {
            return mismatch().fail();
        }
        let padding = target_shape.len() - shape.len();
        let aligned: Shape = std::iter::repeat_n(SInt::from(1usize), padding).chain(shape.iter().cloned()).collect();
        for (dim, target) in aligned.iter().zip(target_shape) {
            if dim != target && *dim != 1 {
                return mismatch().fail();
            }
        }

        self.try_reshape_symbolic(&aligned)?.expand_symbolic(target_shape)
    }

    /// Broadcast to concrete `shape`.
    pub fn try_broadcast_to(&self, shape: &[usize]) -> Result<Tensor> {
        let target: Shape = shape.iter().map(|&d| SInt::from(d)).collect();
        self.broadcast_to(&target)
    }
}
