//! Mathematical operations for tensors.
//!
//! The transcendental primitives (`sqrt`, `exp2`, `log2`, `sin`,
//! `reciprocal`) map to single unary nodes and require a float dtype. The
//! rest are composed from them.

use std::f64::consts::{FRAC_PI_2, LN_2, LOG2_E};

use snafu::ensure;
use tessera_ir::{ConstValue, UnaryOp};

use crate::error::*;
use crate::Tensor;

/// Generates float-only unary operations from `method => UnaryOp` pairs.
macro_rules! impl_float_unary {
    ($($(#[$doc:meta])* $method:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[track_caller]
            pub fn $method(&self) -> Result<Tensor> {
                self.require_float(stringify!($method))?;
                Ok(self.unary_op(UnaryOp::$op))
            }
        )*
    };
}

impl Tensor {
    fn require_float(&self, operation: &'static str) -> Result<()> {
        let dtype = self.dtype();
        ensure!(dtype.is_float(), UnsupportedDTypeSnafu { operation, dtype });
        Ok(())
    }

    impl_float_unary! {
        /// Square root.
        sqrt => Sqrt,
        /// Base-2 exponential.
        exp2 => Exp2,
        /// Base-2 logarithm.
        log2 => Log2,
        /// Sine.
        ///
        /// ```ignore
        /// let t = Tensor::from_slice([0.0f32, PI / 2.0, PI])?;
        /// let result = t.sin()?; // [0, 1, 0]
        /// ```
        sin => Sin,
        /// Reciprocal: 1/x.
        reciprocal => Reciprocal,
    }

    /// Natural exponential, as `exp2(x * log2(e))`.
    #[track_caller]
    pub fn exp(&self) -> Result<Tensor> {
        self.require_float("exp")?;
        self.try_mul(&self.const_like(ConstValue::Float(LOG2_E)))?.exp2()
    }

    /// Natural logarithm, as `log2(x) * ln(2)`.
    #[track_caller]
    pub fn log(&self) -> Result<Tensor> {
        self.log2()?.try_mul(&self.const_like(ConstValue::Float(LN_2)))
    }

    /// Cosine, as `sin(pi/2 - x)`.
    #[track_caller]
    pub fn cos(&self) -> Result<Tensor> {
        self.require_float("cos")?;
        self.const_like(ConstValue::Float(FRAC_PI_2)).try_sub(self)?.sin()
    }

    #[track_caller]
    pub fn square(&self) -> Result<Tensor> {
        self.try_mul(self)
    }

    /// Absolute value, as `max(x, -x)`.
    #[track_caller]
    pub fn abs(&self) -> Result<Tensor> {
        if self.dtype().is_unsigned() {
            return Ok(self.clone());
        }
        self.maximum(&self.try_neg()?)
    }

    /// Rectified linear unit: `max(x, 0)`.
    pub fn relu(&self) -> Result<Tensor> {
        self.maximum(&self.const_like(ConstValue::zero(self.dtype().base())))
    }
}
