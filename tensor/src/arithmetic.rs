//! Elementwise arithmetic, comparison and bitwise operations.
//!
//! Binary operations promote both operands to a common dtype, broadcast them
//! to a common shape, and record a single graph node. Comparisons produce
//! `Bool` tensors.

use snafu::ensure;
use tessera_dtype::DType;
use tessera_ir::{BinaryOp, ConstValue, UnaryOp};

use crate::error::*;
use crate::lazy::{LazyBuffer, LazyKind};
use crate::Tensor;

/// Common dtype of two operands.
///
/// Floats win over integers, integers over bools, and within a family the
/// wider type wins (ties keep `lhs`).
pub fn promote(lhs: &DType, rhs: &DType) -> DType {
    let rank = |d: &DType| (d.is_float(), d.is_int(), d.bytes());
    if rank(rhs) > rank(lhs) { rhs.clone() } else { lhs.clone() }
}

fn supports(op: BinaryOp, dtype: &DType) -> bool {
    match op {
        BinaryOp::Fdiv => dtype.is_float(),
        BinaryOp::Idiv | BinaryOp::Mod => dtype.is_int(),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => dtype.is_int() || dtype.is_bool(),
        _ => true,
    }
}

/// Generates public binary operations from `method => BinaryOp` pairs.
macro_rules! impl_binary_ops {
    ($($method:ident => $op:ident),* $(,)?) => {
        $(
            #[track_caller]
            pub fn $method(&self, other: &Tensor) -> Result<Tensor> {
                self.binary_op(BinaryOp::$op, other, stringify!($method))
            }
        )*
    };
}

impl Tensor {
    impl_binary_ops! {
        try_add => Add,
        try_sub => Sub,
        try_mul => Mul,
        try_mod => Mod,
        try_lt => Lt,
        try_eq => Eq,
        try_ne => Ne,
        bitwise_and => And,
        bitwise_or => Or,
        bitwise_xor => Xor,
    }

    /// New node over `self`'s shape and device.
    pub(crate) fn elementwise(&self, kind: LazyKind, dtype: DType) -> Tensor {
        let shape = self.shape().iter().cloned().collect();
        Self::new(LazyBuffer::new(kind, dtype, self.device(), shape))
    }

    /// Constant of `self`'s shape and dtype.
    pub(crate) fn const_like(&self, value: ConstValue) -> Tensor {
        Self::full_symbolic(self.shape(), value, self.dtype())
    }

    pub(crate) fn binary_op(&self, op: BinaryOp, other: &Tensor, operation: &'static str) -> Result<Tensor> {
        let dtype = promote(&self.dtype(), &other.dtype());
        ensure!(supports(op, &dtype), UnsupportedDTypeSnafu { operation, dtype });

        let (lhs, rhs) = self.cast(dtype.clone()).broadcast_for_binop(&other.cast(dtype.clone()))?;
        let out = if op.is_comparison() { DType::Bool } else { dtype };
        Ok(lhs.elementwise(LazyKind::Binary(op, lhs.lazy.clone(), rhs.lazy.clone()), out))
    }

    pub(crate) fn unary_op(&self, op: UnaryOp) -> Tensor {
        self.elementwise(LazyKind::Unary(op, self.lazy.clone()), self.dtype())
    }

    /// Division: true division for floats, truncating for integers.
    #[track_caller]
    pub fn try_div(&self, other: &Tensor) -> Result<Tensor> {
        let op = if promote(&self.dtype(), &other.dtype()).is_float() { BinaryOp::Fdiv } else { BinaryOp::Idiv };
        self.binary_op(op, other, "try_div")
    }

    #[track_caller]
    pub fn try_gt(&self, other: &Tensor) -> Result<Tensor> {
        other.try_lt(self)
    }

    #[track_caller]
    pub fn try_ge(&self, other: &Tensor) -> Result<Tensor> {
        self.try_lt(other)?.logical_not()
    }

    #[track_caller]
    pub fn try_le(&self, other: &Tensor) -> Result<Tensor> {
        other.try_lt(self)?.logical_not()
    }

    /// Arithmetic negation. Not defined for `Bool`.
    #[track_caller]
    pub fn try_neg(&self) -> Result<Tensor> {
        let dtype = self.dtype();
        ensure!(dtype.is_float() || dtype.is_int(), UnsupportedDTypeSnafu { operation: "neg", dtype });
        Ok(self.unary_op(UnaryOp::Neg))
    }

    /// Logical NOT; non-zero values count as true.
    pub fn logical_not(&self) -> Result<Tensor> {
        let as_bool = self.cast(DType::Bool);
        as_bool.try_ne(&as_bool.const_like(ConstValue::Bool(true)))
    }

    /// Convert elements to `dtype`. Casting to the current dtype is a no-op.
    pub fn cast(&self, dtype: DType) -> Tensor {
        if self.dtype() == dtype {
            return self.clone();
        }
        self.elementwise(LazyKind::Cast(self.lazy.clone()), dtype)
    }
}
