//! Constant evaluation for ALU operations.
//!
//! Shared by constant folding and by the reference interpreter, so folded and
//! executed results agree bit for bit. Every entry point normalizes its result
//! to the requested dtype (wrapping integers, rounding `Float32`).

use tessera_dtype::DType;

use crate::types::{BinaryOp, ConstValue, TernaryOp, UnaryOp};

/// Evaluate a unary operation producing a value of `dtype`.
///
/// Returns `None` when the operation is not defined for the value kind.
pub fn exec_unary(op: UnaryOp, dtype: &DType, v: ConstValue) -> Option<ConstValue> {
    let raw = match op {
        UnaryOp::Neg => eval_neg(v),
        UnaryOp::Sqrt => float_op(v, f64::sqrt),
        UnaryOp::Exp2 => float_op(v, f64::exp2),
        UnaryOp::Log2 => float_op(v, f64::log2),
        UnaryOp::Sin => float_op(v, f64::sin),
        UnaryOp::Reciprocal => float_op(v, |x| 1.0 / x),
    }?;
    raw.cast(dtype)
}

/// Evaluate a binary operation producing a value of `dtype`.
///
/// Integer division and remainder by zero are not foldable and return `None`.
/// Comparisons always produce `Bool` regardless of `dtype`.
pub fn exec_binary(op: BinaryOp, dtype: &DType, a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    let raw = match op {
        BinaryOp::Add => eval_add(a, b),
        BinaryOp::Mul => eval_mul(a, b),
        BinaryOp::Sub => eval_sub(a, b),
        BinaryOp::Mod => eval_mod(a, b),
        BinaryOp::Max => eval_max(a, b),
        BinaryOp::Idiv => eval_idiv(a, b),
        BinaryOp::Fdiv => eval_fdiv(a, b),
        BinaryOp::Lt => return eval_lt(a, b),
        BinaryOp::Eq => return eval_cmp(a, b, true),
        BinaryOp::Ne => return eval_cmp(a, b, false),
        BinaryOp::And => eval_bitwise(a, b, |x, y| x & y, |x, y| x & y),
        BinaryOp::Or => eval_bitwise(a, b, |x, y| x | y, |x, y| x | y),
        BinaryOp::Xor => eval_bitwise(a, b, |x, y| x ^ y, |x, y| x ^ y),
    }?;
    raw.cast(dtype)
}

/// Evaluate a ternary operation producing a value of `dtype`.
pub fn exec_ternary(op: TernaryOp, dtype: &DType, a: ConstValue, b: ConstValue, c: ConstValue) -> Option<ConstValue> {
    let raw = match op {
        TernaryOp::Where => Some(if a.truthy() { b } else { c }),
        TernaryOp::MulAcc => eval_add(eval_mul(a, b)?, c),
    }?;
    raw.cast(dtype)
}

// ============================================================================
// Unary Operations
// ============================================================================

#[inline]
fn eval_neg(v: ConstValue) -> Option<ConstValue> {
    match v {
        ConstValue::Int(x) => Some(ConstValue::Int(x.wrapping_neg())),
        ConstValue::UInt(x) => Some(ConstValue::UInt(x.wrapping_neg())),
        ConstValue::Float(x) => Some(ConstValue::Float(-x)),
        ConstValue::Bool(x) => Some(ConstValue::Bool(!x)),
    }
}

#[inline]
fn float_op(v: ConstValue, f: impl FnOnce(f64) -> f64) -> Option<ConstValue> {
    match v {
        ConstValue::Float(x) => Some(ConstValue::Float(f(x))),
        _ => None,
    }
}

// ============================================================================
// Binary Arithmetic Operations
// ============================================================================

#[inline]
fn eval_add(a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Int(x), ConstValue::Int(y)) => Some(ConstValue::Int(x.wrapping_add(y))),
        (ConstValue::UInt(x), ConstValue::UInt(y)) => Some(ConstValue::UInt(x.wrapping_add(y))),
        (ConstValue::Float(x), ConstValue::Float(y)) => Some(ConstValue::Float(x + y)),
        (ConstValue::Bool(x), ConstValue::Bool(y)) => Some(ConstValue::Bool(x | y)),
        _ => None,
    }
}

#[inline]
fn eval_mul(a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Int(x), ConstValue::Int(y)) => Some(ConstValue::Int(x.wrapping_mul(y))),
        (ConstValue::UInt(x), ConstValue::UInt(y)) => Some(ConstValue::UInt(x.wrapping_mul(y))),
        (ConstValue::Float(x), ConstValue::Float(y)) => Some(ConstValue::Float(x * y)),
        (ConstValue::Bool(x), ConstValue::Bool(y)) => Some(ConstValue::Bool(x & y)),
        _ => None,
    }
}

#[inline]
fn eval_sub(a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Int(x), ConstValue::Int(y)) => Some(ConstValue::Int(x.wrapping_sub(y))),
        (ConstValue::UInt(x), ConstValue::UInt(y)) => Some(ConstValue::UInt(x.wrapping_sub(y))),
        (ConstValue::Float(x), ConstValue::Float(y)) => Some(ConstValue::Float(x - y)),
        _ => None,
    }
}

#[inline]
fn eval_mod(a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Int(x), ConstValue::Int(y)) if y != 0 => Some(ConstValue::Int(x.wrapping_rem(y))),
        (ConstValue::UInt(x), ConstValue::UInt(y)) if y != 0 => Some(ConstValue::UInt(x % y)),
        _ => None,
    }
}

#[inline]
fn eval_max(a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Int(x), ConstValue::Int(y)) => Some(ConstValue::Int(x.max(y))),
        (ConstValue::UInt(x), ConstValue::UInt(y)) => Some(ConstValue::UInt(x.max(y))),
        (ConstValue::Float(x), ConstValue::Float(y)) => Some(ConstValue::Float(x.max(y))),
        (ConstValue::Bool(x), ConstValue::Bool(y)) => Some(ConstValue::Bool(x | y)),
        _ => None,
    }
}

#[inline]
fn eval_idiv(a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Int(x), ConstValue::Int(y)) if y != 0 => Some(ConstValue::Int(x.wrapping_div(y))),
        (ConstValue::UInt(x), ConstValue::UInt(y)) if y != 0 => Some(ConstValue::UInt(x / y)),
        _ => None,
    }
}

#[inline]
fn eval_fdiv(a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Float(x), ConstValue::Float(y)) => Some(ConstValue::Float(x / y)),
        _ => None,
    }
}

// ============================================================================
// Comparisons
// ============================================================================

#[inline]
fn eval_lt(a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Int(x), ConstValue::Int(y)) => Some(ConstValue::Bool(x < y)),
        (ConstValue::UInt(x), ConstValue::UInt(y)) => Some(ConstValue::Bool(x < y)),
        (ConstValue::Float(x), ConstValue::Float(y)) => Some(ConstValue::Bool(x < y)),
        (ConstValue::Bool(x), ConstValue::Bool(y)) => Some(ConstValue::Bool(!x & y)),
        _ => None,
    }
}

#[inline]
fn eval_cmp(a: ConstValue, b: ConstValue, equal: bool) -> Option<ConstValue> {
    let eq = match (a, b) {
        (ConstValue::Int(x), ConstValue::Int(y)) => x == y,
        (ConstValue::UInt(x), ConstValue::UInt(y)) => x == y,
        (ConstValue::Float(x), ConstValue::Float(y)) => x == y,
        (ConstValue::Bool(x), ConstValue::Bool(y)) => x == y,
        _ => return None,
    };
    Some(ConstValue::Bool(eq == equal))
}

// ============================================================================
// Bitwise Operations
// ============================================================================

#[inline]
fn eval_bitwise(
    a: ConstValue,
    b: ConstValue,
    int: impl FnOnce(i64, i64) -> i64,
    boolean: impl FnOnce(bool, bool) -> bool,
) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Int(x), ConstValue::Int(y)) => Some(ConstValue::Int(int(x, y))),
        (ConstValue::UInt(x), ConstValue::UInt(y)) => Some(ConstValue::UInt(int(x as i64, y as i64) as u64)),
        (ConstValue::Bool(x), ConstValue::Bool(y)) => Some(ConstValue::Bool(boolean(x, y))),
        _ => None,
    }
}
