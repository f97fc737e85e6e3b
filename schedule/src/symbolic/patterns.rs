//! Symbolic simplification rules.
//!
//! Every rule is a plain function over one node:
//! - Constant folding (const op const → const)
//! - Identity folding (x + 0 → x, x * 1 → x, x / 1 → x)
//! - Annihilators (x * 0 → 0, x - x → 0, x % 1 → 0)
//! - Conditional folding (where(true, a, b) → a, where(c, v, v) → v)
//! - Regrouping (x*y + z*x → x*(y+z), (x + c1) + c2 → x + (c1 + c2))
//! - Range-based index folding (x % n → x and x // n → 0 when 0 ≤ x < n)
//! - Memory (store of a load from the same address → noop, gated stores)
//! - Reductions (sum of a loop-invariant value → value * trip count)
//!
//! Rules are generic over the rewrite context so the same table composes with
//! context-carrying rules such as loop hoisting.

use tessera_ir::uop::eval::{exec_binary, exec_ternary, exec_unary};
use tessera_ir::{BinaryOp, ConstValue, DType, Op, OpKind, PatternMatcher, Rule, TernaryOp, UOpGraph, UOpId};

use super::bounds::{bounds, split_multiples};

/// Core simplification rule table.
pub fn symbolic<C>() -> PatternMatcher<C> {
    PatternMatcher::new(vec![
        // ========== Constant Folding ==========
        Rule::new("fold_unary", &[OpKind::Unary], fold_unary::<C>),
        Rule::new("fold_binary", &[OpKind::Binary], fold_binary::<C>),
        Rule::new("fold_ternary", &[OpKind::Ternary], fold_ternary::<C>),
        Rule::new("fold_cast", &[OpKind::Cast], fold_cast::<C>),
        // ========== Canonical Form ==========
        Rule::new("const_to_rhs", &[OpKind::Binary], const_to_rhs::<C>),
        Rule::new("sub_const", &[OpKind::Binary], sub_const::<C>),
        // ========== Identities ==========
        Rule::new("identity", &[OpKind::Binary], identity::<C>),
        Rule::new("annihilator", &[OpKind::Binary], annihilator::<C>),
        Rule::new("self_cancel", &[OpKind::Binary], self_cancel::<C>),
        Rule::new("where_fold", &[OpKind::Ternary], where_fold::<C>),
        // ========== Regrouping ==========
        Rule::new("combine_consts", &[OpKind::Binary], combine_consts::<C>),
        Rule::new("factor_common", &[OpKind::Binary], factor_common::<C>),
        Rule::new("range_fold", &[OpKind::Binary], range_fold::<C>),
        Rule::new("div_mod_split", &[OpKind::Binary], div_mod_split::<C>),
        // ========== Memory ==========
        Rule::new("load_gate", &[OpKind::Load], load_gate::<C>),
        Rule::new("store_gate", &[OpKind::Store], store_gate::<C>),
        Rule::new("redundant_store", &[OpKind::Store], redundant_store::<C>),
        Rule::new("gated_store", &[OpKind::Store], gated_store::<C>),
        Rule::new("drop_noops", &[OpKind::Sink], drop_noops::<C>),
        // ========== Reductions ==========
        Rule::new("sum_collapse", &[OpKind::Phi], sum_collapse::<C>),
    ])
}

fn is_int(dtype: &DType) -> bool {
    dtype.is_int()
}

// ============================================================================
// Constant Folding
// ============================================================================

fn fold_unary<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Unary(op, a) = *g.op(id) else { return None };
    let dtype = g.dtype(id).clone();
    let value = exec_unary(op, &dtype, g.const_value(a)?)?;
    Some(g.const_(value, dtype))
}

fn fold_binary<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Binary(op, a, b) = *g.op(id) else { return None };
    let dtype = g.dtype(id).clone();
    let value = exec_binary(op, &dtype, g.const_value(a)?, g.const_value(b)?)?;
    Some(g.const_(value, dtype))
}

fn fold_ternary<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Ternary(op, a, b, c) = *g.op(id) else { return None };
    let dtype = g.dtype(id).clone();
    let value = exec_ternary(op, &dtype, g.const_value(a)?, g.const_value(b)?, g.const_value(c)?)?;
    Some(g.const_(value, dtype))
}

fn fold_cast<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Cast { src } = *g.op(id) else { return None };
    let dtype = g.dtype(id).clone();
    let value = g.const_value(src)?.cast(&dtype)?;
    Some(g.const_(value, dtype))
}

// ============================================================================
// Canonical Form
// ============================================================================

/// `c op x → x op c` for commutative `op`.
fn const_to_rhs<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Binary(op, a, b) = *g.op(id) else { return None };
    if !op.is_commutative() || g.const_value(a).is_none() || g.const_value(b).is_some() {
        return None;
    }
    g.binary(op, b, a).ok()
}

/// `x - c → x + (-c)` on integers, so offsets chain through additions.
fn sub_const<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Binary(BinaryOp::Sub, a, b) = *g.op(id) else { return None };
    let ConstValue::Int(c) = g.const_value(b)? else { return None };
    let dtype = g.dtype(id).clone();
    if !is_int(&dtype) || g.const_value(a).is_some() {
        return None;
    }
    let neg = g.const_(ConstValue::Int(c.wrapping_neg()), dtype);
    g.add(a, neg).ok()
}

// ============================================================================
// Identities
// ============================================================================

fn identity<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Binary(op, a, b) = *g.op(id) else { return None };
    let c = g.const_value(b)?;
    let folds = match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or | BinaryOp::Xor => c.is_zero(),
        BinaryOp::Mul | BinaryOp::Idiv | BinaryOp::Fdiv => c.is_one(),
        _ => false,
    };
    folds.then_some(a)
}

/// Zero of `dtype`'s kind.
fn zero(dtype: &DType) -> ConstValue {
    match dtype {
        d if d.is_float() => ConstValue::Float(0.0),
        DType::Scalar(tessera_dtype::ScalarDType::Bool) => ConstValue::Bool(false),
        _ => ConstValue::Int(0),
    }
}

/// Folds floats too; `x * 0` is taken as `0` regardless of NaN and infinities.
fn annihilator<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Binary(op, _, b) = *g.op(id) else { return None };
    let dtype = g.dtype(id).clone();
    let c = g.const_value(b)?;
    let folds = match op {
        BinaryOp::Mul | BinaryOp::And => c.is_zero(),
        BinaryOp::Mod => c.is_one(),
        _ => false,
    };
    folds.then(|| g.const_(zero(&dtype), dtype))
}

/// `x - x → 0`, `x % x → 0`, `x ^ x → 0`.
fn self_cancel<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Binary(op, a, b) = *g.op(id) else { return None };
    let dtype = g.dtype(id).clone();
    if a != b || !matches!(op, BinaryOp::Sub | BinaryOp::Mod | BinaryOp::Xor) {
        return None;
    }
    Some(g.const_(zero(&dtype), dtype))
}

fn where_fold<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Ternary(TernaryOp::Where, cond, then, otherwise) = *g.op(id) else { return None };
    if then == otherwise {
        return Some(then);
    }
    let cond = g.const_value(cond)?;
    Some(if cond.truthy() { then } else { otherwise })
}

// ============================================================================
// Regrouping
// ============================================================================

/// `(x + c1) + c2 → x + (c1 + c2)` and `(x * c1) * c2 → x * (c1 * c2)` on integers.
fn combine_consts<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Binary(op @ (BinaryOp::Add | BinaryOp::Mul), a, b) = *g.op(id) else { return None };
    let dtype = g.dtype(id).clone();
    if !is_int(&dtype) {
        return None;
    }
    let c2 = g.const_value(b)?;
    let Op::Binary(inner, x, c1) = *g.op(a) else { return None };
    if inner != op {
        return None;
    }
    let c1 = g.const_value(c1)?;
    let folded = exec_binary(op, &dtype, c1, c2)?;
    let folded = g.const_(folded, dtype);
    g.binary(op, x, folded).ok()
}

/// `a*b + c*d` with a shared factor → `shared * (rest + rest)`.
fn factor_common<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Binary(BinaryOp::Add, lhs, rhs) = *g.op(id) else { return None };
    let Op::Binary(BinaryOp::Mul, a, b) = *g.op(lhs) else { return None };
    let Op::Binary(BinaryOp::Mul, c, d) = *g.op(rhs) else { return None };
    let (shared, x, y) = if a == c {
        (a, b, d)
    } else if a == d {
        (a, b, c)
    } else if b == c {
        (b, a, d)
    } else if b == d {
        (b, a, c)
    } else {
        return None;
    };
    let sum = g.add(x, y).ok()?;
    g.mul(shared, sum).ok()
}

/// Comparisons and index arithmetic decided by value ranges.
fn range_fold<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Binary(op, a, b) = *g.op(id) else { return None };
    match op {
        BinaryOp::Lt => {
            let ((amin, amax), (bmin, bmax)) = (bounds(g, a)?, bounds(g, b)?);
            let decided = if amax < bmin {
                true
            } else if amin >= bmax {
                false
            } else {
                return None;
            };
            Some(g.const_(ConstValue::Bool(decided), DType::Bool))
        }
        BinaryOp::Mod | BinaryOp::Idiv => {
            let n = g.const_value(b)?.as_i64()?;
            let (lo, hi) = bounds(g, a)?;
            if n <= 0 || lo < 0 || hi >= n {
                return None;
            }
            match op {
                BinaryOp::Mod => Some(a),
                _ => {
                    let dtype = g.dtype(id).clone();
                    Some(g.const_(ConstValue::Int(0), dtype))
                }
            }
        }
        _ => None,
    }
}

/// `(x*n + r) // n → x` and `(x*n + r) % n → r` when `0 ≤ r < n`.
fn div_mod_split<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Binary(op @ (BinaryOp::Mod | BinaryOp::Idiv), a, b) = *g.op(id) else { return None };
    let n = g.const_value(b)?.as_i64()?;
    if n <= 0 || *g.dtype(id) != DType::Index {
        return None;
    }
    let (quotient, remainder) = split_multiples(g, a, n)?;
    match op {
        BinaryOp::Idiv => Some(quotient),
        _ => Some(remainder),
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Gates that are constant disappear.
fn load_gate<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Load { buffer, index, gate: Some((valid, alt)) } = *g.op(id) else { return None };
    if g.const_value(valid)?.truthy() { g.load(buffer, index, None).ok() } else { Some(alt) }
}

fn store_gate<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Store { buffer, index, value, gate: Some(gate) } = *g.op(id) else { return None };
    if g.const_value(gate)?.truthy() { g.store(buffer, index, value, None).ok() } else { Some(g.noop()) }
}

/// `store(buf, idx, load(buf, idx)) → noop`.
fn redundant_store<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Store { buffer, index, value, .. } = *g.op(id) else { return None };
    let Op::Load { buffer: lb, index: li, gate: None } = *g.op(value) else { return None };
    (lb == buffer && li == index).then(|| g.noop())
}

/// `store(buf, idx, where(c, v, load(buf, idx))) → store(buf, idx, v, gate=c)`.
fn gated_store<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Store { buffer, index, value, gate } = *g.op(id) else { return None };
    let Op::Ternary(TernaryOp::Where, cond, then, otherwise) = *g.op(value) else { return None };
    let Op::Load { buffer: lb, index: li, gate: None } = *g.op(otherwise) else { return None };
    if lb != buffer || li != index {
        return None;
    }
    let gate = match gate {
        Some(outer) => g.and(outer, cond).ok()?,
        None => cond,
    };
    g.store(buffer, index, then, Some(gate)).ok()
}

fn drop_noops<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Sink { sources } = g.op(id) else { return None };
    if !sources.iter().any(|&s| matches!(g.op(s), Op::Noop)) {
        return None;
    }
    let kept: Vec<UOpId> = sources.iter().copied().filter(|&s| !matches!(g.op(s), Op::Noop)).collect();
    Some(g.sink(&kept))
}

// ============================================================================
// Reductions
// ============================================================================

/// A sum over one loop of a value that does not depend on the loop is the
/// value times the trip count.
fn sum_collapse<C>(g: &mut UOpGraph, id: UOpId, _: &mut C) -> Option<UOpId> {
    let Op::Phi { acc, value, ref loops } = *g.op(id) else { return None };
    let [range] = loops.as_slice() else { return None };
    let range = *range;
    let Op::DefineAcc { init, .. } = *g.op(acc) else { return None };
    if !init.0.is_zero() {
        return None;
    }
    let Op::Binary(BinaryOp::Add, lhs, v) = *g.op(value) else { return None };
    if lhs != acc || g.depends_on(v, range) || g.depends_on(v, acc) {
        return None;
    }
    let Op::Loop { start, end, .. } = *g.op(range) else { return None };
    let trip = g.sub(end, start).ok()?;
    let dtype = g.dtype(id).clone();
    let trip = g.cast(trip, dtype);
    g.mul(v, trip).ok()
}
