//! Value ranges of integer expressions.
//!
//! Ranges come from loop bounds, launch-grid sizes and variable bounds and
//! are propagated through index arithmetic. Anything else (loads, floats,
//! accumulators) has no known range.

use tessera_ir::{BinaryOp, ConstValue, Op, UOpGraph, UOpId};

/// Recursion limit; deeper expressions are treated as unbounded.
const MAX_DEPTH: usize = 32;

/// Inclusive `(min, max)` of an integer node, if known.
pub fn bounds(g: &UOpGraph, id: UOpId) -> Option<(i64, i64)> {
    bounds_at(g, id, 0)
}

fn bounds_at(g: &UOpGraph, id: UOpId, depth: usize) -> Option<(i64, i64)> {
    if depth > MAX_DEPTH || !g.dtype(id).is_int() {
        return None;
    }
    let range = |node| bounds_at(g, node, depth + 1);
    match *g.op(id) {
        Op::Const(v) => v.0.as_i64().map(|v| (v, v)),
        Op::DefineVar(ref var) => Some((var.min(), var.max())),
        Op::Loop { start, end, .. } => {
            let (lo, _) = range(start)?;
            let (_, hi) = range(end)?;
            Some((lo, hi.checked_sub(1)?))
        }
        Op::Special { size, .. } => Some((0, range(size)?.1.checked_sub(1)?)),
        Op::Binary(op, a, b) => {
            let ((amin, amax), (bmin, bmax)) = (range(a)?, range(b)?);
            match op {
                BinaryOp::Add => Some((amin.checked_add(bmin)?, amax.checked_add(bmax)?)),
                BinaryOp::Sub => Some((amin.checked_sub(bmax)?, amax.checked_sub(bmin)?)),
                BinaryOp::Mul => {
                    let corners = [
                        amin.checked_mul(bmin)?,
                        amin.checked_mul(bmax)?,
                        amax.checked_mul(bmin)?,
                        amax.checked_mul(bmax)?,
                    ];
                    Some((*corners.iter().min()?, *corners.iter().max()?))
                }
                BinaryOp::Max => Some((amin.max(bmin), amax.max(bmax))),
                // Truncating division by a positive constant is monotone.
                BinaryOp::Idiv if bmin == bmax && bmin > 0 => Some((amin / bmin, amax / bmin)),
                BinaryOp::Mod if bmin == bmax && bmin > 0 => {
                    if amin >= 0 {
                        Some((0, amax.min(bmin - 1)))
                    } else {
                        Some((amin.max(1 - bmin), amax.clamp(0, bmin - 1)))
                    }
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Split `a` into `(q, r)` with `a == q*n + r`, where `q` collects the
/// addends that are multiples of `n` and `0 <= r < n`.
///
/// Requires `a >= 0` so truncating division agrees with the split.
pub fn split_multiples(g: &mut UOpGraph, a: UOpId, n: i64) -> Option<(UOpId, UOpId)> {
    if bounds(g, a)?.0 < 0 {
        return None;
    }
    let mut multiples: Vec<(UOpId, i64)> = Vec::new();
    let mut rest: Vec<UOpId> = Vec::new();
    let mut constant = 0i64;
    for term in addends(g, a) {
        match *g.op(term) {
            Op::Const(v) => constant = constant.checked_add(v.0.as_i64()?)?,
            Op::Binary(BinaryOp::Mul, x, c) => match g.const_value(c).and_then(|c| c.as_i64()) {
                Some(k) if k % n == 0 => multiples.push((x, k / n)),
                _ => rest.push(term),
            },
            _ => rest.push(term),
        }
    }
    if multiples.is_empty() && constant.abs() < n {
        return None;
    }

    let dtype = g.dtype(a).clone();
    let mut remainder: Option<UOpId> = None;
    for term in rest {
        remainder = Some(match remainder {
            Some(acc) => g.add(acc, term).ok()?,
            None => term,
        });
    }
    let mut quotient_const = 0;
    if constant != 0 {
        let (q, r) = (constant.div_euclid(n), constant.rem_euclid(n));
        quotient_const = q;
        if r != 0 {
            let r = g.const_(ConstValue::Int(r), dtype.clone());
            remainder = Some(match remainder {
                Some(acc) => g.add(acc, r).ok()?,
                None => r,
            });
        }
    }
    let remainder = match remainder {
        Some(r) => r,
        None => g.const_(ConstValue::Int(0), dtype.clone()),
    };
    let (lo, hi) = bounds(g, remainder)?;
    if lo < 0 || hi >= n {
        return None;
    }

    let mut quotient: Option<UOpId> = None;
    for (x, k) in multiples {
        let term = if k == 1 {
            x
        } else {
            let k = g.const_(ConstValue::Int(k), dtype.clone());
            g.mul(x, k).ok()?
        };
        quotient = Some(match quotient {
            Some(acc) => g.add(acc, term).ok()?,
            None => term,
        });
    }
    let q = g.const_(ConstValue::Int(quotient_const), dtype);
    let quotient = match quotient {
        Some(acc) if quotient_const != 0 => g.add(acc, q).ok()?,
        Some(acc) => acc,
        None => q,
    };
    Some((quotient, remainder))
}

/// Flattened operands of a chain of additions.
fn addends(g: &UOpGraph, id: UOpId) -> Vec<UOpId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(node) = stack.pop() {
        match *g.op(node) {
            Op::Binary(BinaryOp::Add, a, b) => stack.extend([b, a]),
            _ => out.push(node),
        }
    }
    out
}
