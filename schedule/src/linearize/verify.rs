//! Checks over linear instruction lists.
//!
//! [`verify_order`] checks the structural invariants every linearization
//! must hold; [`verify_types`] checks operand dtypes instruction by
//! instruction.

use snafu::ensure;
use tessera_ir::{BinaryOp, DType, Op, TernaryOp, UOp, UOpId};

use crate::error::*;

/// Sink last, sources before use, end markers closing the innermost scope,
/// accumulators ahead of their loops.
pub fn verify_order(uops: &[UOp]) -> Result<()> {
    ensure!(matches!(uops.last().map(|u| &u.op), Some(Op::Sink { .. })), MissingSinkSnafu);

    let mut open: Vec<usize> = Vec::new();
    for (position, uop) in uops.iter().enumerate() {
        match &uop.op {
            Op::DefineAcc { loops, .. } => {
                for range in loops {
                    ensure!(
                        range.index() > position,
                        AccumulatorAfterLoopSnafu { acc: position, range: range.index() }
                    );
                }
            }
            op => {
                for operand in op.sources() {
                    ensure!(operand.index() < position, SourceNotEmittedSnafu { position, operand: operand.index() });
                }
            }
        }
        match uop.op {
            Op::Loop { .. } | Op::If { .. } => open.push(position),
            Op::EndLoop { range: scope } | Op::EndIf { branch: scope } => {
                ensure!(open.last() == Some(&scope.index()), MisnestedScopeSnafu { position, scope: scope.index() });
                open.pop();
            }
            _ => {}
        }
    }
    match open.last() {
        Some(&scope) => UnclosedScopeSnafu { scope }.fail(),
        None => Ok(()),
    }
}

/// Operand dtypes of every instruction. Expects a list that passed
/// [`verify_order`].
pub fn verify_types(uops: &[UOp]) -> Result<()> {
    let dtype = |id: UOpId| &uops[id.index()].dtype;
    for (position, uop) in uops.iter().enumerate() {
        let fail = |reason: String| TypeCheckSnafu { position, reason }.fail();
        match uop.op {
            Op::Load { buffer, index, gate } => {
                let Some(base) = pointee(dtype(buffer)) else {
                    return fail(format!("load from non-pointer {}", dtype(buffer)));
                };
                if *dtype(index) != DType::Index {
                    return fail(format!("load index has dtype {}", dtype(index)));
                }
                if uop.dtype != base {
                    return fail(format!("load of {} from a {} buffer", uop.dtype, base));
                }
                if let Some((valid, alt)) = gate {
                    if *dtype(valid) != DType::Bool || *dtype(alt) != base {
                        return fail(format!("gate ({}, {}) on a {} load", dtype(valid), dtype(alt), base));
                    }
                }
            }
            Op::Store { buffer, index, value, gate } => {
                let Some(base) = pointee(dtype(buffer)) else {
                    return fail(format!("store to non-pointer {}", dtype(buffer)));
                };
                if *dtype(index) != DType::Index {
                    return fail(format!("store index has dtype {}", dtype(index)));
                }
                if *dtype(value) != base {
                    return fail(format!("store of {} into a {} buffer", dtype(value), base));
                }
                if let Some(gate) = gate
                    && !matches!(uops[gate.index()].op, Op::If { .. })
                    && *dtype(gate) != DType::Bool
                {
                    return fail(format!("store gate has dtype {}", dtype(gate)));
                }
            }
            Op::Binary(op, a, b) => {
                if dtype(a) != dtype(b) {
                    return fail(format!("{op} of {} and {}", dtype(a), dtype(b)));
                }
                let expected = if op.is_comparison() { &DType::Bool } else { dtype(a) };
                if uop.dtype != *expected {
                    return fail(format!("{op} produces {} instead of {expected}", uop.dtype));
                }
                if matches!(op, BinaryOp::Idiv | BinaryOp::Mod) && !dtype(a).is_int() {
                    return fail(format!("{op} on {}", dtype(a)));
                }
            }
            Op::Ternary(TernaryOp::Where, cond, a, b) => {
                if *dtype(cond) != DType::Bool || dtype(a) != dtype(b) || uop.dtype != *dtype(a) {
                    return fail(format!("where({}, {}, {})", dtype(cond), dtype(a), dtype(b)));
                }
            }
            Op::Unary(op, src) if uop.dtype != *dtype(src) => {
                return fail(format!("{op} of {} produces {}", dtype(src), uop.dtype));
            }
            Op::Loop { start, end, .. } => {
                if *dtype(start) != DType::Index || *dtype(end) != DType::Index {
                    return fail(format!("loop bounds of {} and {}", dtype(start), dtype(end)));
                }
            }
            Op::Special { size, .. } if *dtype(size) != DType::Index => {
                return fail(format!("grid size of {}", dtype(size)));
            }
            Op::If { cond } if *dtype(cond) != DType::Bool => {
                return fail(format!("branch on {}", dtype(cond)));
            }
            Op::Phi { acc, value, .. } => {
                if !matches!(uops[acc.index()].op, Op::DefineAcc { .. }) {
                    return fail("phi target is not an accumulator".to_string());
                }
                if *dtype(acc) != uop.dtype || *dtype(value) != uop.dtype {
                    return fail(format!("phi of {} into {}", dtype(value), dtype(acc)));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn pointee(dtype: &DType) -> Option<DType> {
    match dtype {
        DType::Ptr { base, .. } => Some((**base).clone()),
        _ => None,
    }
}
