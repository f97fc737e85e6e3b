//! Typed micro-op constructors.
//!
//! Every constructor validates operand dtypes before interning, so a graph
//! built through these methods is well typed by construction:
//! - Arithmetic: unary, binary (plus named helpers), ternary, cast
//! - Memory: define_global, define_local, define_acc, load, store
//! - Control: loop_, if_, end_loop, end_if, barrier
//! - Structural: const_, special, define_var, phi, sink, noop

use smallvec::SmallVec;
use snafu::ensure;
use tessera_dtype::{AddrSpace, DType};

use super::{LoopAxis, Op, UOpGraph, UOpId};
use crate::error::*;
use crate::sint::Variable;
use crate::types::{BinaryOp, ConstValue, ConstValueHash, TernaryOp, UnaryOp};

/// Named wrappers over [`UOpGraph::binary`].
macro_rules! binary_helpers {
    ($($method:ident => $op:ident),+ $(,)?) => {
        $(
            pub fn $method(&mut self, lhs: UOpId, rhs: UOpId) -> Result<UOpId> {
                self.binary(BinaryOp::$op, lhs, rhs)
            }
        )+
    };
}

impl UOpGraph {
    // =========================================================================
    // Structural
    // =========================================================================

    /// Constant of `dtype`; the value is normalized by casting.
    pub fn const_(&mut self, value: ConstValue, dtype: DType) -> UOpId {
        let value = value.cast(&dtype).unwrap_or(value);
        self.intern(Op::Const(ConstValueHash(value)), dtype)
    }

    pub fn index_const(&mut self, value: i64) -> UOpId {
        self.const_(ConstValue::Int(value), DType::Index)
    }

    pub fn special(&mut self, axis: usize, size: UOpId) -> Result<UOpId> {
        self.expect_index(size)?;
        Ok(self.intern(Op::Special { axis, size }, DType::Index))
    }

    pub fn define_var(&mut self, var: Variable) -> UOpId {
        let (var, _) = var.unbind();
        self.intern(Op::DefineVar(var), DType::Index)
    }

    pub fn phi(&mut self, acc: UOpId, value: UOpId, loops: &[UOpId]) -> Result<UOpId> {
        let (acc_dt, value_dt) = (self.dtype(acc).clone(), self.dtype(value).clone());
        ensure!(
            acc_dt == value_dt,
            OperandDTypeMismatchSnafu { op: "phi", lhs: acc_dt.clone(), rhs: value_dt }
        );
        Ok(self.intern(Op::Phi { acc, value, loops: loops.iter().copied().collect() }, acc_dt))
    }

    pub fn sink(&mut self, sources: &[UOpId]) -> UOpId {
        self.intern(Op::Sink { sources: sources.iter().copied().collect() }, DType::Void)
    }

    pub fn noop(&mut self) -> UOpId {
        self.intern(Op::Noop, DType::Void)
    }

    // =========================================================================
    // Memory
    // =========================================================================

    /// Pointer to kernel argument `slot` holding `base` elements.
    pub fn define_global(&mut self, slot: usize, base: DType) -> UOpId {
        self.intern(Op::DefineGlobal { slot }, base.ptr(None, AddrSpace::Global))
    }

    pub fn define_local(&mut self, name: impl Into<String>, size: usize, base: DType) -> UOpId {
        self.intern(Op::DefineLocal { name: name.into(), size }, base.ptr(Some(size), AddrSpace::Local))
    }

    pub fn define_acc(&mut self, slot: usize, init: ConstValue, dtype: DType, loops: &[UOpId]) -> UOpId {
        let init = ConstValueHash(init.cast(&dtype).unwrap_or(init));
        self.intern(Op::DefineAcc { slot, init, loops: loops.iter().copied().collect() }, dtype)
    }

    /// Read `buffer[index]`; with a gate, reads only where `valid` holds and
    /// yields `alt` elsewhere.
    pub fn load(&mut self, buffer: UOpId, index: UOpId, gate: Option<(UOpId, UOpId)>) -> Result<UOpId> {
        let dtype = self.expect_pointer(buffer, "load buffer")?;
        self.expect_index(index)?;
        if let Some((valid, alt)) = gate {
            self.expect_bool(valid)?;
            let alt_dt = self.dtype(alt).clone();
            ensure!(alt_dt == dtype, OperandDTypeMismatchSnafu { op: "gated load", lhs: dtype.clone(), rhs: alt_dt });
        }
        Ok(self.intern(Op::Load { buffer, index, gate }, dtype))
    }

    pub fn store(&mut self, buffer: UOpId, index: UOpId, value: UOpId, gate: Option<UOpId>) -> Result<UOpId> {
        let dtype = self.expect_pointer(buffer, "store buffer")?;
        self.expect_index(index)?;
        let value_dt = self.dtype(value).clone();
        ensure!(value_dt == dtype, OperandDTypeMismatchSnafu { op: "store", lhs: dtype, rhs: value_dt });
        if let Some(gate) = gate {
            self.expect_bool(gate)?;
        }
        Ok(self.intern(Op::Store { buffer, index, value, gate }, DType::Void))
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    pub fn unary(&mut self, op: UnaryOp, src: UOpId) -> Result<UOpId> {
        let dtype = self.dtype(src).clone();
        let ok = match op {
            UnaryOp::Neg => dtype.is_float() || dtype.is_int(),
            _ => dtype.is_float(),
        };
        ensure!(ok, InvalidDTypeForUnaryOpSnafu { operation: op, dtype });
        Ok(self.intern(Op::Unary(op, src), dtype))
    }

    /// Both operands must share a dtype. Comparisons produce `Bool`,
    /// everything else produces the operand dtype.
    pub fn binary(&mut self, op: BinaryOp, lhs: UOpId, rhs: UOpId) -> Result<UOpId> {
        let (lt, rt) = (self.dtype(lhs).clone(), self.dtype(rhs).clone());
        ensure!(lt == rt, DTypeMismatchSnafu { op, lhs: lt, rhs: rt });
        let ok = match op {
            BinaryOp::Fdiv => lt.is_float(),
            BinaryOp::Idiv | BinaryOp::Mod => lt.is_int(),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => lt.is_int() || lt.is_bool(),
            _ => !lt.is_ptr() && lt != DType::Void,
        };
        ensure!(ok, InvalidDTypeForBinaryOpSnafu { operation: op, dtypes: SmallVec::from_buf([lt.clone(), rt]) });
        let dtype = if op.is_comparison() { DType::Bool } else { lt };
        Ok(self.intern(Op::Binary(op, lhs, rhs), dtype))
    }

    binary_helpers! {
        add => Add,
        mul => Mul,
        sub => Sub,
        idiv => Idiv,
        modulo => Mod,
        max => Max,
        lt => Lt,
        and => And,
    }

    pub fn ternary(&mut self, op: TernaryOp, a: UOpId, b: UOpId, c: UOpId) -> Result<UOpId> {
        let (bt, ct) = (self.dtype(b).clone(), self.dtype(c).clone());
        ensure!(bt == ct, OperandDTypeMismatchSnafu { op: "ternary", lhs: bt.clone(), rhs: ct });
        match op {
            TernaryOp::Where => self.expect_bool(a)?,
            TernaryOp::MulAcc => {
                let at = self.dtype(a).clone();
                ensure!(at == bt, OperandDTypeMismatchSnafu { op: "mulacc", lhs: at, rhs: bt.clone() });
            }
        }
        Ok(self.intern(Op::Ternary(op, a, b, c), bt))
    }

    pub fn where_(&mut self, cond: UOpId, then: UOpId, otherwise: UOpId) -> Result<UOpId> {
        self.ternary(TernaryOp::Where, cond, then, otherwise)
    }

    /// Cast to `dtype`; a no-op cast returns `src` itself.
    pub fn cast(&mut self, src: UOpId, dtype: DType) -> UOpId {
        if *self.dtype(src) == dtype {
            return self.resolve(src);
        }
        self.intern(Op::Cast { src }, dtype)
    }

    // =========================================================================
    // Control
    // =========================================================================

    pub fn loop_(&mut self, start: UOpId, end: UOpId, axis: LoopAxis) -> Result<UOpId> {
        self.expect_index(start)?;
        self.expect_index(end)?;
        Ok(self.intern(Op::Loop { start, end, axis }, DType::Index))
    }

    pub fn if_(&mut self, cond: UOpId) -> Result<UOpId> {
        self.expect_bool(cond)?;
        Ok(self.intern(Op::If { cond }, DType::Void))
    }

    pub fn end_loop(&mut self, range: UOpId) -> UOpId {
        self.intern(Op::EndLoop { range }, DType::Void)
    }

    pub fn end_if(&mut self, branch: UOpId) -> UOpId {
        self.intern(Op::EndIf { branch }, DType::Void)
    }

    pub fn barrier(&mut self, deps: &[UOpId]) -> UOpId {
        self.intern(Op::Barrier { deps: deps.iter().copied().collect() }, DType::Void)
    }

    // =========================================================================
    // Validation helpers
    // =========================================================================

    fn expect_index(&self, id: UOpId) -> Result<()> {
        let actual = self.dtype(id).clone();
        ensure!(actual == DType::Index, IndexTypeMismatchSnafu { actual });
        Ok(())
    }

    fn expect_bool(&self, id: UOpId) -> Result<()> {
        let actual = self.dtype(id).clone();
        ensure!(actual == DType::Bool, ConditionNotBoolSnafu { actual });
        Ok(())
    }

    /// Element dtype of a pointer-typed node.
    fn expect_pointer(&self, id: UOpId, what: &'static str) -> Result<DType> {
        match self.dtype(id) {
            DType::Ptr { base, .. } => Ok((**base).clone()),
            actual => ExpectedPointerSnafu { what, actual: actual.clone() }.fail(),
        }
    }
}
