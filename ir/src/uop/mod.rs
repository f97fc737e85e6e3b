//! Micro-op graph.
//!
//! Micro-ops live in a [`UOpGraph`] arena and refer to each other by
//! [`UOpId`]. Construction is hash-consed: adding a node identical in
//! `(op, dtype, sources)` to an existing node returns the existing id. The
//! rewrite engine may overwrite a slot in place with [`UOpGraph::replace`];
//! ids held elsewhere stay valid and observe the new contents.

mod constructors;
pub mod debug;
pub mod eval;
mod graph;

use smallvec::SmallVec;
use tessera_dtype::DType;

pub use graph::UOpGraph;

use crate::sint::Variable;
use crate::types::{BinaryOp, ConstValue, ConstValueHash, TernaryOp, UnaryOp};

/// Stable reference to a node of a [`UOpGraph`] (or a position in a
/// linearized instruction list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("%{_0}")]
pub struct UOpId(pub u32);

impl UOpId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Role of a loop range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum LoopKind {
    /// Iterates one output dimension.
    Global,
    /// Iterates one reduced dimension; always nested inside the global loops.
    Reduce,
}

/// Loop identity. Orders global loops before reduce loops, then by axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopAxis {
    pub kind: LoopKind,
    pub axis: usize,
}

/// Micro-op kinds with their argument payloads and source edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::EnumDiscriminants)]
#[strum_discriminants(name(OpKind), derive(Hash, PartialOrd, Ord, strum::Display))]
pub enum Op {
    // Structural
    /// Designated root; its sources are the kernel's side effects.
    Sink { sources: SmallVec<[UOpId; 4]> },
    Const(ConstValueHash),
    /// Launch-grid index along `axis`, in `[0, size)`.
    Special { axis: usize, size: UOpId },
    /// Final accumulator value of a reduction: writes `value` back into
    /// `acc` on every iteration of `loops`.
    Phi { acc: UOpId, value: UOpId, loops: SmallVec<[UOpId; 2]> },
    Noop,

    // Memory
    DefineGlobal { slot: usize },
    DefineLocal { name: String, size: usize },
    /// Launch-time symbolic integer.
    DefineVar(Variable),
    /// Register accumulator; `slot` keeps distinct reductions apart.
    DefineAcc { slot: usize, init: ConstValueHash, loops: SmallVec<[UOpId; 2]> },
    /// `gate = Some((valid, alt))` reads only when `valid` holds, else yields `alt`.
    Load { buffer: UOpId, index: UOpId, gate: Option<(UOpId, UOpId)> },
    Store { buffer: UOpId, index: UOpId, value: UOpId, gate: Option<UOpId> },

    // Arithmetic
    Cast { src: UOpId },
    Unary(UnaryOp, UOpId),
    Binary(BinaryOp, UOpId, UOpId),
    Ternary(TernaryOp, UOpId, UOpId, UOpId),

    // Control
    Loop { start: UOpId, end: UOpId, axis: LoopAxis },
    EndLoop { range: UOpId },
    If { cond: UOpId },
    EndIf { branch: UOpId },
    Barrier { deps: SmallVec<[UOpId; 4]> },
}

impl Op {
    pub fn kind(&self) -> OpKind {
        OpKind::from(self)
    }

    /// Source edges in a fixed order.
    pub fn sources(&self) -> SmallVec<[UOpId; 4]> {
        let mut out = SmallVec::new();
        match self {
            Op::Const(_) | Op::Noop | Op::DefineGlobal { .. } | Op::DefineLocal { .. } | Op::DefineVar(_) => {}
            Op::Sink { sources } => out.extend_from_slice(sources),
            Op::Barrier { deps } => out.extend_from_slice(deps),
            Op::Special { size, .. } => out.push(*size),
            Op::Phi { acc, value, loops } => {
                out.push(*acc);
                out.push(*value);
                out.extend_from_slice(loops);
            }
            Op::DefineAcc { loops, .. } => out.extend_from_slice(loops),
            Op::Load { buffer, index, gate } => {
                out.extend([*buffer, *index]);
                if let Some((valid, alt)) = gate {
                    out.extend([*valid, *alt]);
                }
            }
            Op::Store { buffer, index, value, gate } => {
                out.extend([*buffer, *index, *value]);
                out.extend(*gate);
            }
            Op::Cast { src } | Op::Unary(_, src) => out.push(*src),
            Op::Binary(_, a, b) => out.extend([*a, *b]),
            Op::Ternary(_, a, b, c) => out.extend([*a, *b, *c]),
            Op::Loop { start, end, .. } => out.extend([*start, *end]),
            Op::EndLoop { range } => out.push(*range),
            Op::If { cond } => out.push(*cond),
            Op::EndIf { branch } => out.push(*branch),
        }
        out
    }

    /// Copy of `self` with every source edge passed through `f`.
    pub fn map_sources(&self, mut f: impl FnMut(UOpId) -> UOpId) -> Op {
        match self {
            Op::Const(_) | Op::Noop | Op::DefineGlobal { .. } | Op::DefineLocal { .. } | Op::DefineVar(_) => {
                self.clone()
            }
            Op::Sink { sources } => Op::Sink { sources: map_ids(sources, &mut f) },
            Op::Barrier { deps } => Op::Barrier { deps: map_ids(deps, &mut f) },
            Op::DefineAcc { slot, init, loops } => {
                Op::DefineAcc { slot: *slot, init: *init, loops: map_ids(loops, &mut f) }
            }
            Op::Phi { acc, value, loops } => {
                let loops = map_ids(loops, &mut f);
                Op::Phi { acc: f(*acc), value: f(*value), loops }
            }
            Op::Special { axis, size } => Op::Special { axis: *axis, size: f(*size) },
            Op::Load { buffer, index, gate } => {
                Op::Load { buffer: f(*buffer), index: f(*index), gate: gate.map(|(v, a)| (f(v), f(a))) }
            }
            Op::Store { buffer, index, value, gate } => {
                Op::Store { buffer: f(*buffer), index: f(*index), value: f(*value), gate: gate.map(&mut f) }
            }
            Op::Cast { src } => Op::Cast { src: f(*src) },
            Op::Unary(op, a) => Op::Unary(*op, f(*a)),
            Op::Binary(op, a, b) => Op::Binary(*op, f(*a), f(*b)),
            Op::Ternary(op, a, b, c) => Op::Ternary(*op, f(*a), f(*b), f(*c)),
            Op::Loop { start, end, axis } => Op::Loop { start: f(*start), end: f(*end), axis: *axis },
            Op::EndLoop { range } => Op::EndLoop { range: f(*range) },
            Op::If { cond } => Op::If { cond: f(*cond) },
            Op::EndIf { branch } => Op::EndIf { branch: f(*branch) },
        }
    }

    /// Opens a block scope closed by a matching end marker.
    pub fn opens_scope(&self) -> bool {
        matches!(self, Op::Loop { .. } | Op::If { .. })
    }

    /// Has an effect beyond its value.
    pub fn has_side_effect(&self) -> bool {
        matches!(self, Op::Store { .. } | Op::Barrier { .. })
    }
}

fn map_ids<const N: usize>(ids: &[UOpId], f: &mut impl FnMut(UOpId) -> UOpId) -> SmallVec<[UOpId; N]>
where
    [UOpId; N]: smallvec::Array<Item = UOpId>,
{
    ids.iter().map(|&id| f(id)).collect()
}

/// One micro-op: an operation and the dtype it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UOp {
    pub op: Op,
    pub dtype: DType,
}

impl UOp {
    pub fn new(op: Op, dtype: DType) -> Self {
        Self { op, dtype }
    }

    pub fn as_const(&self) -> Option<ConstValue> {
        match &self.op {
            Op::Const(v) => Some(v.0),
            _ => None,
        }
    }
}
