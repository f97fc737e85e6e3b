//! Operation trees handed from the scheduler to the linearizer.
//!
//! A [`LazyOp`] is an immutable tree: leaves are buffer loads and constants
//! (each with a [`ShapeTracker`]), inner nodes are arithmetic, casts and
//! reductions, and the root is a [`LazyOpKind::Sink`] over one store per
//! output. Buffers are referenced by kernel argument slot, so two trees that
//! differ only in which concrete buffers they touch are the same tree.
//!
//! Every node carries a structural hash computed at construction; equal trees
//! have equal keys, which makes the tree usable as a kernel cache key.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;
use snafu::ensure;
use tessera_dtype::DType;

use crate::error::*;
use crate::shape::{Shape, ShapeTracker};
use crate::sint::SInt;
use crate::types::{BinaryOp, ConstValue, ConstValueHash, ReduceOp, TernaryOp, UnaryOp};

/// Child edge of an operation tree.
pub type Src = Arc<LazyOp>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LazyOpKind {
    /// Read kernel argument `buf` through `st`.
    Load { buf: usize, st: ShapeTracker },
    /// A constant broadcast over `st` (masked elements read as zero).
    Const { value: ConstValueHash, st: ShapeTracker },
    Unary(UnaryOp, Src),
    Binary(BinaryOp, Src, Src),
    Ternary(TernaryOp, Src, Src, Src),
    Cast(Src),
    /// Reduce `axes`; the result keeps those axes with size 1.
    Reduce { op: ReduceOp, axes: SmallVec<[usize; 4]>, src: Src },
    /// Write `src` into kernel argument `buf` through `st`.
    Store { buf: usize, st: ShapeTracker, src: Src },
    Sink(Vec<Src>),
}

#[derive(Debug, Clone)]
pub struct LazyOp {
    kind: LazyOpKind,
    dtype: DType,
    shape: Shape,
    key: u64,
}

impl PartialEq for LazyOp {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || (self.key == other.key && self.dtype == other.dtype && self.kind == other.kind)
    }
}

impl Eq for LazyOp {}

impl Hash for LazyOp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl LazyOp {
    fn new(kind: LazyOpKind, dtype: DType, shape: Shape) -> Src {
        let mut hasher = DefaultHasher::new();
        std::mem::discriminant(&kind).hash(&mut hasher);
        dtype.hash(&mut hasher);
        shape.hash(&mut hasher);
        match &kind {
            LazyOpKind::Load { buf, st } => (buf, st).hash(&mut hasher),
            LazyOpKind::Const { value, st } => (value, st).hash(&mut hasher),
            LazyOpKind::Unary(op, _) => op.hash(&mut hasher),
            LazyOpKind::Binary(op, ..) => op.hash(&mut hasher),
            LazyOpKind::Ternary(op, ..) => op.hash(&mut hasher),
            LazyOpKind::Reduce { op, axes, .. } => (op, axes).hash(&mut hasher),
            LazyOpKind::Store { buf, st, .. } => (buf, st).hash(&mut hasher),
            LazyOpKind::Cast(_) | LazyOpKind::Sink(_) => {}
        }
        for src in kind_sources(&kind) {
            src.key.hash(&mut hasher);
        }
        Arc::new(LazyOp { kind, dtype, shape, key: hasher.finish() })
    }

    // ========================================================================
    // Constructors
    // ========================================================================

    pub fn load(buf: usize, dtype: DType, st: ShapeTracker) -> Src {
        let shape = st.shape().iter().cloned().collect();
        Self::new(LazyOpKind::Load { buf, st }, dtype, shape)
    }

    pub fn constant(value: ConstValue, dtype: DType, st: ShapeTracker) -> Src {
        let value = ConstValueHash(value.cast(&dtype).unwrap_or(value));
        let shape = st.shape().iter().cloned().collect();
        Self::new(LazyOpKind::Const { value, st }, dtype, shape)
    }

    pub fn unary(op: UnaryOp, src: Src) -> Src {
        let (dtype, shape) = (src.dtype.clone(), src.shape.clone());
        Self::new(LazyOpKind::Unary(op, src), dtype, shape)
    }

    pub fn binary(op: BinaryOp, lhs: Src, rhs: Src) -> Result<Src> {
        ensure!(
            lhs.shape == rhs.shape,
            OperandShapeMismatchSnafu { op: "binary", lhs: lhs.shape.to_vec(), rhs: rhs.shape.to_vec() }
        );
        ensure!(
            lhs.dtype == rhs.dtype,
            OperandDTypeMismatchSnafu { op: "binary", lhs: lhs.dtype.clone(), rhs: rhs.dtype.clone() }
        );
        let dtype = if op.is_comparison() { DType::Bool } else { lhs.dtype.clone() };
        let shape = lhs.shape.clone();
        Ok(Self::new(LazyOpKind::Binary(op, lhs, rhs), dtype, shape))
    }

    pub fn ternary(op: TernaryOp, a: Src, b: Src, c: Src) -> Result<Src> {
        for other in [&b, &c] {
            ensure!(
                a.shape == other.shape,
                OperandShapeMismatchSnafu { op: "ternary", lhs: a.shape.to_vec(), rhs: other.shape.to_vec() }
            );
        }
        ensure!(
            b.dtype == c.dtype,
            OperandDTypeMismatchSnafu { op: "ternary", lhs: b.dtype.clone(), rhs: c.dtype.clone() }
        );
        let (dtype, shape) = (b.dtype.clone(), a.shape.clone());
        Ok(Self::new(LazyOpKind::Ternary(op, a, b, c), dtype, shape))
    }

    pub fn cast(src: Src, dtype: DType) -> Src {
        let shape = src.shape.clone();
        Self::new(LazyOpKind::Cast(src), dtype, shape)
    }

    pub fn reduce(op: ReduceOp, src: Src, axes: &[usize]) -> Result<Src> {
        let mut axes: SmallVec<[usize; 4]> = axes.iter().copied().collect();
        axes.sort_unstable();
        axes.dedup();
        if let Some(&axis) = axes.iter().find(|&&a| a >= src.shape.len()) {
            return AxisOutOfRangeSnafu { axis, shape_dims: src.shape.len() }.fail();
        }
        let shape = src
            .shape
            .iter()
            .enumerate()
            .map(|(i, d)| if axes.contains(&i) { SInt::Const(1) } else { d.clone() })
            .collect();
        let dtype = src.dtype.clone();
        Ok(Self::new(LazyOpKind::Reduce { op, axes, src }, dtype, shape))
    }

    pub fn store(buf: usize, st: ShapeTracker, src: Src) -> Result<Src> {
        ensure!(
            st.shape() == src.shape.as_slice(),
            OperandShapeMismatchSnafu { op: "store", lhs: st.shape().to_vec(), rhs: src.shape.to_vec() }
        );
        let (dtype, shape) = (src.dtype.clone(), src.shape.clone());
        Ok(Self::new(LazyOpKind::Store { buf, st, src }, dtype, shape))
    }

    pub fn sink(srcs: Vec<Src>) -> Src {
        Self::new(LazyOpKind::Sink(srcs), DType::Void, Shape::new())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn kind(&self) -> &LazyOpKind {
        &self.kind
    }

    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    pub fn shape(&self) -> &[SInt] {
        &self.shape
    }

    /// Structural hash; equal trees share it.
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn sources(&self) -> SmallVec<[&Src; 3]> {
        kind_sources(&self.kind)
    }

    /// Every node reachable from `self`, children before parents, each once.
    pub fn toposort(self: &Arc<Self>) -> Vec<Src> {
        let mut visited: HashSet<*const LazyOp> = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<(Src, bool)> = vec![(self.clone(), false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !visited.insert(Arc::as_ptr(&node)) {
                continue;
            }
            stack.push((node.clone(), true));
            for src in node.sources().into_iter().rev() {
                if !visited.contains(&Arc::as_ptr(src)) {
                    stack.push((src.clone(), false));
                }
            }
        }
        order
    }

    /// All stores under a sink (or `self` if it is a store).
    pub fn stores(self: &Arc<Self>) -> Vec<Src> {
        match &self.kind {
            LazyOpKind::Sink(srcs) => {
                srcs.iter().filter(|s| matches!(s.kind, LazyOpKind::Store { .. })).cloned().collect()
            }
            LazyOpKind::Store { .. } => vec![self.clone()],
            _ => Vec::new(),
        }
    }

    pub fn has_reduce(self: &Arc<Self>) -> bool {
        self.toposort().iter().any(|n| matches!(n.kind, LazyOpKind::Reduce { .. }))
    }

    fn label(&self) -> String {
        match &self.kind {
            LazyOpKind::Load { buf, st } => format!("LOAD buf{buf} {st}"),
            LazyOpKind::Const { value, st } => format!("CONST {} {st}", value.0),
            LazyOpKind::Unary(op, _) => format!("{op}"),
            LazyOpKind::Binary(op, ..) => format!("{op}"),
            LazyOpKind::Ternary(op, ..) => format!("{op}"),
            LazyOpKind::Cast(_) => format!("CAST {}", self.dtype),
            LazyOpKind::Reduce { op, axes, .. } => format!("REDUCE {op} {axes:?}"),
            LazyOpKind::Store { buf, st, .. } => format!("STORE buf{buf} {st}"),
            LazyOpKind::Sink(_) => "SINK".to_string(),
        }
    }
}

fn kind_sources(kind: &LazyOpKind) -> SmallVec<[&Src; 3]> {
    match kind {
        LazyOpKind::Load { .. } | LazyOpKind::Const { .. } => SmallVec::new(),
        LazyOpKind::Unary(_, s) | LazyOpKind::Cast(s) => smallvec::smallvec![s],
        LazyOpKind::Reduce { src, .. } | LazyOpKind::Store { src, .. } => smallvec::smallvec![src],
        LazyOpKind::Binary(_, a, b) => smallvec::smallvec![a, b],
        LazyOpKind::Ternary(_, a, b, c) => smallvec::smallvec![a, b, c],
        LazyOpKind::Sink(srcs) => srcs.iter().collect(),
    }
}

/// Indented tree rendering; shared subtrees are printed at each use.
impl fmt::Display for LazyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack: Vec<(&LazyOp, usize)> = vec![(self, 0)];
        while let Some((node, depth)) = stack.pop() {
            writeln!(f, "{:indent$}{} : {} {:?}", "", node.label(), node.dtype, node.shape, indent = depth * 2)?;
            for src in node.sources().into_iter().rev() {
                stack.push((&**src, depth + 1));
            }
        }
        Ok(())
    }
}
