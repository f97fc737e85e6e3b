//! The lazy operation graph behind [`Tensor`](crate::Tensor).
//!
//! Nodes are reference counted and immutable apart from the buffer they are
//! realized into. Movement operations never create compute: a view node
//! pairs a base node with a [`ShapeTracker`], and moving a view again
//! composes trackers on the same base. Every other node is a base.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tessera_device::Buffer;
use tessera_dtype::{DType, DeviceSpec};
use tessera_ir::{BinaryOp, ConstValue, ReduceOp, SInt, Shape, ShapeTracker, TernaryOp, UnaryOp};

pub type LazyRef = Rc<LazyBuffer>;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub enum LazyKind {
    /// Storage created from host data; realized from the start.
    Buffer,
    Const(ConstValue),
    View { base: LazyRef, st: ShapeTracker },
    Unary(UnaryOp, LazyRef),
    Binary(BinaryOp, LazyRef, LazyRef),
    Ternary(TernaryOp, LazyRef, LazyRef, LazyRef),
    Cast(LazyRef),
    /// Keeps reduced axes with size 1.
    Reduce { op: ReduceOp, axes: SmallVec<[usize; 4]>, src: LazyRef },
    /// Materialization boundary.
    Contiguous(LazyRef),
    /// Write `value` into the storage behind `target`.
    Assign { target: LazyRef, value: LazyRef },
}

pub struct LazyBuffer {
    id: u64,
    kind: LazyKind,
    dtype: DType,
    device: DeviceSpec,
    shape: Shape,
    realized: RefCell<Option<Buffer>>,
}

impl LazyBuffer {
    pub(crate) fn new(kind: LazyKind, dtype: DType, device: DeviceSpec, shape: Shape) -> LazyRef {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Rc::new(Self { id, kind, dtype, device, shape, realized: RefCell::new(None) })
    }

    pub(crate) fn from_buffer(buffer: Buffer, shape: Shape) -> LazyRef {
        let node = Self::new(LazyKind::Buffer, buffer.dtype(), buffer.device(), shape);
        node.realized.replace(Some(buffer));
        node
    }

    /// Unique, increasing in creation order.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &LazyKind {
        &self.kind
    }

    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    pub fn device(&self) -> &DeviceSpec {
        &self.device
    }

    pub fn shape(&self) -> &[SInt] {
        &self.shape
    }

    pub fn is_view(&self) -> bool {
        matches!(self.kind, LazyKind::View { .. })
    }

    /// The node that owns storage for this one.
    pub fn base(self: &Rc<Self>) -> LazyRef {
        match &self.kind {
            LazyKind::View { base, .. } => base.clone(),
            _ => self.clone(),
        }
    }

    /// Tracker from this node's logical shape into its base.
    pub fn st(&self) -> ShapeTracker {
        match &self.kind {
            LazyKind::View { st, .. } => st.clone(),
            _ => ShapeTracker::from_shape(&self.shape),
        }
    }

    pub fn realized(&self) -> Option<Buffer> {
        self.realized.borrow().clone()
    }

    pub fn is_realized(&self) -> bool {
        self.realized.borrow().is_some()
    }

    pub(crate) fn set_realized(&self, buffer: Buffer) {
        self.realized.replace(Some(buffer));
    }

    /// Operand nodes. A view's base counts as its only source.
    pub fn sources(&self) -> SmallVec<[&LazyRef; 3]> {
        match &self.kind {
            LazyKind::Buffer | LazyKind::Const(_) => SmallVec::new(),
            LazyKind::View { base, .. } => smallvec::smallvec![base],
            LazyKind::Unary(_, a) | LazyKind::Cast(a) | LazyKind::Contiguous(a) => smallvec::smallvec![a],
            LazyKind::Reduce { src, .. } => smallvec::smallvec![src],
            LazyKind::Binary(_, a, b) => smallvec::smallvec![a, b],
            LazyKind::Ternary(_, a, b, c) => smallvec::smallvec![a, b, c],
            LazyKind::Assign { target, value } => smallvec::smallvec![target, value],
        }
    }

    /// Apply a movement to the tracker of `self`.
    pub(crate) fn movement(
        self: &Rc<Self>,
        apply: impl FnOnce(&ShapeTracker) -> tessera_ir::Result<ShapeTracker>,
    ) -> tessera_ir::Result<LazyRef> {
        let base = self.base();
        let st = apply(&self.st())?;
        if st.is_contiguous() && st.shape() == base.shape() {
            return Ok(base);
        }
        let shape = st.shape().iter().cloned().collect();
        Ok(Self::new(LazyKind::View { base: base.clone(), st }, base.dtype.clone(), base.device.clone(), shape))
    }
}

impl fmt::Debug for LazyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &self.kind {
            LazyKind::Buffer => "BUFFER".to_string(),
            LazyKind::Const(value) => format!("CONST {value}"),
            LazyKind::View { base, st } => format!("VIEW %{} {st}", base.id),
            LazyKind::Unary(op, a) => format!("{op} %{}", a.id),
            LazyKind::Binary(op, a, b) => format!("{op} %{} %{}", a.id, b.id),
            LazyKind::Ternary(op, a, b, c) => format!("{op} %{} %{} %{}", a.id, b.id, c.id),
            LazyKind::Cast(a) => format!("CAST %{}", a.id),
            LazyKind::Reduce { op, axes, src } => format!("REDUCE {op} {axes:?} %{}", src.id),
            LazyKind::Contiguous(a) => format!("CONTIGUOUS %{}", a.id),
            LazyKind::Assign { target, value } => format!("ASSIGN %{} %{}", target.id, value.id),
        };
        write!(f, "%{} = {label} : {} {:?}", self.id, self.dtype, self.shape)?;
        if let Some(buffer) = self.realized.borrow().as_ref() {
            write!(f, " @ {buffer}")?;
        }
        Ok(())
    }
}
