//! Lazy tensors for tessera.
//!
//! A [`Tensor`] records operations into a graph of [`LazyBuffer`] nodes
//! without computing anything. Realizing a tensor schedules the graph into
//! fused kernels ([`create_schedule`]), assigns physical storage to the
//! intermediates ([`plan_memory`]) and runs the kernels through a
//! [`Realizer`].
//!
//! ```ignore
//! let a = Tensor::from_slice(&[1.0f32, 2.0, 3.0])?;
//! let b = Tensor::from_slice(&[4.0f32, 5.0, 6.0])?;
//! let c = (&a + &b).sum(0)?;
//! assert_eq!(c.to_vec::<f32>()?, vec![21.0]);
//! ```

use std::rc::Rc;

use snafu::{OptionExt, ResultExt};
use tessera_device::Buffer;
use tessera_dtype::{DType, DeviceSpec, HasDType};
use tessera_ir::shape::shape_of;
use tessera_ir::{ConstValue, SInt, Shape, sint_prod};

pub mod config;
pub mod error;
pub mod lazy;
pub mod memory_planner;
pub mod realize;
pub mod schedule;

pub mod arithmetic;
pub mod broadcast;
pub mod conditional;
pub mod math;
pub mod matmul;
pub mod reduce;
pub mod shape_ops;
pub mod traits;

#[cfg(test)]
mod test;

pub use config::ScheduleConfig;
pub use error::*;
pub use lazy::{LazyBuffer, LazyKind, LazyRef};
pub use memory_planner::{MemoryPlannerResult, apply_buffer_replacements, plan_memory};
pub use realize::Realizer;
pub use reduce::AxisSpec;
pub use schedule::{Schedule, ScheduleItem, create_schedule};

/// A lazily evaluated multi-dimensional array.
///
/// Operations build a graph; buffers are only allocated for tensors created
/// from host data and for kernel outputs during realization.
#[derive(Clone)]
pub struct Tensor {
    lazy: LazyRef,
}

impl Tensor {
    pub(crate) fn new(lazy: LazyRef) -> Self {
        Self { lazy }
    }

    /// One-dimensional tensor over a copy of `values`.
    pub fn from_slice<T: HasDType>(values: impl AsRef<[T]>) -> Result<Self> {
        let values = values.as_ref();
        let buffer = Buffer::from_slice(values).context(DeviceSnafu)?;
        Ok(Self::new(LazyBuffer::from_buffer(buffer, shape_of(&[values.len()]))))
    }

    /// Tensor of `shape` with every element equal to `value`.
    pub fn full(shape: &[usize], value: ConstValue, dtype: DType) -> Self {
        Self::full_symbolic(&shape_of(shape), value, dtype)
    }

    pub fn full_symbolic(shape: &[SInt], value: ConstValue, dtype: DType) -> Self {
        let value = value.cast(&dtype).unwrap_or(value);
        let shape: Shape = shape.iter().cloned().collect();
        Self::new(LazyBuffer::new(LazyKind::Const(value), dtype, DeviceSpec::Cpu, shape))
    }

    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let value = ConstValue::zero(dtype.base());
        Self::full(shape, value, dtype)
    }

    pub fn ones(shape: &[usize], dtype: DType) -> Self {
        let value = ConstValue::one(dtype.base());
        Self::full(shape, value, dtype)
    }

    /// The graph node behind this tensor.
    pub fn lazy(&self) -> &LazyRef {
        &self.lazy
    }

    pub fn shape(&self) -> &[SInt] {
        self.lazy.shape()
    }

    /// Concrete dimensions.
    ///
    /// # Errors
    ///
    /// Fails for shapes with symbolic dimensions.
    pub fn dims(&self) -> Result<Vec<usize>> {
        self.shape()
            .iter()
            .map(|d| d.as_const().map(|d| d as usize))
            .collect::<Option<Vec<_>>>()
            .context(SymbolicShapeUnsupportedSnafu { operation: "dims" })
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn numel(&self) -> SInt {
        sint_prod(self.shape())
    }

    pub fn dtype(&self) -> DType {
        self.lazy.dtype().clone()
    }

    pub fn device(&self) -> DeviceSpec {
        *self.lazy.device()
    }

    /// Whether the tensor's data is held in a buffer, unviewed.
    pub fn is_realized(&self) -> bool {
        !self.lazy.is_view() && self.lazy.is_realized()
    }

    /// The buffer holding this tensor's data, if it is realized.
    pub fn buffer(&self) -> Option<Buffer> {
        if self.lazy.is_view() { None } else { self.lazy.realized() }
    }

    /// Realize and copy the elements out in row-major order.
    ///
    /// Views are materialized into a contiguous buffer first.
    pub fn to_vec<T: HasDType>(&self) -> Result<Vec<T>> {
        let partial = match self.lazy.kind() {
            LazyKind::Assign { target, .. } => target.is_view(),
            _ => self.lazy.is_view(),
        };
        let target = if partial { self.contiguous() } else { self.clone() };
        if !target.lazy.is_realized() {
            target.clone().realize()?;
        }
        let buffer = target.lazy.realized().context(NotRealizedSnafu)?;
        buffer.to_vec::<T>().context(DeviceSnafu)
    }

    /// Force materialization into a fresh contiguous buffer.
    pub fn contiguous(&self) -> Tensor {
        let shape = self.lazy.shape().iter().cloned().collect();
        Self::new(LazyBuffer::new(LazyKind::Contiguous(self.lazy.clone()), self.dtype(), self.device(), shape))
    }

    /// Write `value` into the storage behind `self` when realized.
    ///
    /// `self` must be a realized buffer or a view of one. The returned tensor
    /// reads the written storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssignTarget`] for computed targets. Shape and dtype
    /// agreement is checked when the assign is scheduled.
    pub fn assign(&self, value: &Tensor) -> Result<Tensor> {
        if !self.lazy.base().is_realized() {
            return AssignTargetSnafu.fail();
        }
        let shape = self.lazy.shape().iter().cloned().collect();
        let kind = LazyKind::Assign { target: self.lazy.clone(), value: value.lazy.clone() };
        Ok(Self::new(LazyBuffer::new(kind, self.dtype(), self.device(), shape)))
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor").field("lazy", &self.lazy).finish()
    }
}

impl From<Rc<LazyBuffer>> for Tensor {
    fn from(lazy: Rc<LazyBuffer>) -> Self {
        Self::new(lazy)
    }
}
