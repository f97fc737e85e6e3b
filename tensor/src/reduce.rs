//! Reduction operations for tensors.
//!
//! A reduction records one `Reduce` node that keeps reduced axes with size 1;
//! `keepdim = false` is a reshape view on top of it.

use bon::bon;
use smallvec::SmallVec;
use snafu::{OptionExt, ensure};
use tessera_dtype::DType;
use tessera_ir::{ConstValue, ReduceOp, SInt, Shape, sint_prod};

use crate::error::*;
use crate::lazy::{LazyBuffer, LazyKind};
use crate::Tensor;

/// Specification for reduction axes.
///
/// - All axes: `AxisSpec::All` (from `()`)
/// - Single axis: `AxisSpec::Single(0)` (from `isize`)
/// - Multiple axes: `AxisSpec::Multiple(vec![0, 2])` (from `&[isize]` or `Vec<isize>`)
#[derive(Debug, Clone)]
pub enum AxisSpec {
    All,
    /// Supports negative indexing.
    Single(isize),
    Multiple(Vec<isize>),
}

impl From<()> for AxisSpec {
    fn from(_: ()) -> Self {
        Self::All
    }
}

impl From<isize> for AxisSpec {
    fn from(axis: isize) -> Self {
        Self::Single(axis)
    }
}

impl From<i32> for AxisSpec {
    fn from(axis: i32) -> Self {
        Self::Single(axis as isize)
    }
}

impl From<&[isize]> for AxisSpec {
    fn from(axes: &[isize]) -> Self {
        Self::Multiple(axes.to_vec())
    }
}

impl From<Vec<isize>> for AxisSpec {
    fn from(axes: Vec<isize>) -> Self {
        Self::Multiple(axes)
    }
}

impl Tensor {
    /// Normalized, sorted and deduplicated axis indices.
    fn resolve_axis_spec(spec: &AxisSpec, ndim: usize) -> Result<SmallVec<[usize; 4]>> {
        let mut axes: SmallVec<[usize; 4]> = match spec {
            AxisSpec::All => (0..ndim).collect(),
            AxisSpec::Single(axis) => smallvec::smallvec![Self::normalize_axis(*axis, ndim)?],
            AxisSpec::Multiple(axes) => axes.iter().map(|&a| Self::normalize_axis(a, ndim)).collect::<Result<_>>()?,
        };
        axes.sort_unstable();
        axes.dedup();
        Ok(axes)
    }

    /// Accumulation dtype for sums: `Bool` sums count, everything else is kept.
    fn sum_acc_dtype(dtype: &DType) -> DType {
        if dtype.is_bool() { DType::Int32 } else { dtype.clone() }
    }

    /// Reduce `axes`, keeping them with size 1.
    fn reduce_keepdim(&self, op: ReduceOp, axes: &[usize]) -> Tensor {
        let shape: Shape = self
            .shape()
            .iter()
            .enumerate()
            .map(|(i, d)| if axes.contains(&i) { SInt::from(1usize) } else { d.clone() })
            .collect();
        let kind = LazyKind::Reduce { op, axes: axes.iter().copied().collect(), src: self.lazy.clone() };
        Self::new(LazyBuffer::new(kind, self.dtype(), self.device(), shape))
    }

    fn drop_reduced_dims(&self, axes: &[usize]) -> Result<Tensor> {
        let shape: Shape =
            self.shape().iter().enumerate().filter(|(i, _)| !axes.contains(i)).map(|(_, d)| d.clone()).collect();
        self.try_reshape_symbolic(&shape)
    }
}

#[bon]
impl Tensor {
    /// Sum of tensor elements over given axes.
    ///
    /// ```ignore
    /// let total = t.sum(())?;         // every axis
    /// let rows = t.sum(1)?;           // [M, N] -> [M]
    /// ```
    #[track_caller]
    pub fn sum(&self, axes: impl Into<AxisSpec>) -> Result<Self> {
        reduce_internal(self, ReduceOp::Sum, axes.into(), false, None)
    }

    /// Sum with additional options (keepdim, dtype).
    ///
    /// ```ignore
    /// tensor.sum_with().axes(0).keepdim(true).call()?;
    /// tensor.sum_with().axes(0).dtype(DType::Float64).call()?;
    /// ```
    #[builder]
    #[track_caller]
    pub fn sum_with(
        &self,
        axes: impl Into<AxisSpec>,
        #[builder(default = false)] keepdim: bool,
        dtype: Option<DType>,
    ) -> Result<Self> {
        reduce_internal(self, ReduceOp::Sum, axes.into(), keepdim, dtype)
    }

    /// Maximum of tensor elements over given axes.
    pub fn max(&self, axes: impl Into<AxisSpec>) -> Result<Self> {
        reduce_internal(self, ReduceOp::Max, axes.into(), false, None)
    }

    #[builder]
    #[track_caller]
    pub fn max_with(&self, axes: impl Into<AxisSpec>, #[builder(default = false)] keepdim: bool) -> Result<Self> {
        reduce_internal(self, ReduceOp::Max, axes.into(), keepdim, None)
    }

    /// Minimum of tensor elements over given axes, as `-max(-x)`.
    #[track_caller]
    pub fn min(&self, axes: impl Into<AxisSpec>) -> Result<Self> {
        min_impl(self, axes.into(), false)
    }

    #[builder]
    #[track_caller]
    pub fn min_with(&self, axes: impl Into<AxisSpec>, #[builder(default = false)] keepdim: bool) -> Result<Self> {
        min_impl(self, axes.into(), keepdim)
    }

    /// Mean of tensor elements over given axes.
    ///
    /// Integer inputs are averaged in `Float32`.
    #[track_caller]
    pub fn mean(&self, axes: impl Into<AxisSpec>) -> Result<Self> {
        mean_impl(self, axes.into(), false)
    }

    #[builder]
    #[track_caller]
    pub fn mean_with(&self, axes: impl Into<AxisSpec>, #[builder(default = false)] keepdim: bool) -> Result<Self> {
        mean_impl(self, axes.into(), keepdim)
    }
}

#[track_caller]
fn reduce_internal(
    tensor: &Tensor,
    op: ReduceOp,
    axes: AxisSpec,
    keepdim: bool,
    dtype: Option<DType>,
) -> Result<Tensor> {
    let axes = Tensor::resolve_axis_spec(&axes, tensor.ndim())?;
    let acc_dtype = match (op, dtype) {
        (_, Some(dtype)) => dtype,
        (ReduceOp::Sum, None) => Tensor::sum_acc_dtype(&tensor.dtype()),
        (ReduceOp::Max, None) => tensor.dtype(),
    };
    let working = tensor.cast(acc_dtype);
    if axes.is_empty() {
        return Ok(working);
    }

    let reduced = working.reduce_keepdim(op, &axes);
    if keepdim { Ok(reduced) } else { reduced.drop_reduced_dims(&axes) }
}

fn min_impl(tensor: &Tensor, axes: AxisSpec, keepdim: bool) -> Result<Tensor> {
    let dtype = tensor.dtype();
    ensure!(dtype.is_float() || dtype.is_signed(), UnsupportedDTypeSnafu { operation: "min", dtype });
    reduce_internal(&tensor.try_neg()?, ReduceOp::Max, axes, keepdim, None)?.try_neg()
}

fn mean_impl(tensor: &Tensor, axes: AxisSpec, keepdim: bool) -> Result<Tensor> {
    let resolved = Tensor::resolve_axis_spec(&axes, tensor.ndim())?;
    let count = sint_prod(resolved.iter().map(|&a| &tensor.shape()[a]))
        .as_const()
        .context(SymbolicShapeUnsupportedSnafu { operation: "mean" })?;

    let dtype = if tensor.dtype().is_float() { tensor.dtype() } else { DType::Float32 };
    let sum = reduce_internal(tensor, ReduceOp::Sum, axes, keepdim, Some(dtype))?;
    sum.try_div(&sum.const_like(ConstValue::Float(count as f64)))
}
