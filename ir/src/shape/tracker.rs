use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Add;

use smallvec::{SmallVec, smallvec};

use super::{View, merge_views, unravel};
use crate::error::Result;
use crate::sint::{SInt, Variable};

/// A stack of views. The last view maps logical indices; each view's output
/// is unravelled into the shape of the view beneath it, and the first view
/// addresses the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeTracker {
    views: SmallVec<[View; 2]>,
}

impl ShapeTracker {
    pub fn from_shape(shape: &[SInt]) -> Self {
        Self { views: smallvec![View::contiguous(shape.iter().cloned().collect())] }
    }

    pub fn from_views(views: impl IntoIterator<Item = View>) -> Self {
        let views: SmallVec<[View; 2]> = views.into_iter().collect();
        debug_assert!(!views.is_empty());
        Self { views }
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    fn top(&self) -> &View {
        &self.views[self.views.len() - 1]
    }

    fn with_top(&self, view: View) -> Self {
        let mut views = self.views.clone();
        let last = views.len() - 1;
        views[last] = view;
        Self { views }
    }

    pub fn shape(&self) -> &[SInt] {
        self.top().shape()
    }

    pub fn ndim(&self) -> usize {
        self.top().ndim()
    }

    pub fn size(&self) -> SInt {
        self.top().size()
    }

    /// A single unmasked, zero-offset, row-major view.
    pub fn is_contiguous(&self) -> bool {
        self.views.len() == 1 && self.top().is_contiguous()
    }

    pub fn has_mask(&self) -> bool {
        self.views.iter().any(|v| v.mask().is_some())
    }

    /// Collapse adjacent views from the top while [`merge_views`] succeeds.
    pub fn simplify(&self) -> Self {
        let mut views = self.views.clone();
        while views.len() >= 2 {
            let n = views.len();
            match merge_views(&views[n - 2], &views[n - 1]) {
                Some(merged) => {
                    views.truncate(n - 2);
                    views.push(merged);
                }
                None => break,
            }
        }
        Self { views }
    }

    /// Apply `other` on top of `self`. `other`'s bottom view must address a
    /// buffer shaped like `self`.
    pub fn compose(&self, other: &ShapeTracker) -> Self {
        let mut out = self.clone();
        for view in &other.views {
            out.views.push(view.clone());
            out = out.simplify();
        }
        out
    }

    // ========================================================================
    // Movement operations
    // ========================================================================

    pub fn reshape(&self, new_shape: &[SInt]) -> Result<Self> {
        match self.top().reshape(new_shape)? {
            Some(view) => Ok(self.with_top(view).simplify()),
            None => {
                let mut views = self.views.clone();
                views.push(View::contiguous(new_shape.iter().cloned().collect()));
                Ok(Self { views }.simplify())
            }
        }
    }

    pub fn permute(&self, axes: &[usize]) -> Result<Self> {
        Ok(self.with_top(self.top().permute(axes)?))
    }

    pub fn expand(&self, new_shape: &[SInt]) -> Result<Self> {
        Ok(self.with_top(self.top().expand(new_shape)?))
    }

    pub fn pad(&self, padding: &[(usize, usize)]) -> Result<Self> {
        Ok(self.with_top(self.top().pad(padding)?))
    }

    pub fn shrink(&self, ranges: &[(SInt, SInt)]) -> Result<Self> {
        Ok(self.with_top(self.top().shrink(ranges)?))
    }

    pub fn stride(&self, mul: &[i64]) -> Result<Self> {
        Ok(self.with_top(self.top().stride(mul)?))
    }

    pub fn flip(&self, axes: &[bool]) -> Result<Self> {
        Ok(self.with_top(self.top().flip(axes)?))
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Buffer offset for logical `coords`, or `None` if masked out anywhere
    /// along the stack.
    pub fn index(&self, coords: &[i64]) -> Option<i64> {
        let mut idx = self.top().index(coords)?;
        for view in self.views.iter().rev().skip(1) {
            let shape: Vec<i64> = view.shape().iter().map(SInt::eval_bound).collect::<Option<_>>()?;
            let size: i64 = shape.iter().product();
            if idx < 0 || idx >= size {
                return None;
            }
            idx = view.index(&unravel(&shape, idx))?;
        }
        Some(idx)
    }

    /// Buffer offset of the `flat`-th logical element in row-major order.
    pub fn index_flat(&self, flat: i64) -> Option<i64> {
        let shape: Vec<i64> = self.shape().iter().map(SInt::eval_bound).collect::<Option<_>>()?;
        self.index(&unravel(&shape, flat))
    }

    /// Number of buffer elements reachable through this tracker
    /// (one past the largest valid offset), evaluated with bound values.
    pub fn real_size(&self) -> Option<i64> {
        let bottom = &self.views[0];
        if bottom.is_invalid() {
            return Some(0);
        }
        let shape: Vec<i64> = bottom.shape().iter().map(SInt::eval_bound).collect::<Option<_>>()?;
        let strides: Vec<i64> = bottom.strides().iter().map(SInt::eval_bound).collect::<Option<_>>()?;
        let ranges: Vec<(i64, i64)> = match bottom.mask() {
            Some(m) => m.iter().map(|(b, e)| Some((b.eval_bound()?, e.eval_bound()?))).collect::<Option<_>>()?,
            None => shape.iter().map(|&d| (0, d)).collect(),
        };
        let mut hi = bottom.offset().eval_bound()?;
        for (&(b, e), &st) in ranges.iter().zip(&strides) {
            hi += if st > 0 { (e - 1) * st } else { b * st };
        }
        Some(hi + 1)
    }

    pub fn unbind(&self) -> (Self, BTreeMap<Variable, i64>) {
        let mut bindings = BTreeMap::new();
        let views = self
            .views
            .iter()
            .map(|v| {
                let (u, b) = v.unbind();
                bindings.extend(b);
                u
            })
            .collect();
        (Self { views }, bindings)
    }

    pub fn vars(&self) -> BTreeSet<Variable> {
        self.views.iter().flat_map(View::vars).collect()
    }
}

impl Add for &ShapeTracker {
    type Output = ShapeTracker;

    fn add(self, rhs: &ShapeTracker) -> ShapeTracker {
        self.compose(rhs)
    }
}

impl fmt::Display for ShapeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShapeTracker[")?;
        for (i, v) in self.views.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "View(shape={:?}, strides={:?}, offset={}", v.shape(), v.strides(), v.offset())?;
            if let Some(mask) = v.mask() {
                write!(f, ", mask={mask:?}")?;
            }
            write!(f, ")")?;
        }
        write!(f, "]")
    }
}
