//! View and ShapeTracker algebra.
//!
//! A [`View`] is one affine, optionally masked, re-indexing of a buffer. A
//! [`ShapeTracker`] stacks views; adjacent views are collapsed with
//! [`merge_views`] whenever the composition is expressible as one view.

mod merge;
mod tracker;
mod view;

use smallvec::SmallVec;

pub use merge::merge_views;
pub use tracker::ShapeTracker;
pub use view::View;

use crate::sint::SInt;

/// Shape or stride vector. Stack-allocated for rank ≤ 4.
pub type Shape = SmallVec<[SInt; 4]>;

/// Per-dimension valid index range `[begin, end)`.
pub type Mask = SmallVec<[(SInt, SInt); 4]>;

/// Canonical row-major strides; size-1 dimensions get stride 0.
pub fn strides_for_shape(shape: &[SInt]) -> Shape {
    let mut strides: Shape = smallvec::smallvec![SInt::Const(0); shape.len()];
    let mut acc = SInt::Const(1);
    for (i, dim) in shape.iter().enumerate().rev() {
        strides[i] = if *dim == 1 { SInt::Const(0) } else { acc.clone() };
        acc = &acc * dim;
    }
    strides
}

/// Concrete dimensions, if none are symbolic.
pub fn to_concrete(shape: &[SInt]) -> Option<Vec<i64>> {
    shape.iter().map(SInt::as_const).collect()
}

/// Build a concrete shape.
pub fn shape_of(dims: &[usize]) -> Shape {
    dims.iter().map(|&d| SInt::from(d)).collect()
}

/// Row-major coordinates of `flat` within `shape`.
pub fn unravel(shape: &[i64], mut flat: i64) -> Vec<i64> {
    let mut coords = vec![0; shape.len()];
    for (i, &dim) in shape.iter().enumerate().rev() {
        if dim > 0 {
            coords[i] = flat.rem_euclid(dim);
            flat = flat.div_euclid(dim);
        }
    }
    coords
}
