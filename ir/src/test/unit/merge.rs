use smallvec::smallvec;

use crate::shape::{ShapeTracker, View, merge_views, shape_of};
use crate::sint::{SInt, Variable};

fn c(v: i64) -> SInt {
    SInt::Const(v)
}

/// Every logical element of `outer` read through the two-view stack and the
/// merged view must agree.
fn assert_merge_agrees(inner: &View, outer: &View, merged: &View) {
    let stacked = ShapeTracker::from_views([inner.clone(), outer.clone()]);
    let single = ShapeTracker::from_views([merged.clone()]);
    let size = outer.size().as_const().unwrap();
    for i in 0..size {
        assert_eq!(stacked.index_flat(i), single.index_flat(i), "element {i}");
    }
}

#[test]
fn test_contiguous_inner_returns_outer() {
    let inner = View::contiguous(shape_of(&[6]));
    let outer =
        View::contiguous(shape_of(&[6])).reshape(&shape_of(&[2, 3])).unwrap().unwrap().permute(&[1, 0]).unwrap();
    assert_eq!(merge_views(&inner, &outer), Some(outer));
}

#[test]
fn test_contiguous_outer_same_shape_returns_inner() {
    let inner = View::contiguous(shape_of(&[2, 3])).permute(&[1, 0]).unwrap();
    let outer = View::contiguous(shape_of(&[3, 2]));
    assert_eq!(merge_views(&inner, &outer), Some(inner));
}

#[test]
fn test_split_dimension_of_permuted() {
    let inner = View::contiguous(shape_of(&[4, 6])).permute(&[1, 0]).unwrap();
    let outer = View::contiguous(shape_of(&[2, 3, 4]));
    let merged = merge_views(&inner, &outer).unwrap();
    assert_eq!(merged.shape(), shape_of(&[2, 3, 4]).as_slice());
    assert_eq!(merged.strides(), &[c(3), c(1), c(6)]);
    assert_merge_agrees(&inner, &outer, &merged);
}

#[test]
fn test_flatten_of_transpose_fails() {
    let inner = View::contiguous(shape_of(&[3, 2])).permute(&[1, 0]).unwrap();
    let outer = View::contiguous(shape_of(&[6]));
    assert_eq!(merge_views(&inner, &outer), None);
}

#[test]
fn test_shrink_over_permute() {
    let inner = View::contiguous(shape_of(&[3, 4])).permute(&[1, 0]).unwrap();
    let outer = View::contiguous(shape_of(&[4, 3])).shrink(&[(c(1), c(3)), (c(0), c(2))]).unwrap();
    let merged = merge_views(&inner, &outer).unwrap();
    assert_merge_agrees(&inner, &outer, &merged);
}

#[test]
fn test_masked_inner_survives_reshape() {
    let inner = View::contiguous(shape_of(&[2, 3])).pad(&[(0, 0), (1, 1)]).unwrap();
    let outer = View::contiguous(shape_of(&[2, 5, 1]));
    let merged = merge_views(&inner, &outer).unwrap();
    assert!(merged.mask().is_some());
    assert_merge_agrees(&inner, &outer, &merged);
}

#[test]
fn test_masked_inner_outside_window_is_invalid() {
    let inner = View::contiguous(shape_of(&[3])).pad(&[(2, 0)]).unwrap();
    let outer = View::contiguous(shape_of(&[5])).shrink(&[(c(0), c(2))]).unwrap();
    let merged = merge_views(&inner, &outer).unwrap();
    assert!(merged.is_invalid());
}

#[test]
fn test_broadcast_outer() {
    let inner = View::contiguous(shape_of(&[4, 2])).permute(&[1, 0]).unwrap();
    let outer = View::contiguous(shape_of(&[2, 1, 4])).expand(&shape_of(&[2, 3, 4])).unwrap();
    let merged = merge_views(&inner, &outer).unwrap();
    assert_eq!(merged.strides()[1], c(0));
    assert_merge_agrees(&inner, &outer, &merged);
}

#[test]
fn test_symbolic_non_trivial_is_not_merged() {
    let n = Variable::new("n", 1, 8);
    let inner = View::contiguous(smallvec![SInt::var(n), c(2)]).permute(&[1, 0]).unwrap();
    let outer = View::contiguous(inner.shape().iter().cloned().collect()).permute(&[1, 0]).unwrap();
    assert_eq!(merge_views(&inner, &outer), None);
}
