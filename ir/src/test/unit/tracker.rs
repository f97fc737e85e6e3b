use crate::shape::{ShapeTracker, shape_of};
use crate::sint::SInt;

fn st(dims: &[usize]) -> ShapeTracker {
    ShapeTracker::from_shape(&shape_of(dims))
}

fn read_all(st: &ShapeTracker) -> Vec<Option<i64>> {
    let size = st.size().as_const().unwrap();
    (0..size).map(|i| st.index_flat(i)).collect()
}

#[test]
fn test_from_shape_is_contiguous() {
    let t = st(&[3, 4]);
    assert!(t.is_contiguous());
    assert_eq!(t.views().len(), 1);
    assert_eq!(t.real_size(), Some(12));
}

#[test]
fn test_reshape_of_transpose_stacks_views() {
    let t = st(&[5, 2]).permute(&[1, 0]).unwrap().reshape(&shape_of(&[10])).unwrap();
    assert_eq!(t.views().len(), 2);
    assert!(!t.is_contiguous());
    assert_eq!(read_all(&t), vec![0, 2, 4, 6, 8, 1, 3, 5, 7, 9].into_iter().map(Some).collect::<Vec<_>>());
}

#[test]
fn test_transpose_twice_collapses() {
    let t = st(&[5, 2]).permute(&[1, 0]).unwrap().permute(&[1, 0]).unwrap();
    assert!(t.is_contiguous());
}

#[test]
fn test_simplify_merges_compatible_views() {
    let t = st(&[4, 3]).permute(&[1, 0]).unwrap().reshape(&shape_of(&[12])).unwrap();
    let t = t.reshape(&shape_of(&[3, 4])).unwrap();
    // The final reshape undoes the flattening of the transpose.
    let simplified = t.simplify();
    assert_eq!(simplified.views().len(), 1);
    assert_eq!(read_all(&simplified), read_all(&t));
}

#[test]
fn test_compose_applies_other_on_top() {
    let base = st(&[2, 3]).permute(&[1, 0]).unwrap();
    let top = st(&[3, 2]).shrink(&[(SInt::Const(1), SInt::Const(3)), (SInt::Const(0), SInt::Const(2))]).unwrap();
    let composed = &base + &top;
    assert_eq!(composed.shape(), shape_of(&[2, 2]).as_slice());
    // Rows 1..3 of the transposed (3, 2) view.
    assert_eq!(read_all(&composed), vec![Some(1), Some(4), Some(2), Some(5)]);
}

#[test]
fn test_padded_tracker() {
    let t = st(&[2]).pad(&[(1, 1)]).unwrap();
    assert!(t.has_mask());
    assert_eq!(read_all(&t), vec![None, Some(0), Some(1), None]);
    assert_eq!(t.real_size(), Some(2));
}

#[test]
fn test_expand_real_size() {
    let t = st(&[1, 4]).expand(&shape_of(&[8, 4])).unwrap();
    assert_eq!(t.size(), SInt::Const(32));
    assert_eq!(t.real_size(), Some(4));
}

#[test]
fn test_display() {
    let t = st(&[2, 3]).permute(&[1, 0]).unwrap();
    assert_eq!(t.to_string(), "ShapeTracker[View(shape=[3, 2], strides=[1, 3], offset=0)]");
}
