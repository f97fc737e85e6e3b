//! Front-end operations: shapes, dtypes and error reporting.

use test_case::test_case;
use tessera_dtype::DType;

use crate::test::helpers::*;
use crate::{Error, Tensor};

fn matrix() -> Tensor {
    tensor(&iota(6, 1.0), &[2, 3])
}

// ============================================================================
// Shapes
// ============================================================================

#[test_case(&[2, 3], &[2, 3] ; "explicit")]
#[test_case(&[-1, 2], &[3, 2] ; "infer leading")]
#[test_case(&[6, -1], &[6, 1] ; "infer trailing")]
#[test_case(&[1, -1, 1], &[1, 6, 1] ; "infer middle")]
fn test_reshape_dims(request: &[isize], expected: &[usize]) {
    let t = Tensor::from_slice(iota(6, 1.0)).unwrap();
    assert_eq!(t.try_reshape(request).unwrap().dims().unwrap(), expected);
}

#[test]
fn test_reshape_errors() {
    let t = Tensor::from_slice(iota(6, 1.0)).unwrap();
    assert!(matches!(t.try_reshape(&[-1, -1]), Err(Error::MultipleInferDimensions)));
    assert!(matches!(t.try_reshape(&[-2, 3]), Err(Error::NegativeDimension { dim: -2 })));
    assert!(matches!(t.try_reshape(&[4, -1]), Err(Error::InferDimension { numel: 6, .. })));
    assert!(matches!(t.try_reshape(&[4]), Err(Error::Ir { .. })));
}

#[test_case(&[1, 0] ; "swap")]
#[test_case(&[-1, 0] ; "negative axes")]
fn test_permute_valid(axes: &[isize]) {
    assert_eq!(matrix().try_permute(axes).unwrap().dims().unwrap(), vec![3, 2]);
}

#[test_case(&[0, 0] ; "repeated axis")]
#[test_case(&[0] ; "too few axes")]
#[test_case(&[0, 1, 2] ; "too many axes")]
fn test_permute_invalid(axes: &[isize]) {
    assert!(matches!(matrix().try_permute(axes), Err(Error::InvalidPermutation { .. })));
}

#[test]
fn test_axis_out_of_range() {
    let err = matrix().try_transpose(0, 2).unwrap_err();
    assert!(matches!(err, Error::AxisOutOfRange { axis: 2, ndim: 2 }));
    assert!(matches!(matrix().sum(-3), Err(Error::AxisOutOfRange { axis: -3, .. })));
}

#[test]
fn test_squeeze_unsqueeze_flatten() {
    let t = matrix().try_unsqueeze(0).unwrap().try_unsqueeze(-1).unwrap();
    assert_eq!(t.dims().unwrap(), vec![1, 2, 3, 1]);
    assert_eq!(t.try_squeeze(Some(-1)).unwrap().dims().unwrap(), vec![1, 2, 3]);
    assert_eq!(t.try_squeeze(Some(1)).unwrap().dims().unwrap(), vec![1, 2, 3, 1]);
    assert_eq!(t.try_squeeze(None).unwrap().dims().unwrap(), vec![2, 3]);
    assert_eq!(t.flatten().unwrap().dims().unwrap(), vec![6]);
}

#[test]
fn test_contiguous_movement_returns_base() {
    let t = Tensor::from_slice(iota(6, 1.0)).unwrap();
    let round_trip = t.try_reshape(&[3, 2]).unwrap().try_transpose(0, 1).unwrap().try_transpose(0, 1).unwrap();
    assert!(round_trip.lazy().is_view());
    let flat = round_trip.try_reshape(&[6]).unwrap();
    assert!(std::rc::Rc::ptr_eq(flat.lazy(), t.lazy()));
}

#[test]
fn test_expand() {
    let col = tensor(&[1.0, 2.0], &[2, 1]);
    let wide = col.try_expand(&[-1, 3]).unwrap();
    assert_eq!(wide.dims().unwrap(), vec![2, 3]);
    assert_close_f32(&realize_f32(&wide), &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0], 1e-6);
    assert!(matches!(col.try_expand(&[2]), Err(Error::BroadcastMismatch { .. })));
}

// ============================================================================
// Broadcasting and dtypes
// ============================================================================

#[test_case(&[2, 3], &[3], &[2, 3] ; "trailing row")]
#[test_case(&[2, 1], &[1, 3], &[2, 3] ; "outer product")]
#[test_case(&[3], &[], &[3] ; "scalar")]
fn test_broadcast_shapes(lhs: &[isize], rhs: &[isize], expected: &[usize]) {
    let numel = |dims: &[isize]| dims.iter().product::<isize>() as usize;
    let a = tensor(&iota(numel(lhs), 1.0), lhs);
    let b = tensor(&iota(numel(rhs), 1.0), rhs);
    assert_eq!((&a + &b).dims().unwrap(), expected);
}

#[test]
fn test_broadcast_mismatch() {
    let row = Tensor::from_slice([1.0f32, 2.0]).unwrap();
    assert!(matches!(matrix().try_add(&row), Err(Error::BroadcastMismatch { .. })));
}

#[test_case(DType::Float32, DType::Int32, DType::Float32 ; "float beats int")]
#[test_case(DType::Int32, DType::Bool, DType::Int32 ; "int beats bool")]
#[test_case(DType::Int32, DType::Int64, DType::Int64 ; "wider int")]
#[test_case(DType::Float32, DType::Float64, DType::Float64 ; "wider float")]
fn test_binary_promotion(lhs: DType, rhs: DType, expected: DType) {
    let a = Tensor::zeros(&[2], lhs);
    let b = Tensor::zeros(&[2], rhs);
    assert_eq!((&a + &b).dtype(), expected);
    assert_eq!((&b + &a).dtype(), expected);
}

#[test]
fn test_unsupported_dtypes() {
    let ints = Tensor::from_slice([1i32, 4, 9]).unwrap();
    let flags = Tensor::from_slice([true, false]).unwrap();
    let floats = Tensor::from_slice([1.0f32, 2.0]).unwrap();

    assert!(matches!(ints.sqrt(), Err(Error::UnsupportedDType { operation: "sqrt", .. })));
    assert!(matches!(ints.exp(), Err(Error::UnsupportedDType { .. })));
    assert!(matches!(flags.try_neg(), Err(Error::UnsupportedDType { operation: "neg", .. })));
    assert!(matches!(floats.bitwise_and(&floats), Err(Error::UnsupportedDType { .. })));
    assert!(matches!(floats.try_mod(&floats), Err(Error::UnsupportedDType { .. })));
    assert!(flags.bitwise_xor(&flags).is_ok());
}

#[test]
fn test_reduce_dtypes() {
    let ints = Tensor::from_slice([1i32, 2, 4]).unwrap();
    assert_eq!(ints.sum(()).unwrap().dtype(), DType::Int32);
    assert_eq!(ints.mean(()).unwrap().dtype(), DType::Float32);
    assert_close_f32(&realize_f32(&ints.mean(()).unwrap()), &[7.0 / 3.0], 1e-6);

    let summed = ints.sum_with().axes(0isize).dtype(DType::Float32).call().unwrap();
    assert_eq!(summed.dtype(), DType::Float32);
}

#[test_case(0isize, false, &[3] ; "axis 0")]
#[test_case(1isize, false, &[2] ; "axis 1")]
#[test_case(-1isize, true, &[2, 1] ; "keepdim")]
fn test_reduce_shapes(axis: isize, keepdim: bool, expected: &[usize]) {
    let out = matrix().sum_with().axes(axis).keepdim(keepdim).call().unwrap();
    assert_eq!(out.dims().unwrap(), expected);
}

#[test]
fn test_reduce_multiple_axes() {
    let t = tensor(&iota(24, 1.0), &[2, 3, 4]);
    let out = t.sum(vec![0isize, 2]).unwrap();
    assert_eq!(out.dims().unwrap(), vec![3]);
    assert_close_f32(&realize_f32(&out), &[60.0, 92.0, 124.0], 1e-6);
}

// ============================================================================
// Matmul
// ============================================================================

#[test_case(&[3], &[3], &[] ; "vector dot")]
#[test_case(&[2, 3], &[3], &[2] ; "matrix vector")]
#[test_case(&[3], &[3, 4], &[4] ; "vector matrix")]
#[test_case(&[2, 3], &[3, 4], &[2, 4] ; "matrix matrix")]
fn test_dot_shapes(lhs: &[isize], rhs: &[isize], expected: &[usize]) {
    let numel = |dims: &[isize]| dims.iter().product::<isize>() as usize;
    let a = tensor(&iota(numel(lhs), 1.0), lhs);
    let b = tensor(&iota(numel(rhs), 1.0), rhs);
    assert_eq!(a.dot(&b).unwrap().dims().unwrap(), expected);
}

#[test]
fn test_vector_dot_value() {
    let a = Tensor::from_slice([1.0f32, 2.0, 3.0]).unwrap();
    let b = Tensor::from_slice([4.0f32, 5.0, 6.0]).unwrap();
    assert_close_f32(&realize_f32(&a.dot(&b).unwrap()), &[32.0], 1e-6);
}

#[test_case(&[2, 3], &[2, 3] ; "inner dims differ")]
#[test_case(&[2, 3, 4], &[4, 2] ; "rank three")]
fn test_dot_shape_mismatch(lhs: &[isize], rhs: &[isize]) {
    let numel = |dims: &[isize]| dims.iter().product::<isize>() as usize;
    let a = tensor(&iota(numel(lhs), 1.0), lhs);
    let b = tensor(&iota(numel(rhs), 1.0), rhs);
    assert!(matches!(a.matmul(&b), Err(Error::DotShapeMismatch { .. })));
}
