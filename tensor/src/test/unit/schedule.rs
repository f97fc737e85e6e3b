//! Kernel boundaries and schedule consistency.

use tessera_dtype::DType;
use tessera_ir::{ConstValue, SInt, Variable};

use crate::test::helpers::*;
use crate::{Error, Realizer, ScheduleConfig, Tensor, create_schedule};

// ============================================================================
// Fusion
// ============================================================================

#[test]
fn test_elementwise_chain_is_one_kernel() {
    let [a, b, c, d] = [0.0, 1.0, 2.0, 3.0].map(|offset| {
        let values: Vec<f32> = iota(10, 1.0).iter().map(|v| v + offset).collect();
        Tensor::from_slice(&values).unwrap()
    });
    let sum = &(&(&a + &b) + &c) + &d;

    assert_eq!(kernel_count(&[&sum]), 1);
    let expected: Vec<f32> = (0..10).map(|i| 4.0 * i as f32 + 6.0).collect();
    assert_close_f32(&realize_f32(&sum), &expected, 1e-6);
}

#[test]
fn test_contiguous_forces_a_boundary() {
    let a = Tensor::from_slice(iota(10, 1.0)).unwrap();
    let e = tensor(&iota(10, 10.0), &[2, 5]);
    let transposed = a.try_reshape(&[5, 2]).unwrap().try_permute(&[1, 0]).unwrap().contiguous();
    let out = &transposed + &e;

    assert_eq!(kernel_count(&[&out]), 2);
    let expected: Vec<f32> = (0..10).map(|i| ((i % 5) * 2 + i / 5) as f32 + 10.0 * i as f32).collect();
    assert_close_f32(&realize_f32(&out), &expected, 1e-6);
}

#[test]
fn test_reduce_then_elementwise_is_one_kernel() {
    let x = tensor(&iota(100, 1.0), &[10, 10]);
    let y = Tensor::from_slice(iota(10, 1.0)).unwrap();
    let out = &x.sum(0).unwrap() + &y;

    assert_eq!(kernel_count(&[&out]), 1);
    let expected: Vec<f32> = (0..10).map(|c| (0..10).map(|r| (r * 10 + c) as f32).sum::<f32>() + c as f32).collect();
    assert_close_f32(&realize_f32(&out), &expected, 1e-5);
}

#[test]
fn test_independent_reduces_get_separate_kernels() {
    let x = tensor(&iota(100, 1.0), &[10, 10]);
    let y = tensor(&iota(100, 2.0), &[10, 10]);
    let out = &x.sum(0).unwrap() + &y.sum(0).unwrap();

    assert_eq!(kernel_count(&[&out]), 2);
    let expected: Vec<f32> = (0..10).map(|c| 3.0 * (0..10).map(|r| (r * 10 + c) as f32).sum::<f32>()).collect();
    assert_close_f32(&realize_f32(&out), &expected, 1e-5);
}

#[test]
fn test_shared_reduce_is_realized_once() {
    let x = tensor(&iota(12, 1.0), &[3, 4]);
    let s = x.sum(1).unwrap();
    let out = &s + &(&s * &s);

    assert_eq!(kernel_count(&[&out]), 2);
    let expected: Vec<f32> = [6.0f32, 22.0, 38.0].iter().map(|v| v + v * v).collect();
    assert_close_f32(&realize_f32(&out), &expected, 1e-5);
}

#[test]
fn test_reduce_inside_reduce_is_split() {
    let x = tensor(&iota(16, 1.0), &[4, 4]);
    let row_means = x.mean_with().axes(1isize).keepdim(true).call().unwrap();
    let centered = &x - &row_means.try_expand(&[4, 4]).unwrap();
    let out = centered.sum(()).unwrap();

    assert_eq!(kernel_count(&[&out]), 2);
    assert_close_f32(&realize_f32(&out), &[0.0], 1e-4);

    let row_sums = x.sum_with().axes(1isize).keepdim(true).call().unwrap();
    let shifted = (&x - &row_sums.try_expand(&[4, 4]).unwrap()).sum(()).unwrap();
    assert_close_f32(&realize_f32(&shifted), &[120.0 - 4.0 * 120.0], 1e-4);
}

#[test]
fn test_view_budget_materializes_source() {
    let a = Tensor::from_slice(iota(12, 1.0)).unwrap();
    let b = Tensor::from_slice(iota(12, 2.0)).unwrap();
    let e = Tensor::from_slice(iota(12, 0.5)).unwrap();
    let shuffled = (&a + &b).try_reshape(&[3, 4]).unwrap().try_permute(&[1, 0]).unwrap().try_reshape(&[12]).unwrap();
    let out = &shuffled + &e;

    let strict = ScheduleConfig::builder().max_views(1).build();
    assert_eq!(create_schedule(&[&out], &strict).unwrap().len(), 2);
    assert_eq!(create_schedule(&[&out], &ScheduleConfig::default()).unwrap().len(), 1);

    let expected: Vec<f32> = (0..12).map(|i| 3.0 * ((i % 3) * 4 + i / 3) as f32 + 0.5 * i as f32).collect();
    let mut realizer = Realizer::builder().schedule(strict).build();
    realizer.realize(&[&out]).unwrap();
    assert_close_f32(&realize_f32(&out), &expected, 1e-5);
}

#[test]
fn test_realized_tensor_schedules_nothing() {
    let a = Tensor::from_slice([1.0f32, 2.0]).unwrap();
    assert!(create_schedule(&[&a], &ScheduleConfig::default()).unwrap().is_empty());
}

#[test]
fn test_multiple_outputs_share_one_schedule() {
    let a = Tensor::from_slice(iota(6, 1.0)).unwrap();
    let doubled = &a + &a;
    let squared = &a * &a;

    let schedule = create_schedule(&[&doubled, &squared], &ScheduleConfig::default()).unwrap();
    assert_eq!(schedule.len(), 2);
    assert_eq!(schedule.outputs.len(), 2);
}

// ============================================================================
// Symbolic shapes
// ============================================================================

#[test]
fn test_bound_variables_become_launch_values() {
    let n = Variable::new("n", 1, 10).bind(4).unwrap();
    let a = Tensor::from_slice(iota(10, 1.0)).unwrap();
    let window = a.try_shrink_symbolic(&[(SInt::from(0usize), SInt::from(n))]).unwrap();
    let out = &window + &window.const_like(ConstValue::Float(1.0));

    let schedule = create_schedule(&[&out], &ScheduleConfig::default()).unwrap();
    assert_eq!(schedule.len(), 1);
    assert_eq!(schedule.items[0].var_vals.get("n"), Some(&4));
    assert_close_f32(&realize_f32(&out), &[1.0, 2.0, 3.0, 4.0], 1e-6);
}

// ============================================================================
// Assign
// ============================================================================

#[test]
fn test_assign_writes_target_storage() {
    let b = Tensor::from_slice([1.0f32, 2.0, 3.0]).unwrap();
    let written = b.assign(&(&b * &b.const_like(ConstValue::Float(2.0)))).unwrap();

    assert_close_f32(&realize_f32(&written), &[2.0, 4.0, 6.0], 1e-6);
    assert_close_f32(&realize_f32(&b), &[2.0, 4.0, 6.0], 1e-6);
}

#[test]
fn test_assign_into_view() {
    let b = Tensor::from_slice([0.0f32; 6]).unwrap();
    let window = b.try_reshape(&[2, 3]).unwrap().try_shrink(&[(1, 2), (0, 3)]).unwrap();
    window.assign(&tensor(&[7.0, 8.0, 9.0], &[1, 3])).unwrap().realize().unwrap();

    assert_close_f32(&realize_f32(&b), &[0.0, 0.0, 0.0, 7.0, 8.0, 9.0], 1e-6);
}

#[test]
fn test_read_before_overwrite() {
    let b = Tensor::from_slice([1.0f32, 2.0, 3.0]).unwrap();
    let reader = &b + &b.const_like(ConstValue::Float(1.0));
    let writer = b.assign(&(&b * &b)).unwrap();

    Realizer::default().realize(&[&writer, &reader]).unwrap();
    assert_close_f32(&realize_f32(&reader), &[2.0, 3.0, 4.0], 1e-6);
    assert_close_f32(&realize_f32(&b), &[1.0, 4.0, 9.0], 1e-6);
}

#[test]
fn test_assigns_with_different_shapes_conflict() {
    let b = Tensor::from_slice([0.0f32; 10]).unwrap();
    let whole = b.assign(&Tensor::ones(&[10], DType::Float32)).unwrap();
    let half = b.try_shrink(&[(0, 5)]).unwrap().assign(&Tensor::ones(&[5], DType::Float32)).unwrap();

    let result = create_schedule(&[&whole, &half], &ScheduleConfig::default());
    assert!(matches!(result, Err(Error::StoreShapeMismatch { .. })), "{result:?}");
}

#[test]
fn test_assign_shape_mismatch() {
    let b = Tensor::from_slice([0.0f32; 10]).unwrap();
    let bad = b.assign(&Tensor::ones(&[5], DType::Float32)).unwrap();
    let result = create_schedule(&[&bad], &ScheduleConfig::default());
    assert!(matches!(result, Err(Error::StoreShapeMismatch { .. })), "{result:?}");
}

#[test]
fn test_assign_dtype_mismatch() {
    let b = Tensor::from_slice([0.0f32; 4]).unwrap();
    let bad = b.assign(&Tensor::ones(&[4], DType::Int32)).unwrap();
    let result = create_schedule(&[&bad], &ScheduleConfig::default());
    assert!(matches!(result, Err(Error::StoreDTypeMismatch { .. })), "{result:?}");
}

#[test]
fn test_assign_reading_shifted_target_is_rejected() {
    let b = Tensor::from_slice(iota(4, 1.0)).unwrap();
    let reversed = b.try_flip(&[0]).unwrap();
    let bad = b.assign(&reversed).unwrap();
    let result = create_schedule(&[&bad], &ScheduleConfig::default());
    assert!(matches!(result, Err(Error::AssignAliasing { .. })), "{result:?}");
}

#[test]
fn test_assign_requires_realized_target() {
    let a = Tensor::from_slice([1.0f32]).unwrap();
    let computed = &a + &a;
    assert!(matches!(computed.assign(&a), Err(Error::AssignTarget)));
}
