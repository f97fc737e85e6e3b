use crate::memory_planner::analyze_liveness;
use crate::test::helpers::*;
use crate::{ScheduleConfig, Tensor, apply_buffer_replacements, create_schedule, plan_memory};

/// `x -> c1 -> c2 -> c3 -> out`, every intermediate forced into its own kernel.
fn chain(n: usize) -> (Tensor, [Tensor; 3], Tensor) {
    let x = Tensor::from_slice(iota(n, 1.0)).unwrap();
    let c1 = (&x + &x).contiguous();
    let c2 = (&c1 * &x).contiguous();
    let c3 = (&c2 - &x).contiguous();
    let out = &c3 + &x;
    (x, [c1, c2, c3], out)
}

#[test]
fn test_liveness_skips_inputs_and_outputs() {
    let (x, _, out) = chain(10);
    let schedule = create_schedule(&[&out], &ScheduleConfig::default()).unwrap();
    assert_eq!(schedule.len(), 4);

    let liveness = analyze_liveness(&schedule);
    assert_eq!(liveness.len(), 3);
    assert!(!liveness.contains_key(&x.buffer().unwrap().id()));
    for output in schedule.items.last().unwrap().outputs.iter() {
        assert!(!liveness.contains_key(&output.id()));
    }

    let mut spans: Vec<_> = liveness.values().map(|l| (l.first_appearance, l.last_appearance)).collect();
    spans.sort();
    assert_eq!(spans, vec![(0, 1), (1, 2), (2, 3)]);
}

#[test]
fn test_disjoint_lifetimes_share_storage() {
    let (_, _, out) = chain(10);
    let mut schedule = create_schedule(&[&out], &ScheduleConfig::default()).unwrap();

    let plan = plan_memory(&schedule);
    assert_eq!(plan.buffers_reused, 1);
    assert_eq!(plan.memory_saved, 10 * std::mem::size_of::<f32>());

    apply_buffer_replacements(&mut schedule.items, &plan.buffer_replace);
    let first = schedule.items[0].outputs[0].id();
    let third = schedule.items[2].outputs[0].id();
    assert_eq!(first, third);
    assert_ne!(first, schedule.items[1].outputs[0].id());
}

#[test]
fn test_single_kernel_has_nothing_to_plan() {
    let x = Tensor::from_slice(iota(4, 1.0)).unwrap();
    let out = &x * &x;
    let schedule = create_schedule(&[&out], &ScheduleConfig::default()).unwrap();

    let plan = plan_memory(&schedule);
    assert!(plan.buffer_replace.is_empty());
    assert_eq!(plan.memory_saved, 0);
}

#[test]
fn test_different_dtypes_never_share() {
    let x = Tensor::from_slice(iota(6, 1.0)).unwrap();
    let ints = x.cast(tessera_dtype::DType::Int32).contiguous();
    let back = (&ints + &ints).contiguous();
    let floats = (&back.cast(tessera_dtype::DType::Float32) * &x).contiguous();
    let out = &floats + &x;
    let schedule = create_schedule(&[&out], &ScheduleConfig::default()).unwrap();

    let plan = plan_memory(&schedule);
    for (logical, physical) in &plan.buffer_replace {
        let logical = schedule.iter().flat_map(|i| i.buffers()).find(|b| b.id() == *logical).unwrap();
        assert_eq!(logical.dtype(), physical.dtype());
    }
}

#[test]
fn test_planned_chain_computes_same_values() {
    let (_, _, out) = chain(10);
    let expected: Vec<f32> = iota(10, 1.0).iter().map(|v| (2.0 * v * v - v) + v).collect();
    assert_close_f32(&realize_f32(&out), &expected, 1e-6);
}
