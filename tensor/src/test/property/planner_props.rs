//! Shared storage never hosts two live buffers at once.

use std::collections::HashMap;

use proptest::prelude::*;
use tessera_device::BufferId;

use crate::memory_planner::analyze_liveness;
use crate::test::reference::{Expr, build, evaluate};
use crate::{ScheduleConfig, create_schedule, plan_memory};

use super::generators::*;

/// Wrap every other node in `Contiguous` to produce many intermediates.
fn materialize(expr: Expr, depth: usize) -> Expr {
    let wrap = |e: Expr| if depth % 2 == 0 { Expr::Contiguous(Box::new(e)) } else { e };
    let sub = |e: Box<Expr>| Box::new(materialize(*e, depth + 1));
    wrap(match expr {
        Expr::Add(a, b) => Expr::Add(sub(a), sub(b)),
        Expr::Sub(a, b) => Expr::Sub(sub(a), sub(b)),
        Expr::Mul(a, b) => Expr::Mul(sub(a), sub(b)),
        Expr::Max(a, b) => Expr::Max(sub(a), sub(b)),
        Expr::Neg(a) => Expr::Neg(sub(a)),
        Expr::Transpose(a) => Expr::Transpose(sub(a)),
        Expr::SumBroadcast(a, axis) => Expr::SumBroadcast(sub(a), axis),
        Expr::MaxBroadcast(a, axis) => Expr::MaxBroadcast(sub(a), axis),
        Expr::Contiguous(a) => Expr::Contiguous(sub(a)),
        leaf => leaf,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn tenants_of_a_buffer_do_not_overlap(expr in arb_expr(), (n, inputs) in arb_inputs()) {
        let out = build(&materialize(expr, 0), &to_tensors(&inputs, n), n);
        let schedule = create_schedule(&[&out], &ScheduleConfig::default()).unwrap();
        let liveness = analyze_liveness(&schedule);
        let plan = plan_memory(&schedule);

        let mut tenants: HashMap<BufferId, Vec<BufferId>> = HashMap::new();
        for (logical, physical) in &plan.buffer_replace {
            prop_assert!(liveness.contains_key(logical));
            tenants.entry(physical.id()).or_insert_with(|| vec![physical.id()]).push(*logical);
        }

        for (physical, group) in &tenants {
            let host = &liveness[physical].buffer;
            for (i, a) in group.iter().enumerate() {
                let a = &liveness[a];
                prop_assert_eq!(a.buffer.dtype(), host.dtype());
                prop_assert!(a.buffer.size() <= host.size());
                for b in &group[i + 1..] {
                    let b = &liveness[b];
                    prop_assert!(
                        a.last_appearance < b.first_appearance || b.last_appearance < a.first_appearance,
                        "{} [{}, {}] overlaps {} [{}, {}]",
                        a.buffer.id(), a.first_appearance, a.last_appearance,
                        b.buffer.id(), b.first_appearance, b.last_appearance,
                    );
                }
            }
        }
        let saved: usize = plan.buffer_replace.keys().map(|id| liveness[id].buffer.nbytes()).sum();
        prop_assert_eq!(saved, plan.memory_saved);
    }

    #[test]
    fn planned_realization_matches_reference(expr in arb_expr(), (n, inputs) in arb_inputs()) {
        let expr = materialize(expr, 0);
        let expected = evaluate(&expr, &inputs, n);
        let out = build(&expr, &to_tensors(&inputs, n), n);
        let actual = out.to_vec::<f32>().unwrap();
        for (a, e) in actual.iter().zip(&expected) {
            prop_assert!((a - e).abs() <= 1e-3 * e.abs().max(1.0), "{} != {}", a, e);
        }
    }
}
