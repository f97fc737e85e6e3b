//! Simplification checked against direct evaluation.

use std::collections::HashMap;

use proptest::prelude::*;
use tessera_dtype::DType;
use tessera_ir::{BinaryOp, ConstValue, Op, UOpGraph, Variable};

use super::generators::*;
use crate::test::helpers::{eval, simplify};

fn bindings(values: [i64; 3]) -> HashMap<String, i64> {
    VARS.iter().zip(values).map(|(name, v)| (name.to_string(), v)).collect()
}

// ============================================================================
// Soundness
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Simplification never changes the value of an expression.
    #[test]
    fn simplify_preserves_value(expr in arb_expr(), envs in prop::collection::vec(arb_env(), 4)) {
        let mut g = UOpGraph::new();
        let root = build(&mut g, &expr);
        let envs: Vec<_> = envs.into_iter().map(bindings).collect();
        let before: Vec<_> = envs.iter().map(|env| eval(&g, root, env)).collect();

        let root = simplify(&mut g, root);
        for (env, expected) in envs.iter().zip(before) {
            prop_assert_eq!(eval(&g, root, env), expected, "{:?} at {:?}", expr, env);
        }
    }

    /// A simplified graph is a fixed point of the rule table.
    #[test]
    fn simplify_is_idempotent(expr in arb_expr()) {
        let mut g = UOpGraph::new();
        let root = build(&mut g, &expr);
        let once = simplify(&mut g, root);
        let hash = g.structural_hash(once);
        let twice = simplify(&mut g, once);
        prop_assert_eq!(g.structural_hash(twice), hash);
    }

    /// The simplified form does not depend on arena ids.
    #[test]
    fn simplify_ignores_build_order(expr in arb_expr(), noise in 0i64..32) {
        let mut plain = UOpGraph::new();
        let root = build(&mut plain, &expr);
        let root = simplify(&mut plain, root);

        let mut shifted = UOpGraph::new();
        for v in 0..noise {
            shifted.index_const(1000 + v);
        }
        let other = build(&mut shifted, &expr);
        let other = simplify(&mut shifted, other);
        prop_assert_eq!(plain.structural_hash(root), shifted.structural_hash(other));
    }
}

// ============================================================================
// Constant Folding
// ============================================================================

proptest! {
    #[test]
    fn int_add_folds_exactly(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        let mut g = UOpGraph::new();
        let (x, y) = (g.const_(ConstValue::Int(a), DType::Int32), g.const_(ConstValue::Int(b), DType::Int32));
        let sum = g.add(x, y).unwrap();
        let root = simplify(&mut g, sum);
        prop_assert_eq!(g.const_value(root), Some(ConstValue::Int(a + b)));
    }

    #[test]
    fn float_add_folds_exactly(a in -1e12f64..1e12, b in -1e12f64..1e12) {
        let mut g = UOpGraph::new();
        let (x, y) = (g.const_(ConstValue::Float(a), DType::Float64), g.const_(ConstValue::Float(b), DType::Float64));
        let sum = g.add(x, y).unwrap();
        let root = simplify(&mut g, sum);
        prop_assert_eq!(g.const_value(root), Some(ConstValue::Float(a + b)));
    }

    #[test]
    fn multiplying_by_one_is_identity(swap in any::<bool>(), max in 1i64..100) {
        let mut g = UOpGraph::new();
        let x = g.define_var(Variable::new("x", 0, max));
        let one = g.index_const(1);
        let (lhs, rhs) = if swap { (one, x) } else { (x, one) };
        let prod = g.binary(BinaryOp::Mul, lhs, rhs).unwrap();
        let root = simplify(&mut g, prod);
        prop_assert!(matches!(g.op(root), Op::DefineVar(var) if var.name() == "x"));
    }

    #[test]
    fn where_true_selects_first(cond in any::<bool>()) {
        let mut g = UOpGraph::new();
        let a = g.define_var(Variable::new("a", 0, 10));
        let b = g.define_var(Variable::new("b", 0, 10));
        let c = g.const_(ConstValue::Bool(cond), DType::Bool);
        let select = g.where_(c, a, b).unwrap();
        let root = simplify(&mut g, select);
        let expected = if cond { "a" } else { "b" };
        prop_assert!(matches!(g.op(root), Op::DefineVar(var) if var.name() == expected));
    }
}
