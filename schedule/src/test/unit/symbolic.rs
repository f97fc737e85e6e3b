use test_case::test_case;

use tessera_dtype::DType;
use tessera_ir::{BinaryOp, ConstValue, LoopAxis, LoopKind, Op, TernaryOp, UOpGraph, Variable};

use crate::test::helpers::{count, simplify};

fn var(g: &mut UOpGraph, name: &str, max: i64) -> tessera_ir::UOpId {
    g.define_var(Variable::new(name, 0, max))
}

// ============================================================================
// Constant Folding
// ============================================================================

#[test_case(BinaryOp::Add, 3, 4, 7 ; "add")]
#[test_case(BinaryOp::Sub, 3, 4, -1 ; "sub")]
#[test_case(BinaryOp::Mul, -3, 4, -12 ; "mul")]
#[test_case(BinaryOp::Idiv, -7, 2, -3 ; "idiv truncates")]
#[test_case(BinaryOp::Mod, -7, 2, -1 ; "mod keeps dividend sign")]
#[test_case(BinaryOp::Max, -7, 2, 2 ; "max")]
fn test_fold_int(op: BinaryOp, a: i64, b: i64, expected: i64) {
    let mut g = UOpGraph::new();
    let a = g.const_(ConstValue::Int(a), DType::Int32);
    let b = g.const_(ConstValue::Int(b), DType::Int32);
    let root = g.binary(op, a, b).unwrap();
    let root = simplify(&mut g, root);
    assert_eq!(g.const_value(root), Some(ConstValue::Int(expected)));
}

#[test]
fn test_fold_int_wraps() {
    let mut g = UOpGraph::new();
    let a = g.const_(ConstValue::Int(i32::MAX as i64), DType::Int32);
    let b = g.const_(ConstValue::Int(1), DType::Int32);
    let root = g.add(a, b).unwrap();
    let root = simplify(&mut g, root);
    assert_eq!(g.const_value(root), Some(ConstValue::Int(i32::MIN as i64)));
}

#[test]
fn test_fold_division_by_zero_is_kept() {
    let mut g = UOpGraph::new();
    let a = g.index_const(5);
    let b = g.index_const(0);
    let root = g.idiv(a, b).unwrap();
    let root = simplify(&mut g, root);
    assert!(matches!(g.op(root), Op::Binary(BinaryOp::Idiv, ..)));
}

#[test]
fn test_fold_float32_rounds() {
    let mut g = UOpGraph::new();
    let a = g.const_(ConstValue::Float(0.1), DType::Float32);
    let b = g.const_(ConstValue::Float(0.2), DType::Float32);
    let root = g.add(a, b).unwrap();
    let root = simplify(&mut g, root);
    let expected = (0.1f32 as f64 + 0.2f32 as f64) as f32 as f64;
    assert_eq!(g.const_value(root), Some(ConstValue::Float(expected)));
}

#[test]
fn test_fold_comparison_and_cast() {
    let mut g = UOpGraph::new();
    let a = g.const_(ConstValue::Float(1.5), DType::Float32);
    let b = g.const_(ConstValue::Float(2.5), DType::Float32);
    let lt = g.lt(a, b).unwrap();
    let cast = g.cast(b, DType::Int32);
    let sink = g.sink(&[lt, cast]);
    let root = simplify(&mut g, sink);
    let Op::Sink { sources } = g.op(root) else { panic!("expected sink") };
    assert_eq!(g.const_value(sources[0]), Some(ConstValue::Bool(true)));
    assert_eq!(g.const_value(sources[1]), Some(ConstValue::Int(2)));
}

// ============================================================================
// Identities
// ============================================================================

#[test]
fn test_mul_one_both_sides() {
    let mut g = UOpGraph::new();
    let x = var(&mut g, "x", 9);
    let one = g.index_const(1);
    let right = g.mul(x, one).unwrap();
    let left = g.mul(one, x).unwrap();
    let sink = g.sink(&[right, left]);
    let root = simplify(&mut g, sink);
    let Op::Sink { sources } = g.op(root) else { panic!("expected sink") };
    assert!(sources.iter().all(|&s| matches!(g.op(s), Op::DefineVar(_))));
}

#[test]
fn test_where_folds() {
    let mut g = UOpGraph::new();
    let a = var(&mut g, "a", 9);
    let b = var(&mut g, "b", 9);
    let yes = g.const_(ConstValue::Bool(true), DType::Bool);
    let root = g.where_(yes, a, b).unwrap();
    let root = simplify(&mut g, root);
    assert!(matches!(g.op(root), Op::DefineVar(v) if v.name() == "a"));

    let mut g = UOpGraph::new();
    let a = var(&mut g, "a", 9);
    let c = var(&mut g, "c", 9);
    let ten = g.index_const(10);
    let cond = g.lt(c, ten).unwrap();
    let cond = g.and(cond, cond).unwrap();
    let root = g.where_(cond, a, a).unwrap();
    let root = simplify(&mut g, root);
    assert!(matches!(g.op(root), Op::DefineVar(v) if v.name() == "a"));
}

#[test]
fn test_float_annihilators() {
    let mut g = UOpGraph::new();
    let buf = g.define_global(0, DType::Float32);
    let idx = g.index_const(0);
    let x = g.load(buf, idx, None).unwrap();
    let zero = g.const_(ConstValue::Float(0.0), DType::Float32);
    let mul = g.mul(x, zero).unwrap();
    let sub = g.sub(x, x).unwrap();
    let sink = g.sink(&[mul, sub]);
    let sink = simplify(&mut g, sink);
    let Op::Sink { sources } = g.op(sink).clone() else { unreachable!() };
    for src in sources {
        assert_eq!(g.const_value(src), Some(ConstValue::Float(0.0)));
        assert_eq!(*g.dtype(src), DType::Float32);
    }
}

#[test]
fn test_float_common_factor() {
    let mut g = UOpGraph::new();
    let buf = g.define_global(0, DType::Float32);
    let offsets: Vec<_> = (0..3).map(|i| g.index_const(i)).collect();
    let [x, y, z] = [0, 1, 2].map(|i| g.load(buf, offsets[i], None).unwrap());
    let xy = g.mul(x, y).unwrap();
    let zx = g.mul(z, x).unwrap();
    let root = g.add(xy, zx).unwrap();
    assert_eq!(count(&g, root, |op| matches!(op, Op::Binary(BinaryOp::Mul, ..))), 2);
    let root = simplify(&mut g, root);
    assert_eq!(count(&g, root, |op| matches!(op, Op::Binary(BinaryOp::Mul, ..))), 1);
}

#[test]
fn test_int_annihilators() {
    let mut g = UOpGraph::new();
    let x = var(&mut g, "x", 9);
    let zero = g.index_const(0);
    let one = g.index_const(1);
    let mul = g.mul(x, zero).unwrap();
    let modulo = g.modulo(x, one).unwrap();
    let sub = g.sub(x, x).unwrap();
    let sink = g.sink(&[mul, modulo, sub]);
    let root = simplify(&mut g, sink);
    let Op::Sink { sources } = g.op(root) else { panic!("expected sink") };
    assert!(sources.iter().all(|&s| g.const_value(s) == Some(ConstValue::Int(0))));
}

// ============================================================================
// Index Arithmetic
// ============================================================================

#[test]
fn test_combine_constant_offsets() {
    let mut g = UOpGraph::new();
    let x = var(&mut g, "x", 9);
    let two = g.index_const(2);
    let three = g.index_const(3);
    let inner = g.add(x, two).unwrap();
    let root = g.add(inner, three).unwrap();
    let root = simplify(&mut g, root);
    let Op::Binary(BinaryOp::Add, lhs, rhs) = *g.op(root) else { panic!("expected add") };
    assert!(matches!(g.op(lhs), Op::DefineVar(_)));
    assert_eq!(g.const_value(rhs), Some(ConstValue::Int(5)));
}

#[test]
fn test_mod_and_div_by_range() {
    let mut g = UOpGraph::new();
    let x = var(&mut g, "x", 9);
    let ten = g.index_const(10);
    let modulo = g.modulo(x, ten).unwrap();
    let div = g.idiv(x, ten).unwrap();
    let sink = g.sink(&[modulo, div]);
    let root = simplify(&mut g, sink);
    let Op::Sink { sources } = g.op(root) else { panic!("expected sink") };
    assert!(matches!(g.op(sources[0]), Op::DefineVar(_)));
    assert_eq!(g.const_value(sources[1]), Some(ConstValue::Int(0)));
}

#[test]
fn test_div_mod_split_recovers_coordinates() {
    // (g*10 + r) // 10 → g and (g*10 + r) % 10 → r for r in [0, 10).
    let mut g = UOpGraph::new();
    let outer = var(&mut g, "g", 4);
    let inner = var(&mut g, "r", 9);
    let ten = g.index_const(10);
    let scaled = g.mul(outer, ten).unwrap();
    let flat = g.add(scaled, inner).unwrap();
    let div = g.idiv(flat, ten).unwrap();
    let modulo = g.modulo(flat, ten).unwrap();
    let sink = g.sink(&[div, modulo]);
    let root = simplify(&mut g, sink);
    let Op::Sink { sources } = g.op(root) else { panic!("expected sink") };
    assert!(matches!(g.op(sources[0]), Op::DefineVar(v) if v.name() == "g"));
    assert!(matches!(g.op(sources[1]), Op::DefineVar(v) if v.name() == "r"));
}

#[test]
fn test_lt_decided_by_range() {
    let mut g = UOpGraph::new();
    let x = var(&mut g, "x", 9);
    let ten = g.index_const(10);
    let root = g.lt(x, ten).unwrap();
    let root = simplify(&mut g, root);
    assert_eq!(g.const_value(root), Some(ConstValue::Bool(true)));
}

#[test]
fn test_factor_common_operand() {
    let mut g = UOpGraph::new();
    let x = var(&mut g, "x", 9);
    let y = var(&mut g, "y", 9);
    let z = var(&mut g, "z", 9);
    let xy = g.mul(x, y).unwrap();
    let zx = g.mul(z, x).unwrap();
    let root = g.add(xy, zx).unwrap();
    let root = simplify(&mut g, root);
    assert_eq!(count(&g, root, |op| matches!(op, Op::Binary(BinaryOp::Mul, ..))), 1);
}

// ============================================================================
// Memory
// ============================================================================

#[test]
fn test_redundant_store_is_dropped() {
    let mut g = UOpGraph::new();
    let buf = g.define_global(0, DType::Float32);
    let other = g.define_global(1, DType::Float32);
    let idx = g.index_const(3);
    let value = g.load(buf, idx, None).unwrap();
    let dead = g.store(buf, idx, value, None).unwrap();
    let live = g.store(other, idx, value, None).unwrap();
    let sink = g.sink(&[dead, live]);
    let root = simplify(&mut g, sink);
    let Op::Sink { sources } = g.op(root) else { panic!("expected sink") };
    assert_eq!(sources.len(), 1);
    let Op::Store { buffer, .. } = *g.op(sources[0]) else { panic!("expected store") };
    assert!(matches!(g.op(buffer), Op::DefineGlobal { slot: 1 }));
}

#[test]
fn test_select_store_becomes_gated() {
    let mut g = UOpGraph::new();
    let buf = g.define_global(0, DType::Float32);
    let x = var(&mut g, "x", 9);
    let five = g.index_const(5);
    let cond = g.lt(x, five).unwrap();
    let old = g.load(buf, x, None).unwrap();
    let new = g.const_(ConstValue::Float(1.0), DType::Float32);
    let value = g.where_(cond, new, old).unwrap();
    let store = g.store(buf, x, value, None).unwrap();
    let sink = g.sink(&[store]);
    let root = simplify(&mut g, sink);
    let Op::Sink { sources } = g.op(root) else { panic!("expected sink") };
    let Op::Store { value, gate: Some(gate), .. } = *g.op(sources[0]) else { panic!("expected gated store") };
    assert_eq!(g.const_value(value), Some(ConstValue::Float(1.0)));
    assert!(matches!(g.op(gate), Op::Binary(BinaryOp::Lt, ..)));
    assert_eq!(count(&g, root, |op| matches!(op, Op::Ternary(TernaryOp::Where, ..))), 0);
}

#[test]
fn test_constant_gates_disappear() {
    let mut g = UOpGraph::new();
    let buf = g.define_global(0, DType::Float32);
    let idx = g.index_const(0);
    let yes = g.const_(ConstValue::Bool(true), DType::Bool);
    let no = g.const_(ConstValue::Bool(false), DType::Bool);
    let alt = g.const_(ConstValue::Float(7.0), DType::Float32);
    let open = g.load(buf, idx, Some((yes, alt))).unwrap();
    let closed = g.load(buf, idx, Some((no, alt))).unwrap();
    let sum = g.add(open, closed).unwrap();
    let out = g.define_global(1, DType::Float32);
    let kept = g.store(out, idx, sum, Some(yes)).unwrap();
    let dropped = g.store(out, idx, sum, Some(no)).unwrap();
    let sink = g.sink(&[kept, dropped]);
    let root = simplify(&mut g, sink);

    let Op::Sink { sources } = g.op(root) else { panic!("expected sink") };
    assert_eq!(sources.len(), 1);
    let Op::Store { value, gate: None, .. } = *g.op(sources[0]) else { panic!("expected ungated store") };
    let Op::Binary(BinaryOp::Add, load, alt) = *g.op(value) else { panic!("expected add") };
    assert!(matches!(g.op(load), Op::Load { gate: None, .. }));
    assert_eq!(g.const_value(alt), Some(ConstValue::Float(7.0)));
}

// ============================================================================
// Reductions
// ============================================================================

#[test]
fn test_sum_of_invariant_collapses() {
    let mut g = UOpGraph::new();
    let buf = g.define_global(0, DType::Float32);
    let zero = g.index_const(0);
    let eight = g.index_const(8);
    let range = g.loop_(zero, eight, LoopAxis { kind: LoopKind::Reduce, axis: 0 }).unwrap();
    let value = g.load(buf, zero, None).unwrap();
    let acc = g.define_acc(0, ConstValue::Float(0.0), DType::Float32, &[range]);
    let update = g.add(acc, value).unwrap();
    let phi = g.phi(acc, update, &[range]).unwrap();
    let out = g.define_global(1, DType::Float32);
    let store = g.store(out, zero, phi, None).unwrap();
    let sink = g.sink(&[store]);

    let root = simplify(&mut g, sink);
    assert_eq!(count(&g, root, |op| matches!(op, Op::Loop { .. } | Op::Phi { .. } | Op::DefineAcc { .. })), 0);
    let Op::Sink { sources } = g.op(root) else { panic!("expected sink") };
    let Op::Store { value, .. } = *g.op(sources[0]) else { panic!("expected store") };
    let Op::Binary(BinaryOp::Mul, _, trips) = *g.op(value) else { panic!("expected mul") };
    assert_eq!(g.const_value(trips), Some(ConstValue::Float(8.0)));
}

#[test]
fn test_sum_of_loop_dependent_value_is_kept() {
    let mut g = UOpGraph::new();
    let buf = g.define_global(0, DType::Float32);
    let zero = g.index_const(0);
    let eight = g.index_const(8);
    let range = g.loop_(zero, eight, LoopAxis { kind: LoopKind::Reduce, axis: 0 }).unwrap();
    let value = g.load(buf, range, None).unwrap();
    let acc = g.define_acc(0, ConstValue::Float(0.0), DType::Float32, &[range]);
    let update = g.add(acc, value).unwrap();
    let phi = g.phi(acc, update, &[range]).unwrap();
    let sink = g.sink(&[phi]);

    let root = simplify(&mut g, sink);
    assert_eq!(count(&g, root, |op| matches!(op, Op::Phi { .. })), 1);
}
