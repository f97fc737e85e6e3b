use std::collections::HashMap;

use tessera_device::Buffer;
use tessera_dtype::DType;
use tessera_ir::shape::shape_of;
use tessera_ir::{BinaryOp, ConstValue, LazyOp, ReduceOp, SInt, ShapeTracker, Variable};
use tessera_schedule::{CompileConfig, GlobalDims};
use test_case::test_case;

use crate::Error;
use crate::test::helpers::*;

fn add_ast() -> tessera_ir::Src {
    let sum = LazyOp::binary(BinaryOp::Add, load(1, &[10]), load(2, &[10])).unwrap();
    LazyOp::sink(vec![LazyOp::store(0, st(&[10]), sum).unwrap()])
}

#[test_case(GlobalDims::Loops ; "loops")]
#[test_case(GlobalDims::Special ; "launch grid")]
fn test_elementwise_add(global_dims: GlobalDims) {
    let a: Vec<f32> = (0..10).map(|i| i as f32).collect();
    let b: Vec<f32> = (0..10).map(|i| 10.0 - i as f32).collect();
    let out = empty::<f32>(10);
    let buffers = [out.clone(), Buffer::from_slice(&a).unwrap(), Buffer::from_slice(&b).unwrap()];
    let config = CompileConfig::builder().global_dims(global_dims).build();
    interpreter(&add_ast(), &config).run(&buffers, &HashMap::new()).unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![10.0; 10]);
}

#[test]
fn test_sum_then_add() {
    let x: Vec<f32> = (0..100).map(|i| i as f32).collect();
    let y: Vec<f32> = (0..10).map(|i| -(i as f32)).collect();
    let total = LazyOp::reduce(ReduceOp::Sum, load(1, &[10, 10]), &[0]).unwrap();
    let out = LazyOp::binary(BinaryOp::Add, total, load(2, &[1, 10])).unwrap();
    let ast = LazyOp::sink(vec![LazyOp::store(0, st(&[1, 10]), out).unwrap()]);

    let result = run_f32(&ast, &[&x, &y], 10);
    let expected: Vec<f32> = (0..10).map(|j| (0..10).map(|i| (i * 10 + j) as f32).sum::<f32>() - j as f32).collect();
    assert_eq!(result, expected);
}

#[test]
fn test_max_reduce_rows() {
    let x = [-3.0f32, -1.0, -7.0, -2.0, 5.0, 4.0, 9.0, 0.0, -8.0, -8.0, -9.0, -8.5];
    let rows = LazyOp::reduce(ReduceOp::Max, load(1, &[3, 4]), &[1]).unwrap();
    let ast = LazyOp::sink(vec![LazyOp::store(0, st(&[3, 1]), rows).unwrap()]);
    assert_eq!(run_f32(&ast, &[&x], 3), vec![-1.0, 9.0, -8.0]);
}

#[test]
fn test_invariant_value_over_two_loops() {
    let ones = ShapeTracker::from_shape(&shape_of(&[1, 1])).expand(&shape_of(&[4, 5])).unwrap();
    let value = LazyOp::constant(ConstValue::Float(1.5), DType::Float32, ones);
    let total = LazyOp::reduce(ReduceOp::Sum, value, &[0, 1]).unwrap();
    let ast = LazyOp::sink(vec![LazyOp::store(0, st(&[1, 1]), total).unwrap()]);
    assert_eq!(run_f32(&ast, &[], 1), vec![30.0]);
}

#[test]
fn test_padded_load_reads_zero() {
    let padded = st(&[3]).pad(&[(1, 2)]).unwrap();
    let x = LazyOp::load(1, DType::Float32, padded);
    let ast = LazyOp::sink(vec![LazyOp::store(0, st(&[6]), x).unwrap()]);
    assert_eq!(run_f32(&ast, &[&[1.0, 2.0, 3.0]], 6), vec![0.0, 1.0, 2.0, 3.0, 0.0, 0.0]);
}

#[test]
fn test_masked_store_skips_padding() {
    let target = st(&[4]).pad(&[(1, 1)]).unwrap();
    let ast = LazyOp::sink(vec![LazyOp::store(0, target, load(1, &[6])).unwrap()]);
    let src = [10.0f32, 11.0, 12.0, 13.0, 14.0, 15.0];
    assert_eq!(run_f32(&ast, &[&src], 4), vec![11.0, 12.0, 13.0, 14.0]);
}

#[test]
fn test_symbolic_length() {
    let n = Variable::new("n", 1, 8);
    let shape = [SInt::var(n)];
    let x = LazyOp::load(1, DType::Float32, ShapeTracker::from_shape(&shape));
    let doubled = LazyOp::binary(BinaryOp::Add, x.clone(), x).unwrap();
    let ast = LazyOp::sink(vec![LazyOp::store(0, ShapeTracker::from_shape(&shape), doubled).unwrap()]);
    let program = interpreter(&ast, &CompileConfig::default());

    let out = empty::<f32>(8);
    let src = Buffer::from_slice(&[1.0f32; 8]).unwrap();
    let vars = HashMap::from([("n".to_string(), 3)]);
    program.run(&[out.clone(), src.clone()], &vars).unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![2.0, 2.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

    let unbound = program.run(&[out, src], &HashMap::new());
    assert!(matches!(unbound, Err(Error::UnboundVariable { name }) if name == "n"));
}

#[test]
fn test_argument_checks() {
    let program = interpreter(&add_ast(), &CompileConfig::default());
    let f = || Buffer::from_slice(&[0.0f32; 10]).unwrap();
    let result = program.run(&[f(), f()], &HashMap::new());
    assert!(matches!(result, Err(Error::ArgumentCount { expected: 3, actual: 2, .. })));

    let ints = Buffer::from_slice(&[0i32; 10]).unwrap();
    assert!(matches!(
        program.run(&[f(), ints, f()], &HashMap::new()),
        Err(Error::ArgumentDType { slot: 1, .. })
    ));
}

#[test]
fn test_integer_division_by_zero() {
    let int = |buf| LazyOp::load(buf, DType::Int32, st(&[2]));
    let quotient = LazyOp::binary(BinaryOp::Idiv, int(1), int(2)).unwrap();
    let ast = LazyOp::sink(vec![LazyOp::store(0, st(&[2]), quotient).unwrap()]);
    let program = interpreter(&ast, &CompileConfig::default());

    let out = empty::<i32>(2);
    let buffers = [out.clone(), Buffer::from_slice(&[7i32, -7]).unwrap(), Buffer::from_slice(&[2i32, 2]).unwrap()];
    program.run(&buffers, &HashMap::new()).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![3, -3]);

    let buffers = [out, Buffer::from_slice(&[7i32, 1]).unwrap(), Buffer::from_slice(&[1i32, 0]).unwrap()];
    assert!(matches!(program.run(&buffers, &HashMap::new()), Err(Error::Evaluation { .. })));
}
