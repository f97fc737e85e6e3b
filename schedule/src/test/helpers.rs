//! Graph builders and an expression evaluator shared by the tests.

use std::collections::HashMap;

use tessera_dtype::DType;
use tessera_ir::shape::shape_of;
use tessera_ir::uop::eval::{exec_binary, exec_ternary, exec_unary};
use tessera_ir::{ConstValue, LazyOp, Op, ShapeTracker, Src, UOpGraph, UOpId, graph_rewrite};

use crate::symbolic::symbolic;

pub fn st(dims: &[usize]) -> ShapeTracker {
    ShapeTracker::from_shape(&shape_of(dims))
}

pub fn load(buf: usize, dims: &[usize]) -> Src {
    LazyOp::load(buf, DType::Float32, st(dims))
}

/// Simplify `root` with the context-free rule table.
pub fn simplify(g: &mut UOpGraph, root: UOpId) -> UOpId {
    graph_rewrite(g, root, &symbolic::<()>(), &mut (), 64).expect("rewrite")
}

/// Evaluate a loop-free expression with `DefineVar`s bound by name.
pub fn eval(g: &UOpGraph, id: UOpId, env: &HashMap<String, i64>) -> Option<ConstValue> {
    let dtype = g.dtype(id).clone();
    match *g.op(id) {
        Op::Const(v) => Some(v.0),
        Op::DefineVar(ref var) => env.get(var.name()).map(|&v| ConstValue::Int(v)),
        Op::Unary(op, a) => exec_unary(op, &dtype, eval(g, a, env)?),
        Op::Binary(op, a, b) => exec_binary(op, &dtype, eval(g, a, env)?, eval(g, b, env)?),
        Op::Ternary(op, a, b, c) => exec_ternary(op, &dtype, eval(g, a, env)?, eval(g, b, env)?, eval(g, c, env)?),
        Op::Cast { src } => eval(g, src, env)?.cast(&dtype),
        _ => None,
    }
}

/// Count nodes under `root` matching `pred`.
pub fn count(g: &UOpGraph, root: UOpId, pred: impl Fn(&Op) -> bool) -> usize {
    g.toposort(root).into_iter().filter(|&id| pred(g.op(id))).count()
}
