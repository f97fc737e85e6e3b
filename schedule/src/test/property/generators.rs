//! Random index expressions over three bounded variables.

use proptest::prelude::*;
use tessera_dtype::DType;
use tessera_ir::{ConstValue, UOpGraph, UOpId, Variable};

pub const VARS: [&str; 3] = ["x0", "x1", "x2"];
pub const VAR_MAX: i64 = 15;

#[derive(Debug, Clone)]
pub enum Expr {
    Var(usize),
    Const(i64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    /// Scaling by a constant keeps values far from overflow.
    Scale(Box<Expr>, i64),
    Div(Box<Expr>, i64),
    Mod(Box<Expr>, i64),
    Max(Box<Expr>, Box<Expr>),
    Select(Box<Expr>, Box<Expr>, Box<Expr>, Box<Expr>),
}

pub fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![(0..VARS.len()).prop_map(Expr::Var), (-8i64..=16).prop_map(Expr::Const)];
    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            3 => (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::Add(Box::new(a), Box::new(b))),
            1 => (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::Sub(Box::new(a), Box::new(b))),
            2 => (inner.clone(), -4i64..=8).prop_map(|(a, c)| Expr::Scale(Box::new(a), c)),
            2 => (inner.clone(), 1i64..=8).prop_map(|(a, c)| Expr::Div(Box::new(a), c)),
            2 => (inner.clone(), 1i64..=8).prop_map(|(a, c)| Expr::Mod(Box::new(a), c)),
            1 => (inner.clone(), inner.clone()).prop_map(|(a, b)| Expr::Max(Box::new(a), Box::new(b))),
            1 => (inner.clone(), inner.clone(), inner.clone(), inner)
                .prop_map(|(a, b, c, d)| Expr::Select(Box::new(a), Box::new(b), Box::new(c), Box::new(d))),
        ]
    })
}

pub fn arb_env() -> impl Strategy<Value = [i64; 3]> {
    [0..=VAR_MAX, 0..=VAR_MAX, 0..=VAR_MAX]
}

/// Materialize `expr` as `Index` micro-ops.
pub fn build(g: &mut UOpGraph, expr: &Expr) -> UOpId {
    let c = |g: &mut UOpGraph, v: i64| g.const_(ConstValue::Int(v), DType::Index);
    match expr {
        Expr::Var(i) => g.define_var(Variable::new(VARS[*i], 0, VAR_MAX)),
        Expr::Const(v) => c(g, *v),
        Expr::Add(a, b) => {
            let (a, b) = (build(g, a), build(g, b));
            g.add(a, b).expect("add")
        }
        Expr::Sub(a, b) => {
            let (a, b) = (build(g, a), build(g, b));
            g.sub(a, b).expect("sub")
        }
        Expr::Scale(a, k) => {
            let (a, k) = (build(g, a), c(g, *k));
            g.mul(a, k).expect("mul")
        }
        Expr::Div(a, d) => {
            let (a, d) = (build(g, a), c(g, *d));
            g.idiv(a, d).expect("idiv")
        }
        Expr::Mod(a, d) => {
            let (a, d) = (build(g, a), c(g, *d));
            g.modulo(a, d).expect("mod")
        }
        Expr::Max(a, b) => {
            let (a, b) = (build(g, a), build(g, b));
            g.max(a, b).expect("max")
        }
        Expr::Select(a, b, x, y) => {
            let (a, b) = (build(g, a), build(g, b));
            let cond = g.lt(a, b).expect("lt");
            let (x, y) = (build(g, x), build(g, y));
            g.where_(cond, x, y).expect("where")
        }
    }
}
