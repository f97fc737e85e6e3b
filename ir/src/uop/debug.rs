//! Plain-text listings of micro-op graphs.

use std::fmt::Write;

use super::{Op, UOp, UOpGraph, UOpId};

fn describe(uop: &UOp) -> String {
    match &uop.op {
        Op::Const(v) => format!("CONST {}", v.0),
        Op::DefineGlobal { slot } => format!("DEFINE_GLOBAL {slot}"),
        Op::DefineLocal { name, size } => format!("DEFINE_LOCAL {name}[{size}]"),
        Op::DefineVar(var) => format!("DEFINE_VAR {}[{}..={}]", var.name(), var.min(), var.max()),
        Op::DefineAcc { slot, init, .. } => format!("DEFINE_ACC #{slot} init={}", init.0),
        Op::Special { axis, .. } => format!("SPECIAL gidx{axis}"),
        Op::Loop { axis, .. } => format!("LOOP {}{}", axis.kind, axis.axis),
        Op::Unary(op, _) => format!("{op}"),
        Op::Binary(op, ..) => format!("{op}"),
        Op::Ternary(op, ..) => format!("{op}"),
        Op::Load { gate: Some(_), .. } => "LOAD (gated)".to_string(),
        Op::Store { gate: Some(_), .. } => "STORE (gated)".to_string(),
        other => other.kind().to_string().to_uppercase(),
    }
}

fn line(out: &mut String, pos: UOpId, uop: &UOp, sources: &[UOpId]) {
    let srcs: Vec<String> = sources.iter().map(ToString::to_string).collect();
    let dtype = uop.dtype.to_string();
    let _ = writeln!(out, "{:>5} {:<6} {:<28} [{}]", pos.to_string(), dtype, describe(uop), srcs.join(", "));
}

/// Listing of an instruction list whose sources are positions in `uops`.
pub fn format_listing(uops: &[UOp]) -> String {
    let mut out = String::new();
    for (i, uop) in uops.iter().enumerate() {
        line(&mut out, UOpId(i as u32), uop, &uop.op.sources());
    }
    out
}

/// Listing of the subgraph under `root` in dependency order.
pub fn format_graph(graph: &UOpGraph, root: UOpId) -> String {
    let mut out = String::new();
    for id in graph.toposort(root) {
        line(&mut out, id, graph.get(id), &graph.sources(id));
    }
    out
}
