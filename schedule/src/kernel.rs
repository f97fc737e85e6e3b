//! Kernel compilation: lowering, simplification and linearization of one
//! operation tree.

use std::collections::BTreeSet;
use std::fmt::Write;

use snafu::ResultExt;
use tessera_ir::{Op, SInt, Src, UOp, UOpId, Variable, graph_rewrite};
use tracing::debug;

use crate::config::CompileConfig;
use crate::error::*;
use crate::linearize::{linearize, verify_types};
use crate::lower::{GlobalArg, LoweredKernel, lower};
use crate::symbolic::{HoistContext, loop_hoisting, symbolic};

/// A compiled kernel: a linear instruction list and its launch interface.
#[derive(Debug, Clone)]
pub struct Kernel {
    pub name: String,
    pub uops: Vec<UOp>,
    pub globals: Vec<GlobalArg>,
    /// Launch-time variables, sorted by name.
    pub vars: Vec<Variable>,
    /// Structural hash of the simplified graph.
    pub key: u64,
    pub estimates: Estimates,
}

/// Static cost of one launch. Loops with symbolic bounds count once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Estimates {
    pub ops: u64,
    pub mem: u64,
}

/// Compile one kernel's operation tree.
#[tracing::instrument(skip_all, fields(key = ast.key()))]
pub fn compile_kernel(ast: &Src, config: &CompileConfig) -> Result<Kernel> {
    let LoweredKernel { mut graph, sink, globals, output_shape, full_shape, reduce_axes } = lower(ast, config)?;

    let matcher = symbolic::<HoistContext>().extend(loop_hoisting());
    let mut ctx = HoistContext::new(config.loop_hoisting);
    let sink = graph_rewrite(&mut graph, sink, &matcher, &mut ctx, config.max_rewrite_passes).context(IrSnafu)?;
    let key = graph.structural_hash(sink);

    let uops = linearize(&graph, sink)?;
    if config.verify {
        verify_types(&uops)?;
    }

    let vars: BTreeSet<Variable> = uops
        .iter()
        .filter_map(|u| match &u.op {
            Op::DefineVar(var) => Some(var.clone()),
            _ => None,
        })
        .collect();
    let name = if reduce_axes.is_empty() { kernel_name("E", &output_shape) } else { kernel_name("r", &full_shape) };
    let estimates = estimate(&uops);
    debug!(%name, instructions = uops.len(), ops = estimates.ops, mem = estimates.mem, "compiled kernel");

    Ok(Kernel { name, uops, globals, vars: vars.into_iter().collect(), key, estimates })
}

fn kernel_name(prefix: &str, shape: &[SInt]) -> String {
    let mut name = prefix.to_string();
    for dim in shape {
        let _ = write!(name, "_{dim}");
    }
    name
}

/// Operation and memory counts weighted by loop trip counts.
pub fn estimate(uops: &[UOp]) -> Estimates {
    let value = |pos: UOpId| uops[pos.index()].as_const().and_then(|c| c.as_i64());
    let trips = |start: UOpId, end: UOpId| match (value(start), value(end)) {
        (Some(s), Some(e)) => e.saturating_sub(s).max(0) as u64,
        _ => 1,
    };
    let grid: u64 = uops
        .iter()
        .filter_map(|u| match u.op {
            Op::Special { size, .. } => Some(value(size).map_or(1, |s| s.max(0) as u64)),
            _ => None,
        })
        .product();

    let mut estimates = Estimates::default();
    let mut scale: Vec<u64> = vec![grid];
    for uop in uops {
        let current = scale.last().copied().unwrap_or(1);
        match uop.op {
            Op::Loop { start, end, .. } => scale.push(current.saturating_mul(trips(start, end))),
            Op::If { .. } => scale.push(current),
            Op::EndLoop { .. } | Op::EndIf { .. } => {
                scale.pop();
            }
            Op::Unary(..) | Op::Binary(..) | Op::Ternary(..) => estimates.ops += current,
            Op::Load { .. } | Op::Store { .. } => {
                let bytes = match &uop.op {
                    Op::Store { value, .. } => uops[value.index()].dtype.bytes(),
                    _ => uop.dtype.bytes(),
                };
                estimates.mem += current.saturating_mul(bytes as u64);
            }
            _ => {}
        }
    }
    estimates
}
