//! Linearization of micro-op graphs into instruction lists.
//!
//! # Architecture
//!
//! ```text
//! UOpGraph + sink
//!     ↓
//! insert_branches          → gated stores wrapped in If
//!     ↓
//! ScopeContext::new        → scope chain per node
//!     ↓
//! emit                     → basic blocks in priority-aware, scope-respecting order
//!     ↓
//! lower                    → blocks flattened, sources rewritten to positions
//!     ↓
//! verify_order             → structural invariants
//!     ↓
//! Vec<UOp>                 → sources refer to earlier positions
//! ```
//!
//! In the output, every `UOpId` is a position in the list. Loops and
//! conditionals are closed by explicit `EndLoop`/`EndIf` markers and the
//! sink comes last.

mod block;
mod order;
mod scope;
mod verify;

use snafu::ensure;
use tessera_ir::{Op, UOp, UOpGraph, UOpId};
use tracing::{debug, trace};

pub(crate) use block::{BasicBlock, Entry};
pub use scope::{Chain, ScopeContext, insert_branches};
pub use verify::{verify_order, verify_types};

use crate::error::*;

/// Linearize the graph under `sink`.
#[tracing::instrument(skip_all, fields(nodes = graph.len()))]
pub fn linearize(graph: &UOpGraph, sink: UOpId) -> Result<Vec<UOp>> {
    let sink = graph.resolve(sink);
    ensure!(matches!(graph.op(sink), Op::Sink { .. }), MissingSinkSnafu);

    let (graph, blocks) = blocks(graph, sink)?;
    let uops = block::lower(&graph, &blocks);
    verify_order(&uops)?;

    debug!(instructions = uops.len(), blocks = blocks.len(), "linearized");
    Ok(uops)
}

/// Branch and emit the graph under `sink`, returning the rewritten graph
/// and its basic blocks in execution order.
pub(crate) fn blocks(graph: &UOpGraph, sink: UOpId) -> Result<(UOpGraph, Vec<BasicBlock>)> {
    let mut graph = graph.clone();
    let branches = insert_branches(&mut graph, sink)?;
    let scopes = ScopeContext::new(&graph, sink, branches)?;
    let blocks = order::emit(&graph, sink, &scopes)?;
    trace!(blocks = blocks.len(), loops = scopes.nest.len(), "emitted");
    Ok((graph, blocks))
}
