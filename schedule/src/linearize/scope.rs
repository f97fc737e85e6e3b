//! Scope analysis for linearization.
//!
//! Every node is assigned the chain of scopes (loops and conditionals,
//! outermost first) it must be emitted in. A node lives in the innermost
//! chain among its sources, where reading a loop counter or branching on a
//! conditional places the reader inside that scope.
//!
//! All loops of a kernel form a single nest ordered by [`LoopAxis`]: global
//! loops outermost, then reduce loops. Reductions leave their loops through
//! `Phi`, whose value is available after the first of its loops closes.
//! The update a `Phi` writes back is pinned inside the innermost of its
//! loops even when it does not read a loop counter. Accumulators are
//! defined just outside the outermost loop they span.
//!
//! ```text
//! G0 = Loop            chain []
//! acc = DefineAcc      chain [G0]
//! R1 = Loop            chain [G0]
//! v = Load(a, G0, R1)  chain [G0, R1]
//! p = Phi(acc, v)      chain [G0]
//! ```

use std::collections::HashMap;

use smallvec::SmallVec;
use snafu::{ResultExt, ensure};
use tessera_ir::{DType, LoopAxis, Op, UOpGraph, UOpId};

use crate::error::*;

/// Scopes a node is emitted in, outermost first.
pub type Chain = SmallVec<[UOpId; 4]>;

/// Scope assignment for every node under a sink.
#[derive(Debug, Default)]
pub struct ScopeContext {
    pub chains: HashMap<UOpId, Chain>,
    /// Ordering-only dependencies that are not source edges.
    pub extra_deps: HashMap<UOpId, Vec<UOpId>>,
    /// Loops in nesting order.
    pub nest: Vec<UOpId>,
    /// Reduction updates and the loop they must execute in.
    pub pinned: HashMap<UOpId, UOpId>,
}

impl ScopeContext {
    /// Compute scope chains for every node reachable from `sink`.
    pub fn new(graph: &UOpGraph, sink: UOpId, extra_deps: HashMap<UOpId, Vec<UOpId>>) -> Result<Self> {
        let order = graph.toposort(sink);
        let mut loops: Vec<(LoopAxis, UOpId)> = order
            .iter()
            .filter_map(|&id| match graph.op(id) {
                Op::Loop { axis, .. } => Some((*axis, id)),
                _ => None,
            })
            .collect();
        loops.sort();
        let nest: Vec<UOpId> = loops.into_iter().map(|(_, id)| id).collect();
        let depth = |l: &UOpId| nest.iter().position(|n| n == l);
        let pinned = order
            .iter()
            .filter_map(|&id| match graph.op(id) {
                Op::Phi { value, loops, .. } if !matches!(graph.op(*value), Op::Const(_) | Op::DefineAcc { .. }) => {
                    loops.iter().max_by_key(|l| depth(*l)).map(|&inner| (*value, inner))
                }
                _ => None,
            })
            .collect();
        let mut ctx = Self { chains: HashMap::new(), extra_deps, nest, pinned };

        for &id in &order {
            let chain = match graph.op(id) {
                Op::Sink { .. } => Chain::new(),
                Op::DefineAcc { loops, .. } => {
                    loops.iter().filter_map(|l| ctx.chains.get(l)).min_by_key(|c| c.len()).cloned().unwrap_or_default()
                }
                Op::Loop { .. } => {
                    let merged = ctx.merged(graph, id)?;
                    let depth = ctx.nest.iter().position(|&l| l == id).unwrap_or(ctx.nest.len());
                    let outer: Chain = ctx.nest[..depth].iter().copied().collect();
                    ensure!(merged.len() <= outer.len() && outer.starts_with(&merged), ScopeConflictSnafu {
                        node: id.index()
                    });
                    outer
                }
                Op::Phi { loops, .. } => {
                    let mut merged = ctx.merged(graph, id)?;
                    if let Some(cut) = loops.first().and_then(|first| merged.iter().position(|s| s == first)) {
                        merged.truncate(cut);
                    }
                    merged
                }
                _ => ctx.merged(graph, id)?,
            };
            ctx.chains.insert(id, chain);
        }
        Ok(ctx)
    }

    /// Chain a source places its readers in.
    fn inner_chain(&self, graph: &UOpGraph, src: UOpId) -> Chain {
        let mut chain = self.chains.get(&src).cloned().unwrap_or_default();
        if graph.op(src).opens_scope() {
            chain.push(src);
        }
        chain
    }

    /// Innermost of the inner chains of `id`'s sources, extra deps and
    /// pinning loop.
    fn merged(&self, graph: &UOpGraph, id: UOpId) -> Result<Chain> {
        let extra = self.extra_deps.get(&id).into_iter().flatten().copied().chain(self.pinned.get(&id).copied());
        let mut merged = Chain::new();
        for src in graph.sources(id).into_iter().chain(extra) {
            let chain = self.inner_chain(graph, src);
            if chain.len() > merged.len() {
                ensure!(chain.starts_with(&merged), ScopeConflictSnafu { node: id.index() });
                merged = chain;
            } else {
                ensure!(merged.starts_with(&chain), ScopeConflictSnafu { node: id.index() });
            }
        }
        Ok(merged)
    }
}

/// Wrap every store gated on a `Bool` in an `If` on that condition.
///
/// The store is rewritten in place to gate on the `If` node. The `If` must
/// wait for everything else the store reads, so those become its ordering
/// dependencies.
pub fn insert_branches(graph: &mut UOpGraph, sink: UOpId) -> Result<HashMap<UOpId, Vec<UOpId>>> {
    let mut extra_deps = HashMap::new();
    for id in graph.toposort(sink) {
        let Op::Store { buffer, index, value, gate: Some(cond) } = *graph.op(id) else { continue };
        if *graph.dtype(cond) != DType::Bool {
            continue;
        }
        let branch = graph.if_(cond).context(IrSnafu)?;
        graph.replace(id, Op::Store { buffer, index, value, gate: Some(branch) }, DType::Void);
        extra_deps.insert(branch, vec![buffer, index, value]);
    }
    Ok(extra_deps)
}
