//! Graph rewrite engine.
//!
//! One pass walks the graph in dependency order. Each node is rebuilt over
//! the already-rewritten versions of its sources and then handed to the
//! matcher until no rule fires. Passes repeat until a pass changes nothing,
//! after which the graph is pruned to what the root still reaches.
//!
//! Rules see rewritten sources (bottom-up), so a constant produced by folding
//! a child is visible to the parent in the same pass.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{Result, RewriteNonTerminationSnafu, RuleLoopSnafu};
use crate::pattern::{PatternMatcher, RewriteContext};
use crate::uop::{UOpGraph, UOpId};

/// Bound on consecutive rule applications to a single node within a pass.
pub const MAX_RULE_APPLICATIONS: usize = 256;

/// Rewrite the graph under `root` to a fixed point of `matcher`.
///
/// On success `graph` holds only nodes reachable from the returned root.
/// Fails with `RewriteNonTermination` when `max_passes` passes still change
/// the graph and with `RuleLoop` when rules keep rewriting one node.
#[tracing::instrument(skip_all, fields(nodes = graph.len(), max_passes = max_passes))]
pub fn graph_rewrite<C: RewriteContext>(
    graph: &mut UOpGraph,
    root: UOpId,
    matcher: &PatternMatcher<C>,
    ctx: &mut C,
    max_passes: usize,
) -> Result<UOpId> {
    let mut root = graph.resolve(root);
    for pass in 0..max_passes {
        ctx.begin_pass(graph, root);
        let (new_root, changed) = rewrite_pass(graph, root, matcher, ctx)?;
        root = graph.resolve(new_root);
        if !changed {
            let (pruned, pruned_root) = graph.prune(root);
            debug!(passes = pass + 1, nodes = pruned.len(), "rewrite reached fixed point");
            *graph = pruned;
            return Ok(pruned_root);
        }
    }
    RewriteNonTerminationSnafu { passes: max_passes }.fail()
}

fn rewrite_pass<C>(
    graph: &mut UOpGraph,
    root: UOpId,
    matcher: &PatternMatcher<C>,
    ctx: &mut C,
) -> Result<(UOpId, bool)> {
    let mut map: HashMap<UOpId, UOpId> = HashMap::new();
    let mut changed = false;
    for id in graph.toposort(root) {
        let uop = graph.get(id).clone();
        let op = uop.op.map_sources(|s| {
            let s = graph.resolve(s);
            map.get(&s).copied().unwrap_or(s)
        });
        let mut current = graph.intern(op, uop.dtype);
        let mut applications = 0;
        while let Some((rule, next)) = matcher.rewrite(graph, current, ctx) {
            applications += 1;
            if applications > MAX_RULE_APPLICATIONS {
                return RuleLoopSnafu { rule, node: id.index(), limit: MAX_RULE_APPLICATIONS }.fail();
            }
            trace!(rule, from = %current, to = %next, "rewrite");
            current = next;
        }
        // A rule may have replaced this very slot in place.
        let current = graph.resolve(current);
        if current != id || graph.get(id).op != uop.op {
            changed = true;
        }
        map.insert(id, current);
    }
    Ok((map.get(&root).copied().unwrap_or(root), changed))
}
