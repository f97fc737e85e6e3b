//! Priority-aware emission of a scoped graph.
//!
//! Nodes become ready once all their dependencies are emitted. Among ready
//! nodes whose scope chain equals the currently open scopes, the one with
//! the smallest [`OrderKey`] goes next. A scope closes (emitting its end
//! marker) as soon as nothing inside it remains.
//!
//! A load that nothing in a deeper scope needs is held back behind the
//! loops of its scope, so values read after a reduction are loaded after
//! the reduction loop closes. Accumulators are emitted immediately before
//! the outermost loop they span.

use std::collections::{BTreeSet, HashMap, HashSet};

use tessera_ir::{Op, UOpGraph, UOpId};
use tracing::trace;

use super::block::{BasicBlock, BlockBuilder};
use super::scope::ScopeContext;
use crate::error::*;

/// Priority values for different operation types.
///
/// Lower values = higher priority (emitted earlier).
mod priority {
    pub const DEFINE_GLOBAL: i32 = -20;
    pub const DEFINE_VAR: i32 = -19;
    pub const DEFINE_LOCAL: i32 = -18;
    pub const DEFINE_ACC: i32 = -17;
    pub const CONST: i32 = -10;
    pub const SPECIAL: i32 = -8;
    /// Load feeding a deeper scope.
    pub const LOAD_EARLY: i32 = -1;
    pub const DEFAULT: i32 = 0;
    pub const STORE: i32 = 1;
    pub const IF: i32 = 4;
    pub const LOOP: i32 = 5;
    /// Load only read at its own depth.
    pub const LOAD_LATE: i32 = 6;
}

/// Ordering key among ready nodes.
///
/// Tuple ordering: (priority, arg, structural hash, id). The structural hash
/// makes the order independent of arena ids for everything but exact
/// duplicates.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    priority: i32,
    arg: Option<i64>,
    hash: u64,
    id: UOpId,
}

/// Dependencies that must be emitted before `id`.
///
/// An accumulator is defined before the loops it spans, so its loop edges
/// do not order it.
fn scheduling_deps(graph: &UOpGraph, scopes: &ScopeContext, id: UOpId) -> Vec<UOpId> {
    if matches!(graph.op(id), Op::DefineAcc { .. }) {
        return Vec::new();
    }
    let mut deps: Vec<UOpId> = graph.sources(id).into_vec();
    deps.extend(scopes.extra_deps.get(&id).into_iter().flatten().copied());
    deps.sort_unstable();
    deps.dedup();
    deps
}

fn chain_of(scopes: &ScopeContext, id: UOpId) -> &[UOpId] {
    scopes.chains.get(&id).map(|c| c.as_slice()).unwrap_or(&[])
}

struct Emitter<'a> {
    graph: &'a UOpGraph,
    scopes: &'a ScopeContext,
    hashes: HashMap<UOpId, u64>,
    /// Nodes some deeper scope transitively depends on.
    deeper: HashSet<UOpId>,
    pending: HashMap<UOpId, usize>,
    dependents: HashMap<UOpId, Vec<UOpId>>,
    /// Nodes not yet emitted inside each scope.
    remaining: HashMap<UOpId, usize>,
    /// Accumulators keyed by the loop they are emitted in front of.
    accs: HashMap<UOpId, Vec<UOpId>>,
    emitted: HashSet<UOpId>,
    ready: BTreeSet<OrderKey>,
    blocks: BlockBuilder,
}

impl<'a> Emitter<'a> {
    fn new(graph: &'a UOpGraph, sink: UOpId, scopes: &'a ScopeContext, order: &[UOpId]) -> Self {
        let mut this = Self {
            graph,
            scopes,
            hashes: graph.structural_hashes(sink),
            deeper: HashSet::new(),
            pending: HashMap::new(),
            dependents: HashMap::new(),
            remaining: HashMap::new(),
            accs: HashMap::new(),
            emitted: HashSet::new(),
            ready: BTreeSet::new(),
            blocks: BlockBuilder::default(),
        };
        for &id in order.iter().filter(|&&id| id != sink) {
            let deps = scheduling_deps(graph, scopes, id);
            this.pending.insert(id, deps.len());
            for dep in deps {
                this.dependents.entry(dep).or_default().push(id);
            }
            for scope in chain_of(scopes, id) {
                *this.remaining.entry(*scope).or_default() += 1;
            }
        }
        for &id in order.iter().rev().filter(|&&id| id != sink) {
            let depth = chain_of(scopes, id);
            let feeds_deeper = this.dependents.get(&id).into_iter().flatten().any(|d| {
                let inner = chain_of(scopes, *d);
                inner.len() > depth.len() || (inner == depth && this.deeper.contains(d))
            });
            if feeds_deeper {
                this.deeper.insert(id);
            }
        }
        for &id in order {
            let Op::DefineAcc { loops, .. } = graph.op(id) else { continue };
            if let Some(&outer) = loops.iter().min_by_key(|l| chain_of(scopes, **l).len()) {
                this.accs.entry(outer).or_default().push(id);
            }
        }
        let starts: Vec<OrderKey> = order
            .iter()
            .filter(|&&id| id != sink && this.pending.get(&id) == Some(&0) && !this.is_deferred_acc(id))
            .map(|&id| this.order_key(id))
            .collect();
        this.ready.extend(starts);
        let mut keys = std::mem::take(&mut this.accs);
        for accs in keys.values_mut() {
            accs.sort_by_key(|&acc| this.order_key(acc));
        }
        this.accs = keys;
        this
    }

    fn is_deferred_acc(&self, id: UOpId) -> bool {
        matches!(self.graph.op(id), Op::DefineAcc { loops, .. } if !loops.is_empty())
    }

    fn order_key(&self, id: UOpId) -> OrderKey {
        let (priority, arg) = match self.graph.op(id) {
            Op::DefineGlobal { slot } => (priority::DEFINE_GLOBAL, Some(*slot as i64)),
            Op::DefineVar(_) => (priority::DEFINE_VAR, None),
            Op::DefineLocal { size, .. } => (priority::DEFINE_LOCAL, Some(*size as i64)),
            Op::DefineAcc { slot, .. } => (priority::DEFINE_ACC, Some(*slot as i64)),
            Op::Const(_) => (priority::CONST, None),
            Op::Special { axis, .. } => (priority::SPECIAL, Some(*axis as i64)),
            Op::Load { .. } if self.deeper.contains(&id) => (priority::LOAD_EARLY, None),
            Op::Load { .. } => (priority::LOAD_LATE, None),
            Op::Store { .. } => (priority::STORE, None),
            Op::If { .. } => (priority::IF, None),
            Op::Loop { axis, .. } => (priority::LOOP, Some(axis.axis as i64)),
            _ => (priority::DEFAULT, None),
        };
        OrderKey { priority, arg, hash: self.hashes.get(&id).copied().unwrap_or_default(), id }
    }

    /// Record `id` as emitted and release its dependents.
    fn mark(&mut self, id: UOpId) {
        self.emitted.insert(id);
        self.blocks.node(id, self.graph.op(id).opens_scope());
        for scope in chain_of(self.scopes, id) {
            if let Some(count) = self.remaining.get_mut(scope) {
                *count -= 1;
            }
        }
        for &dep in self.dependents.get(&id).into_iter().flatten() {
            if let Some(count) = self.pending.get_mut(&dep) {
                *count -= 1;
                if *count == 0 && !self.is_deferred_acc(dep) {
                    let key = self.order_key(dep);
                    self.ready.insert(key);
                }
            }
        }
    }

    fn next(&self) -> Option<OrderKey> {
        let open = self.blocks.open();
        self.ready.iter().find(|k| chain_of(self.scopes, k.id) == open).cloned()
    }

    fn close_finished(&mut self) {
        while let Some(&top) = self.blocks.open().last() {
            if self.remaining.get(&top).copied().unwrap_or_default() > 0 {
                break;
            }
            self.blocks.end(top);
        }
    }
}

/// Emit the graph under `sink` as basic blocks in execution order.
pub(crate) fn emit(graph: &UOpGraph, sink: UOpId, scopes: &ScopeContext) -> Result<Vec<BasicBlock>> {
    let order = graph.toposort(sink);
    let total = order.len() - 1;
    let mut emitter = Emitter::new(graph, sink, scopes, &order);

    while emitter.emitted.len() < total {
        let Some(key) = emitter.next() else {
            return StalledSnafu { remaining: total - emitter.emitted.len() }.fail();
        };
        emitter.ready.remove(&key);
        let accs = emitter.accs.remove(&key.id).unwrap_or_default();
        for acc in accs {
            if emitter.emitted.contains(&acc) {
                continue;
            }
            trace!(acc = acc.index(), range = key.id.index(), "accumulator ahead of loop");
            emitter.mark(acc);
        }
        emitter.mark(key.id);
        emitter.close_finished();
    }
    emitter.blocks.node(sink, false);
    Ok(emitter.blocks.finish())
}
