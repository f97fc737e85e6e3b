use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use tessera_dtype::DType;

use super::{Op, UOp, UOpId};
use crate::types::ConstValue;

/// Arena of hash-consed micro-ops.
///
/// Slots are never removed. [`UOpGraph::replace`] overwrites a slot; if the
/// new contents already exist elsewhere the slot forwards to that node, and
/// every accessor resolves forwards first.
#[derive(Debug, Clone, Default)]
pub struct UOpGraph {
    nodes: Vec<UOp>,
    forward: Vec<Option<UOpId>>,
    memo: HashMap<UOp, UOpId>,
}

impl UOpGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Follow forwards left by [`UOpGraph::replace`].
    pub fn resolve(&self, mut id: UOpId) -> UOpId {
        while let Some(next) = self.forward[id.index()] {
            id = next;
        }
        id
    }

    /// Intern a node, returning the existing id for identical contents.
    pub fn intern(&mut self, op: Op, dtype: DType) -> UOpId {
        let op = op.map_sources(|s| self.resolve(s));
        let uop = UOp::new(op, dtype);
        if let Some(&id) = self.memo.get(&uop) {
            return id;
        }
        let id = UOpId(self.nodes.len() as u32);
        self.nodes.push(uop.clone());
        self.forward.push(None);
        self.memo.insert(uop, id);
        id
    }

    /// Overwrite the node at `id`. References to `id` observe the new node.
    pub fn replace(&mut self, id: UOpId, op: Op, dtype: DType) {
        let id = self.resolve(id);
        let op = op.map_sources(|s| self.resolve(s));
        let uop = UOp::new(op, dtype);
        if self.memo.get(&self.nodes[id.index()]) == Some(&id) {
            self.memo.remove(&self.nodes[id.index()]);
        }
        match self.memo.get(&uop) {
            Some(&existing) if existing != id => self.forward[id.index()] = Some(existing),
            _ => {
                self.memo.insert(uop.clone(), id);
            }
        }
        self.nodes[id.index()] = uop;
    }

    pub fn get(&self, id: UOpId) -> &UOp {
        &self.nodes[self.resolve(id).index()]
    }

    pub fn op(&self, id: UOpId) -> &Op {
        &self.get(id).op
    }

    pub fn dtype(&self, id: UOpId) -> &DType {
        &self.get(id).dtype
    }

    pub fn const_value(&self, id: UOpId) -> Option<ConstValue> {
        self.get(id).as_const()
    }

    /// Resolved sources of `id`.
    pub fn sources(&self, id: UOpId) -> smallvec::SmallVec<[UOpId; 4]> {
        self.op(id).sources().into_iter().map(|s| self.resolve(s)).collect()
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Nodes reachable from `root`, sources before consumers, each once.
    pub fn toposort(&self, root: UOpId) -> Vec<UOpId> {
        let root = self.resolve(root);
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            for src in self.sources(id).into_iter().rev() {
                if !visited.contains(&src) {
                    stack.push((src, false));
                }
            }
        }
        order
    }

    /// Consumers of every node reachable from `root`.
    pub fn consumers(&self, root: UOpId) -> HashMap<UOpId, Vec<UOpId>> {
        let mut out: HashMap<UOpId, Vec<UOpId>> = HashMap::new();
        for id in self.toposort(root) {
            for src in self.sources(id) {
                let entry = out.entry(src).or_default();
                if !entry.contains(&id) {
                    entry.push(id);
                }
            }
        }
        out
    }

    /// `node` transitively reads `target` (or is it).
    pub fn depends_on(&self, node: UOpId, target: UOpId) -> bool {
        let target = self.resolve(target);
        let mut visited = HashSet::new();
        let mut stack = vec![self.resolve(node)];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if visited.insert(id) {
                stack.extend(self.sources(id));
            }
        }
        false
    }

    /// Hash of the subgraph under `root` that ignores arena ids, so two
    /// graphs built in different orders hash equally.
    pub fn structural_hash(&self, root: UOpId) -> u64 {
        self.structural_hashes(root).get(&self.resolve(root)).copied().unwrap_or_default()
    }

    /// [`UOpGraph::structural_hash`] of every node reachable from `root`.
    pub fn structural_hashes(&self, root: UOpId) -> HashMap<UOpId, u64> {
        let mut hashes: HashMap<UOpId, u64> = HashMap::new();
        for id in self.toposort(root) {
            let uop = self.get(id);
            let mut hasher = DefaultHasher::new();
            uop.op.map_sources(|_| UOpId(0)).hash(&mut hasher);
            uop.dtype.hash(&mut hasher);
            for src in self.sources(id) {
                hashes.get(&src).copied().unwrap_or_default().hash(&mut hasher);
            }
            hashes.insert(id, hasher.finish());
        }
        hashes
    }

    /// Fresh graph containing only the nodes reachable from `root`.
    pub fn prune(&self, root: UOpId) -> (UOpGraph, UOpId) {
        let mut out = UOpGraph::new();
        let mut map: HashMap<UOpId, UOpId> = HashMap::new();
        for id in self.toposort(root) {
            let uop = self.get(id);
            let op = uop.op.map_sources(|s| map[&self.resolve(s)]);
            map.insert(id, out.intern(op, uop.dtype.clone()));
        }
        let root = map[&self.resolve(root)];
        (out, root)
    }
}
