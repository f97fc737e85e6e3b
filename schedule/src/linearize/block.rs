//! Basic blocks produced by emission and their lowering to a flat list.

use std::collections::HashMap;

use tessera_ir::{DType, Op, UOp, UOpGraph, UOpId};

use super::scope::Chain;

/// One emitted item: a graph node or the end marker of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    Node(UOpId),
    End(UOpId),
}

/// Maximal run of entries with no scope boundary inside.
///
/// A scope opener is the last entry of its block; an end marker is the
/// first entry of the block that continues the enclosing scope.
#[derive(Debug, Clone, Default)]
pub(crate) struct BasicBlock {
    /// Scopes open over the block, outermost first.
    pub scopes: Chain,
    pub entries: Vec<Entry>,
}

/// Accumulates entries into blocks as emission opens and closes scopes.
#[derive(Debug, Default)]
pub(crate) struct BlockBuilder {
    done: Vec<BasicBlock>,
    current: BasicBlock,
}

impl BlockBuilder {
    pub fn node(&mut self, id: UOpId, opens_scope: bool) {
        self.current.entries.push(Entry::Node(id));
        if opens_scope {
            let mut scopes = self.current.scopes.clone();
            scopes.push(id);
            self.seal(scopes);
        }
    }

    pub fn end(&mut self, scope: UOpId) {
        let mut scopes = self.current.scopes.clone();
        scopes.pop();
        self.seal(scopes);
        self.current.entries.push(Entry::End(scope));
    }

    /// Scopes open over the block being filled.
    pub fn open(&self) -> &[UOpId] {
        &self.current.scopes
    }

    pub fn finish(mut self) -> Vec<BasicBlock> {
        self.seal(Chain::new());
        self.done
    }

    fn seal(&mut self, next: Chain) {
        let block = std::mem::replace(&mut self.current, BasicBlock { scopes: next, entries: Vec::new() });
        if !block.entries.is_empty() {
            self.done.push(block);
        }
    }
}

/// Concatenate `blocks` into a positional instruction list.
///
/// Sources are rewritten to the positions of the nodes they name and end
/// markers receive the position of the scope they close.
pub(crate) fn lower(graph: &UOpGraph, blocks: &[BasicBlock]) -> Vec<UOp> {
    let entries: Vec<Entry> = blocks.iter().flat_map(|b| b.entries.iter().copied()).collect();
    let positions: HashMap<UOpId, UOpId> = entries
        .iter()
        .enumerate()
        .filter_map(|(pos, entry)| match entry {
            Entry::Node(id) => Some((*id, UOpId(pos as u32))),
            Entry::End(_) => None,
        })
        .collect();
    let at = |id: UOpId| positions.get(&graph.resolve(id)).copied().unwrap_or(id);

    entries
        .iter()
        .map(|entry| match *entry {
            Entry::Node(id) => {
                let uop = graph.get(id);
                UOp::new(uop.op.map_sources(at), uop.dtype.clone())
            }
            Entry::End(scope) => match graph.op(scope) {
                Op::If { .. } => UOp::new(Op::EndIf { branch: at(scope) }, DType::Void),
                _ => UOp::new(Op::EndLoop { range: at(scope) }, DType::Void),
            },
        })
        .collect()
}
