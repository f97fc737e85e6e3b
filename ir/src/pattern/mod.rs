//! Rule tables for the rewrite engine.
//!
//! A [`Rule`] is a plain function that inspects one node with native `match`
//! over [`Op`](crate::uop::Op) variants and either declines (`None`) or
//! returns the id of an equivalent node. A [`PatternMatcher`] indexes rules by
//! the [`OpKind`] of the node they apply to, so dispatch only tries rules that
//! can possibly fire.
//!
//! Rules receive a mutable context `C` at rewrite time; rules that need no
//! state use `()`.

use std::collections::HashMap;

use crate::uop::{OpKind, UOpGraph, UOpId};

/// Signature of a rewrite rule.
pub type RuleFn<C> = fn(&mut UOpGraph, UOpId, &mut C) -> Option<UOpId>;

pub struct Rule<C> {
    pub name: &'static str,
    /// Node kinds this rule inspects. Empty means every kind.
    pub kinds: &'static [OpKind],
    pub apply: RuleFn<C>,
}

impl<C> Rule<C> {
    pub const fn new(name: &'static str, kinds: &'static [OpKind], apply: RuleFn<C>) -> Self {
        Self { name, kinds, apply }
    }
}

/// Context threaded through one `graph_rewrite` call.
pub trait RewriteContext {
    /// Called at the start of every pass with the current root.
    fn begin_pass(&mut self, _graph: &UOpGraph, _root: UOpId) {}
}

impl RewriteContext for () {}

/// Rules indexed by node kind.
pub struct PatternMatcher<C> {
    rules: Vec<Rule<C>>,
    by_kind: HashMap<OpKind, Vec<usize>>,
    wildcard: Vec<usize>,
}

impl<C> PatternMatcher<C> {
    pub fn new(rules: Vec<Rule<C>>) -> Self {
        let mut by_kind: HashMap<OpKind, Vec<usize>> = HashMap::new();
        let mut wildcard = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            if rule.kinds.is_empty() {
                wildcard.push(i);
            }
            for kind in rule.kinds {
                by_kind.entry(*kind).or_default().push(i);
            }
        }
        // Keep declaration order when a kind has both specific and wildcard rules.
        for indices in by_kind.values_mut() {
            indices.extend(&wildcard);
            indices.sort_unstable();
            indices.dedup();
        }
        Self { rules, by_kind, wildcard }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Concatenate two rule tables; `self`'s rules are tried first.
    pub fn extend(self, other: PatternMatcher<C>) -> Self {
        let mut rules = self.rules;
        rules.extend(other.rules);
        Self::new(rules)
    }

    /// First rule whose result differs from `id`, with its name.
    pub fn rewrite(&self, graph: &mut UOpGraph, id: UOpId, ctx: &mut C) -> Option<(&'static str, UOpId)> {
        let id = graph.resolve(id);
        let kind = graph.op(id).kind();
        let candidates = self.by_kind.get(&kind).unwrap_or(&self.wildcard);
        for &i in candidates {
            let rule = &self.rules[i];
            if let Some(next) = (rule.apply)(graph, id, ctx) {
                let next = graph.resolve(next);
                if next != id {
                    return Some((rule.name, next));
                }
            }
        }
        None
    }
}
