//! Loop-invariant offset hoisting.
//!
//! A loop whose counter is only ever read as `range + inv`, with `inv`
//! independent of every loop, is rebased to iterate `[start + inv, end + inv)`
//! and the addition disappears:
//!
//! ```text
//! L = Loop(0, 10)          L = Loop(3, 13)
//! Load(buf, L + 3)    →    Load(buf, L)
//! ```

use std::collections::HashMap;

use tessera_ir::{BinaryOp, DType, Op, OpKind, PatternMatcher, RewriteContext, Rule, UOpGraph, UOpId};

use super::bounds::bounds;

/// Consumer map refreshed at the start of every rewrite pass.
#[derive(Debug, Default)]
pub struct HoistContext {
    consumers: HashMap<UOpId, Vec<UOpId>>,
    pub enabled: bool,
}

impl HoistContext {
    pub fn new(enabled: bool) -> Self {
        Self { consumers: HashMap::new(), enabled }
    }
}

impl RewriteContext for HoistContext {
    fn begin_pass(&mut self, graph: &UOpGraph, root: UOpId) {
        if self.enabled {
            self.consumers = graph.consumers(root);
        }
    }
}

pub fn loop_hoisting() -> PatternMatcher<HoistContext> {
    PatternMatcher::new(vec![Rule::new("hoist_offset", &[OpKind::Binary], hoist_offset)])
}

fn hoist_offset(g: &mut UOpGraph, id: UOpId, ctx: &mut HoistContext) -> Option<UOpId> {
    if !ctx.enabled {
        return None;
    }
    let Op::Binary(BinaryOp::Add, a, b) = *g.op(id) else { return None };
    let (range, inv) = match (g.op(a), g.op(b)) {
        (Op::Loop { .. }, _) => (a, b),
        (_, Op::Loop { .. }) => (b, a),
        _ => return None,
    };
    let Op::Loop { start, end, axis } = *g.op(range) else { return None };
    if bounds(g, inv).is_none() || g.toposort(inv).iter().any(|&n| matches!(g.op(n), Op::Loop { .. })) {
        return None;
    }

    // The addition must be the only non-structural reader of the counter,
    // and must have survived this pass unchanged.
    let consumers = ctx.consumers.get(&range)?;
    let mut readers = consumers.iter().filter(|&&c| !is_structural(g, c, range));
    if readers.next() != Some(&id) || readers.next().is_some() {
        return None;
    }

    let start = g.add(start, inv).ok()?;
    let end = g.add(end, inv).ok()?;
    g.replace(range, Op::Loop { start, end, axis }, DType::Index);
    Some(range)
}

/// Consumers that use a loop for scoping rather than its value.
fn is_structural(g: &UOpGraph, consumer: UOpId, range: UOpId) -> bool {
    match g.op(consumer) {
        Op::EndLoop { .. } => true,
        Op::DefineAcc { loops, .. } | Op::Phi { loops, .. } => loops.contains(&range),
        _ => false,
    }
}
