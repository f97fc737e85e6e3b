//! Kernel scheduling.
//!
//! [`create_schedule`] turns the lazy graph behind a set of tensors into an
//! ordered list of [`ScheduleItem`]s, one kernel each. A node gets its own
//! kernel (it is *realized*) when it is a requested output, an explicit
//! `contiguous` or `assign`, or a reduction read by more than one node.
//! Everything else is fused into the kernels that read it:
//!
//! - Elementwise nodes and casts are inlined into every consumer. Views are
//!   pushed through them by composing trackers, so a kernel reads buffers
//!   through a single tracker per load.
//! - A computed source reached through more views than the configured budget
//!   is realized instead.
//! - A reduction fuses into its consumer when the consumer reads it unviewed.
//!   A consumer that reads it through a pure reshape is re-indexed in the
//!   reduction's output shape first; any other view realizes the reduction.
//! - One kernel holds reductions of a single shape and axis set, and never a
//!   reduction inside another.
//!
//! Kernels are ordered so every buffer is written before it is read and every
//! read of a buffer's old contents precedes the assign that overwrites it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use smallvec::SmallVec;
use snafu::{OptionExt, ResultExt, ensure};
use tessera_device::{Buffer, BufferId};
use tessera_ir::{LazyOp, SInt, ShapeTracker, Src, sint_prod};
use tracing::{debug, trace};

use crate::config::ScheduleConfig;
use crate::error::*;
use crate::lazy::{LazyKind, LazyRef};
use crate::Tensor;

/// One kernel: an operation tree plus the buffers bound to its slots.
#[derive(Debug, Clone)]
pub struct ScheduleItem {
    /// Sink over the stores; slot `i` addresses `buffers().nth(i)`.
    pub ast: Src,
    pub outputs: Vec<Buffer>,
    pub inputs: Vec<Buffer>,
    /// Values of the variables the trackers were bound to.
    pub var_vals: HashMap<String, i64>,
}

impl ScheduleItem {
    /// Kernel arguments in slot order.
    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.outputs.iter().chain(&self.inputs)
    }
}

#[derive(Debug, Default)]
pub struct Schedule {
    pub items: Vec<ScheduleItem>,
    /// Buffers that outlive the schedule: requested outputs and assign targets.
    pub outputs: HashSet<BufferId>,
    /// Node each item realizes, parallel to `items`.
    roots: Vec<LazyRef>,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduleItem> {
        self.items.iter()
    }

    /// Record the output buffer of every executed item on its node.
    ///
    /// With `intermediates` unset only nodes whose buffer outlives the
    /// schedule are marked; planned intermediates may share storage.
    pub(crate) fn commit(&self, intermediates: bool) {
        for (root, item) in self.roots.iter().zip(&self.items) {
            let Some(buffer) = item.outputs.first() else { continue };
            if intermediates || self.outputs.contains(&buffer.id()) {
                root.set_realized(buffer.clone());
            }
        }
    }
}

/// Schedule every kernel needed to realize `tensors`.
#[tracing::instrument(skip_all, fields(outputs = tensors.len()))]
pub fn create_schedule(tensors: &[&Tensor], config: &ScheduleConfig) -> Result<Schedule> {
    let graph = Graph::collect(tensors.iter().map(|t| t.lazy().clone()));
    let mut realize = graph.initial_realizes(tensors);
    let mut storage: HashMap<u64, Buffer> = HashMap::new();

    let kernels = loop {
        match graph.build_kernels(&realize, &mut storage, config) {
            Ok(kernels) => break kernels,
            Err(Stop::Realize(id) | Stop::Rescope { node: id, .. }) => {
                trace!(node = id, "materializing fused source");
                realize.insert(id);
            }
            Err(Stop::Fail(error)) => return Err(error),
        }
    };

    check_assigns(&kernels)?;
    let order = order_kernels(&kernels)?;

    let mut outputs: HashSet<BufferId> = HashSet::new();
    for tensor in tensors {
        let base = tensor.lazy().base();
        if let Some(buffer) = storage.get(&base.id()) {
            outputs.insert(buffer.id());
        }
    }
    let mut schedule = Schedule::default();
    let mut kernels: Vec<Option<ScheduledKernel>> = kernels.into_iter().map(Some).collect();
    for index in order {
        let Some(kernel) = kernels[index].take() else { continue };
        if let Some(target) = kernel.overwrites {
            outputs.insert(target);
        }
        schedule.roots.push(kernel.root);
        schedule.items.push(kernel.item);
    }
    schedule.outputs = outputs;

    debug!(kernels = schedule.len(), realized = realize.len(), "created schedule");
    Ok(schedule)
}

// ============================================================================
// Graph walk
// ============================================================================

struct Graph {
    /// Unrealized bases, sources before consumers.
    order: Vec<LazyRef>,
    /// Number of reads of each base by other unrealized nodes.
    consumers: HashMap<u64, usize>,
}

impl Graph {
    fn collect(roots: impl IntoIterator<Item = LazyRef>) -> Self {
        let mut order = Vec::new();
        let mut consumers: HashMap<u64, usize> = HashMap::new();
        let mut visited: HashSet<u64> = HashSet::new();
        let mut stack: Vec<(LazyRef, bool)> = roots.into_iter().map(|r| (r.base(), false)).collect();
        stack.reverse();

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if node.is_realized() || !visited.insert(node.id()) {
                continue;
            }
            stack.push((node.clone(), true));
            for src in node.sources().into_iter().rev() {
                let base = src.base();
                *consumers.entry(base.id()).or_default() += 1;
                if !visited.contains(&base.id()) {
                    stack.push((base, false));
                }
            }
        }
        Self { order, consumers }
    }

    fn initial_realizes(&self, tensors: &[&Tensor]) -> HashSet<u64> {
        let mut realize: HashSet<u64> =
            tensors.iter().map(|t| t.lazy().base()).filter(|b| !b.is_realized()).map(|b| b.id()).collect();
        for node in &self.order {
            let shared = self.consumers.get(&node.id()).is_some_and(|&n| n > 1);
            match node.kind() {
                LazyKind::Contiguous(_) | LazyKind::Assign { .. } => {
                    realize.insert(node.id());
                }
                LazyKind::Reduce { .. } if shared => {
                    realize.insert(node.id());
                }
                _ => {}
            }
        }
        realize
    }

    fn build_kernels(
        &self,
        realize: &HashSet<u64>,
        storage: &mut HashMap<u64, Buffer>,
        config: &ScheduleConfig,
    ) -> Result<Vec<ScheduledKernel>, Stop> {
        for node in self.order.iter().filter(|n| realize.contains(&n.id())) {
            if !storage.contains_key(&node.id()) {
                storage.insert(node.id(), output_buffer(node)?);
            }
        }
        let mut kernels = Vec::new();
        for root in self.order.iter().filter(|n| realize.contains(&n.id())) {
            kernels.push(build_kernel(root, realize, storage, config)?);
        }
        Ok(kernels)
    }
}

fn output_buffer(node: &LazyRef) -> Result<Buffer> {
    if let LazyKind::Assign { target, .. } = node.kind() {
        return target.base().realized().context(AssignTargetSnafu);
    }
    let numel = sint_prod(node.shape());
    let size = numel.eval_bound().unwrap_or_else(|| numel.vmax()).max(0) as usize;
    Ok(Buffer::new(*node.device(), node.dtype().clone(), size))
}

// ============================================================================
// Kernel construction
// ============================================================================

/// Why a kernel could not be built as requested.
#[derive(Debug)]
enum Stop {
    /// Realize this node and rebuild.
    Realize(u64),
    /// Re-index the kernel in `shape`, the output shape of reduction `node`.
    Rescope { node: u64, shape: Vec<SInt> },
    Fail(Error),
}

impl From<Error> for Stop {
    fn from(error: Error) -> Self {
        Stop::Fail(error)
    }
}

struct ScheduledKernel {
    root: LazyRef,
    item: ScheduleItem,
    /// Scheduled nodes this kernel loads.
    deps: BTreeSet<u64>,
    /// Pre-existing storage this kernel loads.
    reads: BTreeSet<BufferId>,
    /// Pre-existing storage this kernel writes.
    overwrites: Option<BufferId>,
    /// Shape written into `overwrites`.
    store_shape: Vec<SInt>,
}

fn build_kernel(
    root: &LazyRef,
    realize: &HashSet<u64>,
    storage: &HashMap<u64, Buffer>,
    config: &ScheduleConfig,
) -> Result<ScheduledKernel, Stop> {
    let output = storage.get(&root.id()).cloned().context(InvariantSnafu { reason: "root without storage" })?;
    let (value, store_st, overwrites) = match root.kind() {
        LazyKind::Assign { target, value } => {
            ensure!(
                value.shape() == target.shape(),
                StoreShapeMismatchSnafu {
                    buffer: output.id(),
                    expected: target.shape().to_vec(),
                    actual: value.shape().to_vec()
                }
            );
            ensure!(
                value.dtype() == target.dtype(),
                StoreDTypeMismatchSnafu {
                    buffer: output.id(),
                    expected: target.dtype().clone(),
                    actual: value.dtype().clone()
                }
            );
            (value.clone(), target.st(), Some(output.id()))
        }
        LazyKind::Contiguous(src) => (src.clone(), ShapeTracker::from_shape(root.shape()), None),
        _ => (root.clone(), ShapeTracker::from_shape(root.shape()), None),
    };

    let mut shape = root.shape().to_vec();
    let mut rescoped = false;
    loop {
        let mut builder = KernelBuilder::new(root, realize, storage, config, output.clone(), rescoped);
        let result = builder.build(&value, &store_st, &shape);
        match result {
            Ok(ast) => {
                trace!(root = root.id(), inputs = builder.inputs.len(), key = ast.key(), "built kernel");
                let var_vals = builder.var_vals.into_iter().collect();
                let item = ScheduleItem { ast, outputs: vec![output], inputs: builder.inputs, var_vals };
                return Ok(ScheduledKernel {
                    root: root.clone(),
                    item,
                    deps: builder.deps,
                    reads: builder.reads,
                    overwrites,
                    store_shape: store_st.shape().to_vec(),
                });
            }
            Err(Stop::Rescope { node, shape: reduced }) if !rescoped && store_st.reshape(&reduced).is_ok() => {
                trace!(root = root.id(), reduce = node, "re-indexing kernel in reduce output shape");
                shape = reduced;
                rescoped = true;
            }
            Err(Stop::Rescope { node, .. }) => return Err(Stop::Realize(node)),
            Err(stop) => return Err(stop),
        }
    }
}

#[derive(Clone)]
struct Visit {
    node: LazyRef,
    /// From kernel coordinates into `node`'s logical shape.
    st: ShapeTracker,
    in_reduce: bool,
}

type VisitKey = (u64, ShapeTracker, bool);

impl Visit {
    /// Step through views to the base.
    fn new(node: &LazyRef, st: &ShapeTracker, in_reduce: bool) -> Self {
        match node.kind() {
            LazyKind::View { base, st: view } => Self { node: base.clone(), st: view.compose(st), in_reduce },
            _ => Self { node: node.clone(), st: st.clone(), in_reduce },
        }
    }

    fn key(&self) -> VisitKey {
        (self.node.id(), self.st.clone(), self.in_reduce)
    }
}

struct KernelBuilder<'a> {
    root: &'a LazyRef,
    realize: &'a HashSet<u64>,
    storage: &'a HashMap<u64, Buffer>,
    max_views: usize,
    output: Buffer,
    /// Store tracker in kernel coordinates, bound.
    store_st: Option<ShapeTracker>,
    rescoped: bool,
    inputs: Vec<Buffer>,
    slots: HashMap<BufferId, usize>,
    deps: BTreeSet<u64>,
    reads: BTreeSet<BufferId>,
    var_vals: BTreeMap<String, i64>,
    /// The single reduce node fused into this kernel.
    reduce: Option<u64>,
    memo: HashMap<VisitKey, Src>,
}

impl<'a> KernelBuilder<'a> {
    fn new(
        root: &'a LazyRef,
        realize: &'a HashSet<u64>,
        storage: &'a HashMap<u64, Buffer>,
        config: &ScheduleConfig,
        output: Buffer,
        rescoped: bool,
    ) -> Self {
        let slots = HashMap::from([(output.id(), 0)]);
        Self {
            root,
            realize,
            storage,
            max_views: config.max_views,
            output,
            store_st: None,
            rescoped,
            inputs: Vec::new(),
            slots,
            deps: BTreeSet::new(),
            reads: BTreeSet::new(),
            var_vals: BTreeMap::new(),
            reduce: None,
            memo: HashMap::new(),
        }
    }

    /// Build `sink(store(0, store_st, value))` indexed in `shape`.
    fn build(&mut self, value: &LazyRef, store_st: &ShapeTracker, shape: &[SInt]) -> Result<Src, Stop> {
        let store_st = store_st.reshape(shape).context(IrSnafu)?;
        let top = ShapeTracker::from_shape(value.shape()).reshape(shape).context(IrSnafu)?;
        self.store_st = Some(store_st.clone());

        let start = Visit::new(value, &top, false);
        let src = self.lower(start)?;
        let store_st = self.unbind(&store_st)?;
        let store = LazyOp::store(0, store_st, src).context(IrSnafu)?;
        Ok(LazyOp::sink(vec![store]))
    }

    /// Post-order walk with an explicit stack.
    fn lower(&mut self, start: Visit) -> Result<Src, Stop> {
        let root_key = start.key();
        let mut stack = vec![(start, false)];
        while let Some((visit, expanded)) = stack.pop() {
            let key = visit.key();
            if self.memo.contains_key(&key) {
                continue;
            }
            if !expanded {
                if let Some(leaf) = self.leaf(&visit)? {
                    self.memo.insert(key, leaf);
                    continue;
                }
                let children = self.children(&visit)?;
                stack.push((visit, true));
                for child in children.into_iter().rev() {
                    if !self.memo.contains_key(&child.key()) {
                        stack.push((child, false));
                    }
                }
            } else {
                let children = self.children(&visit)?;
                let srcs = children
                    .iter()
                    .map(|c| self.memo.get(&c.key()).cloned())
                    .collect::<Option<SmallVec<[Src; 3]>>>()
                    .context(InvariantSnafu { reason: "operand lowered after its consumer" })?;
                let src = combine(&visit.node, &srcs)?;
                self.memo.insert(key, src);
            }
        }
        Ok(self.memo.get(&root_key).cloned().context(InvariantSnafu { reason: "kernel root not lowered" })?)
    }

    fn is_scheduled(&self, node: &LazyRef) -> bool {
        node.id() != self.root.id() && self.realize.contains(&node.id()) && !node.is_realized()
    }

    fn is_stored(&self, node: &LazyRef) -> bool {
        node.id() != self.root.id() && (node.is_realized() || self.realize.contains(&node.id()))
    }

    /// Loads of stored nodes and constants.
    fn leaf(&mut self, visit: &Visit) -> Result<Option<Src>, Stop> {
        let node = &visit.node;
        if let LazyKind::Const(value) = node.kind() {
            let st = self.unbind(&visit.st)?;
            return Ok(Some(LazyOp::constant(*value, node.dtype().clone(), st)));
        }
        if !self.is_stored(node) {
            return Ok(None);
        }

        let (buffer, st) = match node.kind() {
            LazyKind::Assign { target, .. } => {
                let buffer = target.base().realized().context(AssignTargetSnafu)?;
                (buffer, target.st().compose(&visit.st))
            }
            _ => {
                let buffer = match node.realized() {
                    Some(buffer) => buffer,
                    None => {
                        let missing = InvariantSnafu { reason: "load without storage" };
                        self.storage.get(&node.id()).cloned().context(missing)?
                    }
                };
                (buffer, visit.st.clone())
            }
        };
        if self.is_scheduled(node) {
            self.deps.insert(node.id());
        } else {
            self.reads.insert(buffer.id());
        }
        if buffer.id() == self.output.id() && self.store_st.as_ref() != Some(&st) {
            return Err(AssignAliasingSnafu { buffer: buffer.id() }.build().into());
        }

        let slot = self.slot(&buffer);
        let st = self.unbind(&st)?;
        Ok(Some(LazyOp::load(slot, node.dtype().clone(), st)))
    }

    fn children(&mut self, visit: &Visit) -> Result<SmallVec<[Visit; 3]>, Stop> {
        let (node, st) = (&visit.node, &visit.st);
        let mut children = SmallVec::new();
        match node.kind() {
            LazyKind::Unary(_, a) | LazyKind::Cast(a) => children.push(self.child(a, st, visit.in_reduce)?),
            LazyKind::Binary(_, a, b) => {
                for src in [a, b] {
                    children.push(self.child(src, st, visit.in_reduce)?);
                }
            }
            LazyKind::Ternary(_, a, b, c) => {
                for src in [a, b, c] {
                    children.push(self.child(src, st, visit.in_reduce)?);
                }
            }
            LazyKind::Reduce { src, .. } => {
                if visit.in_reduce {
                    return Err(Stop::Realize(node.id()));
                }
                if !(st.is_contiguous() && st.shape() == node.shape()) {
                    return Err(if st.is_contiguous() && !self.rescoped {
                        Stop::Rescope { node: node.id(), shape: node.shape().to_vec() }
                    } else {
                        Stop::Realize(node.id())
                    });
                }
                match self.reduce {
                    Some(existing) if existing != node.id() => return Err(Stop::Realize(node.id())),
                    Some(_) => {}
                    None => self.reduce = Some(node.id()),
                }
                children.push(Visit::new(src, &ShapeTracker::from_shape(src.shape()), true));
            }
            _ => return Err(InvariantSnafu { reason: "unlowerable node inside a kernel" }.build().into()),
        }
        Ok(children)
    }

    /// Operand visit; computed operands beyond the view budget are realized.
    fn child(&self, src: &LazyRef, st: &ShapeTracker, in_reduce: bool) -> Result<Visit, Stop> {
        let visit = Visit::new(src, st, in_reduce);
        let computed = !self.is_stored(&visit.node) && !matches!(visit.node.kind(), LazyKind::Const(_));
        if computed && visit.st.views().len() > self.max_views {
            return Err(Stop::Realize(visit.node.id()));
        }
        Ok(visit)
    }

    fn slot(&mut self, buffer: &Buffer) -> usize {
        if let Some(&slot) = self.slots.get(&buffer.id()) {
            return slot;
        }
        self.inputs.push(buffer.clone());
        let slot = self.inputs.len();
        self.slots.insert(buffer.id(), slot);
        slot
    }

    /// Strip bound values from `st`, recording them for the launch.
    fn unbind(&mut self, st: &ShapeTracker) -> Result<ShapeTracker> {
        let (st, bindings) = st.unbind();
        for (var, value) in bindings {
            match self.var_vals.get(var.name()) {
                Some(&first) if first != value => {
                    return ConflictingBindingSnafu { name: var.name().to_string(), first, second: value }.fail();
                }
                Some(_) => {}
                None => {
                    self.var_vals.insert(var.name().to_string(), value);
                }
            }
        }
        Ok(st)
    }
}

fn combine(node: &LazyRef, srcs: &[Src]) -> Result<Src> {
    let src = match (node.kind(), srcs) {
        (LazyKind::Unary(op, _), [a]) => LazyOp::unary(*op, a.clone()),
        (LazyKind::Cast(_), [a]) => LazyOp::cast(a.clone(), node.dtype().clone()),
        (LazyKind::Binary(op, ..), [a, b]) => LazyOp::binary(*op, a.clone(), b.clone()).context(IrSnafu)?,
        (LazyKind::Ternary(op, ..), [a, b, c]) => {
            LazyOp::ternary(*op, a.clone(), b.clone(), c.clone()).context(IrSnafu)?
        }
        (LazyKind::Reduce { op, axes, .. }, [a]) => LazyOp::reduce(*op, a.clone(), axes).context(IrSnafu)?,
        _ => return InvariantSnafu { reason: "operand count does not match node" }.fail(),
    };
    Ok(src)
}

// ============================================================================
// Ordering
// ============================================================================

/// Assigns into one buffer must agree on the stored shape.
fn check_assigns(kernels: &[ScheduledKernel]) -> Result<()> {
    let mut stores: HashMap<BufferId, &[SInt]> = HashMap::new();
    for kernel in kernels {
        let Some(target) = kernel.overwrites else { continue };
        let shape = kernel.store_shape.as_slice();
        match stores.get(&target) {
            Some(&expected) => ensure!(
                expected == shape,
                StoreShapeMismatchSnafu { buffer: target, expected: expected.to_vec(), actual: shape.to_vec() }
            ),
            None => {
                stores.insert(target, shape);
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm over read-after-write, write-after-read and
/// write-after-write edges, lowest node id first among ready kernels.
fn order_kernels(kernels: &[ScheduledKernel]) -> Result<Vec<usize>> {
    let index: HashMap<u64, usize> = kernels.iter().enumerate().map(|(i, k)| (k.root.id(), i)).collect();
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); kernels.len()];
    let mut add_edge = |from: usize, to: usize| {
        if from != to {
            successors[from].insert(to);
        }
    };

    for (i, kernel) in kernels.iter().enumerate() {
        for dep in &kernel.deps {
            if let Some(&producer) = index.get(dep) {
                add_edge(producer, i);
            }
        }
        let Some(target) = kernel.overwrites else { continue };
        for (j, other) in kernels.iter().enumerate() {
            if other.reads.contains(&target) {
                add_edge(j, i);
            }
            if other.overwrites == Some(target) && other.root.id() < kernel.root.id() {
                add_edge(j, i);
            }
        }
    }

    let mut indegree = vec![0usize; kernels.len()];
    for targets in &successors {
        for &t in targets {
            indegree[t] += 1;
        }
    }
    let mut ready: BTreeSet<(u64, usize)> =
        (0..kernels.len()).filter(|&i| indegree[i] == 0).map(|i| (kernels[i].root.id(), i)).collect();
    let mut order = Vec::with_capacity(kernels.len());
    while let Some((_, i)) = ready.pop_first() {
        order.push(i);
        for &next in &successors[i] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.insert((kernels[next].root.id(), next));
            }
        }
    }
    ensure!(order.len() == kernels.len(), CyclicScheduleSnafu { remaining: kernels.len() - order.len() });
    Ok(order)
}
