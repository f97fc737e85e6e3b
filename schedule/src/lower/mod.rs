//! Lowering of an operation tree to a micro-op graph.
//!
//! The kernel iterates its output shape with global loops (or launch-grid
//! indices). Reductions add one reduce loop per reduced axis, nested inside
//! the global loops, with a register accumulator seeded with the reduction
//! identity and a `Phi` that writes the updated value back on every
//! iteration. Loads and stores address their buffers through their shape
//! trackers; masked loads are gated and masked stores carry a gate.
//!
//! ```text
//! Sink[Store(out, Add(Reduce(Load a), Load b))]
//!     ↓
//! G0 = Loop(0, 10)            acc = DefineAcc(0.0, [R1])
//! R1 = Loop(0, 10)            v   = Load(a, G0*10 + R1)
//! p  = Phi(acc, acc + v)      s   = Store(out, G0, p + Load(b, G0))
//! ```

pub mod index;

use std::collections::HashMap;

use smallvec::SmallVec;
use snafu::{ResultExt, ensure};
use tracing::trace;
use tessera_ir::{
    ConstValue, DType, LazyOp, LazyOpKind, LoopAxis, LoopKind, SInt, Src, UOpGraph, UOpId,
};

use crate::config::{CompileConfig, GlobalDims};
use crate::error::*;
use index::{render_sint, render_st};

/// Kernel argument: a global buffer bound at launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalArg {
    pub slot: usize,
    /// Element dtype.
    pub dtype: DType,
    pub written: bool,
}

/// Result of lowering one operation tree.
#[derive(Debug, Clone)]
pub struct LoweredKernel {
    pub graph: UOpGraph,
    pub sink: UOpId,
    pub globals: Vec<GlobalArg>,
    pub output_shape: Vec<SInt>,
    /// Shape iterated by the kernel: the reduce input shape if there is a
    /// reduction, the output shape otherwise.
    pub full_shape: Vec<SInt>,
    pub reduce_axes: Vec<usize>,
}

/// Which coordinates a subtree is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Region {
    /// Inside a reduction: reduced axes iterate their reduce loops.
    Full,
    /// After all reductions: reduced axes are fixed at zero.
    Output,
}

struct Lowerer {
    graph: UOpGraph,
    buffers: HashMap<usize, UOpId>,
    full_coords: Vec<UOpId>,
    output_coords: Vec<UOpId>,
    reduce_loops: SmallVec<[UOpId; 2]>,
    /// Keyed by structural equality of the subtree.
    memo: HashMap<(Src, Region), UOpId>,
    next_acc: usize,
}

/// Lower a kernel's operation tree (a sink of stores) to a micro-op graph.
#[tracing::instrument(skip_all, fields(key = ast.key()))]
pub fn lower(ast: &Src, config: &CompileConfig) -> Result<LoweredKernel> {
    let stores = match ast.kind() {
        LazyOpKind::Sink(_) => ast.stores(),
        LazyOpKind::Store { .. } => vec![ast.clone()],
        _ => return InvalidKernelRootSnafu { found: ast.to_string() }.fail(),
    };
    let Some(first) = stores.first() else {
        return InvalidKernelRootSnafu { found: ast.to_string() }.fail();
    };
    let output_shape = first.shape().to_vec();
    for store in &stores {
        ensure!(
            store.shape() == output_shape.as_slice(),
            OutputShapeMismatchSnafu { expected: display_shape(&output_shape), actual: display_shape(store.shape()) }
        );
    }

    let (full_shape, reduce_axes) = reduce_signature(ast, &output_shape)?;
    let globals = collect_globals(ast);

    let mut graph = UOpGraph::new();
    let buffers = globals.iter().map(|g| (g.slot, graph.define_global(g.slot, g.dtype.clone()))).collect();

    let zero = graph.index_const(0);
    let mut output_coords = Vec::with_capacity(output_shape.len());
    for (axis, dim) in output_shape.iter().enumerate() {
        let coord = if *dim == 1 {
            zero
        } else {
            let size = render_sint(&mut graph, dim)?;
            match config.global_dims {
                GlobalDims::Loops => {
                    graph.loop_(zero, size, LoopAxis { kind: LoopKind::Global, axis }).context(IrSnafu)?
                }
                GlobalDims::Special => graph.special(axis, size).context(IrSnafu)?,
            }
        };
        output_coords.push(coord);
    }

    let mut full_coords = output_coords.clone();
    let mut reduce_loops = SmallVec::new();
    for &axis in &reduce_axes {
        let dim = &full_shape[axis];
        if *dim == 1 {
            continue;
        }
        let size = render_sint(&mut graph, dim)?;
        let range = graph.loop_(zero, size, LoopAxis { kind: LoopKind::Reduce, axis }).context(IrSnafu)?;
        full_coords[axis] = range;
        reduce_loops.push(range);
    }

    let mut lowerer = Lowerer {
        graph,
        buffers,
        full_coords,
        output_coords,
        reduce_loops,
        memo: HashMap::new(),
        next_acc: 0,
    };
    let mut sink_sources = Vec::with_capacity(stores.len());
    for store in &stores {
        sink_sources.push(lowerer.lower_node(store, Region::Output)?);
    }
    let sink = lowerer.graph.sink(&sink_sources);
    trace!(nodes = lowerer.graph.len(), reductions = lowerer.next_acc, "lowered kernel");

    Ok(LoweredKernel { graph: lowerer.graph, sink, globals, output_shape, full_shape, reduce_axes })
}

impl Lowerer {
    /// Lower `root` bottom-up with an explicit stack.
    fn lower_node(&mut self, root: &Src, region: Region) -> Result<UOpId> {
        let mut stack: Vec<(Src, Region, bool)> = vec![(root.clone(), region, false)];
        while let Some((node, region, expanded)) = stack.pop() {
            if self.memo.contains_key(&(node.clone(), region)) {
                continue;
            }
            let child_region = match node.kind() {
                LazyOpKind::Reduce { .. } => Region::Full,
                _ => region,
            };
            if !expanded {
                stack.push((node.clone(), region, true));
                for src in node.sources() {
                    if !self.memo.contains_key(&(src.clone(), child_region)) {
                        stack.push((src.clone(), child_region, false));
                    }
                }
                continue;
            }
            let id = self.lower_one(&node, region, child_region)?;
            self.memo.insert((node, region), id);
        }
        Ok(self.memo[&(root.clone(), region)])
    }

    fn src(&self, node: &Src, region: Region) -> UOpId {
        self.memo[&(node.clone(), region)]
    }

    fn lower_one(&mut self, node: &LazyOp, region: Region, child: Region) -> Result<UOpId> {
        let coords = match region {
            Region::Full => self.full_coords.clone(),
            Region::Output => self.output_coords.clone(),
        };
        let g = &mut self.graph;
        let id = match node.kind() {
            LazyOpKind::Load { buf, st } => {
                let (index, valid) = render_st(g, st, &coords)?;
                let gate = match valid {
                    Some(valid) => Some((valid, g.const_(ConstValue::zero(node.dtype().base()), node.dtype().clone()))),
                    None => None,
                };
                g.load(self.buffers[buf], index, gate).context(IrSnafu)?
            }
            LazyOpKind::Const { value, st } => {
                let c = g.const_(value.0, node.dtype().clone());
                let (_, valid) = render_st(g, st, &coords)?;
                match valid {
                    Some(valid) => {
                        let zero = g.const_(ConstValue::zero(node.dtype().base()), node.dtype().clone());
                        g.where_(valid, c, zero).context(IrSnafu)?
                    }
                    None => c,
                }
            }
            LazyOpKind::Unary(op, a) => {
                let a = self.src(a, child);
                self.graph.unary(*op, a).context(IrSnafu)?
            }
            LazyOpKind::Binary(op, a, b) => {
                let (a, b) = (self.src(a, child), self.src(b, child));
                self.graph.binary(*op, a, b).context(IrSnafu)?
            }
            LazyOpKind::Ternary(op, a, b, c) => {
                let (a, b, c) = (self.src(a, child), self.src(b, child), self.src(c, child));
                self.graph.ternary(*op, a, b, c).context(IrSnafu)?
            }
            LazyOpKind::Cast(a) => {
                let a = self.src(a, child);
                self.graph.cast(a, node.dtype().clone())
            }
            LazyOpKind::Reduce { op, src, .. } => {
                ensure!(region == Region::Output, UnsupportedSnafu { what: "reduce inside a reduce" });
                let value = self.src(src, child);
                if self.reduce_loops.is_empty() {
                    // Every reduced axis has size 1.
                    value
                } else {
                    let dtype = node.dtype().clone();
                    let slot = self.next_acc;
                    self.next_acc += 1;
                    let loops = self.reduce_loops.clone();
                    let acc = self.graph.define_acc(slot, op.identity(dtype.base()), dtype, &loops);
                    let update = self.graph.binary(op.binary(), acc, value).context(IrSnafu)?;
                    self.graph.phi(acc, update, &loops).context(IrSnafu)?
                }
            }
            LazyOpKind::Store { buf, st, src } => {
                let value = self.src(src, child);
                let (index, valid) = render_st(&mut self.graph, st, &coords)?;
                self.graph.store(self.buffers[buf], index, value, valid).context(IrSnafu)?
            }
            LazyOpKind::Sink(_) => return UnsupportedSnafu { what: "nested sink" }.fail(),
        };
        Ok(id)
    }
}

/// Full shape and reduced axes shared by every reduction of the kernel.
fn reduce_signature(ast: &Src, output_shape: &[SInt]) -> Result<(Vec<SInt>, Vec<usize>)> {
    let mut signature: Option<(Vec<SInt>, Vec<usize>)> = None;
    for node in ast.toposort() {
        let LazyOpKind::Reduce { axes, src, .. } = node.kind() else { continue };
        let axes = axes.to_vec();
        match &signature {
            None => {
                ensure!(
                    node.shape() == output_shape,
                    OutputShapeMismatchSnafu {
                        expected: display_shape(output_shape),
                        actual: display_shape(node.shape())
                    }
                );
                signature = Some((src.shape().to_vec(), axes));
            }
            Some((shape, expected)) => ensure!(
                shape.as_slice() == src.shape() && *expected == axes,
                ReduceMismatchSnafu { axes, shape: display_shape(src.shape()), expected: expected.clone() }
            ),
        }
    }
    Ok(signature.unwrap_or_else(|| (output_shape.to_vec(), Vec::new())))
}

/// Kernel arguments ordered by slot.
fn collect_globals(ast: &Src) -> Vec<GlobalArg> {
    let mut globals: HashMap<usize, GlobalArg> = HashMap::new();
    for node in ast.toposort() {
        let (slot, written) = match node.kind() {
            LazyOpKind::Load { buf, .. } => (*buf, false),
            LazyOpKind::Store { buf, .. } => (*buf, true),
            _ => continue,
        };
        let entry =
            globals.entry(slot).or_insert_with(|| GlobalArg { slot, dtype: node.dtype().clone(), written: false });
        entry.written |= written;
    }
    let mut globals: Vec<GlobalArg> = globals.into_values().collect();
    globals.sort_by_key(|g| g.slot);
    globals
}

fn display_shape(shape: &[SInt]) -> Vec<String> {
    shape.iter().map(ToString::to_string).collect()
}
