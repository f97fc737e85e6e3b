//! Reference interpreter for compiled kernels.
//!
//! Executes a positional instruction list one instruction at a time with a
//! register per position:
//!
//! - `Loop` initializes its counter and skips its body when empty; the
//!   matching `EndLoop` increments the counter and jumps back.
//! - `If` skips to its `EndIf` when the condition is false.
//! - A `Phi` writes its update back into the accumulator at the end of every
//!   iteration of its innermost loop and reads the accumulator afterwards.
//! - `Special` indices iterate the launch grid: the whole list runs once per
//!   grid point.

use std::collections::HashMap;
use std::rc::Rc;

use snafu::{OptionExt, ResultExt, ensure};
use tessera_device::Buffer;
use tessera_dtype::{DType, HasDType, ScalarDType};
use tessera_ir::shape::unravel;
use tessera_ir::uop::eval::{exec_binary, exec_ternary, exec_unary};
use tessera_ir::{ConstValue, Op, UOpId};
use tessera_schedule::Kernel;
use tracing::trace;

use crate::error::*;
use crate::kernel::CompiledKernel;

#[derive(Debug, Clone)]
pub struct Interpreter {
    kernel: Rc<Kernel>,
    /// Position of the end marker closing each scope opener.
    ends: HashMap<usize, usize>,
    /// `(acc, value)` pairs written back when a loop iteration ends, by loop.
    writebacks: HashMap<usize, Vec<(usize, usize)>>,
}

impl Interpreter {
    pub fn new(kernel: Rc<Kernel>) -> Result<Self> {
        let mut ends = HashMap::new();
        let mut writebacks: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
        for (position, uop) in kernel.uops.iter().enumerate() {
            match &uop.op {
                Op::EndLoop { range: scope } | Op::EndIf { branch: scope } => {
                    ensure!(
                        scope.index() < position,
                        MalformedSnafu { position, reason: "end marker before its scope" }
                    );
                    ends.insert(scope.index(), position);
                }
                Op::Phi { acc, value, loops } => {
                    let inner = loops.iter().map(|l| l.index()).max().context(MalformedSnafu {
                        position,
                        reason: "phi without loops",
                    })?;
                    writebacks.entry(inner).or_default().push((acc.index(), value.index()));
                }
                _ => {}
            }
        }
        Ok(Self { kernel, ends, writebacks })
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Run every grid point of one launch.
    #[tracing::instrument(skip_all, fields(kernel = %self.kernel.name))]
    pub fn run(&self, buffers: &[Buffer], vars: &HashMap<String, i64>) -> Result<()> {
        let globals = &self.kernel.globals;
        ensure!(buffers.len() == globals.len(), ArgumentCountSnafu {
            kernel: self.kernel.name.clone(),
            expected: globals.len(),
            actual: buffers.len(),
        });
        let mut slots = HashMap::with_capacity(buffers.len());
        for (arg, buffer) in globals.iter().zip(buffers) {
            ensure!(buffer.dtype() == arg.dtype, ArgumentDTypeSnafu {
                slot: arg.slot,
                expected: arg.dtype.clone(),
                actual: buffer.dtype(),
            });
            buffer.ensure_allocated().context(DeviceSnafu)?;
            slots.insert(arg.slot, buffer);
        }

        let grid = self.grid(vars)?;
        let sizes: Vec<i64> = grid.iter().map(|&(_, size)| size).collect();
        let points: i64 = sizes.iter().product();
        trace!(points, "launch");
        for flat in 0..points {
            let coords: HashMap<usize, i64> = grid.iter().map(|&(pos, _)| pos).zip(unravel(&sizes, flat)).collect();
            self.execute_point(&slots, vars, &coords)?;
        }
        Ok(())
    }

    /// Launch-grid indices and their sizes, outermost axis first.
    fn grid(&self, vars: &HashMap<String, i64>) -> Result<Vec<(usize, i64)>> {
        let mut grid = Vec::new();
        for (position, uop) in self.kernel.uops.iter().enumerate() {
            if let Op::Special { axis, size } = uop.op {
                let size = self.eval_static(size, vars)?;
                grid.push((axis, position, as_int(size, position)?.max(0)));
            }
        }
        grid.sort_unstable();
        Ok(grid.into_iter().map(|(_, position, size)| (position, size)).collect())
    }

    /// Evaluate a loop-free expression without running the kernel.
    fn eval_static(&self, id: UOpId, vars: &HashMap<String, i64>) -> Result<ConstValue> {
        let position = id.index();
        let uop = &self.kernel.uops[position];
        let value = match uop.op {
            Op::Const(c) => Some(c.0),
            Op::DefineVar(ref var) => Some(ConstValue::Int(lookup(vars, var.name())?)),
            Op::Cast { src } => self.eval_static(src, vars)?.cast(&uop.dtype),
            Op::Unary(op, a) => exec_unary(op, &uop.dtype, self.eval_static(a, vars)?),
            Op::Binary(op, a, b) => exec_binary(op, &uop.dtype, self.eval_static(a, vars)?, self.eval_static(b, vars)?),
            _ => return MalformedSnafu { position, reason: "grid size depends on kernel state" }.fail(),
        };
        value.context(EvaluationSnafu { position, op: format!("{:?}", uop.op) })
    }

    fn execute_point(
        &self,
        slots: &HashMap<usize, &Buffer>,
        vars: &HashMap<String, i64>,
        coords: &HashMap<usize, i64>,
    ) -> Result<()> {
        let uops = &self.kernel.uops;
        let mut regs: Vec<Option<ConstValue>> = vec![None; uops.len()];
        let mut pc = 0;
        while pc < uops.len() {
            let uop = &uops[pc];
            let get = |regs: &[Option<ConstValue>], id: UOpId| {
                regs[id.index()].context(MalformedSnafu { position: pc, reason: "operand has no value" })
            };
            let fail = || EvaluationSnafu { position: pc, op: format!("{:?}", uop.op) };
            let mut next = pc + 1;
            let value = match uop.op {
                Op::Const(c) => Some(c.0),
                Op::DefineVar(ref var) => Some(ConstValue::Int(lookup(vars, var.name())?)),
                Op::Special { .. } => coords.get(&pc).map(|&c| ConstValue::Int(c)),
                Op::DefineAcc { init, .. } => Some(init.0),
                Op::Loop { start, end, .. } => {
                    let (start, end) = (as_int(get(&regs, start)?, pc)?, as_int(get(&regs, end)?, pc)?);
                    if start >= end {
                        next = self.end_of(pc)? + 1;
                    }
                    Some(ConstValue::Int(start))
                }
                Op::EndLoop { range } => {
                    for &(acc, value) in self.writebacks.get(&range.index()).into_iter().flatten() {
                        if regs[value].is_some() {
                            regs[acc] = regs[value];
                        }
                    }
                    let Op::Loop { end, .. } = uops[range.index()].op else {
                        return MalformedSnafu { position: pc, reason: "loop end closes a non-loop" }.fail();
                    };
                    let counter = as_int(get(&regs, range)?, pc)? + 1;
                    if counter < as_int(get(&regs, end)?, pc)? {
                        regs[range.index()] = Some(ConstValue::Int(counter));
                        next = range.index() + 1;
                    }
                    None
                }
                Op::If { cond } => {
                    if !get(&regs, cond)?.truthy() {
                        next = self.end_of(pc)? + 1;
                    }
                    None
                }
                Op::Load { buffer, index, gate } => {
                    let valid = match gate {
                        Some((valid, _)) => get(&regs, valid)?.truthy(),
                        None => true,
                    };
                    match gate {
                        Some((_, alt)) if !valid => Some(get(&regs, alt)?),
                        _ => {
                            let (slot, buffer) = self.buffer(slots, buffer, pc)?;
                            Some(read_element(slot, buffer, as_int(get(&regs, index)?, pc)?)?)
                        }
                    }
                }
                Op::Store { buffer, index, value, gate } => {
                    let enabled = match gate {
                        Some(gate) if matches!(uops[gate.index()].op, Op::If { .. }) => true,
                        Some(gate) => get(&regs, gate)?.truthy(),
                        None => true,
                    };
                    if enabled {
                        let (slot, buffer) = self.buffer(slots, buffer, pc)?;
                        write_element(slot, buffer, as_int(get(&regs, index)?, pc)?, get(&regs, value)?)?;
                    }
                    None
                }
                Op::Phi { acc, .. } => Some(get(&regs, acc)?),
                Op::Cast { src } => Some(get(&regs, src)?.cast(&uop.dtype).with_context(fail)?),
                Op::Unary(op, a) => Some(exec_unary(op, &uop.dtype, get(&regs, a)?).with_context(fail)?),
                Op::Binary(op, a, b) => {
                    Some(exec_binary(op, &uop.dtype, get(&regs, a)?, get(&regs, b)?).with_context(fail)?)
                }
                Op::Ternary(op, a, b, c) => Some(
                    exec_ternary(op, &uop.dtype, get(&regs, a)?, get(&regs, b)?, get(&regs, c)?).with_context(fail)?,
                ),
                Op::DefineGlobal { .. }
                | Op::DefineLocal { .. }
                | Op::EndIf { .. }
                | Op::Barrier { .. }
                | Op::Noop
                | Op::Sink { .. } => None,
            };
            if value.is_some() {
                regs[pc] = value;
            }
            pc = next;
        }
        Ok(())
    }

    fn end_of(&self, position: usize) -> Result<usize> {
        self.ends.get(&position).copied().context(MalformedSnafu { position, reason: "scope is never closed" })
    }

    fn buffer<'a>(
        &self,
        slots: &HashMap<usize, &'a Buffer>,
        id: UOpId,
        position: usize,
    ) -> Result<(usize, &'a Buffer)> {
        let Op::DefineGlobal { slot } = self.kernel.uops[id.index()].op else {
            return MalformedSnafu { position, reason: "memory access through a non-global" }.fail();
        };
        let buffer = slots.get(&slot).context(MalformedSnafu { position, reason: "unbound global slot" })?;
        Ok((slot, *buffer))
    }
}

impl CompiledKernel for Interpreter {
    fn execute(&self, buffers: &[Buffer], vars: &HashMap<String, i64>) -> Result<()> {
        self.run(buffers, vars)
    }

    fn name(&self) -> &str {
        &self.kernel.name
    }
}

fn lookup(vars: &HashMap<String, i64>, name: &str) -> Result<i64> {
    vars.get(name).copied().context(UnboundVariableSnafu { name })
}

fn as_int(value: ConstValue, position: usize) -> Result<i64> {
    value.as_i64().context(MalformedSnafu { position, reason: "expected an integer" })
}

// ============================================================================
// Element access
// ============================================================================

fn element_range(slot: usize, buffer: &Buffer, index: i64) -> Result<std::ops::Range<usize>> {
    let size = buffer.size();
    let element = usize::try_from(index).ok().filter(|&i| i < size).context(OutOfBoundsSnafu { slot, index, size })?;
    let width = buffer.dtype().bytes();
    Ok(element * width..(element + 1) * width)
}

fn read_element(slot: usize, buffer: &Buffer, index: i64) -> Result<ConstValue> {
    let range = element_range(slot, buffer, index)?;
    let dtype = buffer.dtype();
    let value = buffer.with_bytes(|bytes| decode(&bytes[range], &dtype)).context(DeviceSnafu)?;
    value.context(MalformedSnafu { position: 0usize, reason: "buffer of a non-value dtype" })
}

fn write_element(slot: usize, buffer: &Buffer, index: i64, value: ConstValue) -> Result<()> {
    let range = element_range(slot, buffer, index)?;
    let dtype = buffer.dtype();
    let bytes = value
        .cast(&dtype)
        .and_then(|v| encode(v, &dtype))
        .context(MalformedSnafu { position: 0usize, reason: "buffer of a non-value dtype" })?;
    buffer.with_bytes_mut(|data| data[range].copy_from_slice(&bytes)).context(DeviceSnafu)
}

fn decode(bytes: &[u8], dtype: &DType) -> Option<ConstValue> {
    use ScalarDType::*;
    Some(match dtype.scalar()? {
        Bool => ConstValue::Bool(bool::read_le(bytes)),
        Int8 => ConstValue::Int(i8::read_le(bytes).into()),
        Int16 => ConstValue::Int(i16::read_le(bytes).into()),
        Int32 => ConstValue::Int(i32::read_le(bytes).into()),
        Int64 | Index => ConstValue::Int(i64::read_le(bytes)),
        UInt8 => ConstValue::UInt(u8::read_le(bytes).into()),
        UInt16 => ConstValue::UInt(u16::read_le(bytes).into()),
        UInt32 => ConstValue::UInt(u32::read_le(bytes).into()),
        UInt64 => ConstValue::UInt(u64::read_le(bytes)),
        Float32 => ConstValue::Float(f32::read_le(bytes).into()),
        Float64 => ConstValue::Float(f64::read_le(bytes)),
        Void => return None,
    })
}

/// Encode a value already cast to `dtype`.
fn encode(value: ConstValue, dtype: &DType) -> Option<Vec<u8>> {
    use ScalarDType::*;
    let mut out = Vec::with_capacity(dtype.bytes());
    match (dtype.scalar()?, value) {
        (Bool, ConstValue::Bool(v)) => v.write_le(&mut out),
        (Int8, ConstValue::Int(v)) => (v as i8).write_le(&mut out),
        (Int16, ConstValue::Int(v)) => (v as i16).write_le(&mut out),
        (Int32, ConstValue::Int(v)) => (v as i32).write_le(&mut out),
        (Int64 | Index, ConstValue::Int(v)) => v.write_le(&mut out),
        (UInt8, ConstValue::UInt(v)) => (v as u8).write_le(&mut out),
        (UInt16, ConstValue::UInt(v)) => (v as u16).write_le(&mut out),
        (UInt32, ConstValue::UInt(v)) => (v as u32).write_le(&mut out),
        (UInt64, ConstValue::UInt(v)) => v.write_le(&mut out),
        (Float32, ConstValue::Float(v)) => (v as f32).write_le(&mut out),
        (Float64, ConstValue::Float(v)) => v.write_le(&mut out),
        _ => return None,
    }
    Some(out)
}
