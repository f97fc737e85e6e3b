use std::collections::HashMap;
use std::rc::Rc;

use tessera_device::Buffer;
use tessera_dtype::{DType, DeviceSpec, HasDType};
use tessera_ir::shape::shape_of;
use tessera_ir::{LazyOp, ShapeTracker, Src};
use tessera_schedule::{CompileConfig, compile_kernel};

use crate::Interpreter;

pub fn st(dims: &[usize]) -> ShapeTracker {
    ShapeTracker::from_shape(&shape_of(dims))
}

pub fn load(buf: usize, dims: &[usize]) -> Src {
    LazyOp::load(buf, DType::Float32, st(dims))
}

pub fn interpreter(ast: &Src, config: &CompileConfig) -> Interpreter {
    let kernel = compile_kernel(ast, config).expect("compile");
    Interpreter::new(Rc::new(kernel)).expect("interpreter")
}

pub fn empty<T: HasDType>(size: usize) -> Buffer {
    Buffer::new(DeviceSpec::Cpu, T::DTYPE, size)
}

/// Compile `ast`, run it once with no variables and return the contents of slot 0.
pub fn run_f32(ast: &Src, inputs: &[&[f32]], out_size: usize) -> Vec<f32> {
    let out = empty::<f32>(out_size);
    let mut buffers = vec![out.clone()];
    buffers.extend(inputs.iter().map(|values| Buffer::from_slice(values).expect("input")));
    interpreter(ast, &CompileConfig::default()).run(&buffers, &HashMap::new()).expect("run");
    out.to_vec().expect("read")
}
