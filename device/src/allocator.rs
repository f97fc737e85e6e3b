use std::cell::RefCell;
use std::rc::Rc;

use tessera_dtype::DeviceSpec;

use crate::error::{InvalidDeviceSnafu, Result};

/// Opaque handle to device memory.
///
/// Uses `RefCell` for interior mutability with runtime borrow checking.
/// Safe for single-threaded use (Buffer is !Send + !Sync).
#[derive(Debug)]
pub enum RawBuffer {
    Host { data: RefCell<Box<[u8]>> },
}

impl RawBuffer {
    pub fn size(&self) -> usize {
        match self {
            RawBuffer::Host { data } => data.borrow().len(),
        }
    }
}

pub trait Allocator: std::fmt::Debug {
    fn alloc(&self, size: usize) -> Result<RawBuffer>;
    fn free(&self, _buffer: RawBuffer) {}
    fn name(&self) -> &str;
}

/// Zero-initialized host memory.
#[derive(Debug, Clone)]
pub struct CpuAllocator;

impl Allocator for CpuAllocator {
    fn alloc(&self, size: usize) -> Result<RawBuffer> {
        tracing::trace!(size, "host allocation");
        let data = vec![0u8; size].into_boxed_slice();
        Ok(RawBuffer::Host { data: RefCell::new(data) })
    }

    fn name(&self) -> &str {
        "CPU"
    }
}

/// Resolve the allocator that backs `device`.
///
/// Only host memory is available in-process; other devices are the concern
/// of an external runtime.
pub fn allocator_for(device: &DeviceSpec) -> Result<Rc<dyn Allocator>> {
    match device {
        DeviceSpec::Cpu => Ok(Rc::new(CpuAllocator)),
        other => InvalidDeviceSnafu { device: other.to_string() }.fail(),
    }
}
