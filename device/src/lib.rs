pub mod allocator;
pub mod buffer;
pub mod error;

#[cfg(test)]
mod test;

pub use allocator::{Allocator, CpuAllocator, RawBuffer, allocator_for};
pub use buffer::{Buffer, BufferId};
pub use error::{Error, Result};
pub use tessera_dtype::DeviceSpec;
