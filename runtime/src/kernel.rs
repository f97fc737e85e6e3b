//! Generic kernel execution interface.

use std::collections::HashMap;

use tessera_device::Buffer;

use crate::Result;

/// A compiled kernel ready for execution.
///
/// The interpreter is the only in-process implementation; device backends
/// implement the same interface outside this crate.
pub trait CompiledKernel: std::fmt::Debug {
    /// Run one launch.
    ///
    /// `buffers` follow the kernel's global argument order. `vars` binds the
    /// kernel's launch-time variables by name.
    fn execute(&self, buffers: &[Buffer], vars: &HashMap<String, i64>) -> Result<()>;

    /// Get the kernel name for debugging.
    fn name(&self) -> &str;
}
