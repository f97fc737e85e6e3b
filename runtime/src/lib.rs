//! Runtime execution for tessera kernels.
//!
//! Compiled kernels are positional instruction lists with no device syntax.
//! This crate executes them directly over host [`Buffer`](tessera_device::Buffer)s
//! with a reference [`Interpreter`], and memoizes compiled programs by
//! operation-tree key in a [`KernelCache`].

pub mod error;
pub mod interpreter;
pub mod kernel;
pub mod kernel_cache;

#[cfg(test)]
mod test;

pub use error::*;
pub use interpreter::Interpreter;
pub use kernel::CompiledKernel;
pub use kernel_cache::{CacheStats, CachedKernel, KernelCache};
