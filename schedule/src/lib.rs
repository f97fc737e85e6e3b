//! Kernel compilation for tessera.
//!
//! Turns one kernel's operation tree into a verified linear instruction
//! list.
//!
//! # Module Organization
//!
//! - [`lower`] - Operation tree to micro-op graph (loops, accumulators, addressing)
//! - [`symbolic`] - Simplification rules and loop-invariant offset hoisting
//! - [`linearize`] - Scope analysis, priority-aware ordering and verification
//! - [`kernel`] - The end-to-end [`compile_kernel`] pipeline
//! - [`config`] - Compilation settings
//!
//! Pattern matching and rewriting live in `tessera_ir::pattern` and
//! `tessera_ir::rewrite`; they are re-exported here for convenience.

pub mod config;
pub mod error;
pub mod kernel;
pub mod linearize;
pub mod lower;
pub mod symbolic;

#[cfg(test)]
mod test;

pub use tessera_ir::pattern;
pub use tessera_ir::rewrite;

pub use config::{CompileConfig, GlobalDims};
pub use error::{Error, Result};
pub use kernel::{Estimates, Kernel, compile_kernel};
pub use linearize::{linearize, verify_order, verify_types};
pub use lower::{GlobalArg, LoweredKernel, lower};
pub use symbolic::{HoistContext, loop_hoisting, symbolic};
