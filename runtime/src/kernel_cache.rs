//! Kernel deduplication cache.
//!
//! Maps (operation tree, device) pairs to compiled kernels. Trees are
//! compared structurally, so a repeated schedule compiles each kernel once
//! and two trees whose hashes collide still get their own entries. The
//! cache is an explicit value owned by the realization context rather than
//! a process-wide global.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tessera_ir::Src;
use tessera_schedule::Kernel;
use tracing::trace;

use crate::kernel::CompiledKernel;

/// Cached kernel that can be reused across schedules.
#[derive(Debug)]
pub struct CachedKernel {
    /// The compiled instruction list and launch interface.
    pub kernel: Rc<Kernel>,
    /// The executable program.
    pub program: Box<dyn CompiledKernel>,
    /// Device string (e.g., "CPU").
    pub device: String,
}

/// Cache key: (operation tree, device string).
type KernelKey = (Src, String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

#[derive(Debug, Default)]
pub struct KernelCache {
    kernels: HashMap<KernelKey, Rc<CachedKernel>>,
    stats: CacheStats,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or compile the kernel for `ast` on `device`.
    ///
    /// # Errors
    ///
    /// Returns the compile function's error if compilation fails; nothing is
    /// cached in that case.
    pub fn get_or_compile<F, E>(&mut self, ast: &Src, device: &str, compile: F) -> Result<Rc<CachedKernel>, E>
    where
        F: FnOnce() -> Result<CachedKernel, E>,
    {
        let key = (ast.clone(), device.to_string());
        if let Some(cached) = self.kernels.get(&key) {
            self.stats.hits += 1;
            trace!(key = ast.key(), device, "kernel cache hit");
            return Ok(Rc::clone(cached));
        }
        self.stats.misses += 1;
        let cached = Rc::new(compile()?);
        self.kernels.insert(key, Rc::clone(&cached));
        Ok(cached)
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Clear all cached kernels.
    pub fn clear(&mut self) {
        self.kernels.clear();
    }

    /// Remove kernels whose trees are not in `live`.
    pub fn retain_live(&mut self, live: &HashSet<Src>) {
        self.kernels.retain(|(ast, _), _| live.contains(ast));
    }
}
