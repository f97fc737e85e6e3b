//! Tensor realization.
//!
//! A [`Realizer`] drives the pipeline for a set of tensors:
//! 1. **Scheduling** - split the lazy graph into fused kernels
//! 2. **Memory planning** - share storage between intermediates
//! 3. **Compilation** - lower, simplify and linearize each operation tree,
//!    memoized by tree key in the realizer's kernel cache
//! 4. **Execution** - run each kernel in schedule order

use std::rc::Rc;

use bon::bon;
use snafu::ResultExt;
use tessera_runtime::{CachedKernel, CompiledKernel, Interpreter, KernelCache};
use tessera_schedule::{CompileConfig, compile_kernel};
use tracing::debug;

use crate::config::ScheduleConfig;
use crate::error::*;
use crate::memory_planner::{apply_buffer_replacements, plan_memory};
use crate::schedule::{ScheduleItem, create_schedule};
use crate::Tensor;

/// Compilation context for realizing tensors.
///
/// Owns the kernel cache, so realizing structurally identical graphs twice
/// through one realizer compiles each kernel once.
#[derive(Debug, Default)]
pub struct Realizer {
    compile: CompileConfig,
    schedule: ScheduleConfig,
    cache: KernelCache,
}

#[bon]
impl Realizer {
    #[builder]
    pub fn new(#[builder(default)] compile: CompileConfig, #[builder(default)] schedule: ScheduleConfig) -> Self {
        Self { compile, schedule, cache: KernelCache::new() }
    }

    /// Configuration from `TESSERA_*` environment variables.
    pub fn from_env() -> Self {
        Self::builder().compile(CompileConfig::from_env()).schedule(ScheduleConfig::from_env()).build()
    }

    pub fn cache(&self) -> &KernelCache {
        &self.cache
    }

    pub fn compile_config(&self) -> &CompileConfig {
        &self.compile
    }

    pub fn schedule_config(&self) -> &ScheduleConfig {
        &self.schedule
    }

    /// Compute every tensor in `tensors`.
    ///
    /// After this returns, each tensor that is not a view reads from a
    /// realized buffer.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The graph cannot be scheduled consistently
    /// - A kernel fails to compile
    /// - A kernel fails to execute
    pub fn realize(&mut self, tensors: &[&Tensor]) -> Result<()> {
        let mut schedule = create_schedule(tensors, &self.schedule)?;
        if schedule.is_empty() {
            return Ok(());
        }
        if self.schedule.memory_planner {
            let plan = plan_memory(&schedule);
            apply_buffer_replacements(&mut schedule.items, &plan.buffer_replace);
        }
        self.run_schedule(&schedule.items)?;
        schedule.commit(!self.schedule.memory_planner);
        Ok(())
    }

    /// Compile (or fetch) and execute each item in order.
    #[tracing::instrument(skip_all, fields(items = items.len()))]
    pub fn run_schedule(&mut self, items: &[ScheduleItem]) -> Result<()> {
        for item in items {
            let device = item.outputs.first().map(|b| b.device().to_string()).unwrap_or_default();
            let compile = &self.compile;
            let cached = self.cache.get_or_compile(&item.ast, &device, || -> Result<CachedKernel> {
                let kernel = Rc::new(compile_kernel(&item.ast, compile).context(CompileSnafu)?);
                let program = Interpreter::new(kernel.clone()).context(RuntimeSnafu)?;
                Ok(CachedKernel { kernel, program: Box::new(program), device: device.clone() })
            })?;

            let buffers: Vec<_> = item.buffers().cloned().collect();
            cached.program.execute(&buffers, &item.var_vals).context(RuntimeSnafu)?;
            debug!(
                kernel = cached.program.name(),
                ops = cached.kernel.estimates.ops,
                mem = cached.kernel.estimates.mem,
                "executed kernel"
            );
        }
        Ok(())
    }
}

impl Tensor {
    /// Realize (execute) this tensor's computation graph with a fresh
    /// [`Realizer`] configured from the environment.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let a = Tensor::from_slice(&[1.0f32, 2.0, 3.0])?;
    /// let b = Tensor::from_slice(&[4.0f32, 5.0, 6.0])?;
    /// let c = (&a + &b).realize()?;
    /// // c's buffer now contains [5.0, 7.0, 9.0]
    /// ```
    pub fn realize(self) -> Result<Self> {
        self.realize_with(&mut Realizer::from_env())
    }

    pub fn realize_with(self, realizer: &mut Realizer) -> Result<Self> {
        realizer.realize(&[&self])?;
        Ok(self)
    }
}
