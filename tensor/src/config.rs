//! Scheduling configuration.
//!
//! Mirrors [`CompileConfig`](tessera_schedule::CompileConfig): a bon builder
//! for code and [`ScheduleConfig::from_env`] for `TESSERA_*` overrides.

use bon::bon;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Reuse intermediate buffers whose liveness does not overlap.
    pub memory_planner: bool,
    /// View-stack budget for fused sources. A computed source reached through
    /// a tracker with more views is materialized instead.
    pub max_views: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { memory_planner: true, max_views: 2 }
    }
}

#[bon]
impl ScheduleConfig {
    #[builder]
    pub fn new(#[builder(default = true)] memory_planner: bool, #[builder(default = 2)] max_views: usize) -> Self {
        Self { memory_planner, max_views: max_views.max(1) }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSERA_NO_MEMORY_PLANNER` - Disable intermediate buffer reuse
    /// * `TESSERA_MAX_VIEWS` - View-stack budget (default: 2)
    pub fn from_env() -> Self {
        let memory_planner = std::env::var("TESSERA_NO_MEMORY_PLANNER").is_err();
        let max_views = std::env::var("TESSERA_MAX_VIEWS").ok().and_then(|s| s.parse().ok()).unwrap_or(2usize);

        Self { memory_planner, max_views: max_views.max(1) }
    }
}
