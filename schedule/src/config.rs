//! Kernel compilation configuration.
//!
//! Built with a bon builder; [`CompileConfig::from_env`] reads `TESSERA_*`
//! environment variables for the settings that are useful to flip while
//! debugging.

use bon::bon;

/// How output dimensions are iterated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GlobalDims {
    /// Explicit global loops around the kernel body.
    #[default]
    Loops,
    /// Launch-grid indices (`Special`), one kernel instance per output element.
    Special,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileConfig {
    /// Bound on rewrite passes before the rule set is declared non-terminating.
    pub max_rewrite_passes: usize,
    pub global_dims: GlobalDims,
    /// Type-check the final instruction list.
    pub verify: bool,
    /// Fold additive loop-invariant offsets into loop bounds.
    pub loop_hoisting: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self { max_rewrite_passes: 64, global_dims: GlobalDims::Loops, verify: true, loop_hoisting: true }
    }
}

#[bon]
impl CompileConfig {
    #[builder]
    pub fn new(
        #[builder(default = 64)] max_rewrite_passes: usize,
        #[builder(default)] global_dims: GlobalDims,
        #[builder(default = true)] verify: bool,
        #[builder(default = true)] loop_hoisting: bool,
    ) -> Self {
        Self { max_rewrite_passes, global_dims, verify, loop_hoisting }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSERA_REWRITE_PASSES` - Rewrite pass bound (default: 64)
    /// * `TESSERA_SPECIAL=1` - Iterate output dimensions with launch-grid indices
    /// * `TESSERA_NOVERIFY` - Skip the final type check
    /// * `TESSERA_NOHOIST` - Disable loop-invariant offset hoisting
    pub fn from_env() -> Self {
        let max_rewrite_passes =
            std::env::var("TESSERA_REWRITE_PASSES").ok().and_then(|s| s.parse().ok()).unwrap_or(64);
        let global_dims = match std::env::var("TESSERA_SPECIAL").as_deref() {
            Ok("1") => GlobalDims::Special,
            _ => GlobalDims::Loops,
        };
        let verify = std::env::var("TESSERA_NOVERIFY").is_err();
        let loop_hoisting = std::env::var("TESSERA_NOHOIST").is_err();

        Self { max_rewrite_passes, global_dims, verify, loop_hoisting }
    }
}
