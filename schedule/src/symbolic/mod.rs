//! Symbolic simplification of micro-op graphs.
//!
//! [`symbolic`] is the context-free rule table (folding, identities, index
//! arithmetic, memory and reduction rules). [`loop_hoisting`] adds the one
//! rule that needs a consumer map. Kernels are compiled with both:
//!
//! ```ignore
//! let matcher = symbolic::<HoistContext>().extend(loop_hoisting());
//! ```

pub mod bounds;
pub mod hoist;
pub mod patterns;

pub use bounds::bounds;
pub use hoist::{HoistContext, loop_hoisting};
pub use patterns::symbolic;
