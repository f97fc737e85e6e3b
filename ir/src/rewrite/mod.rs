//! Fixed-point graph rewriting.

pub mod engine;

pub use engine::{MAX_RULE_APPLICATIONS, graph_rewrite};
