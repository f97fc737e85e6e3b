//! Intermediate representation for the tessera compiler.
//!
//! # Module Organization
//!
//! - [`sint`] - Symbolic integers over bounded variables
//! - [`shape`] - View and ShapeTracker algebra
//! - [`ast`] - Operation trees produced by the scheduler
//! - [`types`] - Constants and the operator vocabulary
//! - [`uop`] - Hash-consed micro-op arena and typed constructors
//! - [`pattern`] - Rule tables matched by node kind
//! - [`rewrite`] - Fixed-point rewrite engine
//! - [`error`] - Error types and result handling

pub mod ast;
pub mod error;
pub mod pattern;
pub mod rewrite;
pub mod shape;
pub mod sint;
pub mod types;
pub mod uop;


pub use ast::{LazyOp, LazyOpKind, Src};
pub use error::{Error, Result};
pub use pattern::{PatternMatcher, RewriteContext, Rule};
pub use rewrite::graph_rewrite;
pub use shape::{Shape, ShapeTracker, View, merge_views};
pub use sint::{SInt, Variable, sint_prod};
pub use types::{BinaryOp, ConstValue, ConstValueHash, ReduceOp, TernaryOp, UnaryOp};
pub use uop::{LoopAxis, LoopKind, Op, OpKind, UOp, UOpGraph, UOpId};

pub use tessera_dtype::DType;
