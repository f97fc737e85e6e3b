use smallvec::SmallVec;
use snafu::Snafu;
use tessera_dtype::DType;

use crate::sint::SInt;
use crate::types::{BinaryOp, UnaryOp};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    // ------------------------------------------------------------------
    // Shape errors
    // ------------------------------------------------------------------
    #[snafu(display("reshape size mismatch: input size {input_size} != output size {output_size}"))]
    ReshapeSizeMismatch { input_size: SInt, output_size: SInt },

    #[snafu(display("reshape contains negative dimension in {shape:?}"))]
    ReshapeNegativeDimension { shape: Vec<SInt> },

    /// Symbolic dimensions that cannot be checked against the source shape.
    #[snafu(display("cannot reshape {from:?} to {to:?}: symbolic sizes do not agree"))]
    SymbolicReshape { from: Vec<SInt>, to: Vec<SInt> },

    #[snafu(display("expand dimension mismatch: input has {input_dims} dimensions, output has {output_dims}"))]
    ExpandRankMismatch { input_dims: usize, output_dims: usize },

    #[snafu(display("expand invalid: dimension {dim} has size {input} but needs to expand to {output}"))]
    ExpandInvalidDimension { dim: usize, input: SInt, output: SInt },

    #[snafu(display("invalid permutation {permutation:?}: expected permutation of 0..{expected_dims}"))]
    PermuteInvalidPermutation { permutation: Vec<usize>, expected_dims: usize },

    #[snafu(display("pad dimension mismatch: padding has {padding_dims} dimensions but shape has {shape_dims}"))]
    PadRankMismatch { padding_dims: usize, shape_dims: usize },

    #[snafu(display("shrink bounds violation: dimension {dim} has range [{begin}, {end}) but size is {size}"))]
    ShrinkBoundsViolation { dim: usize, begin: SInt, end: SInt, size: SInt },

    #[snafu(display("shrink rank mismatch: {ranges} ranges for {shape_dims} dimensions"))]
    ShrinkRankMismatch { ranges: usize, shape_dims: usize },

    #[snafu(display("stride multiplier on dimension {dim} must be nonzero"))]
    StrideZero { dim: usize },

    #[snafu(display("stride rank mismatch: {multipliers} multipliers for {shape_dims} dimensions"))]
    StrideRankMismatch { multipliers: usize, shape_dims: usize },

    /// A mask bound depends on variables in a way that cannot be decided.
    #[snafu(display("symbolic mask bound {bound} is not decidable"))]
    SymbolicMask { bound: SInt },

    #[snafu(display("axis {axis} is out of range for {shape_dims} dimensions"))]
    AxisOutOfRange { axis: usize, shape_dims: usize },

    #[snafu(display("bind value {value} is outside valid range [{min}, {max}]"))]
    BindValueOutOfRange { value: i64, min: i64, max: i64 },

    // ------------------------------------------------------------------
    // Operation trees
    // ------------------------------------------------------------------
    #[snafu(display("{op} operands have different shapes: {lhs:?} vs {rhs:?}"))]
    OperandShapeMismatch { op: &'static str, lhs: Vec<SInt>, rhs: Vec<SInt> },

    #[snafu(display("{op} operands have different dtypes: {lhs} vs {rhs}"))]
    OperandDTypeMismatch { op: &'static str, lhs: DType, rhs: DType },

    // ------------------------------------------------------------------
    // Micro-op construction
    // ------------------------------------------------------------------
    #[snafu(display("dtype mismatch: cannot perform {op} on {lhs} and {rhs}"))]
    DTypeMismatch { op: BinaryOp, lhs: DType, rhs: DType },

    #[snafu(display("invalid dtype for {operation}: {dtype}"))]
    InvalidDTypeForUnaryOp { operation: UnaryOp, dtype: DType },

    #[snafu(display("invalid dtypes for {operation}: {dtypes:?}"))]
    InvalidDTypeForBinaryOp { operation: BinaryOp, dtypes: SmallVec<[DType; 2]> },

    #[snafu(display("index operand must have Index dtype, got {actual}"))]
    IndexTypeMismatch { actual: DType },

    #[snafu(display("{what} must be a pointer, got {actual}"))]
    ExpectedPointer { what: &'static str, actual: DType },

    #[snafu(display("condition must be Bool, got {actual}"))]
    ConditionNotBool { actual: DType },

    // ------------------------------------------------------------------
    // Rewrite engine
    // ------------------------------------------------------------------
    /// The rule table failed to reach a fixed point.
    #[snafu(display("graph rewrite did not reach a fixed point after {passes} passes"))]
    RewriteNonTermination { passes: usize },

    #[snafu(display("rule '{rule}' kept rewriting node {node} past {limit} applications"))]
    RuleLoop { rule: &'static str, node: usize, limit: usize },
}
