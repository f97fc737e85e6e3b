use snafu::Snafu;
use tessera_device::BufferId;
use tessera_dtype::DType;
use tessera_ir::SInt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("IR operation error: {source}"))]
    Ir { source: tessera_ir::Error },

    #[snafu(display("kernel compilation failed: {source}"))]
    Compile { source: tessera_schedule::Error },

    #[snafu(display("kernel execution failed: {source}"))]
    Runtime { source: tessera_runtime::Error },

    #[snafu(display("device error: {source}"))]
    Device { source: tessera_device::Error },

    // ------------------------------------------------------------------
    // Front end
    // ------------------------------------------------------------------
    #[snafu(display("axis {axis} is out of range for tensor with {ndim} dimensions"))]
    AxisOutOfRange { axis: isize, ndim: usize },

    #[snafu(display("invalid permutation: axes {axes:?} is not a valid permutation"))]
    InvalidPermutation { axes: Vec<isize> },

    #[snafu(display("multiple -1 dimensions in reshape are not allowed"))]
    MultipleInferDimensions,

    #[snafu(display("negative dimension {dim} is not allowed (except -1 for inference)"))]
    NegativeDimension { dim: isize },

    #[snafu(display("cannot infer a dimension of {shape:?} from {numel} elements"))]
    InferDimension { shape: Vec<isize>, numel: usize },

    #[snafu(display("operation '{operation}' does not support symbolic shapes"))]
    SymbolicShapeUnsupported { operation: &'static str },

    #[snafu(display("shapes {lhs:?} and {rhs:?} cannot be broadcast together"))]
    BroadcastMismatch { lhs: Vec<SInt>, rhs: Vec<SInt> },

    #[snafu(display("{operation} is not defined for {dtype}"))]
    UnsupportedDType { operation: &'static str, dtype: DType },

    #[snafu(display("matmul shape mismatch: cannot multiply {lhs:?} and {rhs:?}"))]
    DotShapeMismatch { lhs: Vec<SInt>, rhs: Vec<SInt> },

    #[snafu(display("assign target must be a realized buffer or a view of one"))]
    AssignTarget,

    #[snafu(display("tensor has no realized buffer"))]
    NotRealized,

    // ------------------------------------------------------------------
    // Schedule consistency
    // ------------------------------------------------------------------
    /// Two stores into one buffer disagree on the stored shape.
    #[snafu(display("store into buffer {buffer} has shape {actual:?}, expected {expected:?}"))]
    StoreShapeMismatch { buffer: BufferId, expected: Vec<SInt>, actual: Vec<SInt> },

    /// Two stores into one buffer disagree on the stored dtype.
    #[snafu(display("store into buffer {buffer} has dtype {actual}, expected {expected}"))]
    StoreDTypeMismatch { buffer: BufferId, expected: DType, actual: DType },

    /// The assign kernel reads its own target through a different view.
    #[snafu(display("assign into buffer {buffer} reads the target through a non-identity view"))]
    AssignAliasing { buffer: BufferId },

    #[snafu(display("variable {name} is bound to both {first} and {second}"))]
    ConflictingBinding { name: String, first: i64, second: i64 },

    #[snafu(display("schedule has a dependency cycle through {remaining} kernels"))]
    CyclicSchedule { remaining: usize },

    #[snafu(display("scheduler invariant violated: {reason}"))]
    Invariant { reason: &'static str },
}
