//! Error types for kernel execution.

use snafu::Snafu;
use tessera_dtype::DType;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("device error: {source}"))]
    Device { source: tessera_device::Error },

    #[snafu(display("kernel {kernel} takes {expected} buffers, got {actual}"))]
    ArgumentCount { kernel: String, expected: usize, actual: usize },

    #[snafu(display("buffer for slot {slot} holds {actual}, kernel expects {expected}"))]
    ArgumentDType { slot: usize, expected: DType, actual: DType },

    /// A launch-time variable has no value.
    #[snafu(display("variable '{name}' is not bound"))]
    UnboundVariable { name: String },

    #[snafu(display("index {index} out of bounds for slot {slot} with {size} elements"))]
    OutOfBounds { slot: usize, index: i64, size: usize },

    /// Arithmetic with no defined result, such as integer division by zero.
    #[snafu(display("instruction {position} ({op}) has no defined result"))]
    Evaluation { position: usize, op: String },

    /// The instruction list violates a structural invariant.
    #[snafu(display("malformed kernel at instruction {position}: {reason}"))]
    Malformed { position: usize, reason: &'static str },
}
