use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("size mismatch: expected {expected} bytes, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// No allocator is registered for this device.
    #[snafu(display("invalid device: {device}"))]
    InvalidDevice { device: String },

    #[snafu(display("buffer {id} is not allocated"))]
    NotAllocated { id: u64 },

    #[snafu(display("element {index} out of bounds for buffer {id} with {size} elements"))]
    OutOfBounds { id: u64, index: usize, size: usize },

    #[snafu(display("buffer {id} is already borrowed"))]
    AlreadyBorrowed { id: u64 },
}
