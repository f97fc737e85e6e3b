use std::cell::OnceCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tessera_dtype::{DType, DeviceSpec, HasDType, ext};

use crate::allocator::{Allocator, RawBuffer, allocator_for};
use crate::error::{AlreadyBorrowedSnafu, NotAllocatedSnafu, Result, SizeMismatchSnafu};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

/// Stable identity of a logical buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

struct BufferData {
    raw: OnceCell<RawBuffer>,
    allocator: OnceCell<Rc<dyn Allocator>>,
}

impl fmt::Debug for BufferData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferData").field("allocated", &self.raw.get().is_some()).finish()
    }
}

impl Drop for BufferData {
    fn drop(&mut self) {
        if let (Some(raw), Some(allocator)) = (self.raw.take(), self.allocator.get()) {
            allocator.free(raw);
        }
    }
}

/// A device allocation identified by device, element type and element count.
///
/// Memory is allocated on first access. Clones share the same allocation and
/// identity. This type is `!Send + !Sync`: execution is single-threaded.
#[derive(Debug, Clone)]
pub struct Buffer {
    id: BufferId,
    data: Rc<BufferData>,
    device: DeviceSpec,
    dtype: DType,
    size: usize,
}

impl Buffer {
    /// Create a new buffer of `size` elements without allocating it.
    pub fn new(device: DeviceSpec, dtype: DType, size: usize) -> Self {
        let id = BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed));
        Self { id, data: Rc::new(BufferData { raw: OnceCell::new(), allocator: OnceCell::new() }), device, dtype, size }
    }

    /// Create a host buffer initialized from `values`.
    pub fn from_slice<T: HasDType>(values: &[T]) -> Result<Self> {
        let buffer = Self::new(DeviceSpec::Cpu, T::DTYPE, values.len());
        buffer.copyin(&ext::to_bytes(values))?;
        Ok(buffer)
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn device(&self) -> DeviceSpec {
        self.device
    }

    pub fn dtype(&self) -> DType {
        self.dtype.clone()
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of the allocation in bytes.
    pub fn nbytes(&self) -> usize {
        self.size * self.dtype.bytes()
    }

    pub fn is_allocated(&self) -> bool {
        self.data.raw.get().is_some()
    }

    pub fn ensure_allocated(&self) -> Result<()> {
        if self.data.raw.get().is_some() {
            return Ok(());
        }
        let allocator = match self.data.allocator.get() {
            Some(allocator) => allocator.clone(),
            None => {
                let allocator = allocator_for(&self.device)?;
                let _ = self.data.allocator.set(allocator.clone());
                allocator
            }
        };
        let raw = allocator.alloc(self.nbytes())?;
        tracing::trace!(id = %self.id, device = %self.device, nbytes = self.nbytes(), "buffer allocated");
        if let Err(raw) = self.data.raw.set(raw) {
            allocator.free(raw);
        }
        Ok(())
    }

    fn raw(&self) -> Result<&RawBuffer> {
        self.data.raw.get().ok_or_else(|| NotAllocatedSnafu { id: self.id.0 }.build())
    }

    /// Copy host bytes into this buffer, allocating it if needed.
    pub fn copyin(&self, src: &[u8]) -> Result<()> {
        self.ensure_allocated()?;
        let expected = self.nbytes();
        snafu::ensure!(expected == src.len(), SizeMismatchSnafu { expected, actual: src.len() });
        self.with_bytes_mut(|bytes| bytes.copy_from_slice(src))
    }

    /// Copy the contents of this buffer to host memory.
    pub fn copyout(&self, dst: &mut [u8]) -> Result<()> {
        let expected = self.nbytes();
        snafu::ensure!(expected == dst.len(), SizeMismatchSnafu { expected, actual: dst.len() });
        self.with_bytes(|bytes| dst.copy_from_slice(bytes))
    }

    /// Read the whole buffer as host values.
    pub fn to_vec<T: HasDType>(&self) -> Result<Vec<T>> {
        self.with_bytes(|bytes| ext::from_bytes(bytes))
    }

    /// Borrow the raw bytes. The buffer must be allocated.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        match self.raw()? {
            RawBuffer::Host { data } => {
                let data = data.try_borrow().map_err(|_| AlreadyBorrowedSnafu { id: self.id.0 }.build())?;
                Ok(f(&data))
            }
        }
    }

    /// Mutably borrow the raw bytes, allocating on first use.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        self.ensure_allocated()?;
        match self.raw()? {
            RawBuffer::Host { data } => {
                let mut data = data.try_borrow_mut().map_err(|_| AlreadyBorrowedSnafu { id: self.id.0 }.build())?;
                Ok(f(&mut data))
            }
        }
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Buffer {}

impl Hash for Buffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {} {}x{}>", self.id, self.device, self.size, self.dtype)
    }
}
