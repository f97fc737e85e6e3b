use super::*;

/// Host scalar types that map onto a tessera element type.
///
/// Values are moved in and out of device buffers in little-endian byte order.
pub trait HasDType: Copy + Sized {
    const DTYPE: DType;

    fn write_le(&self, out: &mut Vec<u8>);

    /// Decode from exactly `DTYPE.bytes()` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_dtype_ext {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(impl HasDType for $ty {
            const DTYPE: DType = $dtype;

            fn write_le(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }
        })*
    };
}

impl_dtype_ext! {
    i8 => DType::Int8, i16 => DType::Int16, i32 => DType::Int32, i64 => DType::Int64,
    u8 => DType::UInt8, u16 => DType::UInt16, u32 => DType::UInt32, u64 => DType::UInt64,
    f32 => DType::Float32, f64 => DType::Float64,
}

impl HasDType for bool {
    const DTYPE: DType = DType::Bool;

    fn write_le(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Encode a host slice into a little-endian byte vector.
pub fn to_bytes<T: HasDType>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::DTYPE.bytes());
    for v in values {
        v.write_le(&mut out);
    }
    out
}

/// Decode a little-endian byte slice into host values.
pub fn from_bytes<T: HasDType>(bytes: &[u8]) -> Vec<T> {
    let width = T::DTYPE.bytes();
    bytes.chunks_exact(width).map(T::read_le).collect()
}
