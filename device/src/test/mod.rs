use test_case::test_case;
use tessera_dtype::{DType, DeviceSpec};

use crate::{Buffer, Error};

#[test_case(DType::Bool, 3, 3 ; "bool")]
#[test_case(DType::Int16, 3, 6 ; "int16")]
#[test_case(DType::Float64, 5, 40 ; "float64")]
#[test_case(DType::Float32, 0, 0 ; "empty")]
fn nbytes_follows_dtype(dtype: DType, size: usize, expected: usize) {
    assert_eq!(Buffer::new(DeviceSpec::Cpu, dtype, size).nbytes(), expected);
}

#[test]
fn allocation_is_lazy() {
    let buffer = Buffer::new(DeviceSpec::Cpu, DType::Float32, 16);
    assert!(!buffer.is_allocated());
    assert_eq!(buffer.nbytes(), 64);
    buffer.ensure_allocated().unwrap();
    assert!(buffer.is_allocated());
    assert_eq!(buffer.to_vec::<f32>().unwrap(), vec![0.0; 16]);
}

#[test]
fn roundtrip_values() {
    let buffer = Buffer::from_slice(&[1i32, -2, 3]).unwrap();
    assert_eq!(buffer.dtype(), DType::Int32);
    assert_eq!(buffer.to_vec::<i32>().unwrap(), vec![1, -2, 3]);
}

#[test]
fn clones_share_storage_and_identity() {
    let a = Buffer::new(DeviceSpec::Cpu, DType::UInt8, 4);
    let b = a.clone();
    a.copyin(&[1, 2, 3, 4]).unwrap();
    assert_eq!(a, b);
    assert_eq!(b.to_vec::<u8>().unwrap(), vec![1, 2, 3, 4]);
    assert_ne!(a.id(), Buffer::new(DeviceSpec::Cpu, DType::UInt8, 4).id());
}

#[test]
fn copyin_checks_size() {
    let buffer = Buffer::new(DeviceSpec::Cpu, DType::Int64, 2);
    assert!(matches!(buffer.copyin(&[0; 8]), Err(Error::SizeMismatch { expected: 16, actual: 8 })));
}

#[test]
fn read_before_allocation_fails() {
    let buffer = Buffer::new(DeviceSpec::Cpu, DType::Int64, 2);
    assert!(matches!(buffer.to_vec::<i64>(), Err(Error::NotAllocated { .. })));
}

#[test]
fn foreign_device_cannot_allocate_in_process() {
    let buffer = Buffer::new(DeviceSpec::Cuda { device_id: 0 }, DType::Float32, 4);
    assert!(matches!(buffer.ensure_allocated(), Err(Error::InvalidDevice { .. })));
}
