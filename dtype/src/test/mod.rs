use proptest::prelude::*;
use test_case::test_case;

use crate::ext::{from_bytes, to_bytes};
use crate::*;

#[test_case(DType::Bool, 1; "bool")]
#[test_case(DType::Int32, 4; "int32")]
#[test_case(DType::UInt64, 8; "uint64")]
#[test_case(DType::Float32, 4; "float32")]
#[test_case(DType::Index, 8; "index")]
fn scalar_bytes(dtype: DType, bytes: usize) {
    assert_eq!(dtype.bytes(), bytes);
}

#[test]
fn classification() {
    assert!(DType::Int8.is_signed() && DType::Int8.is_int());
    assert!(DType::UInt16.is_unsigned() && !DType::UInt16.is_signed());
    assert!(DType::Index.is_int() && !DType::Index.is_signed());
    assert!(DType::Float64.is_float() && !DType::Float64.is_int());
    assert!(DType::Bool.is_bool());
}

#[test]
fn pointer_base() {
    let ptr = DType::Float32.ptr(Some(16), AddrSpace::Global);
    assert!(ptr.is_ptr());
    assert_eq!(ptr.base(), ScalarDType::Float32);
    assert_eq!(ptr.bytes(), 8);
    assert_eq!(ptr.to_string(), "f32*");
    assert_eq!(ptr.clone().ptr(None, AddrSpace::Local).base(), ScalarDType::Float32);
}

#[test_case("cpu", DeviceSpec::Cpu; "cpu")]
#[test_case("CUDA:1", DeviceSpec::Cuda { device_id: 1 }; "cuda")]
#[test_case("metal", DeviceSpec::Metal { device_id: 0 }; "metal")]
fn parse_device(s: &str, expected: DeviceSpec) {
    assert_eq!(s.parse::<DeviceSpec>().unwrap(), expected);
}

#[test]
fn parse_device_rejects_unknown() {
    assert!("tpu".parse::<DeviceSpec>().is_err());
}

proptest! {
    #[test]
    fn f32_bytes_roundtrip(values in prop::collection::vec(any::<f32>().prop_filter("nan", |v| !v.is_nan()), 0..32)) {
        prop_assert_eq!(from_bytes::<f32>(&to_bytes(&values)), values);
    }

    #[test]
    fn i64_bytes_roundtrip(values in prop::collection::vec(any::<i64>(), 0..32)) {
        prop_assert_eq!(from_bytes::<i64>(&to_bytes(&values)), values);
    }
}
