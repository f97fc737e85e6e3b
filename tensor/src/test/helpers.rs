//! Shared helpers for tensor tests.

use crate::{ScheduleConfig, Tensor, create_schedule};

/// Row-major `[0, 1, 2, ...]` scaled by `scale`.
pub fn iota(n: usize, scale: f32) -> Vec<f32> {
    (0..n).map(|i| i as f32 * scale).collect()
}

/// Host tensor of the given dimensions.
pub fn tensor(values: &[f32], dims: &[isize]) -> Tensor {
    Tensor::from_slice(values).unwrap().try_reshape(dims).unwrap()
}

/// Number of kernels scheduled for `tensors` under the default config.
pub fn kernel_count(tensors: &[&Tensor]) -> usize {
    create_schedule(tensors, &ScheduleConfig::default()).unwrap().len()
}

#[track_caller]
pub fn realize_f32(t: &Tensor) -> Vec<f32> {
    t.to_vec::<f32>().expect("realize failed")
}

/// Compare float slices with an absolute tolerance scaled by magnitude.
#[track_caller]
pub fn assert_close_f32(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch: {} != {}", actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let bound = tol * e.abs().max(1.0);
        assert!((a - e).abs() <= bound, "mismatch at index {i}: {a} != {e} (diff: {})", (a - e).abs());
    }
}
