//! Element-wise activations: SiLU, GELU, and the `MUL`/`CAST` op bodies
//! (§4.2, §4.4).

use crate::kernel::split_range;
use crate::quant::{dequantize_q40_to_f32, dequantize_q80_to_f32, quantize_f32_to_q80};
use crate::quant::{BlockQ40, BlockQ80};

const SQRT_2_OVER_PI: f32 = 0.7978845608028654;

/// `x * sigmoid(x)`, in place, this thread's range only.
pub fn silu(x: &mut [f32], n: usize, n_threads: usize, thread_index: usize) {
    let (start, end) = split_range(n, n_threads, thread_index);
    for v in &mut x[start..end] {
        *v *= 1.0 / (1.0 + (-*v).exp());
    }
}

/// Tanh-approximation GELU, in place.
pub fn gelu(x: &mut [f32], n: usize, n_threads: usize, thread_index: usize) {
    let (start, end) = split_range(n, n_threads, thread_index);
    for v in &mut x[start..end] {
        let x3 = *v * *v * *v;
        *v = 0.5 * *v * (1.0 + (SQRT_2_OVER_PI * (*v + 0.044715 * x3)).tanh());
    }
}

/// `y[i] *= w[i]` (the `MUL` op: `mul(d, l)` hadamard with a buffer).
pub fn mul(y: &mut [f32], w: &[f32], n: usize, n_threads: usize, thread_index: usize) {
    let (start, end) = split_range(n, n_threads, thread_index);
    for i in start..end {
        y[i] *= w[i];
    }
}

/// `CAST` op bodies: every pipe/buffer type conversion the graph needs,
/// including quantizing and dequantizing casts (§4.4).
pub fn cast_f32_to_q80(x: &[f32], y: &mut [BlockQ80], n: usize, n_threads: usize, thread_index: usize) {
    quantize_f32_to_q80(x, y, n, n_threads, thread_index);
}

pub fn cast_q80_to_f32(x: &[BlockQ80], y: &mut [f32], n: usize, n_threads: usize, thread_index: usize) {
    dequantize_q80_to_f32(x, y, n, n_threads, thread_index);
}

pub fn cast_q40_to_f32(x: &[BlockQ40], y: &mut [f32], n: usize, n_threads: usize, thread_index: usize) {
    dequantize_q40_to_f32(x, y, n, n_threads, thread_index);
}

pub fn cast_f32_to_f32(x: &[f32], y: &mut [f32], n: usize, n_threads: usize, thread_index: usize) {
    let (start, end) = split_range(n, n_threads, thread_index);
    y[start..end].copy_from_slice(&x[start..end]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silu_matches_definition() {
        let mut x = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        let n = x.len();
        let expected: Vec<f32> = x.iter().map(|v| v * (1.0 / (1.0 + (-v).exp()))).collect();
        silu(&mut x, n, 1, 0);
        for (a, b) in x.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn gelu_is_near_identity_for_large_positive_input() {
        let mut x = vec![5.0f32];
        gelu(&mut x, 1, 1, 0);
        assert!((x[0] - 5.0).abs() < 0.01);
    }

    #[test]
    fn mul_is_elementwise_product() {
        let mut y = vec![2.0, 3.0, 4.0];
        let w = vec![1.0, 2.0, 0.5];
        mul(&mut y, &w, 3, 1, 0);
        assert_eq!(y, vec![2.0, 6.0, 2.0]);
    }
}
