//! RMS normalization kernels (§4.2).

use crate::kernel::split_range;
use crate::quant::{f16_to_f32, BlockQ80, Q80_BLOCK_SIZE};

/// `1/sqrt(mean(x^2) + eps)`. Tolerates `k` of any size (no SIMD tail to
/// worry about in the scalar reference).
pub fn inv_rms(x: &[f32], k: usize, epsilon: f32) -> f32 {
    let sum: f32 = x[..k].iter().map(|v| v * v).sum();
    let mean = sum / k as f32 + epsilon;
    1.0 / mean.sqrt()
}

/// `y = w * (invRms * x)`, f32 input, this thread's column range only.
pub fn rms_norm_f32(
    y: &mut [f32],
    x: &[f32],
    inv_rms: f32,
    w: &[f32],
    k: usize,
    n_threads: usize,
    thread_index: usize,
) {
    let (start, end) = split_range(k, n_threads, thread_index);
    for i in start..end {
        y[i] = w[i] * (inv_rms * x[i]);
    }
}

/// Same, but `x` is a Q80-quantized row, dequantized on the fly.
/// Threaded over whole Q80 blocks.
pub fn rms_norm_q80_f32(
    y: &mut [f32],
    x: &[BlockQ80],
    inv_rms: f32,
    w: &[f32],
    k: usize,
    n_threads: usize,
    thread_index: usize,
) {
    assert_eq!(k % Q80_BLOCK_SIZE, 0);
    let n_blocks = k / Q80_BLOCK_SIZE;
    let (start, end) = split_range(n_blocks, n_threads, thread_index);
    for i in start..end {
        let d = f16_to_f32(x[i].d);
        for j in 0..Q80_BLOCK_SIZE {
            let idx = i * Q80_BLOCK_SIZE + j;
            y[idx] = w[idx] * (inv_rms * d * x[i].qs[j] as f32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::quantize_f32_to_q80;

    #[test]
    fn inv_rms_matches_reference_value() {
        let x = [0.1, 0.3, 0.2, 0.4, 0.6, 0.5, 0.0, 0.8];
        let r = inv_rms(&x, x.len(), 1e-5);
        assert!((r - 1.0 / 0.4402).abs() < 1e-3, "got {}", r);
    }

    #[test]
    fn rms_norm_is_scale_equivariant() {
        let k = 32;
        let x: Vec<f32> = (0..k).map(|i| (i as f32 - 16.0) * 0.1).collect();
        let w = vec![1.0f32; k];
        let r = inv_rms(&x, k, 1e-5);
        let mut y1 = vec![0.0f32; k];
        rms_norm_f32(&mut y1, &x, r, &w, k, 1, 0);

        let alpha = 3.7f32;
        let xs: Vec<f32> = x.iter().map(|v| v * alpha).collect();
        let r2 = inv_rms(&xs, k, 1e-5);
        let mut y2 = vec![0.0f32; k];
        rms_norm_f32(&mut y2, &xs, r2, &w, k, 1, 0);

        for (a, b) in y1.iter().zip(y2.iter()) {
            assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
    }

    #[test]
    fn q80_path_matches_f32_path_within_quant_error() {
        let k = 64;
        let x: Vec<f32> = (0..k).map(|i| (i as f32 / k as f32) - 0.5).collect();
        let w = vec![1.0f32; k];
        let r = inv_rms(&x, k, 1e-5);

        let mut y_ref = vec![0.0f32; k];
        rms_norm_f32(&mut y_ref, &x, r, &w, k, 1, 0);

        let mut blocks = vec![crate::quant::BlockQ80::ZERO; k / Q80_BLOCK_SIZE];
        quantize_f32_to_q80(&x, &mut blocks, k, 1, 0);
        let mut y_q = vec![0.0f32; k];
        rms_norm_q80_f32(&mut y_q, &blocks, r, &w, k, 1, 0);

        for (a, b) in y_ref.iter().zip(y_q.iter()) {
            assert!((a - b).abs() < 0.05, "{} vs {}", a, b);
        }
    }
}
