//! `sgemm`: a BLAS-like, register-blocked batched matmul path used when
//! `batchSize > 1` and memory is contiguous (§4.2). Falls back to the
//! per-row `matmul` kernel otherwise — same numeric contract, just tiled
//! for throughput, named after `llamafileSgemm` in the source material
//! this behavior is grounded on.

use super::matmul::{matmul_f32_f32_f32, matmul_q80_q40_f32};
use crate::quant::{BlockQ40, BlockQ80, Q80_BLOCK_SIZE};

/// Register-block tile shape: `RM` output rows by `RN` batch columns per
/// micro-kernel application.
const RM: usize = 4;
const RN: usize = 4;

/// f32 x f32 batched matmul: `y[b][i] = sum_j W[i*n+j] * x[b][j]` for
/// `b in 0..batchSize`. `x` and `y` are row-major `[batchSize, n]` /
/// `[batchSize, d]`. Falls back to per-row matmul when `batch_size == 1`.
pub fn sgemm_f32(
    y: &mut [f32],
    x: &[f32],
    w: &[f32],
    n: usize,
    d: usize,
    batch_size: usize,
    n_threads: usize,
    thread_index: usize,
) {
    if batch_size == 1 {
        matmul_f32_f32_f32(y, x, w, n, d, n_threads, thread_index);
        return;
    }

    let (row_start, row_end) = crate::kernel::split_range(d, n_threads, thread_index);
    let mut row_tile = row_start;
    while row_tile < row_end {
        let rows = RM.min(row_end - row_tile);
        let mut batch_tile = 0;
        while batch_tile < batch_size {
            let cols = RN.min(batch_size - batch_tile);
            for ri in 0..rows {
                let i = row_tile + ri;
                let w_row = &w[i * n..(i + 1) * n];
                for ci in 0..cols {
                    let b = batch_tile + ci;
                    let x_row = &x[b * n..(b + 1) * n];
                    let sum: f32 = w_row.iter().zip(x_row.iter()).map(|(a, c)| a * c).sum();
                    y[b * d + i] = sum;
                }
            }
            batch_tile += RN;
        }
        row_tile += RM;
    }
}

/// q80 activations x q40 weights, batched. Falls back to the per-row
/// kernel for `batch_size == 1`.
pub fn sgemm_q80_q40(
    y: &mut [f32],
    x: &[BlockQ80],
    w: &[BlockQ40],
    n: usize,
    d: usize,
    batch_size: usize,
    n_threads: usize,
    thread_index: usize,
) {
    if batch_size == 1 {
        matmul_q80_q40_f32(y, x, w, n, d, n_threads, thread_index);
        return;
    }
    let blocks_per_row = n / Q80_BLOCK_SIZE;
    let (row_start, row_end) = crate::kernel::split_range(d, n_threads, thread_index);
    for i in row_start..row_end {
        let w_row = &w[i * blocks_per_row..(i + 1) * blocks_per_row];
        for b in 0..batch_size {
            let x_row = &x[b * blocks_per_row..(b + 1) * blocks_per_row];
            let mut row_out = [0.0f32; 1];
            matmul_q80_q40_f32(&mut row_out, x_row, w_row, n, 1, 1, 0);
            y[b * d + i] = row_out[0];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::{quantize_f32_to_q40, quantize_f32_to_q80};

    fn lcg(seed: &mut u64) -> f32 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        (((*seed >> 33) as u32) as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    #[test]
    fn sgemm_f32_matches_per_row_matmul() {
        let n = 32usize;
        let d = 128usize;
        let batch = 8usize;
        let mut seed = 11u64;
        let x: Vec<f32> = (0..batch * n).map(|_| lcg(&mut seed)).collect();
        let w: Vec<f32> = (0..d * n).map(|_| lcg(&mut seed)).collect();

        let mut reference = vec![0.0f32; batch * d];
        for b in 0..batch {
            matmul_f32_f32_f32(
                &mut reference[b * d..(b + 1) * d],
                &x[b * n..(b + 1) * n],
                &w,
                n,
                d,
                1,
                0,
            );
        }

        let mut y = vec![0.0f32; batch * d];
        sgemm_f32(&mut y, &x, &w, n, d, batch, 1, 0);

        for b in 0..batch {
            for i in 0..d {
                let a = reference[b * d + i];
                let got = y[b * d + i];
                assert!((a - got).abs() <= 0.01, "{} vs {}", a, got);
            }
        }
    }

    #[test]
    fn sgemm_q80_q40_matches_per_row_matmul() {
        let n = 256usize;
        let d = 128usize;
        let batch = 8usize;
        let mut seed = 5u64;
        let x: Vec<f32> = (0..batch * n).map(|_| lcg(&mut seed)).collect();
        let w: Vec<f32> = (0..d * n).map(|_| lcg(&mut seed)).collect();

        let blocks_per_row_80 = n / Q80_BLOCK_SIZE;
        let mut xq = vec![BlockQ80::ZERO; batch * blocks_per_row_80];
        for b in 0..batch {
            quantize_f32_to_q80(
                &x[b * n..(b + 1) * n],
                &mut xq[b * blocks_per_row_80..(b + 1) * blocks_per_row_80],
                n,
                1,
                0,
            );
        }
        let blocks_per_row_40 = n / crate::quant::Q40_BLOCK_SIZE;
        let mut wq = vec![BlockQ40::ZERO; d * blocks_per_row_40];
        for row in 0..d {
            quantize_f32_to_q40(
                &w[row * n..(row + 1) * n],
                &mut wq[row * blocks_per_row_40..(row + 1) * blocks_per_row_40],
                n,
                1,
                0,
            );
        }

        let mut reference = vec![0.0f32; batch * d];
        for b in 0..batch {
            matmul_q80_q40_f32(
                &mut reference[b * d..(b + 1) * d],
                &xq[b * blocks_per_row_80..(b + 1) * blocks_per_row_80],
                &wq,
                n,
                d,
                1,
                0,
            );
        }

        let mut y = vec![0.0f32; batch * d];
        sgemm_q80_q40(&mut y, &xq, &wq, n, d, batch, 1, 0);

        for i in 0..reference.len() {
            assert!((reference[i] - y[i]).abs() <= 1.5, "{} vs {}", reference[i], y[i]);
        }
    }
}
