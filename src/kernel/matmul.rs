//! matmul kernels: `y[i] = sum_j W[i*n+j] * x[j]` (§4.2).
//!
//! Three quant-triple variants are required: f32 x f32 -> f32, q80 x q40
//! -> f32, and q80 x q80 -> f32 (the latter used when activations and the
//! merge buffers are both Q80). Each is threaded over output rows `d`.

use crate::kernel::split_range;
use crate::quant::{f16_to_f32, BlockQ40, BlockQ80, Q40_BLOCK_SIZE, Q80_BLOCK_SIZE};

pub fn matmul_f32_f32_f32(
    y: &mut [f32],
    x: &[f32],
    w: &[f32],
    n: usize,
    d: usize,
    n_threads: usize,
    thread_index: usize,
) {
    let (start, end) = split_range(d, n_threads, thread_index);
    for i in start..end {
        let row = &w[i * n..(i + 1) * n];
        let sum: f32 = row.iter().zip(x.iter()).map(|(a, b)| a * b).sum();
        y[i] = sum;
    }
}

/// q80 activations x q40 weights -> f32. Both operands share a block
/// layout, so the dot product is accumulated block-by-block, each
/// contributing `sum(q80.qs[k] * q40.dequantized[k]) * q80.d`.
pub fn matmul_q80_q40_f32(
    y: &mut [f32],
    x: &[BlockQ80],
    w: &[BlockQ40],
    n: usize,
    d: usize,
    n_threads: usize,
    thread_index: usize,
) {
    assert_eq!(n % Q80_BLOCK_SIZE, 0);
    assert_eq!(Q80_BLOCK_SIZE, Q40_BLOCK_SIZE);
    let n_blocks = n / Q80_BLOCK_SIZE;
    let (start, end) = split_range(d, n_threads, thread_index);

    for i in start..end {
        let w_row = &w[i * n_blocks..(i + 1) * n_blocks];
        let mut acc = 0.0f32;
        for (xb, wb) in x.iter().take(n_blocks).zip(w_row.iter()) {
            let xd = f16_to_f32(xb.d);
            let wd = f16_to_f32(wb.d);
            let mut block_sum = 0i32;
            for j in 0..Q80_BLOCK_SIZE / 2 {
                let w0 = (wb.qs[j] & 0x0F) as i32 - 8;
                let w1 = (wb.qs[j] >> 4) as i32 - 8;
                block_sum += w0 * xb.qs[j] as i32;
                block_sum += w1 * xb.qs[j + Q80_BLOCK_SIZE / 2] as i32;
            }
            acc += block_sum as f32 * xd * wd;
        }
        y[i] = acc;
    }
}

/// q80 activations x q80 weights -> f32.
pub fn matmul_q80_q80_f32(
    y: &mut [f32],
    x: &[BlockQ80],
    w: &[BlockQ80],
    n: usize,
    d: usize,
    n_threads: usize,
    thread_index: usize,
) {
    assert_eq!(n % Q80_BLOCK_SIZE, 0);
    let n_blocks = n / Q80_BLOCK_SIZE;
    let (start, end) = split_range(d, n_threads, thread_index);

    for i in start..end {
        let w_row = &w[i * n_blocks..(i + 1) * n_blocks];
        let mut acc = 0.0f32;
        for (xb, wb) in x.iter().take(n_blocks).zip(w_row.iter()) {
            let xd = f16_to_f32(xb.d);
            let wd = f16_to_f32(wb.d);
            let dot: i32 = xb
                .qs
                .iter()
                .zip(wb.qs.iter())
                .map(|(a, b)| *a as i32 * *b as i32)
                .sum();
            acc += dot as f32 * xd * wd;
        }
        y[i] = acc;
    }
}
