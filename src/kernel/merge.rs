//! `merge_add`: sum the per-node partial results gathered over the
//! network into the accumulator buffer (§4.2, the `MergeAdd` op in
//! §4.4's block diagram — the all-to-all reduction step after row
//! matmul and after attention).

use crate::kernel::split_range;
use crate::quant::{f16_to_f32, BlockQ80, Q80_BLOCK_SIZE};

/// `acc[i] += sum_p partials[p][i]` for f32 partials laid out as
/// `[nPartials, width]` row-major.
pub fn merge_add_f32(acc: &mut [f32], partials: &[f32], width: usize, n_partials: usize, n_threads: usize, thread_index: usize) {
    let (start, end) = split_range(width, n_threads, thread_index);
    for p in 0..n_partials {
        let row = &partials[p * width..(p + 1) * width];
        for i in start..end {
            acc[i] += row[i];
        }
    }
}

/// Same reduction when partials arrive Q80-quantized (one quant block
/// dequantized at a time, accumulated into the f32 accumulator).
pub fn merge_add_q80(acc: &mut [f32], partials: &[BlockQ80], width: usize, n_partials: usize, n_threads: usize, thread_index: usize) {
    let blocks_per_row = width / Q80_BLOCK_SIZE;
    let (block_start, block_end) = split_range(blocks_per_row, n_threads, thread_index);
    for p in 0..n_partials {
        let row = &partials[p * blocks_per_row..(p + 1) * blocks_per_row];
        for b in block_start..block_end {
            let block = &row[b];
            let d = f16_to_f32(block.d);
            let base = b * Q80_BLOCK_SIZE;
            for (j, q) in block.qs.iter().enumerate() {
                acc[base + j] += *q as f32 * d;
            }
        }
    }
}
