//! Q80: 32-element blocks of int8 + one f16 scale (§4.1).

use super::f16::{f16_to_f32, f32_to_f16, F16};

pub const Q80_BLOCK_SIZE: usize = 32;

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct BlockQ80 {
    pub d: F16,
    pub qs: [i8; Q80_BLOCK_SIZE],
}

impl BlockQ80 {
    pub const ZERO: BlockQ80 = BlockQ80 {
        d: 0,
        qs: [0; Q80_BLOCK_SIZE],
    };
}

/// Split `nBlocks` whole blocks across `nThreads`: the first `r` threads
/// take `floor(nBlocks/nThreads)+1` blocks, the rest take the floor value,
/// where `r = nBlocks % nThreads` — but per the source, the *remainder* is
/// folded into the *last* thread rather than spread over the first `r`
/// (see `quantizeF32toQ80` in `nn-quants.cpp`). This mirrors that exactly:
/// the i-th thread owns `[i*floor, (i+1)*floor)` blocks, except the last
/// thread which also absorbs `nBlocks % nThreads` extra blocks.
fn thread_block_range(n_blocks: usize, n_threads: usize, thread_index: usize) -> (usize, usize) {
    assert!(n_threads > 0);
    let blocks_per_thread = n_blocks / n_threads;
    let start = blocks_per_thread * thread_index;
    let extra = if thread_index == n_threads - 1 {
        n_blocks % n_threads
    } else {
        0
    };
    let end = start + blocks_per_thread + extra;
    (start, end)
}

/// Quantize `input[0..k)` (k a multiple of 32) into `output`, processing
/// only this thread's whole-block slice.
pub fn quantize_f32_to_q80(
    input: &[f32],
    output: &mut [BlockQ80],
    k: usize,
    n_threads: usize,
    thread_index: usize,
) {
    assert_eq!(k % Q80_BLOCK_SIZE, 0);
    let n_blocks = k / Q80_BLOCK_SIZE;
    let (start, end) = thread_block_range(n_blocks, n_threads, thread_index);

    for i in start..end {
        let x = &input[i * Q80_BLOCK_SIZE..(i + 1) * Q80_BLOCK_SIZE];
        let amax = x.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let d = amax / 127.0;
        let id = if d != 0.0 { 1.0 / d } else { 0.0 };

        let block = &mut output[i];
        block.d = f32_to_f16(d);
        for (j, v) in x.iter().enumerate() {
            block.qs[j] = (v * id).round() as i8;
        }
    }
}

/// Dequantize this thread's whole-block slice of `input` into `output`.
pub fn dequantize_q80_to_f32(
    input: &[BlockQ80],
    output: &mut [f32],
    k: usize,
    n_threads: usize,
    thread_index: usize,
) {
    assert_eq!(k % Q80_BLOCK_SIZE, 0);
    let n_blocks = k / Q80_BLOCK_SIZE;
    let (start, end) = thread_block_range(n_blocks, n_threads, thread_index);

    for i in start..end {
        let d = f16_to_f32(input[i].d);
        let y = &mut output[i * Q80_BLOCK_SIZE..(i + 1) * Q80_BLOCK_SIZE];
        for (j, slot) in y.iter_mut().enumerate() {
            *slot = input[i].qs[j] as f32 * d;
        }
    }
}

/// Single-threaded convenience wrapper used by kernels that need an
/// on-the-fly dequantize of one row.
pub fn dequantize_row(input: &[BlockQ80], output: &mut [f32], k: usize) {
    dequantize_q80_to_f32(input, output, k, 1, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_error_bounded() {
        let k = 64;
        let input: Vec<f32> = (0..k)
            .map(|i| ((i as f32) / k as f32) * 2.0 - 1.0)
            .collect();
        let mut blocks = vec![BlockQ80::ZERO; k / Q80_BLOCK_SIZE];
        quantize_f32_to_q80(&input, &mut blocks, k, 1, 0);
        let mut back = vec![0.0f32; k];
        dequantize_row(&blocks, &mut back, k);

        for block_idx in 0..(k / Q80_BLOCK_SIZE) {
            let slice = &input[block_idx * Q80_BLOCK_SIZE..(block_idx + 1) * Q80_BLOCK_SIZE];
            let amax = slice.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            let bound = amax / 254.0;
            for j in 0..Q80_BLOCK_SIZE {
                let idx = block_idx * Q80_BLOCK_SIZE + j;
                let err = (input[idx] - back[idx]).abs();
                assert!(err <= bound + 1e-6, "err {} > bound {}", err, bound);
            }
        }
    }

    #[test]
    fn thread_split_covers_all_blocks_once() {
        let n_blocks = 13;
        for n_threads in 1..=8usize {
            let mut covered = vec![false; n_blocks];
            for t in 0..n_threads {
                let (s, e) = thread_block_range(n_blocks, n_threads, t);
                for b in &mut covered[s..e] {
                    assert!(!*b, "block double-covered");
                    *b = true;
                }
            }
            assert!(covered.iter().all(|&c| c), "block left uncovered");
        }
    }
}
