//! `embedding`: look up one token row out of the embedding table and
//! write it into the per-position working buffer (§4.2, §4.4
//! `OpCode::Embedding`).

use crate::kernel::split_range;
use crate::quant::{dequantize_q80_to_f32, BlockQ80};

/// `out[0..dim] = table[token * dim .. (token+1) * dim]`, f32 table.
pub fn embedding_f32(out: &mut [f32], token: usize, table: &[f32], dim: usize, n_threads: usize, thread_index: usize) {
    let (start, end) = split_range(dim, n_threads, thread_index);
    let row = &table[token * dim..(token + 1) * dim];
    out[start..end].copy_from_slice(&row[start..end]);
}

/// Same lookup, but the table is stored Q80 and the destination is a
/// dense f32 working buffer; the row is dequantized on the way out.
pub fn embedding_q80(
    out: &mut [f32],
    token: usize,
    table: &[BlockQ80],
    dim: usize,
    n_threads: usize,
    thread_index: usize,
) {
    let blocks_per_row = dim / crate::quant::Q80_BLOCK_SIZE;
    let row = &table[token * blocks_per_row..(token + 1) * blocks_per_row];
    dequantize_q80_to_f32(row, out, dim, n_threads, thread_index);
}
