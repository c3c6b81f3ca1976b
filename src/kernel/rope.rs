//! Rotary position embedding (§4.2, §6.1 `ROPE_TYPE`/`ROPE_SCALING_*`).

/// Which RoPE frequency scaling to apply when building the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RopeType {
    Llama,
    Llama31,
}

/// Parameters needed to fill a RoPE cache for one node's slice.
#[derive(Debug, Clone, Copy)]
pub struct RopeCacheParams {
    pub rope_type: RopeType,
    pub theta: f32,
    pub head_dim: usize,
    pub slice_dim: usize,
    pub seq_len: usize,
    pub scaling_factor: f32,
    pub scaling_low_freq_factor: f32,
    pub scaling_high_freq_factor: f32,
    pub scaling_orig_max_seq_len: u32,
}

fn llama31_freq_scale(freq: f32, p: &RopeCacheParams) -> f32 {
    if p.scaling_factor <= 1.0 {
        return freq;
    }
    let low_freq_wavelen = p.scaling_orig_max_seq_len as f32 / p.scaling_low_freq_factor;
    let high_freq_wavelen = p.scaling_orig_max_seq_len as f32 / p.scaling_high_freq_factor;
    let wavelen = 2.0 * std::f32::consts::PI / freq;
    if wavelen < high_freq_wavelen {
        freq
    } else if wavelen > low_freq_wavelen {
        freq / p.scaling_factor
    } else {
        let smooth = (p.scaling_orig_max_seq_len as f32 / wavelen - p.scaling_low_freq_factor)
            / (p.scaling_high_freq_factor - p.scaling_low_freq_factor);
        (1.0 - smooth) * freq / p.scaling_factor + smooth * freq
    }
}

/// Fill a `[seqLen, sliceDim]` row-major cache of `(cos, sin)` pairs, one
/// pair per even index `i` in `0..sliceDim`, keyed by `(pos, i)`.
pub fn fill_rope_cache(params: &RopeCacheParams, cache: &mut [f32]) {
    assert_eq!(cache.len(), params.seq_len * params.slice_dim);
    for pos in 0..params.seq_len {
        let row = &mut cache[pos * params.slice_dim..(pos + 1) * params.slice_dim];
        let mut i = 0usize;
        while i < params.slice_dim {
            let head_i = (i % params.head_dim) as f32;
            let mut freq = 1.0 / params.theta.powf(head_i / params.head_dim as f32);
            if params.rope_type == RopeType::Llama31 {
                freq = llama31_freq_scale(freq, params);
            }
            let angle = pos as f32 * freq;
            row[i] = angle.cos();
            row[i + 1] = angle.sin();
            i += 2;
        }
    }
}

/// Apply RoPE in place to `x[iStart..iEnd)` (an even range) using the
/// cache row for `pos`, offset by `shift` (§4.2).
pub fn apply_rope(
    x: &mut [f32],
    cache: &[f32],
    pos: usize,
    shift: usize,
    slice_dim: usize,
    i_start: usize,
    i_end: usize,
) {
    let pos_cache = &cache[pos * slice_dim + shift..];
    let mut i = i_start;
    while i < i_end {
        let cr = pos_cache[i];
        let ci = pos_cache[i + 1];
        let v0 = x[i];
        let v1 = x[i + 1];
        x[i] = v0 * cr - v1 * ci;
        x[i + 1] = v0 * ci + v1 * cr;
        i += 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_params(seq_len: usize, slice_dim: usize, head_dim: usize) -> RopeCacheParams {
        RopeCacheParams {
            rope_type: RopeType::Llama,
            theta: 10_000.0,
            head_dim,
            slice_dim,
            seq_len,
            scaling_factor: 1.0,
            scaling_low_freq_factor: 1.0,
            scaling_high_freq_factor: 4.0,
            scaling_orig_max_seq_len: 8192,
        }
    }

    #[test]
    fn single_slice_matches_whole_tensor_subrange() {
        let head_dim = 128usize;
        let dim = 4096usize;
        let seq_len = 64usize;

        let whole_params = reference_params(seq_len, dim, head_dim);
        let mut whole_cache = vec![0.0f32; seq_len * dim];
        fill_rope_cache(&whole_params, &mut whole_cache);

        for n_slices in [1usize, 2, 4, 8] {
            let slice_dim = dim / n_slices;
            for node_index in 0..n_slices {
                let shift = node_index * slice_dim;
                let mut slice_params = reference_params(seq_len, slice_dim, head_dim);
                // head_dim offsets repeat every head_dim elements, and a
                // uniform slice always starts on a head boundary for the
                // divisibility-constrained sizes used here.
                slice_params.theta = whole_params.theta;
                let mut slice_cache = vec![0.0f32; seq_len * slice_dim];
                fill_rope_cache(&slice_params, &mut slice_cache);

                for pos in [0usize, seq_len / 2, seq_len - 1] {
                    let whole_row = &whole_cache[pos * dim + shift..pos * dim + shift + slice_dim];
                    let slice_row = &slice_cache[pos * slice_dim..(pos + 1) * slice_dim];
                    for (a, b) in whole_row.iter().zip(slice_row.iter()) {
                        assert!((a - b).abs() < 1e-6);
                    }
                }
            }
        }
    }

    #[test]
    fn forward_matches_single_thread_reference_across_slicing() {
        let head_dim = 128usize;
        let dim = 4096usize;
        let seq_len = 2048usize;
        let params = reference_params(seq_len, dim, head_dim);
        let mut cache = vec![0.0f32; seq_len * dim];
        fill_rope_cache(&params, &mut cache);

        for pos in [0usize, 1024, 2047] {
            let reference_q = vec![1.0f32; dim];
            let mut reference = reference_q.clone();
            apply_rope(&mut reference, &cache, pos, 0, dim, 0, dim);

            for n_threads in [1usize, 2, 3] {
                let mut out = reference_q.clone();
                for t in 0..n_threads {
                    let (s, e) = crate::kernel::split_range(dim / 2, n_threads, t);
                    apply_rope(&mut out, &cache, pos, 0, dim, s * 2, e * 2);
                }
                for (a, b) in reference.iter().zip(out.iter()) {
                    assert!((a - b).abs() < 1e-6);
                }
            }
        }
    }
}
