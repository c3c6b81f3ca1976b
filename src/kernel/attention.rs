//! Multi-head attention kernel (§4.2).

/// Geometry needed to run attention for this node's local head slice.
#[derive(Debug, Clone, Copy)]
pub struct AttentionParams {
    pub n_heads0: usize,
    pub n_kv_heads: usize,
    pub head_size: usize,
    pub seq_len: usize,
    pub kv_dim0: usize,
}

/// For each local head, score against every cached timestep up to and
/// including `pos`, softmax the scores, then accumulate the weighted sum
/// of cached values into `x`.
///
/// `q` is `[nHeads0 * headSize]`, `k_cache`/`v_cache` are
/// `[seqLen, kvDim0]` row-major, `att_scratch` is per-thread scratch of at
/// least `seqLen` floats, `x` is the `[nHeads0 * headSize]` output.
pub fn multihead_att(
    x: &mut [f32],
    q: &[f32],
    k_cache: &[f32],
    v_cache: &[f32],
    att_scratch: &mut [f32],
    pos: usize,
    params: &AttentionParams,
    n_threads: usize,
    thread_index: usize,
) {
    let (h_start, h_end) = crate::kernel::split_range(params.n_heads0, n_threads, thread_index);
    let kv_mul = params.n_heads0 / params.n_kv_heads.max(1);
    let scale = (params.head_size as f32).sqrt();

    for h in h_start..h_end {
        let kv_head = h / kv_mul.max(1);
        let q_h = &q[h * params.head_size..(h + 1) * params.head_size];
        let scores = &mut att_scratch[..pos + 1];

        for (t, score) in scores.iter_mut().enumerate() {
            let k_t = &k_cache[t * params.kv_dim0 + kv_head * params.head_size
                ..t * params.kv_dim0 + (kv_head + 1) * params.head_size];
            let dot: f32 = q_h.iter().zip(k_t.iter()).map(|(a, b)| a * b).sum();
            *score = dot / scale;
        }

        crate::kernel::softmax::softmax(scores, pos + 1);

        let out = &mut x[h * params.head_size..(h + 1) * params.head_size];
        out.fill(0.0);
        for (t, &weight) in scores.iter().enumerate() {
            let v_t = &v_cache[t * params.kv_dim0 + kv_head * params.head_size
                ..t * params.kv_dim0 + (kv_head + 1) * params.head_size];
            for (o, v) in out.iter_mut().zip(v_t.iter()) {
                *o += weight * v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_timestep_reproduces_that_value() {
        let head_size = 4;
        let params = AttentionParams {
            n_heads0: 1,
            n_kv_heads: 1,
            head_size,
            seq_len: 1,
            kv_dim0: head_size,
        };
        let q = vec![1.0, 0.0, 0.0, 0.0];
        let k_cache = vec![1.0, 0.0, 0.0, 0.0];
        let v_cache = vec![2.0, 3.0, 4.0, 5.0];
        let mut scratch = vec![0.0f32; 1];
        let mut x = vec![0.0f32; head_size];
        multihead_att(&mut x, &q, &k_cache, &v_cache, &mut scratch, 0, &params, 1, 0);
        assert_eq!(x, v_cache);
    }

    #[test]
    fn thread_split_over_heads_matches_single_thread() {
        let head_size = 8;
        let n_heads = 4;
        let seq_len = 3;
        let params = AttentionParams {
            n_heads0: n_heads,
            n_kv_heads: n_heads,
            head_size,
            seq_len,
            kv_dim0: n_heads * head_size,
        };
        let q: Vec<f32> = (0..n_heads * head_size).map(|i| (i as f32) * 0.01).collect();
        let k_cache: Vec<f32> = (0..seq_len * n_heads * head_size)
            .map(|i| ((i * 7) % 11) as f32 * 0.02 - 0.1)
            .collect();
        let v_cache: Vec<f32> = (0..seq_len * n_heads * head_size)
            .map(|i| ((i * 3) % 13) as f32 * 0.03)
            .collect();

        let mut reference = vec![0.0f32; n_heads * head_size];
        let mut scratch = vec![0.0f32; seq_len];
        multihead_att(&mut reference, &q, &k_cache, &v_cache, &mut scratch, seq_len - 1, &params, 1, 0);

        for n_threads in [2usize, 4] {
            let mut out = vec![0.0f32; n_heads * head_size];
            for t in 0..n_threads {
                let mut s = vec![0.0f32; seq_len];
                multihead_att(&mut out, &q, &k_cache, &v_cache, &mut s, seq_len - 1, &params, n_threads, t);
            }
            for (a, b) in reference.iter().zip(out.iter()) {
                assert!((a - b).abs() < 1e-5);
            }
        }
    }
}
