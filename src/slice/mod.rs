//! Slicers and splitters (§4.6): pure geometry, keyed by
//! `(global size, nNodes, nodeIndex)`. No I/O, no kernel calls — these
//! functions only compute shapes and copy weight bytes into per-node
//! layouts at load time.

use crate::quant::ElemType;

/// `(z, y, x)` tensor shape plus derived byte counts (§3 `Size3D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size3D {
    pub elem_type: ElemType,
    pub z: usize,
    pub y: usize,
    pub x: usize,
    pub length: usize,
    pub n_bytes: usize,
}

pub fn size2d(elem_type: ElemType, y: usize, x: usize) -> Size3D {
    let length = y * x;
    Size3D {
        elem_type,
        z: 1,
        y,
        x,
        length,
        n_bytes: elem_type.bytes(length),
    }
}

pub fn size1d(elem_type: ElemType, x: usize) -> Size3D {
    size2d(elem_type, 1, x)
}

/// The empty size used for ops that carry no weight (§4.4 `size0`).
pub fn size0() -> Size3D {
    Size3D { elem_type: ElemType::Unk, z: 1, y: 0, x: 0, length: 0, n_bytes: 0 }
}

/// Per-node KV cache geometry (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct KvCacheSlice {
    pub kv_dim0: usize,
    pub key_size: Size3D,
    pub value_size: Size3D,
}

pub fn slice_kv_cache(kv_dim: usize, seq_len: usize, n_nodes: usize) -> KvCacheSlice {
    assert_eq!(kv_dim % n_nodes, 0, "kvDim must be divisible by nNodes");
    let kv_dim0 = kv_dim / n_nodes;
    KvCacheSlice {
        kv_dim0,
        key_size: size2d(ElemType::F32, seq_len, kv_dim0),
        value_size: size2d(ElemType::F32, seq_len, kv_dim0),
    }
}

/// Row-parallel matmul slice: weight rows `d` are split across nodes,
/// input width `n` is replicated (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct RowMatmulSlice {
    pub elem_type: ElemType,
    pub n_nodes: usize,
    pub d0: usize,
    pub n: usize,
    pub size: Size3D,
    pub slice_size: Size3D,
}

pub fn slice_row_matmul(elem_type: ElemType, n_nodes: usize, n: usize, d: usize) -> RowMatmulSlice {
    assert_eq!(d % n_nodes, 0, "d must be divisible by nNodes");
    let d0 = d / n_nodes;
    RowMatmulSlice {
        elem_type,
        n_nodes,
        d0,
        n,
        size: size2d(elem_type, n, d),
        slice_size: size2d(elem_type, n, d0),
    }
}

/// Copy this node's `d0` weight rows out of the full `[n, d]` row-major
/// weight into `weight0` (§4.6 `splitRowMatmulWeight`).
pub fn split_row_matmul_weight(slice: &RowMatmulSlice, node_index: usize, weight: &[u8], weight0: &mut [u8]) -> usize {
    let block_size = slice.elem_type.block_size();
    let batch_bytes = slice.elem_type.bytes(block_size);
    assert_eq!(slice.n % block_size, 0);
    let n = slice.n / block_size;
    let offset = slice.d0 * node_index * n * batch_bytes;
    let mut copied = 0;
    for d in 0..slice.d0 {
        for j in 0..n {
            let o = (d * n + j) * batch_bytes;
            weight0[o..o + batch_bytes].copy_from_slice(&weight[offset + o..offset + o + batch_bytes]);
            copied += batch_bytes;
        }
    }
    copied
}

/// Column-parallel matmul slice: the contraction dimension `n` is split
/// across nodes, output width `d` is replicated (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct ColMatmulSlice {
    pub elem_type: ElemType,
    pub n_nodes: usize,
    pub n: usize,
    pub n0: usize,
    pub d: usize,
    pub size: Size3D,
    pub slice_size: Size3D,
}

pub fn slice_col_matmul(elem_type: ElemType, n_nodes: usize, n: usize, d: usize) -> ColMatmulSlice {
    assert_eq!(n % n_nodes, 0, "n must be divisible by nNodes");
    let n0 = n / n_nodes;
    ColMatmulSlice {
        elem_type,
        n_nodes,
        n,
        n0,
        d,
        size: size2d(elem_type, n, d),
        slice_size: size2d(elem_type, n0, d),
    }
}

/// Copy this node's `n0`-row-wide column slice out of the full `[n, d]`
/// row-major weight into `weight0` (§4.6 `splitColMatmulWeight`).
pub fn split_col_matmul_weight(slice: &ColMatmulSlice, node_index: usize, weight: &[u8], weight0: &mut [u8]) -> usize {
    let block_size = slice.elem_type.block_size();
    let batch_bytes = slice.elem_type.bytes(block_size);
    assert_eq!(slice.n0 % block_size, 0);
    let n = slice.n / block_size;
    let row_bytes = n * batch_bytes;
    let row0_bytes = (slice.n0 / block_size) * batch_bytes;
    let row_offset_bytes = node_index * row0_bytes;
    let mut copied = 0;
    for d in 0..slice.d {
        let dst = row0_bytes * d;
        let src = row_bytes * d + row_offset_bytes;
        weight0[dst..dst + row0_bytes].copy_from_slice(&weight[src..src + row0_bytes]);
        copied += row0_bytes;
    }
    copied
}

/// Per-node RoPE slice: query and key/value dims are each split across
/// nodes, but a node's query slice does not generally start where its
/// kv slice does, hence the `shift` field (§4.6 `sliceRope`).
#[derive(Debug, Clone, Copy)]
pub struct RopeSlice {
    pub q_dim0: usize,
    pub q_dim_start: usize,
    pub q_dim_end: usize,
    pub q_shift: usize,
    pub kv_dim: usize,
    pub kv_dim0: usize,
    pub kv_dim_start: usize,
    pub slice_dim: usize,
    pub seq_len: usize,
    pub head_size: usize,
    pub n_kv_heads: usize,
    pub rope_theta: f32,
    pub cache_size: Size3D,
}

pub fn slice_rope(
    dim: usize,
    kv_dim: usize,
    n_kv_heads: usize,
    n_nodes: usize,
    seq_len: usize,
    head_size: usize,
    rope_theta: f32,
    node_index: usize,
) -> RopeSlice {
    assert!(dim >= kv_dim);
    assert_eq!(dim % n_nodes, 0);
    assert_eq!(kv_dim % n_nodes, 0);

    let q_dim0 = dim / n_nodes;
    let kv_dim0 = kv_dim / n_nodes;
    assert_eq!(q_dim0 % 2, 0);
    assert_eq!(kv_dim0 % 2, 0);

    let kv_dim_start = kv_dim0 * node_index;
    let q_dim_start = q_dim0 * node_index;
    let q_dim_end = q_dim_start + q_dim0;
    let q_shift = q_dim_start - kv_dim_start;
    let slice_dim = q_dim_end - kv_dim_start;
    assert_eq!(slice_dim % 2, 0);

    RopeSlice {
        q_dim0,
        q_dim_start,
        q_dim_end,
        q_shift,
        kv_dim,
        kv_dim0,
        kv_dim_start,
        slice_dim,
        seq_len,
        head_size,
        n_kv_heads,
        rope_theta,
        cache_size: size2d(ElemType::F32, seq_len, slice_dim),
    }
}

/// Per-node multi-head attention slice: heads are split evenly across
/// nodes (§4.6 `sliceMultiHeadAtt`).
#[derive(Debug, Clone, Copy)]
pub struct MultiHeadAttSlice {
    pub n_heads: usize,
    pub n_heads0: usize,
    pub att_size: Size3D,
}

pub fn slice_multihead_att(n_heads: usize, seq_len: usize, n_nodes: usize) -> MultiHeadAttSlice {
    assert_eq!(n_heads % n_nodes, 0);
    let n_heads0 = n_heads / n_nodes;
    MultiHeadAttSlice {
        n_heads,
        n_heads0,
        att_size: size2d(ElemType::F32, seq_len, n_heads0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_cache_slice_splits_kv_dim_evenly() {
        let s = slice_kv_cache(16, 4, 4);
        assert_eq!(s.kv_dim0, 4);
        assert_eq!(s.key_size.length, 16);
    }

    #[test]
    fn row_matmul_weight_split_round_trips() {
        let n = 4usize;
        let d = 8usize;
        let n_nodes = 2usize;
        let slice = slice_row_matmul(ElemType::F32, n_nodes, n, d);
        let weight: Vec<f32> = (0..n * d).map(|i| i as f32).collect();
        let weight_bytes: &[u8] = bytemuck_cast_f32(&weight);

        for node_index in 0..n_nodes {
            let mut weight0 = vec![0u8; slice.slice_size.n_bytes];
            split_row_matmul_weight(&slice, node_index, weight_bytes, &mut weight0);
            let floats: &[f32] = bytemuck_cast_u8(&weight0);
            for (j, &v) in floats.iter().enumerate() {
                let d_local = j / n;
                let col = j % n;
                let global_d = node_index * slice.d0 + d_local;
                assert_eq!(v, (global_d * n + col) as f32);
            }
        }
    }

    #[test]
    fn col_matmul_weight_split_round_trips() {
        let n = 8usize;
        let d = 3usize;
        let n_nodes = 2usize;
        let slice = slice_col_matmul(ElemType::F32, n_nodes, n, d);
        let weight: Vec<f32> = (0..n * d).map(|i| i as f32).collect();
        let weight_bytes: &[u8] = bytemuck_cast_f32(&weight);

        for node_index in 0..n_nodes {
            let mut weight0 = vec![0u8; slice.slice_size.n_bytes];
            split_col_matmul_weight(&slice, node_index, weight_bytes, &mut weight0);
            let floats: &[f32] = bytemuck_cast_u8(&weight0);
            for row in 0..d {
                for col0 in 0..slice.n0 {
                    let global_col = node_index * slice.n0 + col0;
                    let got = floats[row * slice.n0 + col0];
                    assert_eq!(got, (row * n + global_col) as f32);
                }
            }
        }
    }

    #[test]
    fn rope_slice_shift_is_consistent_across_nodes() {
        for n_nodes in [1usize, 2, 4] {
            for node_index in 0..n_nodes {
                let s = slice_rope(4096, 1024, 8, n_nodes, 128, 128, 10000.0, node_index);
                assert_eq!(s.q_dim_start, s.kv_dim_start + s.q_shift);
                assert_eq!(s.slice_dim % 2, 0);
            }
        }
    }

    #[test]
    fn multihead_att_slice_splits_heads_evenly() {
        let s = slice_multihead_att(32, 2048, 4);
        assert_eq!(s.n_heads0, 8);
    }

    fn bytemuck_cast_f32(x: &[f32]) -> &[u8] {
        unsafe { std::slice::from_raw_parts(x.as_ptr() as *const u8, x.len() * 4) }
    }
    fn bytemuck_cast_u8(x: &[u8]) -> &[f32] {
        unsafe { std::slice::from_raw_parts(x.as_ptr() as *const f32, x.len() / 4) }
    }
}
