//! Builds the per-layer operator graph for a LLaMA-family transformer
//! block (§4.4). One node's program for one block looks like:
//!
//! ```text
//! x --[rmsNorm]--> xb --[matmul Wq/Wk/Wv row-slice]--> q,k,v
//!   --[rope q]--> q --[rope k]--> k --[shift k,v into kv cache]
//!   --[multiheadAtt]--> att --[matmul Wo col-slice]--> xb2
//!   --[mergeAdd across nodes]--> x (+=)
//!   --[rmsNorm]--> xb --[matmul W1/W3 row-slice]--> h1,h3
//!   --[silu h1][mul h1,h3]--> h --[matmul W2 col-slice]--> xb2
//!   --[mergeAdd across nodes]--> x (+=)
//! ```
//!
//! This mirrors the row-parallel/column-parallel split used by every
//! attention and FFN projection: row-parallel ops split the output
//! dimension across nodes (each node owns a slice of heads / FFN
//! neurons) and need a `mergeAdd` sync after the matching
//! column-parallel op brings the slices back together.

use crate::graph::{
    BufferConfig, NetConfig, NodeConfig, OpCode, OpConfig, OpPayload, PipeConfig, PointerConfig,
    PointerSource, SegmentConfig, SyncConfig, SyncMode,
};
use crate::kernel::rope::RopeType;
use crate::quant::ElemType;
use crate::slice::{size1d, size2d};

/// Dimensions needed to lay out one transformer block across `n_nodes`
/// (§1, §3).
#[derive(Debug, Clone, Copy)]
pub struct BlockDims {
    pub dim: usize,
    pub hidden_dim: usize,
    pub n_heads: usize,
    pub n_kv_heads: usize,
    pub head_dim: usize,
    pub kv_dim: usize,
    pub seq_len: usize,
    pub n_nodes: usize,
    pub rope_type: RopeType,
    pub rope_theta: f32,
    pub weight_type: ElemType,
    pub act_type: ElemType,
}

/// Indices into the net's pipe table that every node agrees on before
/// any block graph is built (§4.4).
#[derive(Debug, Clone, Copy)]
pub struct SharedPipes {
    pub x: usize,
    pub position: usize,
}

/// Buffers a single node allocates to run one block (§4.4).
struct BlockBuffers {
    xb: usize,
    q: usize,
    k: usize,
    v: usize,
    k_cache: usize,
    v_cache: usize,
    att: usize,
    xb2: usize,
    inv_rms: usize,
    h1: usize,
    h3: usize,
    rope_cache: usize,
}

fn push_buffer(buffers: &mut Vec<BufferConfig>, name: &str, size: crate::slice::Size3D) -> usize {
    buffers.push(BufferConfig { name: name.to_string(), size });
    buffers.len() - 1
}

/// Allocate this node's local buffers for one block.
fn alloc_block_buffers(buffers: &mut Vec<BufferConfig>, d: &BlockDims, node_index: usize) -> BlockBuffers {
    let q_slice = crate::slice::slice_row_matmul(d.weight_type, d.n_nodes, d.dim, d.dim);
    let kv_slice = crate::slice::slice_row_matmul(d.weight_type, d.n_nodes, d.dim, d.kv_dim);
    let kv_cache = crate::slice::slice_kv_cache(d.kv_dim, d.seq_len, d.n_nodes);
    let rope = crate::slice::slice_rope(d.dim, d.kv_dim, d.n_kv_heads, d.n_nodes, d.seq_len, d.head_dim, d.rope_theta, node_index);
    let att = crate::slice::slice_multihead_att(d.n_heads, d.seq_len, d.n_nodes);
    let ffn_slice = crate::slice::slice_row_matmul(d.weight_type, d.n_nodes, d.dim, d.hidden_dim);

    BlockBuffers {
        xb: push_buffer(buffers, "xb", size1d(ElemType::F32, d.dim)),
        q: push_buffer(buffers, "q", size1d(ElemType::F32, q_slice.d0)),
        k: push_buffer(buffers, "k", size1d(ElemType::F32, kv_slice.d0)),
        v: push_buffer(buffers, "v", size1d(ElemType::F32, kv_slice.d0)),
        k_cache: push_buffer(buffers, "k_cache", kv_cache.key_size),
        v_cache: push_buffer(buffers, "v_cache", kv_cache.value_size),
        att: push_buffer(buffers, "att", att.att_size),
        xb2: push_buffer(buffers, "xb2", size1d(ElemType::F32, d.dim)),
        inv_rms: push_buffer(buffers, "inv_rms", size1d(ElemType::F32, 1)),
        h1: push_buffer(buffers, "h1", size1d(ElemType::F32, ffn_slice.d0)),
        h3: push_buffer(buffers, "h3", size1d(ElemType::F32, ffn_slice.d0)),
        rope_cache: push_buffer(buffers, "rope_cache", rope.cache_size),
    }
}

fn op(code: OpCode, name: &str, index: usize, input: PointerConfig, output: PointerConfig, payload: OpPayload) -> OpConfig {
    OpConfig {
        code,
        name: name.to_string(),
        index,
        input,
        output,
        weight_size: crate::slice::size0(),
        payload,
    }
}

/// Build one node's segment program for the attention half of a block,
/// plus the segment program for the FFN half, and this node's local
/// buffer table. Segments end with a `mergeAdd` sync on the shared `x`
/// pipe whenever this node's op only computed a partial sum over its
/// slice of heads or FFN neurons (§4.4, §4.8).
pub fn build_block(buffers: &mut Vec<BufferConfig>, shared: &SharedPipes, d: &BlockDims, node_index: usize) -> Vec<SegmentConfig> {
    let b = alloc_block_buffers(buffers, d, node_index);
    let mut op_index = 0usize;
    let mut next_index = || {
        let i = op_index;
        op_index += 1;
        i
    };

    // Per-node weight shard sizes (§4.6): row-parallel ops split their
    // output dimension, column-parallel ops split their contraction
    // dimension. Every matmul/rms-norm op below carries its own
    // `weight_size` so the loader knows how much of the model file is
    // its payload and the device knows to allocate a `RawBuf` for it.
    let q_slice = crate::slice::slice_row_matmul(d.weight_type, d.n_nodes, d.dim, d.dim);
    let kv_slice = crate::slice::slice_row_matmul(d.weight_type, d.n_nodes, d.dim, d.kv_dim);
    let wo_slice = crate::slice::slice_col_matmul(d.weight_type, d.n_nodes, d.dim, d.dim);
    let ffn_slice = crate::slice::slice_row_matmul(d.weight_type, d.n_nodes, d.dim, d.hidden_dim);
    let w2_slice = crate::slice::slice_col_matmul(d.weight_type, d.n_nodes, d.hidden_dim, d.dim);
    // Rms-norm gains are not split across nodes: every node runs the
    // full-length norm over the shared `x` pipe and needs the same,
    // unsliced weight vector (§4.6 "no partial-sum ops have no weight
    // splitter").
    let rms_norm_weight_size = size1d(ElemType::F32, d.dim);

    let attn_norm = SegmentConfig {
        ops: vec![
            op(
                OpCode::InvRms,
                "attn_inv_rms",
                next_index(),
                PointerConfig::batch(PointerSource::Pipe, shared.x),
                PointerConfig::batch(PointerSource::Buffer, b.inv_rms),
                OpPayload::InvRms { epsilon: 1e-5, n_columns: d.dim },
            ),
            {
                let mut rms_norm = op(
                    OpCode::RmsNorm,
                    "attn_rms_norm",
                    next_index(),
                    PointerConfig::batch(PointerSource::Pipe, shared.x),
                    PointerConfig::batch(PointerSource::Buffer, b.xb),
                    OpPayload::RmsNorm { inv_rms_buffer_index: b.inv_rms, n_columns: d.dim },
                );
                rms_norm.weight_size = rms_norm_weight_size;
                rms_norm
            },
            {
                let mut wq = op(
                    OpCode::Matmul,
                    "wq",
                    next_index(),
                    PointerConfig::batch(PointerSource::Buffer, b.xb),
                    PointerConfig::batch(PointerSource::Buffer, b.q),
                    OpPayload::Matmul { input_type: ElemType::F32, output_type: ElemType::F32 },
                );
                wq.weight_size = q_slice.slice_size;
                wq
            },
            {
                let mut wk = op(
                    OpCode::Matmul,
                    "wk",
                    next_index(),
                    PointerConfig::batch(PointerSource::Buffer, b.xb),
                    PointerConfig::batch(PointerSource::Buffer, b.k),
                    OpPayload::Matmul { input_type: ElemType::F32, output_type: ElemType::F32 },
                );
                wk.weight_size = kv_slice.slice_size;
                wk
            },
            {
                let mut wv = op(
                    OpCode::Matmul,
                    "wv",
                    next_index(),
                    PointerConfig::batch(PointerSource::Buffer, b.xb),
                    PointerConfig::batch(PointerSource::Buffer, b.v),
                    OpPayload::Matmul { input_type: ElemType::F32, output_type: ElemType::F32 },
                );
                wv.weight_size = kv_slice.slice_size;
                wv
            },
            op(
                OpCode::Rope,
                "rope_q",
                next_index(),
                PointerConfig::batch(PointerSource::Buffer, b.q),
                PointerConfig::batch(PointerSource::Buffer, b.q),
                OpPayload::Rope {
                    rope_type: d.rope_type,
                    is_q: true,
                    position_pipe_index: shared.position,
                    rope_cache_buffer_index: b.rope_cache,
                    scaling_factor: 1.0,
                    scaling_low_freq_factor: 1.0,
                    scaling_high_freq_factor: 4.0,
                    scaling_orig_max_seq_len: 8192,
                },
            ),
            op(
                OpCode::Rope,
                "rope_k",
                next_index(),
                PointerConfig::batch(PointerSource::Buffer, b.k),
                PointerConfig::batch(PointerSource::Buffer, b.k),
                OpPayload::Rope {
                    rope_type: d.rope_type,
                    is_q: false,
                    position_pipe_index: shared.position,
                    rope_cache_buffer_index: b.rope_cache,
                    scaling_factor: 1.0,
                    scaling_low_freq_factor: 1.0,
                    scaling_high_freq_factor: 4.0,
                    scaling_orig_max_seq_len: 8192,
                },
            ),
            op(
                OpCode::Shift,
                "shift_k",
                next_index(),
                PointerConfig::batch(PointerSource::Buffer, b.k),
                PointerConfig::batch(PointerSource::Buffer, b.k_cache),
                OpPayload::Shift { index_pipe_index: shared.position },
            ),
            op(
                OpCode::Shift,
                "shift_v",
                next_index(),
                PointerConfig::batch(PointerSource::Buffer, b.v),
                PointerConfig::batch(PointerSource::Buffer, b.v_cache),
                OpPayload::Shift { index_pipe_index: shared.position },
            ),
            op(
                OpCode::MultiheadAtt,
                "attention",
                next_index(),
                PointerConfig::batch(PointerSource::Buffer, b.q),
                PointerConfig::batch(PointerSource::Buffer, b.att),
                OpPayload::MultiheadAtt {
                    n_heads: d.n_heads,
                    n_heads0: d.n_heads / d.n_nodes,
                    n_kv_heads: d.n_kv_heads,
                    head_dim: d.head_dim,
                    seq_len: d.seq_len,
                    q_slice_d0: d.dim / d.n_nodes,
                    kv_dim0: d.kv_dim / d.n_nodes,
                    position_pipe_index: shared.position,
                    query_buffer_index: b.q,
                    key_cache_buffer_index: b.k_cache,
                    value_cache_buffer_index: b.v_cache,
                    att_buffer_index: b.att,
                },
            ),
            {
                let mut wo = op(
                    OpCode::Matmul,
                    "wo",
                    next_index(),
                    PointerConfig::batch(PointerSource::Buffer, b.att),
                    PointerConfig::batch(PointerSource::Buffer, b.xb2),
                    OpPayload::Matmul { input_type: ElemType::F32, output_type: ElemType::F32 },
                );
                wo.weight_size = wo_slice.slice_size;
                wo
            },
            op(
                OpCode::MergeAdd,
                "merge_attn_out",
                next_index(),
                PointerConfig::batch(PointerSource::Buffer, b.xb2),
                PointerConfig::batch(PointerSource::Pipe, shared.x),
                OpPayload::MergeAdd,
            ),
        ],
        syncs: vec![SyncConfig { pipe_index: shared.x, mode: SyncMode::NodeSlices }],
    };

    let ffn = SegmentConfig {
        ops: vec![
            op(
                OpCode::InvRms,
                "ffn_inv_rms",
                next_index(),
                PointerConfig::batch(PointerSource::Pipe, shared.x),
                PointerConfig::batch(PointerSource::Buffer, b.inv_rms),
                OpPayload::InvRms { epsilon: 1e-5, n_columns: d.dim },
            ),
            {
                let mut rms_norm = op(
                    OpCode::RmsNorm,
                    "ffn_rms_norm",
                    next_index(),
                    PointerConfig::batch(PointerSource::Pipe, shared.x),
                    PointerConfig::batch(PointerSource::Buffer, b.xb),
                    OpPayload::RmsNorm { inv_rms_buffer_index: b.inv_rms, n_columns: d.dim },
                );
                rms_norm.weight_size = rms_norm_weight_size;
                rms_norm
            },
            {
                let mut w1_gate = op(
                    OpCode::Matmul,
                    "w1_gate",
                    next_index(),
                    PointerConfig::batch(PointerSource::Buffer, b.xb),
                    PointerConfig::batch(PointerSource::Buffer, b.h1),
                    OpPayload::Matmul { input_type: ElemType::F32, output_type: ElemType::F32 },
                );
                w1_gate.weight_size = ffn_slice.slice_size;
                w1_gate
            },
            {
                let mut w3_up = op(
                    OpCode::Matmul,
                    "w3_up",
                    next_index(),
                    PointerConfig::batch(PointerSource::Buffer, b.xb),
                    PointerConfig::batch(PointerSource::Buffer, b.h3),
                    OpPayload::Matmul { input_type: ElemType::F32, output_type: ElemType::F32 },
                );
                w3_up.weight_size = ffn_slice.slice_size;
                w3_up
            },
            op(
                OpCode::Silu,
                "silu_gate",
                next_index(),
                PointerConfig::batch(PointerSource::Buffer, b.h1),
                PointerConfig::batch(PointerSource::Buffer, b.h1),
                OpPayload::Silu,
            ),
            op(
                OpCode::Mul,
                "gate_mul_up",
                next_index(),
                PointerConfig::batch(PointerSource::Buffer, b.h1),
                PointerConfig::batch(PointerSource::Buffer, b.h1),
                OpPayload::Mul { multiplier_buffer_index: b.h3 },
            ),
            {
                let mut w2_down = op(
                    OpCode::Matmul,
                    "w2_down",
                    next_index(),
                    PointerConfig::batch(PointerSource::Buffer, b.h1),
                    PointerConfig::batch(PointerSource::Buffer, b.xb2),
                    OpPayload::Matmul { input_type: ElemType::F32, output_type: ElemType::F32 },
                );
                w2_down.weight_size = w2_slice.slice_size;
                w2_down
            },
            op(
                OpCode::MergeAdd,
                "merge_ffn_out",
                next_index(),
                PointerConfig::batch(PointerSource::Buffer, b.xb2),
                PointerConfig::batch(PointerSource::Pipe, shared.x),
                OpPayload::MergeAdd,
            ),
        ],
        syncs: vec![SyncConfig { pipe_index: shared.x, mode: SyncMode::NodeSlices }],
    };

    vec![attn_norm, ffn]
}

/// Build a full network config (the pipe table every node agrees on)
/// plus one `NodeConfig` per node, for a single block. A full model's
/// `NetConfig`/`NodeConfig`s are the concatenation of this across
/// `nLayers` blocks, wrapped by an embedding segment at the front and
/// an output-norm + classifier segment at the back (§4.4, §4.9).
pub fn build_llm_net(d: &BlockDims) -> (NetConfig, Vec<NodeConfig>) {
    let pipes = vec![
        PipeConfig { name: "x".to_string(), size: size1d(ElemType::F32, d.dim) },
        PipeConfig { name: "position".to_string(), size: size1d(ElemType::F32, 1) },
    ];
    let shared = SharedPipes { x: 0, position: 1 };
    let net = NetConfig {
        n_batches: 1,
        n_nodes: d.n_nodes,
        pipes,
        pre_syncs: vec![shared.position],
    };

    let nodes = (0..d.n_nodes)
        .map(|node_index| {
            let mut buffers = Vec::new();
            let segments = build_block(&mut buffers, &shared, d, node_index);
            NodeConfig { node_index, buffers, segments }
        })
        .collect();

    (net, nodes)
}

/// Full-model dimensions: a block's dimensions plus the layer count
/// and vocabulary size needed to wrap it in an embedding lookup and a
/// final norm + classifier (§4.9 `buildLlmNetWeight`'s embedding/Wcls
/// bookends).
#[derive(Debug, Clone, Copy)]
pub struct ModelDims {
    pub block: BlockDims,
    pub n_layers: usize,
    pub vocab_size: usize,
}

/// Build the whole model's network config and one `NodeConfig` per
/// node: an embedding lookup, `nLayers` transformer blocks, and a
/// final rms-norm + classifier matmul (§2 "embed → blocks × nLayers →
/// rms-norm → logits matmul", §4.9).
///
/// The embedding table and classifier weight are held by the root
/// alone (they are the two largest tensors the source engine keeps
/// un-sliced) — every other node's embedding/final segment is empty
/// and only participates in the `WithRoot` broadcast of `x`/`logits`.
pub fn build_model_net(d: &ModelDims) -> (NetConfig, Vec<NodeConfig>) {
    let dim = d.block.dim;
    let n_nodes = d.block.n_nodes;

    let pipes = vec![
        PipeConfig { name: "x".to_string(), size: size1d(ElemType::F32, dim) },
        PipeConfig { name: "position".to_string(), size: size1d(ElemType::F32, 1) },
        PipeConfig { name: "token".to_string(), size: size1d(ElemType::F32, 1) },
        PipeConfig { name: "logits".to_string(), size: size1d(ElemType::F32, d.vocab_size) },
    ];
    let shared = SharedPipes { x: 0, position: 1 };
    let token_pipe = 2;
    let logits_pipe = 3;

    let net = NetConfig {
        n_batches: 1,
        n_nodes,
        pipes,
        pre_syncs: vec![shared.position, token_pipe],
    };

    let mut node_buffers: Vec<Vec<BufferConfig>> = (0..n_nodes).map(|_| Vec::new()).collect();
    let mut node_segments: Vec<Vec<SegmentConfig>> = (0..n_nodes).map(|_| Vec::new()).collect();

    // Embedding: root looks the token up in its table and broadcasts
    // the resulting row to every worker.
    for node_index in 0..n_nodes {
        let ops = if node_index == 0 {
            let mut embedding = op(
                OpCode::Embedding,
                "token_embedding",
                0,
                PointerConfig::batch(PointerSource::Pipe, token_pipe),
                PointerConfig::batch(PointerSource::Pipe, shared.x),
                OpPayload::Embedding,
            );
            embedding.weight_size = size2d(d.block.weight_type, d.vocab_size, dim);
            vec![embedding]
        } else {
            Vec::new()
        };
        node_segments[node_index].push(SegmentConfig {
            ops,
            syncs: vec![SyncConfig { pipe_index: shared.x, mode: SyncMode::WithRoot }],
        });
    }

    // `nLayers` transformer blocks, identical structure per layer.
    for _layer in 0..d.n_layers {
        for node_index in 0..n_nodes {
            let segments = build_block(&mut node_buffers[node_index], &shared, &d.block, node_index);
            node_segments[node_index].extend(segments);
        }
    }

    // Final rms-norm + classifier matmul: root-only, same reasoning as
    // the embedding table above.
    for node_index in 0..n_nodes {
        if node_index != 0 {
            node_segments[node_index].push(SegmentConfig::default());
            continue;
        }
        let inv_rms = push_buffer(&mut node_buffers[0], "final_inv_rms", size1d(ElemType::F32, 1));
        let xb = push_buffer(&mut node_buffers[0], "final_xb", size1d(ElemType::F32, dim));
        let mut logits_matmul = op(
            OpCode::Matmul,
            "w_cls",
            0,
            PointerConfig::batch(PointerSource::Buffer, xb),
            PointerConfig::batch(PointerSource::Pipe, logits_pipe),
            OpPayload::Matmul { input_type: ElemType::F32, output_type: ElemType::F32 },
        );
        logits_matmul.weight_size = size2d(d.block.weight_type, d.vocab_size, dim);
        let mut final_rms_norm = op(
            OpCode::RmsNorm,
            "final_rms_norm",
            1,
            PointerConfig::batch(PointerSource::Pipe, shared.x),
            PointerConfig::batch(PointerSource::Buffer, xb),
            OpPayload::RmsNorm { inv_rms_buffer_index: inv_rms, n_columns: dim },
        );
        final_rms_norm.weight_size = size1d(ElemType::F32, dim);

        node_segments[0].push(SegmentConfig {
            ops: vec![
                op(
                    OpCode::InvRms,
                    "final_inv_rms",
                    0,
                    PointerConfig::batch(PointerSource::Pipe, shared.x),
                    PointerConfig::batch(PointerSource::Buffer, inv_rms),
                    OpPayload::InvRms { epsilon: 1e-5, n_columns: dim },
                ),
                final_rms_norm,
                logits_matmul,
            ],
            syncs: Vec::new(),
        });
    }

    let nodes = node_buffers
        .into_iter()
        .zip(node_segments)
        .enumerate()
        .map(|(node_index, (buffers, segments))| NodeConfig { node_index, buffers, segments })
        .collect();

    (net, nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(n_nodes: usize) -> BlockDims {
        BlockDims {
            dim: 256,
            hidden_dim: 512,
            n_heads: 8,
            n_kv_heads: 8,
            head_dim: 32,
            kv_dim: 256,
            seq_len: 64,
            n_nodes,
            rope_type: RopeType::Llama,
            rope_theta: 10_000.0,
            weight_type: ElemType::F32,
            act_type: ElemType::F32,
        }
    }

    #[test]
    fn builds_one_node_config_per_node() {
        for n_nodes in [1usize, 2, 4] {
            let (net, nodes) = build_llm_net(&dims(n_nodes));
            assert_eq!(net.n_nodes, n_nodes);
            assert_eq!(nodes.len(), n_nodes);
            for node in &nodes {
                assert_eq!(node.segments.len(), 2);
                assert!(!node.buffers.is_empty());
            }
        }
    }

    #[test]
    fn every_segment_ends_with_a_merge_add_sync_on_x() {
        let (_, nodes) = build_llm_net(&dims(2));
        for node in &nodes {
            for segment in &node.segments {
                assert_eq!(segment.syncs.len(), 1);
                assert_eq!(segment.syncs[0].pipe_index, 0);
                let last_op = segment.ops.last().unwrap();
                assert_eq!(last_op.code, OpCode::MergeAdd);
            }
        }
    }

    fn model_dims(n_nodes: usize, n_layers: usize) -> ModelDims {
        ModelDims { block: dims(n_nodes), n_layers, vocab_size: 512 }
    }

    #[test]
    fn model_net_has_one_pipe_set_and_four_pipes() {
        let (net, nodes) = build_model_net(&model_dims(2, 3));
        assert_eq!(net.n_nodes, 2);
        assert_eq!(net.pipes.len(), 4);
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn model_net_wraps_n_layers_blocks_with_embedding_and_classifier_segments() {
        let (_, nodes) = build_model_net(&model_dims(2, 3));
        for node in &nodes {
            // 1 embedding segment + 3 layers * 2 segments each + 1 final segment
            assert_eq!(node.segments.len(), 1 + 3 * 2 + 1);
        }
    }

    #[test]
    fn only_root_carries_embedding_and_classifier_ops() {
        let (_, nodes) = build_model_net(&model_dims(3, 2));
        let embed = nodes[0].segments.first().unwrap();
        assert_eq!(embed.ops.len(), 1);
        assert_eq!(embed.ops[0].code, OpCode::Embedding);
        let final_segment = nodes[0].segments.last().unwrap();
        assert_eq!(final_segment.ops.len(), 3);
        assert_eq!(final_segment.ops.last().unwrap().code, OpCode::Matmul);

        for worker in &nodes[1..] {
            assert!(worker.segments.first().unwrap().ops.is_empty());
            assert!(worker.segments.last().unwrap().ops.is_empty());
        }
    }

    #[test]
    fn embedding_and_final_segments_sync_with_root_not_merge_add() {
        let (_, nodes) = build_model_net(&model_dims(2, 1));
        let embed = nodes[0].segments.first().unwrap();
        assert_eq!(embed.syncs.len(), 1);
        assert_eq!(embed.syncs[0].mode, SyncMode::WithRoot);

        let final_segment = nodes[0].segments.last().unwrap();
        assert!(final_segment.syncs.is_empty());
    }
}
