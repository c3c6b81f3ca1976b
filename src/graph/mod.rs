//! The operator graph data model (§3, §4.4): pipes, buffers, ops,
//! segments, and the node/net configs that describe a distributed
//! forward pass independently of any device backend.

pub mod builder;

use crate::kernel::rope::RopeType;
use crate::quant::ElemType;
use crate::slice::Size3D;

/// One op in the linearized graph (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    MergeAdd,
    Embedding,
    InvRms,
    RmsNorm,
    Matmul,
    Rope,
    MultiheadAtt,
    Gelu,
    Silu,
    Mul,
    Cast,
    Shift,
}

/// `<input>_<weight>_<output>` quant triple an op is compiled for
/// (§4.1, §4.4). Intentionally a subset of what the source material
/// enumerates: `F32_Q40_F32`/`F32_Q40_Q80`/`F32_F32_Q80`/`Q80_Q80_Q80`/
/// `Q80_F32_F32` have no exercised code path in this engine and are left
/// out rather than carried as unreachable variants (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpQuantType {
    F32F32F32,
    Q80Q80F32,
    Q80Q40F32,
}

pub fn op_quant_type(input: ElemType, weight: ElemType, output: ElemType) -> Option<OpQuantType> {
    match (input, weight, output) {
        (ElemType::F32, ElemType::F32, ElemType::F32) | (ElemType::F32, ElemType::Unk, ElemType::F32) => {
            Some(OpQuantType::F32F32F32)
        }
        (ElemType::Q80, ElemType::Q80, ElemType::F32) | (ElemType::Q80, ElemType::Unk, ElemType::F32) => {
            Some(OpQuantType::Q80Q80F32)
        }
        (ElemType::Q80, ElemType::Q40, ElemType::F32) => Some(OpQuantType::Q80Q40F32),
        _ => None,
    }
}

/// Where a pointer's target buffer lives: a network-visible pipe, or a
/// node-local buffer (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSource {
    Pipe,
    Buffer,
}

/// How a pointer addresses its target across the batch dimension (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerType {
    Raw,
    Batch,
    BatchedSlice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerConfig {
    pub source: PointerSource,
    pub index: usize,
    pub kind: PointerType,
}

impl PointerConfig {
    pub fn raw(source: PointerSource, index: usize) -> Self {
        Self { source, index, kind: PointerType::Raw }
    }
    pub fn batch(source: PointerSource, index: usize) -> Self {
        Self { source, index, kind: PointerType::Batch }
    }
    pub fn batched_slice(source: PointerSource, index: usize) -> Self {
        Self { source, index, kind: PointerType::BatchedSlice }
    }

    /// A pointer addresses contiguous memory only when it is a plain
    /// batch pointer with no slicing (§4.4).
    pub fn has_continuous_memory(&self) -> bool {
        self.kind == PointerType::Batch
    }
}

/// A network-visible tensor, shared by every node (§3).
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub name: String,
    pub size: Size3D,
}

/// A node-local tensor, invisible to other nodes (§3).
#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub name: String,
    pub size: Size3D,
}

/// Op-specific configuration payloads (§3 op config).
#[derive(Debug, Clone)]
pub enum OpPayload {
    Embedding,
    InvRms { epsilon: f32, n_columns: usize },
    RmsNorm { inv_rms_buffer_index: usize, n_columns: usize },
    Matmul { input_type: ElemType, output_type: ElemType },
    Rope {
        rope_type: RopeType,
        is_q: bool,
        position_pipe_index: usize,
        rope_cache_buffer_index: usize,
        scaling_factor: f32,
        scaling_low_freq_factor: f32,
        scaling_high_freq_factor: f32,
        scaling_orig_max_seq_len: u32,
    },
    MultiheadAtt {
        n_heads: usize,
        n_heads0: usize,
        n_kv_heads: usize,
        head_dim: usize,
        seq_len: usize,
        q_slice_d0: usize,
        kv_dim0: usize,
        position_pipe_index: usize,
        query_buffer_index: usize,
        key_cache_buffer_index: usize,
        value_cache_buffer_index: usize,
        att_buffer_index: usize,
    },
    MergeAdd,
    Silu,
    Gelu,
    Mul { multiplier_buffer_index: usize },
    Cast { input_type: ElemType, output_type: ElemType },
    Shift { index_pipe_index: usize },
}

/// A single op in a segment (§3, §4.4).
#[derive(Debug, Clone)]
pub struct OpConfig {
    pub code: OpCode,
    pub name: String,
    pub index: usize,
    pub input: PointerConfig,
    pub output: PointerConfig,
    pub weight_size: Size3D,
    pub payload: OpPayload,
}

/// How a pipe is synchronized across nodes after a segment runs (§3,
/// §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    WithRoot,
    NodeSlices,
    NodeSlicesExceptRoot,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub pipe_index: usize,
    pub mode: SyncMode,
}

/// A run of ops followed by zero or more pipe syncs (§3).
#[derive(Debug, Clone, Default)]
pub struct SegmentConfig {
    pub ops: Vec<OpConfig>,
    pub syncs: Vec<SyncConfig>,
}

/// Per-node configuration: its local buffers and its segment program
/// (§3).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_index: usize,
    pub buffers: Vec<BufferConfig>,
    pub segments: Vec<SegmentConfig>,
}

/// Whole-network configuration shared by every node before it builds
/// its own executor program (§3).
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub n_batches: usize,
    pub n_nodes: usize,
    pub pipes: Vec<PipeConfig>,
    /// Pipe indices that must be populated before the first segment of
    /// the first forward step (e.g. the position pipe).
    pub pre_syncs: Vec<usize>,
}
