//! Wires a `graph::NodeConfig` into an executor-ready program, and
//! drives weight loading for it (§4.5, §4.9).
//!
//! `graph::builder` only knows shapes; it has no notion of where a
//! weight tensor lives in the model file or how it's split across
//! nodes. This module closes that gap by keying off the op names
//! `build_block`/`build_model_net` hand out (`wq`, `wk`, `wv`, `wo`,
//! `w1_gate`, `w3_up`, `w2_down`, `token_embedding`, `w_cls`) against
//! the same row/column slicers `graph::builder` used to size each
//! node's local buffers.

use crate::device::{Device, DeviceSegment, ExecutionBuffers};
use crate::executor::Step;
use crate::graph::builder::ModelDims;
use crate::graph::{NetConfig, NodeConfig};
use crate::quant::ElemType;
use crate::slice::{size2d, slice_col_matmul, slice_row_matmul, split_col_matmul_weight, split_row_matmul_weight};
use crate::utils::error::{EngineError, Result};
use std::io::Read;

/// Turn one node's segment program into an executor-ready step list,
/// device segments, and its pipe/buffer storage.
pub fn compile_node(device: &dyn Device, net: &NetConfig, node: &NodeConfig) -> (Vec<Step>, Vec<Box<dyn DeviceSegment>>, ExecutionBuffers) {
    let pipe_sizes: Vec<usize> = net.pipes.iter().map(|p| p.size.n_bytes).collect();
    let buffer_sizes: Vec<usize> = node.buffers.iter().map(|b| b.size.n_bytes).collect();
    let buffers = ExecutionBuffers::new(&pipe_sizes, &buffer_sizes);

    let mut steps = Vec::new();
    let mut segments = Vec::with_capacity(node.segments.len());
    for (segment_index, segment) in node.segments.iter().enumerate() {
        for op_index in 0..segment.ops.len() {
            steps.push(Step::ExecuteOp { segment_index, op_index });
        }
        if !segment.syncs.is_empty() {
            steps.push(Step::SyncNodes { segment_index });
        }
        segments.push(device.create_segment(segment.ops.clone()));
    }
    (steps, segments, buffers)
}

/// Which geometry an op's weight tensor needs split by, keyed by name
/// (§4.6, §4.9).
enum WeightShape {
    /// Loaded whole, no cross-node split (embedding table, classifier —
    /// both root-only ops, so only the root ever asks for this).
    Whole,
    /// Row-parallel: output rows split across nodes.
    Row { n: usize, d: usize },
    /// Column-parallel: input columns split across nodes.
    Col { n: usize, d: usize },
    /// Replicated: every node needs the identical, unsliced vector (the
    /// rms-norm gains — there is no partial-sum op to split them over).
    Replicated { len: usize },
}

fn weight_shape(name: &str, d: &ModelDims) -> Option<WeightShape> {
    let dim = d.block.dim;
    let hidden_dim = d.block.hidden_dim;
    let kv_dim = d.block.kv_dim;
    match name {
        "token_embedding" | "w_cls" => Some(WeightShape::Whole),
        "wq" => Some(WeightShape::Row { n: dim, d: dim }),
        "wk" | "wv" => Some(WeightShape::Row { n: dim, d: kv_dim }),
        "w1_gate" | "w3_up" => Some(WeightShape::Row { n: dim, d: hidden_dim }),
        "wo" => Some(WeightShape::Col { n: dim, d: dim }),
        "w2_down" => Some(WeightShape::Col { n: hidden_dim, d: dim }),
        "attn_rms_norm" | "ffn_rms_norm" | "final_rms_norm" => Some(WeightShape::Replicated { len: dim }),
        _ => None,
    }
}

/// Root-side: stream the whole model file in its on-disk order
/// (§6.1's embedding → per-layer weights → classifier order), loading
/// this node's own slice into `own_segments` directly and handing
/// every other node's slice to `send_slice` for the caller to ship
/// over its socket (§4.9).
pub fn load_root_weights(
    file: &mut impl Read,
    d: &ModelDims,
    own_node: &NodeConfig,
    own_segments: &mut [Box<dyn DeviceSegment>],
    mut send_slice: impl FnMut(usize, usize, usize, &[u8]) -> Result<()>,
) -> Result<()> {
    let weight_type = d.block.weight_type;
    for (segment_index, segment) in own_node.segments.iter().enumerate() {
        for (op_index, op) in segment.ops.iter().enumerate() {
            if op.weight_size.n_bytes == 0 {
                continue;
            }
            let shape = weight_shape(&op.name, d)
                .ok_or_else(|| EngineError::BadConfig(format!("op '{}' carries a weight but has no known shape", op.name)))?;
            load_one_weight(
                file,
                weight_type,
                shape,
                d.block.n_nodes,
                op.weight_size.n_bytes,
                segment_index,
                op_index,
                own_segments,
                &mut send_slice,
            )?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn load_one_weight(
    file: &mut impl Read,
    weight_type: ElemType,
    shape: WeightShape,
    n_nodes: usize,
    own_slice_n_bytes: usize,
    segment_index: usize,
    op_index: usize,
    own_segments: &mut [Box<dyn DeviceSegment>],
    send_slice: &mut impl FnMut(usize, usize, usize, &[u8]) -> Result<()>,
) -> Result<()> {
    match shape {
        WeightShape::Whole => {
            let mut buf = vec![0u8; own_slice_n_bytes];
            file.read_exact(&mut buf).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;
            own_segments[segment_index].load_weight(op_index, 0, &buf)
        }
        WeightShape::Row { n, d } => {
            let full = size2d(weight_type, n, d);
            let mut buf = vec![0u8; full.n_bytes];
            file.read_exact(&mut buf).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;
            let slice = slice_row_matmul(weight_type, n_nodes, n, d);
            for node_index in 0..n_nodes {
                let mut weight0 = vec![0u8; slice.slice_size.n_bytes];
                split_row_matmul_weight(&slice, node_index, &buf, &mut weight0);
                if node_index == 0 {
                    own_segments[segment_index].load_weight(op_index, 0, &weight0)?;
                } else {
                    send_slice(node_index, segment_index, op_index, &weight0)?;
                }
            }
            Ok(())
        }
        WeightShape::Col { n, d } => {
            let full = size2d(weight_type, n, d);
            let mut buf = vec![0u8; full.n_bytes];
            file.read_exact(&mut buf).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;
            let slice = slice_col_matmul(weight_type, n_nodes, n, d);
            for node_index in 0..n_nodes {
                let mut weight0 = vec![0u8; slice.slice_size.n_bytes];
                split_col_matmul_weight(&slice, node_index, &buf, &mut weight0);
                if node_index == 0 {
                    own_segments[segment_index].load_weight(op_index, 0, &weight0)?;
                } else {
                    send_slice(node_index, segment_index, op_index, &weight0)?;
                }
            }
            Ok(())
        }
        WeightShape::Replicated { .. } => {
            let mut buf = vec![0u8; own_slice_n_bytes];
            file.read_exact(&mut buf).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;
            own_segments[segment_index].load_weight(op_index, 0, &buf)?;
            for node_index in 1..n_nodes {
                send_slice(node_index, segment_index, op_index, &buf)?;
            }
            Ok(())
        }
    }
}
