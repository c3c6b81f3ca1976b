//! The CPU backend (§4.3): the only device this engine ships. Each
//! segment holds its op list plus one weight `RawBuf` per op that
//! declares a non-empty `weight_size`, mlocked best-effort on load.

use crate::device::{try_mlock, Device, DeviceSegment, ExecutionBuffers, RawBuf};
use crate::graph::{OpCode, OpConfig, OpPayload, PointerSource};
use crate::kernel;
use crate::quant::ElemType;
use crate::utils::error::{EngineError, Result};

pub struct CpuDevice {
    max_n_threads: usize,
}

impl CpuDevice {
    pub fn new(max_n_threads: usize) -> Self {
        Self { max_n_threads }
    }
}

impl Device for CpuDevice {
    fn max_n_threads(&self) -> usize {
        self.max_n_threads
    }

    fn create_segment(&self, ops: Vec<OpConfig>) -> Box<dyn DeviceSegment> {
        let weights = ops
            .iter()
            .map(|op| {
                if op.weight_size.n_bytes == 0 {
                    None
                } else {
                    Some(RawBuf::new(op.weight_size.n_bytes))
                }
            })
            .collect();
        Box::new(CpuDeviceSegment { ops, weights })
    }
}

pub struct CpuDeviceSegment {
    ops: Vec<OpConfig>,
    weights: Vec<Option<RawBuf>>,
}

impl DeviceSegment for CpuDeviceSegment {
    fn load_weight(&mut self, op_index: usize, offset: usize, weight: &[u8]) -> Result<()> {
        let slab = self.weights[op_index]
            .as_mut()
            .ok_or_else(|| EngineError::BadConfig(format!("op {} carries no weight slab", op_index)))?;
        let dst = slab.as_bytes_mut();
        if offset + weight.len() > dst.len() {
            return Err(EngineError::RangeViolation(format!(
                "weight write [{}, {}) exceeds slab of {} bytes",
                offset,
                offset + weight.len(),
                dst.len()
            )));
        }
        dst[offset..offset + weight.len()].copy_from_slice(weight);
        if offset + weight.len() == dst.len() {
            try_mlock(slab);
        }
        Ok(())
    }

    fn forward(&self, op_index: usize, n_threads: usize, thread_index: usize, batch_size: usize, ctx: &ExecutionBuffers) -> Result<()> {
        let op = &self.ops[op_index];
        let weight = self.weights[op_index].as_ref();
        run_op(op, weight, n_threads, thread_index, batch_size, ctx)
    }
}

fn run_op(op: &OpConfig, weight: Option<&RawBuf>, n_threads: usize, thread_index: usize, batch_size: usize, ctx: &ExecutionBuffers) -> Result<()> {
    let _ = batch_size; // batched forward is out of scope for this dispatch table (§9 non-goal)
    match op.code {
        OpCode::InvRms => {
            let (epsilon, n_columns) = match op.payload {
                OpPayload::InvRms { epsilon, n_columns } => (epsilon, n_columns),
                _ => unreachable!("InvRms op without InvRms payload"),
            };
            let x = ctx.resolve(&op.input).as_f32();
            let out = ctx.resolve(&op.output).as_f32_mut();
            if thread_index == 0 {
                out[0] = kernel::norm::inv_rms(&x[..n_columns], n_columns, epsilon);
            }
            Ok(())
        }
        OpCode::RmsNorm => {
            let (inv_rms_idx, n_columns) = match op.payload {
                OpPayload::RmsNorm { inv_rms_buffer_index, n_columns } => (inv_rms_buffer_index, n_columns),
                _ => unreachable!("RmsNorm op without RmsNorm payload"),
            };
            let w = weight.ok_or_else(|| EngineError::BadConfig(format!("rms_norm op {} has no weight", op.index)))?;
            let x = ctx.resolve(&op.input).as_f32();
            let inv_rms = ctx.buffer(inv_rms_idx).as_f32()[0];
            let out = ctx.resolve(&op.output).as_f32_mut();
            kernel::norm::rms_norm_f32(&mut out[..n_columns], &x[..n_columns], inv_rms, w.as_f32(), n_columns, n_threads, thread_index);
            Ok(())
        }
        OpCode::Matmul => {
            let (input_type, output_type) = match op.payload {
                OpPayload::Matmul { input_type, output_type } => (input_type, output_type),
                _ => unreachable!("Matmul op without Matmul payload"),
            };
            let w = weight.ok_or_else(|| EngineError::BadConfig(format!("matmul op {} has no weight", op.index)))?;
            let weight_type = op.weight_size.elem_type;
            let x = ctx.resolve(&op.input);
            let y = ctx.resolve(&op.output).as_f32_mut();
            let d = y.len();
            crate::graph::op_quant_type(input_type, weight_type, output_type).ok_or_else(|| {
                EngineError::KernelUnsupported(format!("matmul({:?}, {:?}) -> {:?}", input_type, weight_type, output_type))
            })?;
            let kernel = crate::kernel::select::resolve_matmul(input_type, weight_type, output_type)?;
            match kernel {
                crate::kernel::select::MatmulKernel::F32F32F32 => {
                    let x = x.as_f32();
                    kernel::matmul::matmul_f32_f32_f32(y, x, w.as_f32(), x.len(), d, n_threads, thread_index);
                }
                crate::kernel::select::MatmulKernel::Q80Q40F32 => {
                    let x = x.as_q80();
                    let n = x.len() * crate::quant::Q80_BLOCK_SIZE;
                    kernel::matmul::matmul_q80_q40_f32(y, x, w.as_q40(), n, d, n_threads, thread_index);
                }
                crate::kernel::select::MatmulKernel::Q80Q80F32 => {
                    let x = x.as_q80();
                    let n = x.len() * crate::quant::Q80_BLOCK_SIZE;
                    kernel::matmul::matmul_q80_q80_f32(y, x, w.as_q80(), n, d, n_threads, thread_index);
                }
            }
            Ok(())
        }
        OpCode::Rope => {
            let (rope_cache_idx, position_idx) = match op.payload {
                OpPayload::Rope { rope_cache_buffer_index, position_pipe_index, .. } => (rope_cache_buffer_index, position_pipe_index),
                _ => unreachable!("Rope op without Rope payload"),
            };
            let cache = ctx.buffer(rope_cache_idx).as_f32();
            let pos = ctx.pipe(position_idx).as_f32()[0] as usize;
            let x = ctx.resolve(&op.output).as_f32_mut();
            let slice_dim = x.len();
            let (s, e) = kernel::split_range(slice_dim / 2, n_threads, thread_index);
            kernel::rope::apply_rope(x, cache, pos, 0, slice_dim, s * 2, e * 2);
            Ok(())
        }
        OpCode::MultiheadAtt => {
            let params = match &op.payload {
                OpPayload::MultiheadAtt {
                    n_heads0,
                    n_kv_heads,
                    head_dim,
                    seq_len,
                    kv_dim0,
                    position_pipe_index,
                    key_cache_buffer_index,
                    value_cache_buffer_index,
                    ..
                } => kernel::attention::AttentionParams {
                    n_heads0: *n_heads0,
                    n_kv_heads: *n_kv_heads,
                    head_size: *head_dim,
                    seq_len: *seq_len,
                    kv_dim0: *kv_dim0,
                },
                _ => unreachable!("MultiheadAtt op without MultiheadAtt payload"),
            };
            let (position_idx, k_idx, v_idx) = match &op.payload {
                OpPayload::MultiheadAtt { position_pipe_index, key_cache_buffer_index, value_cache_buffer_index, .. } => {
                    (*position_pipe_index, *key_cache_buffer_index, *value_cache_buffer_index)
                }
                _ => unreachable!(),
            };
            let pos = ctx.pipe(position_idx).as_f32()[0] as usize;
            let q = ctx.resolve(&op.input).as_f32();
            let k_cache = ctx.buffer(k_idx).as_f32();
            let v_cache = ctx.buffer(v_idx).as_f32();
            let x = ctx.resolve(&op.output).as_f32_mut();
            let mut scratch = vec![0.0f32; params.seq_len];
            kernel::attention::multihead_att(x, q, k_cache, v_cache, &mut scratch, pos, &params, n_threads, thread_index);
            Ok(())
        }
        OpCode::Silu => {
            let x = ctx.resolve(&op.output).as_f32_mut();
            let n = x.len();
            kernel::activation::silu(x, n, n_threads, thread_index);
            Ok(())
        }
        OpCode::Gelu => {
            let x = ctx.resolve(&op.output).as_f32_mut();
            let n = x.len();
            kernel::activation::gelu(x, n, n_threads, thread_index);
            Ok(())
        }
        OpCode::Mul => {
            let mult_idx = match op.payload {
                OpPayload::Mul { multiplier_buffer_index } => multiplier_buffer_index,
                _ => unreachable!("Mul op without Mul payload"),
            };
            let w = ctx.buffer(mult_idx).as_f32().to_vec();
            let y = ctx.resolve(&op.output).as_f32_mut();
            let n = y.len();
            kernel::activation::mul(y, &w, n, n_threads, thread_index);
            Ok(())
        }
        OpCode::Shift => {
            let position_idx = match op.payload {
                OpPayload::Shift { index_pipe_index } => index_pipe_index,
                _ => unreachable!("Shift op without Shift payload"),
            };
            if thread_index != 0 {
                return Ok(());
            }
            let pos = ctx.pipe(position_idx).as_f32()[0] as usize;
            let src = ctx.resolve(&op.input).as_f32().to_vec();
            let row_width = src.len();
            let dst = ctx.resolve(&op.output).as_f32_mut();
            let seq_len = dst.len() / row_width;
            kernel::shift::shift(dst, &src, pos, row_width, seq_len);
            Ok(())
        }
        OpCode::MergeAdd => {
            if thread_index != 0 {
                return Ok(());
            }
            let partial = ctx.resolve(&op.input).as_f32().to_vec();
            let out = ctx.resolve(&op.output).as_f32_mut();
            for (o, p) in out.iter_mut().zip(partial.iter()) {
                *o += p;
            }
            Ok(())
        }
        OpCode::Embedding => {
            let table = weight.ok_or_else(|| EngineError::BadConfig("embedding op has no table".to_string()))?;
            let token = ctx.resolve(&op.input).as_f32()[0] as usize;
            let out = ctx.resolve(&op.output).as_f32_mut();
            let dim = out.len();
            kernel::embedding::embedding_f32(out, token, table.as_f32(), dim, n_threads, thread_index);
            Ok(())
        }
        OpCode::Cast => {
            let (input_type, output_type) = match op.payload {
                OpPayload::Cast { input_type, output_type } => (input_type, output_type),
                _ => unreachable!("Cast op without Cast payload"),
            };
            match (input_type, output_type) {
                (ElemType::F32, ElemType::F32) => {
                    let x = ctx.resolve(&op.input).as_f32();
                    let y = ctx.resolve(&op.output).as_f32_mut();
                    let n = x.len().min(y.len());
                    kernel::activation::cast_f32_to_f32(&x[..n], &mut y[..n], n, n_threads, thread_index);
                }
                (ElemType::F32, ElemType::Q80) => {
                    let x = ctx.resolve(&op.input).as_f32();
                    let y = ctx.resolve(&op.output).as_q80_mut();
                    let n = x.len();
                    kernel::activation::cast_f32_to_q80(x, y, n, n_threads, thread_index);
                }
                (ElemType::Q80, ElemType::F32) => {
                    let x = ctx.resolve(&op.input).as_q80();
                    let y = ctx.resolve(&op.output).as_f32_mut();
                    let n = y.len();
                    kernel::activation::cast_q80_to_f32(x, y, n, n_threads, thread_index);
                }
                (ElemType::Q40, ElemType::F32) => {
                    let x = ctx.resolve(&op.input).as_q40();
                    let y = ctx.resolve(&op.output).as_f32_mut();
                    let n = y.len();
                    kernel::activation::cast_q40_to_f32(x, y, n, n_threads, thread_index);
                }
                _ => {
                    return Err(EngineError::KernelUnsupported(format!("cast({:?} -> {:?})", input_type, output_type)));
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ExecutionBuffers;
    use crate::graph::{OpConfig, PointerConfig};
    use crate::slice::size1d;

    #[test]
    fn matmul_segment_reproduces_reference() {
        let n = 8usize;
        let d = 4usize;
        let ctx = ExecutionBuffers::new(&[], &[n * 4, d * 4]);
        let x = ctx.buffer(0).as_f32_mut();
        for (i, v) in x.iter_mut().enumerate() {
            *v = i as f32;
        }

        let op = OpConfig {
            code: OpCode::Matmul,
            name: "wq".to_string(),
            index: 0,
            input: PointerConfig::batch(PointerSource::Buffer, 0),
            output: PointerConfig::batch(PointerSource::Buffer, 1),
            weight_size: size1d(ElemType::F32, n * d),
            payload: OpPayload::Matmul { input_type: ElemType::F32, output_type: ElemType::F32 },
        };

        let device = CpuDevice::new(4);
        let mut segment = device.create_segment(vec![op]);
        let w: Vec<f32> = (0..n * d).map(|i| (i % 3) as f32 - 1.0).collect();
        let w_bytes = unsafe { std::slice::from_raw_parts(w.as_ptr() as *const u8, w.len() * 4) };
        segment.load_weight(0, 0, w_bytes).unwrap();
        segment.forward(0, 1, 0, 1, &ctx).unwrap();

        let mut expected = vec![0.0f32; d];
        kernel::matmul::matmul_f32_f32_f32(&mut expected, ctx.buffer(0).as_f32(), &w, n, d, 1, 0);
        for (a, b) in expected.iter().zip(ctx.buffer(1).as_f32().iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
