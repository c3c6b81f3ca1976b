//! Session handshake (§6.2): before any forward pass, the root sends
//! every worker the net config and its own node config, each framed as
//! a length-prefixed blob, acked on both ends. Weight bytes stream
//! afterwards over the same framing (§4.9, §6.2).

use crate::device::DeviceSegment;
use crate::graph::builder::{BlockDims, ModelDims};
use crate::kernel::rope::RopeType;
use crate::quant::ElemType;
use crate::transport::Network;
use crate::utils::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Wire form of `graph::builder::ModelDims` (§6.2). A worker has no
/// model file of its own; it learns the header fields this way and
/// builds the identical op graph the root built, rather than the op
/// graph itself being shipped over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireModelDims {
    pub dim: usize,
    pub hidden_dim: usize,
    pub n_heads: usize,
    pub n_kv_heads: usize,
    pub head_dim: usize,
    pub kv_dim: usize,
    pub seq_len: usize,
    pub n_nodes: usize,
    pub n_layers: usize,
    pub vocab_size: usize,
    pub rope_type: u8,
    pub rope_theta: f32,
    pub weight_type: u8,
    pub act_type: u8,
}

fn elem_type_code(t: ElemType) -> u8 {
    match t {
        ElemType::F32 => 0,
        ElemType::F16 => 1,
        ElemType::Q40 => 2,
        ElemType::Q80 => 3,
        ElemType::Unk => 4,
    }
}

fn elem_type_from_code(code: u8) -> Result<ElemType> {
    match code {
        0 => Ok(ElemType::F32),
        1 => Ok(ElemType::F16),
        2 => Ok(ElemType::Q40),
        3 => Ok(ElemType::Q80),
        4 => Ok(ElemType::Unk),
        other => Err(EngineError::BadConfig(format!("unknown wire elem type code {other}"))),
    }
}

impl From<&ModelDims> for WireModelDims {
    fn from(d: &ModelDims) -> Self {
        Self {
            dim: d.block.dim,
            hidden_dim: d.block.hidden_dim,
            n_heads: d.block.n_heads,
            n_kv_heads: d.block.n_kv_heads,
            head_dim: d.block.head_dim,
            kv_dim: d.block.kv_dim,
            seq_len: d.block.seq_len,
            n_nodes: d.block.n_nodes,
            n_layers: d.n_layers,
            vocab_size: d.vocab_size,
            rope_type: match d.block.rope_type {
                RopeType::Llama => 0,
                RopeType::Llama31 => 1,
            },
            rope_theta: d.block.rope_theta,
            weight_type: elem_type_code(d.block.weight_type),
            act_type: elem_type_code(d.block.act_type),
        }
    }
}

impl WireModelDims {
    pub fn to_model_dims(&self) -> Result<ModelDims> {
        let rope_type = match self.rope_type {
            0 => RopeType::Llama,
            1 => RopeType::Llama31,
            other => return Err(EngineError::BadConfig(format!("unknown wire rope type code {other}"))),
        };
        Ok(ModelDims {
            block: BlockDims {
                dim: self.dim,
                hidden_dim: self.hidden_dim,
                n_heads: self.n_heads,
                n_kv_heads: self.n_kv_heads,
                head_dim: self.head_dim,
                kv_dim: self.kv_dim,
                seq_len: self.seq_len,
                n_nodes: self.n_nodes,
                rope_type,
                rope_theta: self.rope_theta,
                weight_type: elem_type_from_code(self.weight_type)?,
                act_type: elem_type_from_code(self.act_type)?,
            },
            n_layers: self.n_layers,
            vocab_size: self.vocab_size,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireNetConfig {
    pub model_dims: WireModelDims,
    pub pipe_byte_sizes: Vec<usize>,
    pub pre_syncs: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireNodeConfig {
    pub node_index: usize,
    pub buffer_byte_sizes: Vec<usize>,
}

fn write_framed<T: Serialize>(network: &Network, socket_index: usize, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value).map_err(|e| EngineError::TransportWrite(e.to_string()))?;
    let len = payload.len() as u32;
    network.write(socket_index, &len.to_le_bytes())?;
    network.write(socket_index, &payload)
}

fn read_framed<T: for<'de> Deserialize<'de>>(network: &Network, socket_index: usize) -> Result<T> {
    let mut len_buf = [0u8; 4];
    network.read(socket_index, &mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    network.read(socket_index, &mut payload)?;
    serde_json::from_slice(&payload).map_err(|e| EngineError::TransportRead(e.to_string()))
}

/// Root-side writer: sends the net config once and each worker its own
/// node config, acking the handshake on every socket (§6.2).
pub struct RootConfigWriter<'a> {
    network: &'a Network,
}

impl<'a> RootConfigWriter<'a> {
    pub fn new(network: &'a Network) -> Self {
        Self { network }
    }

    pub fn write_to_workers(&self, net: &WireNetConfig, node_configs: &[WireNodeConfig]) -> Result<()> {
        for (worker_index, node_config) in node_configs.iter().enumerate().skip(1) {
            let socket_index = self.network.peer_socket_index(0, worker_index);
            write_framed(self.network, socket_index, net)?;
            write_framed(self.network, socket_index, node_config)?;
            self.network.write_ack(socket_index)?;
        }
        Ok(())
    }
}

/// Worker-side reader: blocks until the root sends the net config and
/// this worker's node config, then acks (§6.2).
pub struct WorkerConfigReader<'a> {
    network: &'a Network,
}

impl<'a> WorkerConfigReader<'a> {
    pub fn new(network: &'a Network) -> Self {
        Self { network }
    }

    pub fn read_net(&self) -> Result<WireNetConfig> {
        read_framed(self.network, crate::transport::ROOT_SOCKET_INDEX)
    }

    pub fn read_node(&self) -> Result<WireNodeConfig> {
        let node = read_framed(self.network, crate::transport::ROOT_SOCKET_INDEX)?;
        self.network.write_ack(crate::transport::ROOT_SOCKET_INDEX)?;
        Ok(node)
    }
}

/// One weight shard addressed to a specific node's segment/op during
/// the load stream; a zero-length `bytes` record is the terminator
/// (§4.9 "receive `(name, index, n_bytes, bytes)` until a zero-length
/// record, then ACK").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireWeightRecord {
    pub segment_index: usize,
    pub op_index: usize,
    pub bytes: Vec<u8>,
}

/// Root-side: streams one worker's weight shards as they're split out
/// of the model file (§4.9).
pub struct RootWeightStreamWriter<'a> {
    network: &'a Network,
    socket_index: usize,
}

impl<'a> RootWeightStreamWriter<'a> {
    pub fn new(network: &'a Network, socket_index: usize) -> Self {
        Self { network, socket_index }
    }

    pub fn send(&self, segment_index: usize, op_index: usize, bytes: &[u8]) -> Result<()> {
        write_framed(self.network, self.socket_index, &WireWeightRecord { segment_index, op_index, bytes: bytes.to_vec() })
    }

    /// Send the zero-length terminator and wait for the worker's ack.
    pub fn finish(&self) -> Result<()> {
        write_framed(self.network, self.socket_index, &WireWeightRecord { segment_index: 0, op_index: 0, bytes: Vec::new() })?;
        self.network.read_ack(self.socket_index)
    }
}

/// Worker-side: reads weight shards until the terminator, loading each
/// into the matching segment, then acks the stream (§4.9).
pub struct WorkerWeightStreamReader<'a> {
    network: &'a Network,
}

impl<'a> WorkerWeightStreamReader<'a> {
    pub fn new(network: &'a Network) -> Self {
        Self { network }
    }

    pub fn read_into(&self, segments: &mut [Box<dyn DeviceSegment>]) -> Result<()> {
        loop {
            let record: WireWeightRecord = read_framed(self.network, crate::transport::ROOT_SOCKET_INDEX)?;
            if record.bytes.is_empty() {
                break;
            }
            segments[record.segment_index].load_weight(record.op_index, 0, &record.bytes)?;
        }
        self.network.write_ack(crate::transport::ROOT_SOCKET_INDEX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trips_over_loopback() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let network = Network::from_sockets(vec![stream]).unwrap();
            let writer = RootConfigWriter::new(&network);
            let model_dims = ModelDims {
                block: BlockDims {
                    dim: 8,
                    hidden_dim: 16,
                    n_heads: 2,
                    n_kv_heads: 2,
                    head_dim: 4,
                    kv_dim: 8,
                    seq_len: 32,
                    n_nodes: 2,
                    rope_type: RopeType::Llama,
                    rope_theta: 10_000.0,
                    weight_type: ElemType::F32,
                    act_type: ElemType::F32,
                },
                n_layers: 1,
                vocab_size: 64,
            };
            let net = WireNetConfig { model_dims: (&model_dims).into(), pipe_byte_sizes: vec![1024], pre_syncs: vec![0] };
            let nodes = vec![
                WireNodeConfig { node_index: 0, buffer_byte_sizes: vec![64] },
                WireNodeConfig { node_index: 1, buffer_byte_sizes: vec![64] },
            ];
            writer.write_to_workers(&net, &nodes).unwrap();
        });

        let client = Network::connect(addr).unwrap();
        let reader = WorkerConfigReader::new(&client);
        let net = reader.read_net().unwrap();
        assert_eq!(net.model_dims.n_nodes, 2);
        let node = reader.read_node().unwrap();
        assert_eq!(node.node_index, 1);

        server.join().unwrap();
    }

    #[test]
    fn weight_stream_round_trips_and_terminates() {
        use crate::device::cpu::CpuDevice;
        use crate::device::Device;
        use crate::graph::{OpCode, OpConfig, OpPayload, PointerConfig, PointerSource};
        use crate::slice::size1d;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let network = Network::from_sockets(vec![stream]).unwrap();
            let writer = RootWeightStreamWriter::new(&network, 0);
            writer.send(0, 0, &[1, 2, 3, 4]).unwrap();
            writer.finish().unwrap();
        });

        let op = OpConfig {
            code: OpCode::Matmul,
            name: "wq".to_string(),
            index: 0,
            input: PointerConfig::batch(PointerSource::Buffer, 0),
            output: PointerConfig::batch(PointerSource::Buffer, 1),
            weight_size: size1d(ElemType::F32, 1),
            payload: OpPayload::Matmul { input_type: ElemType::F32, output_type: ElemType::F32 },
        };
        let mut segments: Vec<Box<dyn DeviceSegment>> = vec![CpuDevice::new(1).create_segment(vec![op])];

        let client = Network::connect(addr).unwrap();
        let reader = WorkerWeightStreamReader::new(&client);
        reader.read_into(&mut segments).unwrap();

        server.join().unwrap();
    }
}
