//! Binary entry point (§6.3): `inference`, `chat`, and `worker` modes
//! over a hand-rolled `std::env::args()` flag surface — no `clap` in
//! the dependency set this crate inherits, so the CLI reads flags the
//! same env/flag-merge way `config::EngineConfig` already does.

use std::io::Write;
use std::net::TcpStream;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tensormesh_engine::config::EngineConfig;
use tensormesh_engine::device::cpu::CpuDevice;
use tensormesh_engine::executor::Executor;
use tensormesh_engine::graph::builder::{build_model_net, BlockDims, ModelDims};
use tensormesh_engine::graph::{NodeConfig, SegmentConfig, SyncConfig};
use tensormesh_engine::kernel::rope::RopeType;
use tensormesh_engine::model::compile::{compile_node, load_root_weights};
use tensormesh_engine::model::header::ModelHeader;
use tensormesh_engine::quant::ElemType;
use tensormesh_engine::run::chat_template;
use tensormesh_engine::run::root::RootRunner;
use tensormesh_engine::run::sampler::TemperatureSampler;
use tensormesh_engine::run::tokenizer::BpeTokenizer;
use tensormesh_engine::run::worker::WorkerRunner;
use tensormesh_engine::sync::{FakeSynchronizer, NetworkSynchronizer, NodeSynchronizer, PipeSync};
use tensormesh_engine::transport::Network;
use tensormesh_engine::utils::error::EngineError;
use tensormesh_engine::wire::{RootConfigWriter, RootWeightStreamWriter, WireNetConfig, WireNodeConfig, WorkerConfigReader, WorkerWeightStreamReader};

type CliResult<T> = std::result::Result<T, CliError>;

/// Fixed pipe layout `build_model_net` always hands out: `x`, then
/// `position`, `token`, `logits` in that order (§4.4).
const POSITION_PIPE: usize = 1;
const TOKEN_PIPE: usize = 2;
const LOGITS_PIPE: usize = 3;

fn init_logging(cfg: &EngineConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("tensormesh={}", cfg.logging.level)));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}

enum CliError {
    Usage(String),
    Engine(EngineError),
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        CliError::Engine(e)
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    match run(&args) {
        Ok(()) => ExitCode::from(0),
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            ExitCode::from(1)
        }
        Err(CliError::Engine(e)) => match e {
            EngineError::TransportRead(_) | EngineError::TransportWrite(_) => {
                eprintln!("transport failure: {e}");
                ExitCode::from(1)
            }
            other => {
                eprintln!("model/integrity failure: {other}");
                ExitCode::from(2)
            }
        },
    }
}

/// Parsed `--flag value` pairs plus the leading positional mode.
/// `--workers` is special-cased to collect every token up to the next
/// `--flag` as a `host:port` peer address (§6.3 `--workers host:port
/// ...`); every other flag takes exactly one value.
struct Flags {
    mode: String,
    values: std::collections::HashMap<String, String>,
    workers: Vec<String>,
    rest: Vec<String>,
}

fn parse_flags(args: &[String]) -> CliResult<Flags> {
    if args.len() < 2 {
        return Err(CliError::Usage("usage: tensormesh <inference|chat|worker> [flags...]".to_string()));
    }
    let mode = args[1].clone();
    let mut values = std::collections::HashMap::new();
    let mut workers = Vec::new();
    let mut rest = Vec::new();
    let mut i = 2;
    while i < args.len() {
        let arg = &args[i];
        if let Some(name) = arg.strip_prefix("--") {
            if name == "workers" {
                i += 1;
                while i < args.len() && !args[i].starts_with("--") {
                    workers.push(args[i].clone());
                    i += 1;
                }
                continue;
            }
            let value = args.get(i + 1).cloned().ok_or_else(|| CliError::Usage(format!("flag --{name} needs a value")))?;
            values.insert(name.to_string(), value);
            i += 2;
        } else {
            rest.push(arg.clone());
            i += 1;
        }
    }
    Ok(Flags { mode, values, workers, rest })
}

fn parse_elem_type(s: &str) -> CliResult<ElemType> {
    match s {
        "f32" => Ok(ElemType::F32),
        "f16" => Ok(ElemType::F16),
        "q40" => Ok(ElemType::Q40),
        "q80" => Ok(ElemType::Q80),
        other => Err(CliError::Usage(format!("unknown float type '{other}', expected f32|f16|q40|q80"))),
    }
}

/// §6.1's on-disk weight-type codes, matching `NnFloatType`:
/// `F_32=0, F_16=1, F_Q40=2, F_Q80=3`.
fn elem_type_from_header_code(code: u32) -> CliResult<ElemType> {
    match code {
        0 => Ok(ElemType::F32),
        1 => Ok(ElemType::F16),
        2 => Ok(ElemType::Q40),
        3 => Ok(ElemType::Q80),
        other => Err(CliError::Usage(format!("unsupported weight float type code {other} in model file"))),
    }
}

/// §6.1's rope-type codes: `ROPE_LLAMA=0, ROPE_LLAMA3_1=2` (the Falcon
/// variant at `1` has no implementation in this engine).
fn rope_type_from_header_code(code: u32) -> CliResult<RopeType> {
    match code {
        0 => Ok(RopeType::Llama),
        2 => Ok(RopeType::Llama31),
        other => Err(CliError::Usage(format!("unsupported rope type code {other} in model file"))),
    }
}

fn default_seed() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn run(args: &[String]) -> CliResult<()> {
    let flags = parse_flags(args)?;
    let mut config = EngineConfig::load();

    if let Some(v) = flags.values.get("port") {
        config.network.port = v.parse().map_err(|_| CliError::Usage("--port must be a u16".to_string()))?;
    }
    if !flags.workers.is_empty() {
        config.network.workers = flags.workers.clone();
    }
    if let Some(v) = flags.values.get("nthreads") {
        config.performance.n_threads = v.parse().map_err(|_| CliError::Usage("--nthreads must be a positive integer".to_string()))?;
    }
    if let Some(v) = flags.values.get("max-seq-len") {
        config.node.max_seq_len = v.parse().map_err(|_| CliError::Usage("--max-seq-len must be a positive integer".to_string()))?;
    }
    if let Some(v) = flags.values.get("temperature") {
        config.sampling.temperature = v.parse().map_err(|_| CliError::Usage("--temperature must be a float".to_string()))?;
    }
    if let Some(v) = flags.values.get("topp") {
        config.sampling.topp = v.parse().map_err(|_| CliError::Usage("--topp must be a float".to_string()))?;
    }
    if let Some(v) = flags.values.get("seed") {
        config.sampling.seed = v.parse().map_err(|_| CliError::Usage("--seed must be a u64".to_string()))?;
    } else if config.sampling.seed == 0 {
        config.sampling.seed = default_seed();
    }
    if let Some(v) = flags.values.get("chat-template") {
        config.node.chat_template = v.clone();
    }
    if let Some(v) = flags.values.get("model") {
        config.node.model_path = v.into();
    }
    if let Some(v) = flags.values.get("tokenizer") {
        config.node.tokenizer_path = v.into();
    }
    if let Some(v) = flags.values.get("buffer-float-type") {
        config.node.buffer_float_type = v.clone();
    }
    if let Some(v) = flags.values.get("weights-float-type") {
        config.node.weights_float_type = v.clone();
    }

    init_logging(&config);

    match flags.mode.as_str() {
        "inference" => run_root(&config, &flags, false),
        "chat" => run_root(&config, &flags, true),
        "worker" => run_worker(&config),
        other => Err(CliError::Usage(format!("unknown mode '{other}', expected inference|chat|worker"))),
    }
}

fn segment_syncs_from(segments: &[SegmentConfig]) -> Vec<Vec<PipeSync>> {
    segments
        .iter()
        .map(|s| s.syncs.iter().map(|sc: &SyncConfig| PipeSync { pipe_index: sc.pipe_index, mode: sc.mode }).collect())
        .collect()
}

fn load_header_dims(config: &EngineConfig, model_file: &mut std::fs::File) -> CliResult<ModelDims> {
    let header = ModelHeader::read(model_file).map_err(CliError::Engine)?;
    let n_nodes = 1 + config.network.workers.len();
    let head_dim = if header.head_size > 0 { header.head_size as usize } else { header.dim as usize / header.n_heads.max(1) as usize };

    let dims = ModelDims {
        block: BlockDims {
            dim: header.dim as usize,
            hidden_dim: header.hidden_dim as usize,
            n_heads: header.n_heads as usize,
            n_kv_heads: header.n_kv_heads as usize,
            head_dim,
            kv_dim: head_dim * header.n_kv_heads as usize,
            seq_len: (header.seq_len as usize).min(config.node.max_seq_len).max(1),
            n_nodes,
            rope_type: rope_type_from_header_code(header.rope_type)?,
            rope_theta: header.rope_theta,
            weight_type: elem_type_from_header_code(header.weight_type)?,
            act_type: parse_elem_type(&config.node.buffer_float_type)?,
        },
        n_layers: header.n_layers as usize,
        vocab_size: header.vocab_size as usize,
    };

    if let Ok(expected) = parse_elem_type(&config.node.weights_float_type) {
        if expected != dims.block.weight_type {
            return Err(CliError::Usage(format!(
                "--weights-float-type {} doesn't match the model file's weight type",
                config.node.weights_float_type
            )));
        }
    }
    Ok(dims)
}

fn run_root(config: &EngineConfig, flags: &Flags, interactive: bool) -> CliResult<()> {
    if config.node.model_path.as_os_str().is_empty() {
        return Err(CliError::Usage("--model is required".to_string()));
    }
    if config.node.tokenizer_path.as_os_str().is_empty() {
        return Err(CliError::Usage("--tokenizer is required".to_string()));
    }

    let mut model_file = std::fs::File::open(&config.node.model_path).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;
    let dims = load_header_dims(config, &mut model_file)?;
    let n_nodes = dims.block.n_nodes;

    let (net, nodes) = build_model_net(&dims);
    let device = CpuDevice::new(config.performance.n_threads);
    let (steps, mut segments, buffers) = compile_node(&device, &net, &nodes[0]);

    let synchronizer: Box<dyn NodeSynchronizer> = if n_nodes > 1 {
        let mut sockets = Vec::with_capacity(config.network.workers.len());
        for addr in &config.network.workers {
            sockets.push(TcpStream::connect(addr).map_err(|e| EngineError::TransportWrite(e.to_string()))?);
        }
        let mut network = Network::from_sockets(sockets)?;
        network.set_turbo(config.network.turbo)?;

        let wire_net = WireNetConfig {
            model_dims: (&dims).into(),
            pipe_byte_sizes: net.pipes.iter().map(|p| p.size.n_bytes).collect(),
            pre_syncs: net.pre_syncs.clone(),
        };
        let wire_nodes: Vec<WireNodeConfig> = nodes
            .iter()
            .map(|n| WireNodeConfig { node_index: n.node_index, buffer_byte_sizes: n.buffers.iter().map(|b| b.size.n_bytes).collect() })
            .collect();
        RootConfigWriter::new(&network).write_to_workers(&wire_net, &wire_nodes)?;

        load_root_weights(&mut model_file, &dims, &nodes[0], &mut segments, |peer, seg, op, bytes| {
            let socket_index = network.peer_socket_index(0, peer);
            RootWeightStreamWriter::new(&network, socket_index).send(seg, op, bytes)
        })?;
        for peer in 1..n_nodes {
            let socket_index = network.peer_socket_index(0, peer);
            RootWeightStreamWriter::new(&network, socket_index).finish()?;
        }

        Box::new(NetworkSynchronizer::new(Arc::new(network), 0, n_nodes, segment_syncs_from(&nodes[0].segments)))
    } else {
        load_root_weights(&mut model_file, &dims, &nodes[0], &mut segments, |_, _, _, _| {
            Err(EngineError::BadConfig("single-node run produced a peer weight slice".to_string()))
        })?;
        Box::new(FakeSynchronizer)
    };

    let executor = Executor::new(steps, segments, buffers, synchronizer, config.performance.n_threads, config.performance.n_batches);

    let mut tokenizer_file = std::fs::File::open(&config.node.tokenizer_path).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;
    let tokenizer = BpeTokenizer::load(&mut tokenizer_file)?;
    let template = chat_template::resolve(&config.node.chat_template).map_err(CliError::Engine)?;
    let mut sampler = TemperatureSampler::new(config.sampling.temperature, config.sampling.topp, config.sampling.seed);

    info!(n_nodes, n_layers = dims.n_layers, dim = dims.block.dim, "engine ready");

    let runner = RootRunner {
        executor: &executor,
        buffers: executor.buffers(),
        position_pipe_index: POSITION_PIPE,
        token_pipe_index: TOKEN_PIPE,
        logits_pipe_index: LOGITS_PIPE,
        tokenizer: &tokenizer,
        template: template.as_ref(),
    };

    if interactive {
        run_chat_loop(&runner, &tokenizer, &mut sampler, config)
    } else {
        run_inference_once(&runner, &tokenizer, &mut sampler, config, &flags.rest.join(" "))
    }
}

fn run_inference_once(runner: &RootRunner, tokenizer: &BpeTokenizer, sampler: &mut TemperatureSampler, config: &EngineConfig, prompt: &str) -> CliResult<()> {
    let messages = vec![("user".to_string(), prompt.to_string())];
    let generated = runner.generate(&messages, config.node.max_seq_len, config.node.max_seq_len, sampler)?;
    let mut stdout = std::io::stdout();
    for token in generated {
        let _ = write!(stdout, "{}", tokenizer.decode(token));
    }
    println!();
    Ok(())
}

fn run_chat_loop(runner: &RootRunner, tokenizer: &BpeTokenizer, sampler: &mut TemperatureSampler, config: &EngineConfig) -> CliResult<()> {
    let mut messages: Vec<(String, String)> = Vec::new();
    let stdin = std::io::stdin();
    loop {
        print!("user: ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end().to_string();
        if line.is_empty() {
            break;
        }
        messages.push(("user".to_string(), line));

        let generated = runner.generate(&messages, config.node.max_seq_len, config.node.max_seq_len, sampler)?;
        let reply: String = generated.iter().map(|t| tokenizer.decode(*t)).collect();
        println!("assistant: {reply}");
        messages.push(("assistant".to_string(), reply));
    }
    Ok(())
}

fn run_worker(config: &EngineConfig) -> CliResult<()> {
    let mut network = Network::serve(config.network.port, 1)?;
    network.set_turbo(config.network.turbo)?;
    let network = Arc::new(network);

    let reader = WorkerConfigReader::new(&network);
    let wire_net = reader.read_net()?;
    let wire_node = reader.read_node()?;

    let dims = wire_net.model_dims.to_model_dims().map_err(CliError::Engine)?;
    let (net, nodes) = build_model_net(&dims);
    let node: NodeConfig = nodes
        .into_iter()
        .find(|n| n.node_index == wire_node.node_index)
        .ok_or_else(|| EngineError::BadConfig(format!("no node config for index {}", wire_node.node_index)))?;

    let device = CpuDevice::new(config.performance.n_threads);
    let (steps, mut segments, buffers) = compile_node(&device, &net, &node);

    WorkerWeightStreamReader::new(&network).read_into(&mut segments)?;

    let segment_syncs = segment_syncs_from(&node.segments);
    let synchronizer = Box::new(NetworkSynchronizer::new(Arc::clone(&network), wire_node.node_index, dims.block.n_nodes, segment_syncs));
    let executor = Executor::new(steps, segments, buffers, synchronizer, config.performance.n_threads, config.performance.n_batches);

    info!(node_index = wire_node.node_index, "worker ready");
    let runner = WorkerRunner { executor: &executor, network: &network };
    runner.run()?;
    let (sent, received) = runner.transport_stats();
    info!(sent, received, "worker shutting down after root disconnected");
    Ok(())
}
