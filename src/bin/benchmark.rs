//! Benchmark utility for the engine.
//!
//! Usage: cargo run --release --bin benchmark -- --model M --tokenizer T [--prompt "..."] [--steps N]
//!
//! Runs a single-node generation request locally (no socket, no HTTP
//! server) and reports tokens/sec the way `utils::benchmark` reports
//! it for any other request path.

use std::time::Instant;
use tensormesh_engine::config::EngineConfig;
use tensormesh_engine::device::cpu::CpuDevice;
use tensormesh_engine::executor::Executor;
use tensormesh_engine::graph::builder::{build_model_net, BlockDims, ModelDims};
use tensormesh_engine::kernel::rope::RopeType;
use tensormesh_engine::model::compile::{compile_node, load_root_weights};
use tensormesh_engine::model::header::ModelHeader;
use tensormesh_engine::quant::ElemType;
use tensormesh_engine::run::chat_template;
use tensormesh_engine::run::root::RootRunner;
use tensormesh_engine::run::sampler::TemperatureSampler;
use tensormesh_engine::run::tokenizer::BpeTokenizer;
use tensormesh_engine::sync::FakeSynchronizer;
use tensormesh_engine::utils::{BenchmarkTracker, MemorySnapshot};

fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).cloned()
}

fn elem_type_from_code(code: u32) -> ElemType {
    match code {
        1 => ElemType::F16,
        2 => ElemType::Q40,
        3 => ElemType::Q80,
        _ => ElemType::F32,
    }
}

fn rope_type_from_code(code: u32) -> RopeType {
    if code == 2 {
        RopeType::Llama31
    } else {
        RopeType::Llama
    }
}

fn main() {
    println!("=== tensormesh-engine benchmark ===\n");

    let args: Vec<String> = std::env::args().collect();
    let config = EngineConfig::load();
    let model_path = flag(&args, "--model").map(std::path::PathBuf::from).unwrap_or(config.node.model_path.clone());
    let tokenizer_path = flag(&args, "--tokenizer").map(std::path::PathBuf::from).unwrap_or(config.node.tokenizer_path.clone());
    let prompt = flag(&args, "--prompt").unwrap_or_else(|| "Explain quantum computing in one sentence.".to_string());
    let steps: usize = flag(&args, "--steps").and_then(|s| s.parse().ok()).unwrap_or(64);

    if let Some(mem) = MemorySnapshot::capture() {
        println!("Initial memory usage:");
        mem.display();
        println!();
    }

    let mut model_file = match std::fs::File::open(&model_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to open model file {}: {e}", model_path.display());
            std::process::exit(1);
        }
    };
    let header = ModelHeader::read(&mut model_file).expect("valid model header");
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
            n_nodes: 1,
            rope_type: rope_type_from_code(header.rope_type),
            rope_theta: header.rope_theta,
            weight_type: elem_type_from_code(header.weight_type),
            act_type: ElemType::F32,
        },
        n_layers: header.n_layers as usize,
        vocab_size: header.vocab_size as usize,
    };

    let (net, nodes) = build_model_net(&dims);
    let device = CpuDevice::new(config.performance.n_threads);
    let (steps_program, mut segments, buffers) = compile_node(&device, &net, &nodes[0]);
    load_root_weights(&mut model_file, &dims, &nodes[0], &mut segments, |_, _, _, _| {
        unreachable!("single-node benchmark never produces a peer weight slice")
    })
    .expect("weight load");

    let executor = Executor::new(steps_program, segments, buffers, Box::new(FakeSynchronizer), config.performance.n_threads, config.performance.n_batches);

    let mut tokenizer_file = std::fs::File::open(&tokenizer_path).expect("tokenizer file");
    let tokenizer = BpeTokenizer::load(&mut tokenizer_file).expect("valid tokenizer file");
    let template = chat_template::resolve(&config.node.chat_template).expect("known chat template");
    let mut sampler = TemperatureSampler::new(config.sampling.temperature, config.sampling.topp, config.sampling.seed);

    let runner = RootRunner {
        executor: &executor,
        buffers: executor.buffers(),
        position_pipe_index: 1,
        token_pipe_index: 2,
        logits_pipe_index: 3,
        tokenizer: &tokenizer,
        template: template.as_ref(),
    };

    println!("Model: {} ({} layers, dim={})", model_path.display(), dims.n_layers, dims.block.dim);
    println!("Steps: {steps}\n");
    println!("Starting benchmark...\n");

    let mut tracker = BenchmarkTracker::new();
    let start = Instant::now();
    let messages = vec![("user".to_string(), prompt)];
    let generated = runner.generate(&messages, steps, dims.block.seq_len, &mut sampler).expect("generation");
    for _ in &generated {
        tracker.record_token();
    }
    tracker.record_request(start.elapsed());

    println!("Benchmark completed!");
    println!("Total time: {:.2}s\n", start.elapsed().as_secs_f64());

    let results = tracker.finalize();
    results.display();

    if let Some(mem) = MemorySnapshot::capture() {
        println!("\nFinal memory usage:");
        mem.display();
    }

    if let Err(e) = std::fs::write("benchmark_results.json", results.to_json()) {
        eprintln!("failed to write results: {e}");
        std::process::exit(1);
    }
    println!("\nResults exported to benchmark_results.json");
}
