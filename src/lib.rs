//! A distributed, tensor-parallel inference engine for dense
//! LLaMA-family transformers.
//!
//! A designated root node owns the tokenizer, sampler, and user I/O;
//! worker nodes hold equal shards of every layer's weights and
//! participate in every token's forward pass over TCP. Tensor
//! parallelism is per-layer: attention heads and feed-forward columns
//! are row- or column-sliced across nodes, and partial results are
//! merged via small all-to-all exchanges embedded in the forward
//! graph.
//!
//! ## Module map
//! - [`quant`] — Q40/Q80 block quantization and f16 conversion.
//! - [`kernel`] — pure numeric kernels threads run their slice of.
//! - [`slice`] — row/column/head slicers and weight splitters.
//! - [`graph`] — the operator graph data model.
//! - [`device`] — the CPU backend that executes one op at a time.
//! - [`executor`] — the lock-free thread-pool barrier.
//! - [`sync`] — the distributed pipe synchronizer.
//! - [`transport`] — the TCP wire layer.
//! - [`wire`] — the session handshake framing.
//! - [`model`] — the model file format and weight loader.
//! - [`run`] — root/worker run loops and their collaborator seams.
//! - [`api`] — the HTTP surface (collaborator).

pub mod api;
pub mod config;
pub mod device;
pub mod executor;
pub mod graph;
pub mod kernel;
pub mod metrics;
pub mod model;
pub mod quant;
pub mod run;
pub mod slice;
pub mod sync;
pub mod transport;
pub mod utils;
pub mod wire;

pub use api::{build_router, AppState};
pub use config::EngineConfig;
pub use metrics::{create_metrics, EngineMetrics, MetricsSnapshot, SharedMetrics};
pub use utils::error::{EngineError, Result};
