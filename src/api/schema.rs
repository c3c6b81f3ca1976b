//! HTTP request/response schemas (§6.4). Full OpenAI schema fidelity
//! and SSE streaming are out of scope here; these are the typed
//! structs the core hands to a collaborator that wants a richer
//! surface.

use crate::metrics::SharedMetrics;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Generates a full chat completion from a rendered message list. The
/// HTTP layer depends only on this trait, not on `run::RootRunner`
/// directly, so the executor/device/graph machinery never needs to be
/// `'static` + `Clone` to live in `axum` state.
pub trait ChatGenerator: Send + Sync {
    fn generate(&self, messages: &[ChatMessage], params: &GenerationParams) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: usize,
    pub stop: Vec<String>,
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn ChatGenerator>,
    pub model_name: String,
    pub metrics: SharedMetrics,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.0
}
fn default_top_p() -> f32 {
    0.9
}
fn default_max_tokens() -> usize {
    512
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChoice {
    pub index: usize,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Serialize)]
pub struct ModelData {
    pub id: String,
    pub object: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelData>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: f64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
