//! HTTP request handlers (§6.4). These are thin adapters over the
//! typed request/response structs and the `ChatGenerator` seam; full
//! SSE streaming and OpenAI schema fidelity are collaborator work.

use crate::api::schema::{
    AppState, ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, GenerationParams, HealthResponse, ModelData,
    ModelsResponse,
};
use crate::utils::error::EngineError;
use axum::{extract::State, Json};
use tracing::info;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: state.metrics.uptime_secs(),
    })
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        object: "list".to_string(),
        data: vec![ModelData {
            id: state.model_name.clone(),
            object: "model".to_string(),
        }],
    })
}

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> std::result::Result<Json<ChatCompletionResponse>, EngineError> {
    if request.messages.is_empty() {
        return Err(EngineError::InvalidRequest("messages cannot be empty".to_string()));
    }

    info!(n_messages = request.messages.len(), model = %request.model, "chat completion request");

    state.metrics.request_start();
    let start = std::time::Instant::now();

    let params = GenerationParams {
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
        stop: request.stop.clone(),
    };

    let result = state.generator.generate(&request.messages, &params);
    match result {
        Ok(content) => {
            state.metrics.request_success(start.elapsed(), content.len());
            Ok(Json(ChatCompletionResponse {
                id: format!("chatcmpl-{:x}", start.elapsed().as_nanos()),
                object: "chat.completion".to_string(),
                model: request.model,
                choices: vec![ChatCompletionChoice {
                    index: 0,
                    message: ChatMessage {
                        role: "assistant".to_string(),
                        content,
                    },
                    finish_reason: "stop".to_string(),
                }],
            }))
        }
        Err(e) => {
            state.metrics.request_failure();
            Err(e)
        }
    }
}
