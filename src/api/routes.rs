//! API route configuration (§6.4).

use super::handlers::{chat_completions, health, list_models};
use super::schema::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/v1/health", get(health))
        .with_state(state)
}
