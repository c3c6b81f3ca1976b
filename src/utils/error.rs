//! Error types for the engine (§7)

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Crate-wide error type. One variant per error kind in §7 of the spec.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Impossible slice, unsupported quant triple, unknown header key, zero
    /// `nThreads` — fatal at graph/segment build time.
    #[error("bad config: {0}")]
    BadConfig(String),

    /// Wrong magic, truncated weight stream, post-load byte mismatch —
    /// fatal at model load time.
    #[error("file integrity: {0}")]
    FileIntegrity(String),

    /// Socket error or EOF while reading. Fatal for the current session.
    #[error("transport read: {0}")]
    TransportRead(String),

    /// Socket error while writing. Fatal for the current session.
    #[error("transport write: {0}")]
    TransportWrite(String),

    /// `getForward` returned nothing for the resolved quant triple —
    /// fatal at segment construction.
    #[error("kernel unsupported for triple {0}")]
    KernelUnsupported(String),

    /// A `shift` index exceeded buffer bounds. Must never fire under a
    /// correctly constructed graph; kept as a debug assertion surface.
    #[error("range violation: {0}")]
    RangeViolation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            EngineError::BadConfig(m) => (StatusCode::BAD_REQUEST, m.clone()),
            EngineError::FileIntegrity(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            EngineError::TransportRead(m) => (StatusCode::BAD_GATEWAY, m.clone()),
            EngineError::TransportWrite(m) => (StatusCode::BAD_GATEWAY, m.clone()),
            EngineError::KernelUnsupported(m) => (StatusCode::NOT_IMPLEMENTED, m.clone()),
            EngineError::RangeViolation(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
            EngineError::InvalidRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            EngineError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
