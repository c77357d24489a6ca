//! Voice Agent Server
//!
//! HTTP endpoints for appointments, slots, summaries and reminders, plus the
//! WebSocket transport that carries a live call.

pub mod http;
pub mod metrics;
pub mod session;
pub mod speech;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use crate::metrics::init_metrics;
pub use session::{LiveSession, SessionRegistry};
pub use speech::{HttpSpeechToText, HttpTextToSpeech};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::Session(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Store(_) => StatusCode::BAD_GATEWAY,
            ServerError::Config(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<voice_agent_persistence::PersistenceError> for ServerError {
    fn from(err: voice_agent_persistence::PersistenceError) -> Self {
        ServerError::Store(err.to_string())
    }
}

impl From<voice_agent_config::ConfigError> for ServerError {
    fn from(err: voice_agent_config::ConfigError) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl From<voice_agent_llm::LlmError> for ServerError {
    fn from(err: voice_agent_llm::LlmError) -> Self {
        ServerError::Config(err.to_string())
    }
}
