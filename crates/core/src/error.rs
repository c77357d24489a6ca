//! Error types shared by collaborator traits

use thiserror::Error;

/// Result alias used across the core traits
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by external collaborators (speech, language model, store)
#[derive(Error, Debug)]
pub enum Error {
    #[error("Speech-to-text error: {0}")]
    Stt(String),

    #[error("Text-to-speech error: {0}")]
    Tts(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Stt(_) | Self::Tts(_))
    }
}
