//! LLM integration for the appointment voice agent
//!
//! Features:
//! - OpenAI-compatible chat completions with native tool calling
//! - System prompt construction
//! - Tool-announcement filtering of model text
//! - End-of-call summary generation

pub mod filter;
pub mod openai;
pub mod prompt;
pub mod summary;

pub use filter::strip_tool_announcements;
pub use openai::{OpenAIBackend, OpenAIConfig};
pub use prompt::system_prompt;
pub use summary::{parse_summary, SummaryContent, SummaryGenerator, FALLBACK_SUMMARY};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Worth retrying on the next utterance
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for voice_agent_core::Error {
    fn from(err: LlmError) -> Self {
        voice_agent_core::Error::Llm(err.to_string())
    }
}

impl From<voice_agent_core::Error> for LlmError {
    fn from(err: voice_agent_core::Error) -> Self {
        match err {
            voice_agent_core::Error::Timeout(_) => LlmError::Timeout,
            other => LlmError::Api(other.to_string()),
        }
    }
}
