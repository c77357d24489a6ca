//! Tool errors
//!
//! Business conditions (slot taken, not identified, not owned) are never
//! errors; they come back as unsuccessful [`crate::ToolOutcome`]s. These
//! variants cover malformed requests and infrastructure failures.

use thiserror::Error;
use voice_agent_persistence::PersistenceError;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Store error: {0}")]
    Store(#[from] PersistenceError),
}

impl ToolError {
    pub fn invalid(tool: &str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::Store(_) => "store",
        }
    }
}

impl From<ToolError> for voice_agent_core::Error {
    fn from(err: ToolError) -> Self {
        voice_agent_core::Error::Tool(err.to_string())
    }
}
