//! Call orchestration for the appointment voice agent
//!
//! Features:
//! - Turn engine: one model exchange, looping while the model requests tools
//! - Voice session: speech in, turns, speech out and call termination
//! - Session state: history, tool-call audit trail and usage counters under one lock
//! - Typed per-session event channel for the transport layer

pub mod events;
pub mod state;
pub mod turn;
pub mod voice_session;

pub use events::VoiceSessionEvent;
pub use state::{SessionSnapshot, SessionState, SessionStatus};
pub use turn::{
    NoopObserver, TurnEnd, TurnEngine, TurnObserver, TurnOutcome, FAREWELL, ROUND_LIMIT_APOLOGY,
};
pub use voice_session::{SessionServices, VoiceSession, VoiceSessionConfig};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("Session has ended")]
    Ended,
}

impl From<voice_agent_core::Error> for AgentError {
    fn from(err: voice_agent_core::Error) -> Self {
        use voice_agent_core::Error as CoreError;
        match err {
            CoreError::Stt(msg) | CoreError::Tts(msg) => AgentError::Speech(msg),
            CoreError::Store(msg) => AgentError::Store(msg),
            CoreError::Tool(msg) => AgentError::Tool(msg),
            CoreError::Cancelled => AgentError::Cancelled,
            other => AgentError::Llm(other.to_string()),
        }
    }
}

impl From<voice_agent_llm::LlmError> for AgentError {
    fn from(err: voice_agent_llm::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

impl From<voice_agent_tools::ToolError> for AgentError {
    fn from(err: voice_agent_tools::ToolError) -> Self {
        AgentError::Tool(err.to_string())
    }
}

impl From<voice_agent_persistence::PersistenceError> for AgentError {
    fn from(err: voice_agent_persistence::PersistenceError) -> Self {
        AgentError::Store(err.to_string())
    }
}
