//! Events published by a voice session

use serde_json::Value;
use voice_agent_core::CostBreakdown;
use voice_agent_persistence::CallSummary;

/// Voice session events
///
/// Delivered over a broadcast channel; the transport subscribes before
/// calling [`crate::VoiceSession::start`] so the greeting is not missed.
#[derive(Debug, Clone)]
pub enum VoiceSessionEvent {
    /// Session started
    Started { session_id: String },
    /// Partial or final transcript of caller speech (or typed input)
    Transcript { text: String, is_final: bool },
    /// Text the assistant is about to speak
    AgentResponse { text: String },
    /// The model requested a tool
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    /// A tool finished; `error` is set when it could not run
    ToolResult {
        id: String,
        name: String,
        result: Option<Value>,
        error: Option<String>,
    },
    /// Synthesized audio for playback
    Audio(Vec<u8>),
    /// A collaborator failed; the session stays usable
    Error { message: String },
    /// The call terminated and its summary was produced (sent once)
    CallEnded {
        summary: CallSummary,
        cost: CostBreakdown,
    },
}

impl VoiceSessionEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
