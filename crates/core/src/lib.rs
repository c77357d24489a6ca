//! Core traits and types for the appointment voice agent
//!
//! This crate provides foundational types used across all other crates:
//! - Collaborator traits (STT, TTS, LLM)
//! - LLM request/response types
//! - Conversation history and transcript events
//! - Usage counters and cost breakdown
//! - Error types

pub mod conversation;
pub mod error;
pub mod llm_types;
pub mod transcript;
pub mod traits;
pub mod usage;

pub use conversation::{render_transcript, ConversationMessage, MessageRole};
pub use error::{Error, Result};
pub use llm_types::{
    FinishReason, GenerateRequest, GenerateResponse, Message, Role, TokenUsage, ToolCall,
    ToolDefinition,
};
pub use transcript::TranscriptEvent;
pub use usage::{CostBreakdown, UnitPrices, UsageCounters};

pub use traits::{
    LanguageModel, SpeechToText, SttEvent, TextToSpeech, TranscriptionSession, TtsEvent,
};
