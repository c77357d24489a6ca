//! Core traits for the voice agent system
//!
//! All external collaborators sit behind these traits so that sessions can be
//! driven by real network adapters in production and by mocks in tests.
//!
//! # Trait Hierarchy
//!
//! ```text
//! Speech Processing:
//!   - SpeechToText: opens streaming transcription sessions
//!   - TextToSpeech: request/response and streaming synthesis
//!
//! Language Models:
//!   - LanguageModel: Text generation and tool calling
//! ```

mod llm;
mod speech;

pub use llm::LanguageModel;
pub use speech::{SpeechToText, SttEvent, TextToSpeech, TranscriptionSession, TtsEvent};
