//! Speech transcription events

use serde::{Deserialize, Serialize};

/// A transcription result emitted by a streaming STT session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    #[serde(default)]
    pub confidence: f32,
    /// Seconds of audio covered by this result
    #[serde(default)]
    pub audio_duration_secs: f64,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence: 0.0,
            audio_duration_secs: 0.0,
        }
    }

    pub fn final_result(text: impl Into<String>, audio_duration_secs: f64) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence: 1.0,
            audio_duration_secs,
        }
    }

    /// Only finalized, non-empty transcripts start a turn
    pub fn drives_turn(&self) -> bool {
        self.is_final && !self.text.trim().is_empty()
    }
}
