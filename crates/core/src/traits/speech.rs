//! Speech processing traits
//!
//! Both directions are streaming network services. Events flow back to the
//! session over mpsc channels instead of callbacks.

use crate::transcript::TranscriptEvent;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Event emitted by a live transcription session
#[derive(Debug, Clone, PartialEq)]
pub enum SttEvent {
    Transcript(TranscriptEvent),
    Error(String),
    Closed,
}

/// Event emitted by a streaming synthesis request
#[derive(Debug, Clone, PartialEq)]
pub enum TtsEvent {
    Audio(Vec<u8>),
    Complete,
    Error(String),
}

/// An open streaming transcription connection
#[async_trait]
pub trait TranscriptionSession: Send + Sync {
    /// Push raw audio bytes
    async fn send_audio(&self, audio: &[u8]) -> Result<()>;

    /// Close the stream (best-effort)
    async fn close(&self) -> Result<()>;
}

/// Speech-to-Text interface
///
/// # Example
///
/// ```ignore
/// let (tx, mut rx) = mpsc::channel(64);
/// let session = stt.start_session(tx).await?;
/// session.send_audio(&chunk).await?;
/// while let Some(SttEvent::Transcript(t)) = rx.recv().await { ... }
/// ```
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Open a streaming session whose events are delivered to `events`
    async fn start_session(
        &self,
        events: mpsc::Sender<SttEvent>,
    ) -> Result<Box<dyn TranscriptionSession>>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

/// Text-to-Speech interface
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize a whole utterance in one request
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Start a streaming synthesis; audio chunks arrive on `events`
    ///
    /// An `Err` means the stream could not be set up and the caller should
    /// fall back to [`TextToSpeech::synthesize`].
    async fn start_stream(
        &self,
        text: &str,
        context_id: &str,
        events: mpsc::Sender<TtsEvent>,
    ) -> Result<()>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
