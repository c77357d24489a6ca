//! HTTP speech service adapters
//!
//! Both services are sidecars speaking plain HTTP:
//! - `POST {stt_url}/transcribe` takes PCM16 mono (`audio/pcm`) and returns
//!   `{text, confidence, error?}`
//! - `POST {tts_url}/synthesize` takes `{text, voice, language}` and returns
//!   audio bytes; `/synthesize/stream` returns the same audio chunked
//!
//! Transcription is buffered: audio accumulates until `stt_buffer_ms` worth
//! is available, then one request is made and its text is reported as a
//! final transcript.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use voice_agent_config::SpeechConfig;
use voice_agent_core::{
    Error, Result, SpeechToText, SttEvent, TextToSpeech, TranscriptEvent, TranscriptionSession,
    TtsEvent,
};

/// Minimum audio flushed on close: 100ms at 16kHz PCM16
const MIN_FLUSH_BYTES: usize = 3200;

/// Connection settings shared by both adapters
#[derive(Debug, Clone)]
pub struct HttpSpeechConfig {
    pub stt_url: String,
    pub tts_url: String,
    pub api_key: Option<String>,
    pub language: String,
    pub voice: String,
    pub sample_rate: u32,
    /// Bytes buffered before a transcription request
    pub buffer_bytes: usize,
    pub timeout: Duration,
}

impl HttpSpeechConfig {
    pub fn from_settings(settings: &SpeechConfig) -> Self {
        Self {
            stt_url: settings.stt_url.trim_end_matches('/').to_string(),
            tts_url: settings.tts_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            language: settings.language.clone(),
            voice: settings.voice.clone(),
            sample_rate: settings.sample_rate.max(1),
            buffer_bytes: settings.stt_buffer_bytes().max(MIN_FLUSH_BYTES),
            timeout: Duration::from_secs(settings.timeout_seconds.max(1)),
        }
    }

    /// Seconds of PCM16 mono audio in `bytes`
    fn audio_seconds(&self, bytes: usize) -> f64 {
        bytes as f64 / (self.sample_rate as f64 * 2.0)
    }
}

fn build_client(config: &HttpSpeechConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

fn authorize(request: reqwest::RequestBuilder, api_key: &Option<String>) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) if !key.is_empty() => request.bearer_auth(key),
        _ => request,
    }
}

/// Response from the transcription service
#[derive(Debug, Deserialize)]
struct SttResponse {
    text: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    error: Option<String>,
}

/// Buffered HTTP transcription
pub struct HttpSpeechToText {
    config: Arc<HttpSpeechConfig>,
    client: reqwest::Client,
}

impl HttpSpeechToText {
    pub fn new(config: HttpSpeechConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    /// Probe `{stt_url}/health`; unreachable services are only logged
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.config.stt_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(url = %self.config.stt_url, language = %self.config.language, "STT service reachable");
                true
            },
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "STT service unhealthy - proceeding anyway");
                false
            },
            Err(e) => {
                tracing::warn!(error = %e, "STT service not reachable - will retry on first request");
                false
            },
        }
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn start_session(
        &self,
        events: mpsc::Sender<SttEvent>,
    ) -> Result<Box<dyn TranscriptionSession>> {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        tokio::spawn(transcribe_chunks(
            self.client.clone(),
            Arc::clone(&self.config),
            chunk_rx,
            events,
        ));
        Ok(Box::new(HttpTranscription::new(
            chunk_tx,
            self.config.buffer_bytes,
        )))
    }

    fn model_name(&self) -> &str {
        "http-stt"
    }
}

/// Sends buffered chunks one at a time so transcripts keep audio order
async fn transcribe_chunks(
    client: reqwest::Client,
    config: Arc<HttpSpeechConfig>,
    mut chunks: mpsc::Receiver<Vec<u8>>,
    events: mpsc::Sender<SttEvent>,
) {
    while let Some(chunk) = chunks.recv().await {
        let seconds = config.audio_seconds(chunk.len());
        match transcribe(&client, &config, chunk).await {
            Ok(response) => {
                if let Some(error) = &response.error {
                    tracing::warn!(error = %error, "STT service returned error");
                }
                if response.text.trim().is_empty() {
                    continue;
                }
                let mut event = TranscriptEvent::final_result(response.text, seconds);
                event.confidence = response.confidence;
                if events.send(SttEvent::Transcript(event)).await.is_err() {
                    return;
                }
            },
            Err(e) => {
                let _ = events.send(SttEvent::Error(e.to_string())).await;
                return;
            },
        }
    }
    let _ = events.send(SttEvent::Closed).await;
}

async fn transcribe(
    client: &reqwest::Client,
    config: &HttpSpeechConfig,
    pcm: Vec<u8>,
) -> Result<SttResponse> {
    let url = format!("{}/transcribe", config.stt_url);
    let request = client
        .post(&url)
        .header("Content-Type", "audio/pcm")
        .header("X-Language", &config.language)
        .header("X-Sample-Rate", config.sample_rate.to_string())
        .body(pcm);

    let response = authorize(request, &config.api_key)
        .send()
        .await
        .map_err(|e| Error::Stt(format!("HTTP STT request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(Error::Stt(format!(
            "HTTP STT service returned error: {}",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| Error::Stt(format!("Failed to parse STT response: {}", e)))
}

/// One open transcription stream
struct HttpTranscription {
    buffer: Mutex<Vec<u8>>,
    chunks: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    buffer_bytes: usize,
}

impl HttpTranscription {
    fn new(chunks: mpsc::Sender<Vec<u8>>, buffer_bytes: usize) -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(buffer_bytes)),
            chunks: Mutex::new(Some(chunks)),
            buffer_bytes,
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Vec<u8>>> {
        self.chunks
            .lock()
            .clone()
            .ok_or_else(|| Error::Stt("transcription stream closed".to_string()))
    }
}

#[async_trait]
impl TranscriptionSession for HttpTranscription {
    async fn send_audio(&self, audio: &[u8]) -> Result<()> {
        let sender = self.sender()?;
        let full = {
            let mut buffer = self.buffer.lock();
            buffer.extend_from_slice(audio);
            (buffer.len() >= self.buffer_bytes).then(|| std::mem::take(&mut *buffer))
        };

        if let Some(chunk) = full {
            sender
                .send(chunk)
                .await
                .map_err(|_| Error::Stt("transcription stream closed".to_string()))?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(sender) = self.chunks.lock().take() else {
            return Ok(());
        };
        let rest = std::mem::take(&mut *self.buffer.lock());
        if rest.len() >= MIN_FLUSH_BYTES {
            // Worker may already be gone; nothing left to report then
            let _ = sender.send(rest).await;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    language: &'a str,
}

/// HTTP synthesis with chunked streaming
pub struct HttpTextToSpeech {
    config: Arc<HttpSpeechConfig>,
    client: reqwest::Client,
}

impl HttpTextToSpeech {
    pub fn new(config: HttpSpeechConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    async fn post(&self, path: &str, text: &str, context_id: Option<&str>) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.config.tts_url, path);
        let mut request = self.client.post(&url).json(&SynthesizeRequest {
            text,
            voice: &self.config.voice,
            language: &self.config.language,
        });
        if let Some(context_id) = context_id {
            request = request.header("X-Context-Id", context_id);
        }

        let response = authorize(request, &self.config.api_key)
            .send()
            .await
            .map_err(|e| Error::Tts(format!("HTTP TTS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Tts(format!(
                "HTTP TTS service returned error: {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl TextToSpeech for HttpTextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self.post("/synthesize", text, None).await?;
        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Tts(format!("Failed to read TTS audio: {}", e)))?;
        Ok(audio.to_vec())
    }

    async fn start_stream(
        &self,
        text: &str,
        context_id: &str,
        events: mpsc::Sender<TtsEvent>,
    ) -> Result<()> {
        let response = self.post("/synthesize/stream", text, Some(context_id)).await?;
        let context_id = context_id.to_string();

        tokio::spawn(async move {
            let mut body = Box::pin(response.bytes_stream());
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) if bytes.is_empty() => continue,
                    Ok(bytes) => {
                        if events.send(TtsEvent::Audio(bytes.to_vec())).await.is_err() {
                            return;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(context_id = %context_id, error = %e, "TTS stream interrupted");
                        let _ = events.send(TtsEvent::Error(e.to_string())).await;
                        return;
                    },
                }
            }
            let _ = events.send(TtsEvent::Complete).await;
        });

        Ok(())
    }

    fn model_name(&self) -> &str {
        "http-tts"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = SpeechConfig {
            stt_url: "http://stt.local/".to_string(),
            ..SpeechConfig::default()
        };
        let config = HttpSpeechConfig::from_settings(&settings);
        assert_eq!(config.stt_url, "http://stt.local");
        // 1.5s of 16kHz PCM16
        assert_eq!(config.buffer_bytes, 48000);
        assert!((config.audio_seconds(32000) - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_transcription_buffers_until_full() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = HttpTranscription::new(tx, 4000);

        session.send_audio(&[0u8; 3000]).await.unwrap();
        assert!(rx.try_recv().is_err());

        session.send_audio(&[0u8; 1500]).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().len(), 4500);
    }

    #[tokio::test]
    async fn test_close_flushes_remainder_once() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = HttpTranscription::new(tx, 48000);

        session.send_audio(&[0u8; 3200]).await.unwrap();
        session.close().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().len(), 3200);
        // Sender dropped after close
        assert!(rx.recv().await.is_none());

        session.close().await.unwrap();
        assert!(session.send_audio(&[0u8; 10]).await.is_err());
    }

    #[tokio::test]
    async fn test_close_drops_short_tail() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = HttpTranscription::new(tx, 48000);

        session.send_audio(&[0u8; 100]).await.unwrap();
        session.close().await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
