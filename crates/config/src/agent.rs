//! Agent, language model and speech configuration

use serde::{Deserialize, Serialize};

/// Conversational agent behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Name the assistant introduces itself with
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// First utterance spoken when a session starts
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Upper bound on tool-calling rounds within one turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Capacity of the per-session event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_assistant_name() -> String {
    "Ava".to_string()
}
fn default_greeting() -> String {
    "Hello! I'm Ava, your appointment scheduling assistant. How can I help you today? \
     You can book, check, or manage your appointments."
        .to_string()
}
fn default_max_tool_rounds() -> usize {
    8
}
fn default_event_buffer() -> usize {
    256
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            greeting: default_greeting(),
            max_tool_rounds: default_max_tool_rounds(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// OpenAI-compatible chat completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL, `/chat/completions` is appended
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Token cap for the closing completion after an end signal
    #[serde(default = "default_closing_max_tokens")]
    pub closing_max_tokens: u32,

    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_closing_max_tokens() -> u32 {
    200
}
fn default_summary_temperature() -> f32 {
    0.3
}
fn default_llm_timeout() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            closing_max_tokens: default_closing_max_tokens(),
            summary_temperature: default_summary_temperature(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

/// HTTP speech services (transcription and synthesis)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_stt_url")]
    pub stt_url: String,

    #[serde(default = "default_tts_url")]
    pub tts_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    /// Sample rate of incoming PCM16 mono audio
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Audio buffered before a transcription request is made
    #[serde(default = "default_stt_buffer_ms")]
    pub stt_buffer_ms: u64,

    #[serde(default = "default_speech_timeout")]
    pub timeout_seconds: u64,
}

fn default_stt_url() -> String {
    "http://127.0.0.1:8090".to_string()
}
fn default_tts_url() -> String {
    "http://127.0.0.1:8091".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_voice() -> String {
    "default".to_string()
}
fn default_sample_rate() -> u32 {
    16000
}
fn default_stt_buffer_ms() -> u64 {
    1500
}
fn default_speech_timeout() -> u64 {
    15
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_url: default_stt_url(),
            tts_url: default_tts_url(),
            api_key: None,
            language: default_language(),
            voice: default_voice(),
            sample_rate: default_sample_rate(),
            stt_buffer_ms: default_stt_buffer_ms(),
            timeout_seconds: default_speech_timeout(),
        }
    }
}

impl SpeechConfig {
    /// Bytes of PCM16 mono audio that make up one transcription request
    pub fn stt_buffer_bytes(&self) -> usize {
        (self.sample_rate as u64 * 2 * self.stt_buffer_ms / 1000) as usize
    }
}
