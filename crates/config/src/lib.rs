//! Configuration management for the voice agent
//!
//! Supports loading configuration from:
//! - TOML/YAML files under `config/` (default, then per-environment)
//! - Environment variables (VOICE_AGENT_ prefix, `__` separator)

pub mod agent;
pub mod scheduling;
pub mod settings;

pub use agent::{AgentConfig, LlmConfig, SpeechConfig};
pub use scheduling::{PricingConfig, RemindersConfig, SchedulingConfig};
pub use settings::{
    load_settings, load_settings_from, ObservabilityConfig, PersistenceConfig, RuntimeEnvironment,
    ServerConfig, Settings, StoreBackend,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
