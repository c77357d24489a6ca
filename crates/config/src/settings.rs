//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    AgentConfig, ConfigError, LlmConfig, PricingConfig, RemindersConfig, SchedulingConfig,
    SpeechConfig,
};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub scheduling: SchedulingConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub reminders: RemindersConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_scheduling()?;
        self.validate_persistence()?;

        if self.reminders.enabled && self.reminders.tick_seconds == 0 {
            return Err(invalid("reminders.tick_seconds", "Must be at least 1 second"));
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(invalid("agent.max_tool_rounds", "Must be at least 1"));
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "Port cannot be 0"));
        }
        if self.server.max_sessions == 0 {
            return Err(invalid("server.max_sessions", "Must be at least 1"));
        }

        if self.environment.is_production()
            && self.server.cors_enabled
            && self.server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid(
                "llm.temperature",
                &format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(invalid("llm.max_tokens", "Must be at least 1"));
        }
        if self.environment.is_production() && self.llm.api_key.is_none() {
            return Err(ConfigError::MissingField("llm.api_key".to_string()));
        }
        Ok(())
    }

    fn validate_scheduling(&self) -> Result<(), ConfigError> {
        let sched = &self.scheduling;
        if sched.open_hour >= sched.close_hour || sched.close_hour > 24 {
            return Err(invalid(
                "scheduling.open_hour",
                &format!(
                    "Business hours {}..{} are not a valid range",
                    sched.open_hour, sched.close_hour
                ),
            ));
        }
        if sched.slot_minutes == 0 || 60 % sched.slot_minutes != 0 {
            return Err(invalid("scheduling.slot_minutes", "Must divide an hour evenly"));
        }
        if sched.default_duration_minutes <= 0 {
            return Err(invalid("scheduling.default_duration_minutes", "Must be positive"));
        }
        if !(-14 * 60..=14 * 60).contains(&sched.utc_offset_minutes) {
            return Err(invalid("scheduling.utc_offset_minutes", "Must be within +/-14h"));
        }
        Ok(())
    }

    fn validate_persistence(&self) -> Result<(), ConfigError> {
        if self.persistence.backend == StoreBackend::Rest {
            if self.persistence.url.is_empty() {
                return Err(ConfigError::MissingField("persistence.url".to_string()));
            }
            if self.persistence.api_key.is_none() {
                return Err(ConfigError::MissingField("persistence.api_key".to_string()));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed origins; empty means any origin outside production
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Idle sessions older than this are stopped by the cleanup task
    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: u64,

    /// Concurrent live sessions accepted before new connections are refused
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_session_timeout() -> u64 {
    3600
}
fn default_max_sessions() -> usize {
    100
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            session_timeout_seconds: default_session_timeout(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store, lost on restart
    #[default]
    Memory,
    /// PostgREST-compatible REST API
    Rest,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Base URL of the REST store (`/rest/v1` is appended)
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_store_timeout")]
    pub timeout_seconds: u64,
}

fn default_store_timeout() -> u64 {
    10
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: String::new(),
            api_key: None,
            timeout_seconds: default_store_timeout(),
        }
    }
}

/// Logging, tracing and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// OTLP collector, used when built with the `telemetry` feature
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
            otlp_endpoint: None,
        }
    }
}

/// Load settings from `config/` relative to the working directory
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from files in `dir` and from environment variables
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    builder = builder.add_source(File::from(dir.join("default")).required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("VOICE_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
