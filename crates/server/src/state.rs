//! Application State
//!
//! Shared state across all handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};

use voice_agent_agent::{SessionServices, TurnEngine, VoiceSession, VoiceSessionConfig};
use voice_agent_config::Settings;
use voice_agent_core::{LanguageModel, SpeechToText, TextToSpeech};
use voice_agent_llm::SummaryGenerator;
use voice_agent_persistence::PersistenceLayer;
use voice_agent_reminders::ReminderScheduler;
use voice_agent_tools::AppointmentTools;

use crate::session::{LiveSession, SessionRegistry};
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub session_config: VoiceSessionConfig,
    pub services: SessionServices,
    /// Tool set, also used directly by the read-only API
    pub tools: Arc<AppointmentTools>,
    pub sessions: Arc<SessionRegistry>,
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the per-call services from their collaborators
    pub fn new(
        settings: Settings,
        persistence: PersistenceLayer,
        llm: Arc<dyn LanguageModel>,
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        reminders: Option<Arc<ReminderScheduler>>,
    ) -> Self {
        let tools = Arc::new(AppointmentTools::new(
            persistence.clone(),
            settings.scheduling.clone(),
        ));
        let engine = Arc::new(TurnEngine::from_settings(
            Arc::clone(&llm),
            tools.clone(),
            &settings.agent,
            &settings.llm,
            &settings.scheduling,
        ));
        let services = SessionServices {
            engine,
            summaries: SummaryGenerator::from_settings(llm, &settings.llm),
            stt,
            tts,
            persistence,
            reminders,
        };
        let sessions = Arc::new(SessionRegistry::new(
            settings.server.max_sessions,
            Duration::from_secs(settings.server.session_timeout_seconds),
        ));

        Self {
            session_config: VoiceSessionConfig::from_settings(&settings),
            settings: Arc::new(settings),
            services,
            tools,
            sessions,
            metrics: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    pub fn persistence(&self) -> &PersistenceLayer {
        &self.services.persistence
    }

    pub fn reminders(&self) -> Option<&Arc<ReminderScheduler>> {
        self.services.reminders.as_ref()
    }

    /// Create and register a session for `room`
    pub fn create_session(&self, room: &str) -> Result<Arc<LiveSession>, ServerError> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = VoiceSession::new(
            id,
            room,
            self.session_config.clone(),
            self.services.clone(),
        );
        self.sessions.register(session)
    }
}
