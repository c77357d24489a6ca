//! Voice session
//!
//! Owns one call from greeting to summary:
//! 1. Audio is pushed into a lazily opened transcription stream
//! 2. Final transcripts run a turn (at most one at a time; extras are dropped)
//! 3. The reply is appended to history, published and synthesized
//! 4. An ended turn, or an explicit end-call, runs the termination pipeline once
//!
//! Everything observable is published on a broadcast channel of
//! [`VoiceSessionEvent`]s.

use chrono::{FixedOffset, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use uuid::Uuid;

use voice_agent_config::Settings;
use voice_agent_core::{
    ConversationMessage, SpeechToText, SttEvent, TextToSpeech, ToolCall, TranscriptEvent,
    TranscriptionSession, TtsEvent, UnitPrices,
};
use voice_agent_llm::{SummaryContent, SummaryGenerator};
use voice_agent_persistence::{Appointment, CallSummary, PersistenceLayer};
use voice_agent_reminders::ReminderScheduler;
use voice_agent_tools::utils::format_display;
use voice_agent_tools::{ToolContext, ToolEffect};

use crate::events::VoiceSessionEvent;
use crate::state::{SessionSnapshot, SessionState};
use crate::turn::{TurnEngine, TurnObserver};
use crate::AgentError;

/// Per-session settings
#[derive(Debug, Clone)]
pub struct VoiceSessionConfig {
    pub greeting: String,
    pub event_buffer: usize,
    pub prices: UnitPrices,
    pub timezone: FixedOffset,
}

impl Default for VoiceSessionConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl VoiceSessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            greeting: settings.agent.greeting.clone(),
            event_buffer: settings.agent.event_buffer.max(1),
            prices: settings.pricing.unit_prices(),
            timezone: settings.scheduling.timezone(),
        }
    }
}

/// Collaborators shared by every session of the process
#[derive(Clone)]
pub struct SessionServices {
    pub engine: Arc<TurnEngine>,
    pub summaries: SummaryGenerator,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub persistence: PersistenceLayer,
    /// Booking effects are forwarded here when set
    pub reminders: Option<Arc<ReminderScheduler>>,
}

/// Voice session for a single call
pub struct VoiceSession {
    state: SessionState,
    config: VoiceSessionConfig,
    services: SessionServices,
    stt_session: Mutex<Option<ActiveStream>>,
    /// Bumped for every transcription stream opened
    stt_generation: AtomicU64,
    /// Set while a turn is in flight
    processing: AtomicBool,
    /// Set once the termination pipeline has been claimed
    terminated: AtomicBool,
    /// Cancels in-flight turns and transcription (end-call and stop)
    cancel_tx: watch::Sender<bool>,
    /// Set by stop; also cuts outbound audio
    stop_tx: watch::Sender<bool>,
    event_tx: broadcast::Sender<VoiceSessionEvent>,
}

/// The open transcription stream, tagged so a stale pump cannot clear a newer one
struct ActiveStream {
    generation: u64,
    stream: Box<dyn TranscriptionSession>,
}

/// Clears the processing flag when a turn exits, however it exits
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Publishes tool activity and bills tokens as a turn progresses
struct SessionObserver<'a> {
    state: &'a SessionState,
    events: &'a broadcast::Sender<VoiceSessionEvent>,
}

impl TurnObserver for SessionObserver<'_> {
    fn on_tool_call(&self, call: &ToolCall) {
        let _ = self.events.send(VoiceSessionEvent::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments_json(),
        });
    }

    fn on_tool_result(&self, call: &ToolCall, result: &Result<Value, String>) {
        let (result, error) = match result {
            Ok(value) => (Some(value.clone()), None),
            Err(message) => (None, Some(message.clone())),
        };
        let _ = self.events.send(VoiceSessionEvent::ToolResult {
            id: call.id.clone(),
            name: call.name.clone(),
            result,
            error,
        });
    }

    fn on_usage(&self, tokens: u64) {
        self.state.add_tokens(tokens);
    }
}

impl VoiceSession {
    /// Create a session; call [`VoiceSession::start`] after subscribing
    pub fn new(
        session_id: impl Into<String>,
        room: impl Into<String>,
        config: VoiceSessionConfig,
        services: SessionServices,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(config.event_buffer);
        let (cancel_tx, _) = watch::channel(false);
        let (stop_tx, _) = watch::channel(false);

        Arc::new(Self {
            state: SessionState::new(session_id, room),
            config,
            services,
            stt_session: Mutex::new(None),
            stt_generation: AtomicU64::new(0),
            processing: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            cancel_tx,
            stop_tx,
            event_tx,
        })
    }

    pub fn session_id(&self) -> &str {
        self.state.id()
    }

    pub fn room(&self) -> &str {
        self.state.room()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<VoiceSessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot(&self.config.prices)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Whether termination has run (or is running)
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Announce the session and speak the greeting
    pub async fn start(&self) {
        tracing::info!(session_id = %self.session_id(), room = %self.room(), "Voice session started");
        metrics::counter!("voice_agent_sessions_started_total").increment(1);

        self.emit(VoiceSessionEvent::Started {
            session_id: self.session_id().to_string(),
        });

        let greeting = self.config.greeting.clone();
        self.state.push_message(ConversationMessage::assistant(&greeting));
        self.emit(VoiceSessionEvent::AgentResponse {
            text: greeting.clone(),
        });
        self.speak(&greeting).await;
    }

    /// Push caller audio into the transcription stream
    ///
    /// The stream is opened on first use and reopened after it fails.
    pub async fn push_audio(self: &Arc<Self>, audio: &[u8]) -> Result<(), AgentError> {
        if self.is_stopped() || self.is_terminated() {
            return Err(AgentError::Ended);
        }

        let mut guard = self.stt_session.lock().await;
        if guard.is_none() {
            let (tx, rx) = mpsc::channel(64);
            let session = self.services.stt.start_session(tx).await.map_err(|e| {
                self.emit(VoiceSessionEvent::error(format!(
                    "Failed to start speech recognition: {}",
                    e
                )));
                AgentError::from(e)
            })?;
            tracing::debug!(
                session_id = %self.session_id(),
                model = self.services.stt.model_name(),
                "Transcription stream opened"
            );
            let generation = self.stt_generation.fetch_add(1, Ordering::AcqRel) + 1;
            self.spawn_transcript_pump(rx, generation);
            *guard = Some(ActiveStream {
                generation,
                stream: session,
            });
        }

        if let Some(active) = guard.as_ref() {
            if let Err(e) = active.stream.send_audio(audio).await {
                tracing::warn!(session_id = %self.session_id(), error = %e, "Audio push failed, resetting stream");
                *guard = None;
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn spawn_transcript_pump(self: &Arc<Self>, mut rx: mpsc::Receiver<SttEvent>, generation: u64) {
        let session: Weak<Self> = Arc::downgrade(self);
        let mut cancel_rx = self.cancel_tx.subscribe();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancelled(&mut cancel_rx) => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let Some(session) = session.upgrade() else {
                    break;
                };

                match event {
                    SttEvent::Transcript(transcript) => session.on_transcript(transcript),
                    SttEvent::Error(message) => {
                        tracing::warn!(session_id = %session.session_id(), error = %message, "Transcription stream failed");
                        session.release_stream(generation).await;
                        session.emit(VoiceSessionEvent::error(format!(
                            "Speech recognition error: {}",
                            message
                        )));
                        break;
                    },
                    SttEvent::Closed => {
                        session.release_stream(generation).await;
                        break;
                    },
                }
            }
        });
    }

    /// Forget the stream of `generation` if it is still the open one
    async fn release_stream(&self, generation: u64) {
        let mut guard = self.stt_session.lock().await;
        if guard.as_ref().is_some_and(|active| active.generation == generation) {
            *guard = None;
        } else {
            tracing::debug!(session_id = %self.session_id(), generation, "Stale transcription stream ended");
        }
    }

    /// Close the open transcription stream, if any; failures are only logged
    async fn close_transcription(&self) {
        let active = self.stt_session.lock().await.take();
        if let Some(active) = active {
            if let Err(e) = active.stream.close().await {
                tracing::debug!(session_id = %self.session_id(), error = %e, "Transcription stream close failed");
            }
        }
    }

    fn on_transcript(self: &Arc<Self>, transcript: TranscriptEvent) {
        self.emit(VoiceSessionEvent::Transcript {
            text: transcript.text.clone(),
            is_final: transcript.is_final,
        });
        if !transcript.is_final {
            return;
        }

        self.state.add_speech(transcript.audio_duration_secs);
        if transcript.drives_turn() {
            let session = Arc::clone(self);
            tokio::spawn(async move {
                let _ = session.handle_final_transcript(&transcript.text).await;
            });
        }
    }

    /// Typed input, handled like a final transcript
    pub async fn send_text_input(self: &Arc<Self>, text: &str) -> Result<bool, AgentError> {
        let text = text.trim();
        if text.is_empty() || text == "null" || text == "undefined" {
            return Err(AgentError::InvalidInput(
                "Please provide valid text".to_string(),
            ));
        }

        self.emit(VoiceSessionEvent::Transcript {
            text: text.to_string(),
            is_final: true,
        });
        self.handle_final_transcript(text).await
    }

    /// Run one turn for a finalized utterance
    ///
    /// Returns `Ok(false)` when the utterance was dropped because another
    /// turn is in flight or the call is over.
    pub async fn handle_final_transcript(self: &Arc<Self>, text: &str) -> Result<bool, AgentError> {
        if self.is_terminated() || self.is_stopped() {
            return Ok(false);
        }
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(session_id = %self.session_id(), "Turn in flight, dropping transcript");
            metrics::counter!("voice_agent_transcripts_dropped_total").increment(1);
            return Ok(false);
        }
        let _guard = ProcessingGuard(&self.processing);

        self.state.push_message(ConversationMessage::user(text));
        let history = self.state.history();
        let observer = SessionObserver {
            state: &self.state,
            events: &self.event_tx,
        };

        let mut cancel_rx = self.cancel_tx.subscribe();
        let result = tokio::select! {
            result = self.services.engine.run(&self.state, &history, &observer) => result,
            _ = cancelled(&mut cancel_rx) => Err(AgentError::Cancelled),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                tracing::error!(session_id = %self.session_id(), error = %e, "Turn failed");
                self.emit(VoiceSessionEvent::error(format!(
                    "Failed to process request: {}",
                    e
                )));
                return Err(e);
            },
        };

        self.apply_effects(&outcome.effects);
        if self.is_terminated() {
            tracing::debug!(session_id = %self.session_id(), "Call ended during turn, reply discarded");
            return Ok(false);
        }
        self.state
            .push_message(ConversationMessage::assistant(&outcome.text));
        self.emit(VoiceSessionEvent::AgentResponse {
            text: outcome.text.clone(),
        });
        self.speak(&outcome.text).await;

        if outcome.is_ended() {
            self.end_call().await;
        }
        Ok(true)
    }

    fn apply_effects(&self, effects: &[ToolEffect]) {
        let Some(reminders) = &self.services.reminders else {
            return;
        };
        for effect in effects {
            match effect {
                ToolEffect::AppointmentBooked(id) => reminders.track(*id),
                ToolEffect::AppointmentCancelled(id) => {
                    reminders.untrack(*id);
                },
                ToolEffect::AppointmentRescheduled(id) => reminders.retrack(*id),
                ToolEffect::CallerIdentified { .. } | ToolEffect::EndConversation { .. } => {},
            }
        }
    }

    /// Synthesize `text`, streaming when the adapter supports it
    async fn speak(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.state.add_synthesized(text);

        let context_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(64);
        match self.services.tts.start_stream(text, &context_id, tx).await {
            Ok(()) => self.spawn_audio_forwarder(rx),
            Err(e) => {
                tracing::debug!(session_id = %self.session_id(), error = %e, "Streaming synthesis unavailable, using request/response");
                match self.services.tts.synthesize(text).await {
                    Ok(audio) if !audio.is_empty() => self.emit(VoiceSessionEvent::Audio(audio)),
                    Ok(_) => {},
                    Err(e) => {
                        tracing::warn!(session_id = %self.session_id(), error = %e, "Speech synthesis failed");
                        self.emit(VoiceSessionEvent::error(format!(
                            "Speech synthesis error: {}",
                            e
                        )));
                    },
                }
            },
        }
    }

    fn spawn_audio_forwarder(&self, mut rx: mpsc::Receiver<TtsEvent>) {
        let events = self.event_tx.clone();
        // Only stop cuts audio, so a farewell still plays out after end-call
        let mut cancel_rx = self.stop_tx.subscribe();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancelled(&mut cancel_rx) => break,
                    event = rx.recv() => event,
                };
                match event {
                    Some(TtsEvent::Audio(chunk)) => {
                        let _ = events.send(VoiceSessionEvent::Audio(chunk));
                    },
                    Some(TtsEvent::Error(message)) => {
                        let _ = events.send(VoiceSessionEvent::error(format!(
                            "Speech synthesis error: {}",
                            message
                        )));
                        break;
                    },
                    Some(TtsEvent::Complete) | None => break,
                }
            }
        });
    }

    /// Terminate the call: summarize, price, persist and announce
    ///
    /// Cancels any turn still in flight first. Only the first caller runs the
    /// pipeline; later calls return `None`.
    pub async fn end_call(&self) -> Option<CallSummary> {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.cancel_tx.send_replace(true);
        self.close_transcription().await;

        let started = Instant::now();
        let ended_at = self.state.mark_ended();
        let history = self.state.history();
        let caller = self.state.caller();

        let appointments = match &caller {
            Some(caller) => self.upcoming_appointments(&caller.phone).await,
            None => Vec::new(),
        };
        let lines: Vec<String> = appointments
            .iter()
            .map(|apt| describe_appointment(apt, &self.config.timezone))
            .collect();

        let content = match self.services.summaries.generate(&history, &lines).await {
            Ok((content, tokens)) => {
                self.state.add_tokens(tokens);
                content
            },
            Err(e) => {
                tracing::warn!(session_id = %self.session_id(), error = %e, "Summary generation failed");
                self.emit(VoiceSessionEvent::error(format!(
                    "Failed to generate summary: {}",
                    e
                )));
                SummaryContent::fallback()
            },
        };

        let cost = self.state.usage().cost(&self.config.prices);
        let summary = CallSummary {
            id: Uuid::new_v4(),
            session_id: self.session_id().to_string(),
            caller_phone: caller.map(|c| c.phone),
            summary: content.summary,
            appointments,
            user_preferences: content.user_preferences,
            key_topics: content.key_topics,
            duration_seconds: (ended_at - self.state.started_at()).num_seconds().max(0),
            cost: cost.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.services.persistence.summaries.save(&summary).await {
            tracing::error!(session_id = %self.session_id(), error = %e, "Failed to save call summary");
        }

        metrics::counter!("voice_agent_calls_ended_total").increment(1);
        metrics::histogram!("voice_agent_call_duration_seconds")
            .record(summary.duration_seconds as f64);
        metrics::histogram!("voice_agent_call_cost_dollars").record(cost.total_cost);
        tracing::info!(
            session_id = %self.session_id(),
            duration_seconds = summary.duration_seconds,
            total_cost = cost.total_cost,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Call ended"
        );

        self.emit(VoiceSessionEvent::CallEnded {
            summary: summary.clone(),
            cost,
        });
        Some(summary)
    }

    async fn upcoming_appointments(&self, phone: &str) -> Vec<Appointment> {
        match self
            .services
            .persistence
            .appointments
            .list_upcoming_for_caller(phone, Utc::now())
            .await
        {
            Ok(appointments) => appointments,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id(), error = %e, "Could not load appointments for summary");
                Vec::new()
            },
        }
    }

    /// Cancel in-flight work and close the speech streams (best-effort)
    ///
    /// Does not produce a summary; use [`VoiceSession::end_call`] for that.
    pub async fn stop(&self) {
        if self.stop_tx.send_replace(true) {
            return;
        }
        self.cancel_tx.send_replace(true);
        tracing::info!(session_id = %self.session_id(), "Voice session stopped");
        self.close_transcription().await;
    }

    fn emit(&self, event: VoiceSessionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Resolves once the session is cancelled (or its sender is gone)
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancelled| *cancelled).await;
}

fn describe_appointment(appointment: &Appointment, tz: &FixedOffset) -> String {
    format!(
        "{}: {} ({} min) - Status: {}",
        format_display(appointment.start, tz),
        appointment.purpose,
        appointment.duration_minutes,
        appointment.status.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_describe_appointment() {
        let start = Utc.with_ymd_and_hms(2030, 5, 6, 14, 0, 0).unwrap();
        let apt = Appointment::new("+15551234567", "Jane", start, 30, "Checkup", "");
        let tz = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            describe_appointment(&apt, &tz),
            "Monday, May 6, 2030 at 2:00 PM: Checkup (30 min) - Status: booked"
        );

        let apt = Appointment::new("+1", "J", start + Duration::hours(1), 45, "Review", "");
        assert!(describe_appointment(&apt, &tz).contains("(45 min)"));
    }

    #[test]
    fn test_config_defaults() {
        let config = VoiceSessionConfig::default();
        assert!(config.greeting.starts_with("Hello! I'm Ava"));
        assert_eq!(config.prices, UnitPrices::default());
        assert_eq!(config.timezone.local_minus_utc(), 0);
    }
}
