//! Integration tests for the voice session (transcript -> turn -> speech -> summary)
//!
//! Collaborators are scripted mocks over the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::timeout;

use voice_agent_agent::{
    AgentError, SessionServices, TurnEngine, VoiceSession, VoiceSessionConfig, VoiceSessionEvent,
    FAREWELL,
};
use voice_agent_config::{RemindersConfig, SchedulingConfig};
use voice_agent_core::{
    Error as CoreError, GenerateRequest, GenerateResponse, LanguageModel, Result as CoreResult,
    SpeechToText, SttEvent, TextToSpeech, TokenUsage, ToolCall, ToolDefinition, TranscriptEvent,
    TranscriptionSession, TtsEvent,
};
use voice_agent_llm::{SummaryGenerator, FALLBACK_SUMMARY};
use voice_agent_persistence::{CallSummaryStore, InMemoryStore, PersistenceLayer};
use voice_agent_reminders::{LoggingNotifier, ReminderScheduler};
use voice_agent_tools::AppointmentTools;

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

/// Scripted model: tool-enabled calls pop the script, plain calls are either
/// summaries or closing completions
struct ScriptedLlm {
    script: Mutex<VecDeque<CoreResult<GenerateResponse>>>,
    turn_calls: AtomicUsize,
    closing_calls: AtomicUsize,
    summary_calls: AtomicUsize,
    closing_reply: Mutex<Option<CoreResult<GenerateResponse>>>,
    summary_fails: bool,
    /// Blocks the first tool-enabled call until notified
    gate: Mutex<Option<Arc<Notify>>>,
    entered: Arc<Notify>,
}

impl ScriptedLlm {
    fn new(script: Vec<CoreResult<GenerateResponse>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            turn_calls: AtomicUsize::new(0),
            closing_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
            closing_reply: Mutex::new(None),
            summary_fails: false,
            gate: Mutex::new(None),
            entered: Arc::new(Notify::new()),
        }
    }

    fn with_gate(self, gate: Arc<Notify>) -> Self {
        *self.gate.lock() = Some(gate);
        self
    }

    fn with_closing(self, reply: CoreResult<GenerateResponse>) -> Self {
        *self.closing_reply.lock() = Some(reply);
        self
    }

    fn with_failing_summary(mut self) -> Self {
        self.summary_fails = true;
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, request: GenerateRequest) -> CoreResult<GenerateResponse> {
        let is_summary = request
            .messages
            .first()
            .map(|m| m.content.starts_with("You are analyzing"))
            .unwrap_or(false);

        if is_summary {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            if self.summary_fails {
                return Err(CoreError::Llm("summary backend down".into()));
            }
            return Ok(GenerateResponse::text(
                r#"{"summary": "Caller booked a checkup.", "user_preferences": ["mornings"], "key_topics": ["booking"]}"#,
            )
            .with_usage(TokenUsage::new(90, 30)));
        }

        self.closing_calls.fetch_add(1, Ordering::SeqCst);
        self.closing_reply
            .lock()
            .take()
            .unwrap_or_else(|| Ok(GenerateResponse::text("Goodbye, take care!")))
    }

    async fn generate_with_tools(
        &self,
        _request: GenerateRequest,
        _tools: &[ToolDefinition],
    ) -> CoreResult<GenerateResponse> {
        self.turn_calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(GenerateResponse::text("Okay.")))
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct MockStream {
    audio: Arc<Mutex<Vec<u8>>>,
    fail_next_send: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl TranscriptionSession for MockStream {
    async fn send_audio(&self, audio: &[u8]) -> CoreResult<()> {
        if self.fail_next_send.swap(false, Ordering::SeqCst) {
            return Err(CoreError::Stt("broken pipe".into()));
        }
        self.audio.lock().extend_from_slice(audio);
        Ok(())
    }

    async fn close(&self) -> CoreResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Keeps the event sender of every opened stream so tests can inject results
#[derive(Default)]
struct MockStt {
    opened: AtomicUsize,
    events: Mutex<Vec<mpsc::Sender<SttEvent>>>,
    audio: Arc<Mutex<Vec<u8>>>,
    fail_next_send: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
}

impl MockStt {
    /// Inject into the latest stream
    async fn emit(&self, event: SttEvent) {
        let latest = self.events.lock().len().checked_sub(1).expect("stream not opened");
        self.emit_on(latest, event).await;
    }

    /// Inject into the `index`-th stream opened
    async fn emit_on(&self, index: usize, event: SttEvent) {
        let sender = self.events.lock()[index].clone();
        sender.send(event).await.unwrap();
    }
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn start_session(
        &self,
        events: mpsc::Sender<SttEvent>,
    ) -> CoreResult<Box<dyn TranscriptionSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(events);
        Ok(Box::new(MockStream {
            audio: self.audio.clone(),
            fail_next_send: self.fail_next_send.clone(),
            closed: self.closed.clone(),
        }))
    }

    fn model_name(&self) -> &str {
        "mock-stt"
    }
}

/// Records utterances; streaming can be disabled to exercise the fallback
struct RecordingTts {
    streaming: bool,
    spoken: Mutex<Vec<String>>,
}

impl RecordingTts {
    fn new(streaming: bool) -> Self {
        Self {
            streaming,
            spoken: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextToSpeech for RecordingTts {
    async fn synthesize(&self, text: &str) -> CoreResult<Vec<u8>> {
        self.spoken.lock().push(text.to_string());
        Ok(text.as_bytes().to_vec())
    }

    async fn start_stream(
        &self,
        text: &str,
        _context_id: &str,
        events: mpsc::Sender<TtsEvent>,
    ) -> CoreResult<()> {
        if !self.streaming {
            return Err(CoreError::Tts("streaming not supported".into()));
        }
        self.spoken.lock().push(text.to_string());
        let _ = events.send(TtsEvent::Audio(text.as_bytes().to_vec())).await;
        let _ = events.send(TtsEvent::Complete).await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        "recording-tts"
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    session: Arc<VoiceSession>,
    llm: Arc<ScriptedLlm>,
    stt: Arc<MockStt>,
    tts: Arc<RecordingTts>,
    store: Arc<InMemoryStore>,
    reminders: Arc<ReminderScheduler>,
    events: broadcast::Receiver<VoiceSessionEvent>,
}

fn harness(llm: ScriptedLlm) -> Harness {
    harness_with_tts(llm, RecordingTts::new(true))
}

fn harness_with_tts(llm: ScriptedLlm, tts: RecordingTts) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let persistence = PersistenceLayer::from_memory(store.clone());
    let scheduling = SchedulingConfig::default();

    let llm = Arc::new(llm);
    let stt = Arc::new(MockStt::default());
    let tts = Arc::new(tts);
    let tools = Arc::new(AppointmentTools::new(persistence.clone(), scheduling.clone()));
    let reminders = Arc::new(ReminderScheduler::new(
        persistence.appointments.clone(),
        Arc::new(LoggingNotifier),
        &RemindersConfig::default(),
        &scheduling,
    ));

    let services = SessionServices {
        engine: Arc::new(TurnEngine::new(llm.clone(), tools)),
        summaries: SummaryGenerator::new(llm.clone()),
        stt: stt.clone(),
        tts: tts.clone(),
        persistence,
        reminders: Some(reminders.clone()),
    };
    let session = VoiceSession::new("session-1", "room-1", VoiceSessionConfig::default(), services);
    let events = session.subscribe();

    Harness {
        session,
        llm,
        stt,
        tts,
        store,
        reminders,
        events,
    }
}

fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::new(id, name, args)
}

fn future_slot() -> DateTime<Utc> {
    let day = (Utc::now() + ChronoDuration::days(3)).date_naive();
    Utc.from_utc_datetime(&day.and_hms_opt(10, 0, 0).unwrap())
}

/// Wait for the first event matching `pred`
async fn wait_for<F>(events: &mut broadcast::Receiver<VoiceSessionEvent>, pred: F) -> VoiceSessionEvent
where
    F: Fn(&VoiceSessionEvent) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_greeting_on_start() {
    let mut h = harness(ScriptedLlm::new(vec![]));
    h.session.start().await;

    match h.events.recv().await.unwrap() {
        VoiceSessionEvent::Started { session_id } => assert_eq!(session_id, "session-1"),
        other => panic!("unexpected event: {:?}", other),
    }
    let greeting = match h.events.recv().await.unwrap() {
        VoiceSessionEvent::AgentResponse { text } => text,
        other => panic!("unexpected event: {:?}", other),
    };
    assert!(greeting.starts_with("Hello! I'm Ava"));

    wait_for(&mut h.events, |e| matches!(e, VoiceSessionEvent::Audio(_))).await;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].content, greeting);
    assert_eq!(snapshot.cost_breakdown.tts_characters, greeting.chars().count() as u64);
    assert_eq!(*h.tts.spoken.lock(), vec![greeting]);
}

#[tokio::test]
async fn test_text_input_validation() {
    let h = harness(ScriptedLlm::new(vec![]));
    for input in ["", "   ", "null", "undefined"] {
        let result = h.session.send_text_input(input).await;
        assert!(matches!(result, Err(AgentError::InvalidInput(_))), "{:?}", input);
    }
    assert_eq!(h.llm.turn_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plain_turn_updates_history() {
    let mut h = harness(ScriptedLlm::new(vec![Ok(GenerateResponse::text(
        "Sure, which day works for you?",
    )
    .with_usage(TokenUsage::new(100, 20)))]));

    assert!(h.session.send_text_input("I'd like to book").await.unwrap());

    wait_for(&mut h.events, |e| {
        matches!(e, VoiceSessionEvent::AgentResponse { text } if text == "Sure, which day works for you?")
    })
    .await;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].content, "I'd like to book");
    assert_eq!(snapshot.cost_breakdown.llm_tokens, 120);
    assert!(!h.session.is_processing());
}

#[tokio::test]
async fn test_tool_round_binds_caller_and_publishes_activity() {
    let mut h = harness(ScriptedLlm::new(vec![
        Ok(GenerateResponse::tool_calls(vec![call(
            "c1",
            "identify_user",
            json!({"phone_number": "(555) 123-4567", "name": "Jane Doe"}),
        )])),
        Ok(GenerateResponse::text("Welcome, Jane!")),
    ]));

    h.session.send_text_input("My number is 555 123 4567, I'm Jane Doe").await.unwrap();

    match wait_for(&mut h.events, |e| matches!(e, VoiceSessionEvent::ToolCall { .. })).await {
        VoiceSessionEvent::ToolCall { id, name, arguments } => {
            assert_eq!(id, "c1");
            assert_eq!(name, "identify_user");
            assert_eq!(arguments["name"], "Jane Doe");
        },
        _ => unreachable!(),
    }
    match wait_for(&mut h.events, |e| matches!(e, VoiceSessionEvent::ToolResult { .. })).await {
        VoiceSessionEvent::ToolResult { result, error, .. } => {
            assert!(error.is_none());
            assert_eq!(result.unwrap()["is_new_user"], true);
        },
        _ => unreachable!(),
    }

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.user_name.as_deref(), Some("Jane Doe"));
    assert_eq!(snapshot.tool_calls.len(), 1);
    assert!(snapshot.tool_calls[0].is_complete());
}

#[tokio::test]
async fn test_second_transcript_dropped_while_processing() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        ScriptedLlm::new(vec![Ok(GenerateResponse::text("First answer"))]).with_gate(gate.clone()),
    );

    let first = {
        let session = h.session.clone();
        tokio::spawn(async move { session.send_text_input("first").await })
    };
    h.llm.entered.notified().await;
    assert!(h.session.is_processing());

    let dropped = h.session.send_text_input("second").await.unwrap();
    assert!(!dropped);

    gate.notify_one();
    assert!(first.await.unwrap().unwrap());

    let messages = h.session.snapshot().messages;
    let users: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == voice_agent_core::MessageRole::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(users, vec!["first"]);
    assert_eq!(h.llm.turn_calls.load(Ordering::SeqCst), 1);

    // The guard is released; the next utterance runs normally
    assert!(h.session.send_text_input("third").await.unwrap());
}

#[tokio::test]
async fn test_ending_tool_runs_one_closing_completion_and_terminates() {
    let mut h = harness(ScriptedLlm::new(vec![Ok(GenerateResponse::tool_calls(vec![call(
        "c1",
        "end_conversation",
        json!({"reason": "caller is done"}),
    )]))]));

    h.session.send_text_input("That's all, bye").await.unwrap();

    assert_eq!(h.llm.turn_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.llm.closing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.llm.summary_calls.load(Ordering::SeqCst), 1);

    wait_for(&mut h.events, |e| {
        matches!(e, VoiceSessionEvent::AgentResponse { text } if text == "Goodbye, take care!")
    })
    .await;
    match wait_for(&mut h.events, |e| matches!(e, VoiceSessionEvent::CallEnded { .. })).await {
        VoiceSessionEvent::CallEnded { summary, cost } => {
            assert_eq!(summary.session_id, "session-1");
            assert_eq!(summary.summary, "Caller booked a checkup.");
            assert_eq!(summary.key_topics, vec!["booking"]);
            // Summary tokens are billed
            assert_eq!(cost.llm_tokens, 120);
        },
        _ => unreachable!(),
    }

    assert!(h.session.is_terminated());
    assert_eq!(h.store.summary_count(), 1);

    // Later utterances are ignored
    assert!(!h.session.send_text_input("hello?").await.unwrap());
}

#[tokio::test]
async fn test_closing_and_summary_failures_fall_back() {
    let mut h = harness(
        ScriptedLlm::new(vec![Ok(GenerateResponse::tool_calls(vec![call(
            "c1",
            "end_conversation",
            json!({}),
        )]))])
        .with_closing(Err(CoreError::Llm("HTTP 503".into())))
        .with_failing_summary(),
    );

    h.session.send_text_input("bye").await.unwrap();

    wait_for(&mut h.events, |e| {
        matches!(e, VoiceSessionEvent::AgentResponse { text } if text == FAREWELL)
    })
    .await;
    wait_for(&mut h.events, |e| {
        matches!(e, VoiceSessionEvent::Error { message } if message.starts_with("Failed to generate summary"))
    })
    .await;
    match wait_for(&mut h.events, |e| matches!(e, VoiceSessionEvent::CallEnded { .. })).await {
        VoiceSessionEvent::CallEnded { summary, .. } => {
            assert_eq!(summary.summary, FALLBACK_SUMMARY);
            assert_eq!(summary.key_topics, vec!["appointment scheduling"]);
        },
        _ => unreachable!(),
    }
    assert_eq!(h.store.summary_count(), 1);
}

#[tokio::test]
async fn test_end_call_twice_persists_one_summary() {
    let h = harness(ScriptedLlm::new(vec![]));
    h.session.start().await;

    let (first, second) = tokio::join!(h.session.end_call(), h.session.end_call());
    assert_eq!(first.is_some() as u8 + second.is_some() as u8, 1);
    assert!(h.session.end_call().await.is_none());

    assert_eq!(h.store.summary_count(), 1);
    assert_eq!(h.llm.summary_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_model_end_then_manual_end_yields_one_summary() {
    let mut h = harness(ScriptedLlm::new(vec![Ok(GenerateResponse::tool_calls(vec![call(
        "c1",
        "end_conversation",
        json!({}),
    )]))]));

    h.session.send_text_input("Thanks, bye").await.unwrap();
    assert!(h.session.is_terminated());
    assert!(h.session.end_call().await.is_none());

    let mut ended = 0;
    loop {
        match h.events.try_recv() {
            Ok(VoiceSessionEvent::CallEnded { .. }) => ended += 1,
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    assert_eq!(ended, 1);
    assert_eq!(h.store.summary_count(), 1);
    assert_eq!(h.llm.summary_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_end_call_cancels_turn_in_flight() {
    let start = future_slot();
    let gate = Arc::new(Notify::new());
    let mut h = harness(
        ScriptedLlm::new(vec![
            Ok(GenerateResponse::tool_calls(vec![
                call("c1", "identify_user", json!({"phone_number": "+15551234567", "name": "Jane"})),
                call("c2", "book_appointment", json!({"date_time": start.to_rfc3339()})),
            ])),
            Ok(GenerateResponse::text("You're booked.")),
        ])
        .with_gate(gate.clone()),
    );

    let turn = {
        let session = h.session.clone();
        tokio::spawn(async move { session.send_text_input("Book me for Thursday").await })
    };
    h.llm.entered.notified().await;

    let summary = h.session.end_call().await;
    assert!(summary.is_some());
    gate.notify_one();

    let result = timeout(Duration::from_secs(2), turn).await.unwrap().unwrap();
    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert!(!h.session.is_processing());

    // The held model reply never reaches the tools
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.store.appointment_count(), 0);
    assert_eq!(h.store.summary_count(), 1);
    assert!(h.session.snapshot().tool_calls.is_empty());

    loop {
        match h.events.try_recv() {
            Ok(VoiceSessionEvent::AgentResponse { text }) => {
                assert_ne!(text, "You're booked.");
            },
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

#[tokio::test]
async fn test_end_call_closes_transcription() {
    let h = harness(ScriptedLlm::new(vec![]));
    h.session.push_audio(&[1, 2]).await.unwrap();

    h.session.end_call().await.unwrap();
    assert_eq!(h.stt.closed.load(Ordering::SeqCst), 1);
    assert!(matches!(h.session.push_audio(&[3]).await, Err(AgentError::Ended)));
    assert_eq!(h.stt.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_summary_includes_upcoming_appointments() {
    let start = future_slot();
    let h = harness(ScriptedLlm::new(vec![
        Ok(GenerateResponse::tool_calls(vec![
            call("c1", "identify_user", json!({"phone_number": "5551234567", "name": "Jane"})),
            call(
                "c2",
                "book_appointment",
                json!({"date_time": start.to_rfc3339(), "duration": 30, "purpose": "Checkup"}),
            ),
        ])),
        Ok(GenerateResponse::text("You're booked.")),
    ]));

    h.session.send_text_input("Book me in").await.unwrap();
    assert_eq!(h.store.appointment_count(), 1);

    // Booking effect reaches the reminder scheduler
    assert_eq!(h.reminders.tracked_count(), 1);

    let summary = h.session.end_call().await.unwrap();
    assert_eq!(summary.caller_phone.as_deref(), Some("+15551234567"));
    assert_eq!(summary.appointments.len(), 1);
    assert_eq!(summary.appointments[0].start, start);
    assert_eq!(summary.user_preferences, vec!["mornings"]);

    let saved = CallSummaryStore::list_for_caller(h.store.as_ref(), "+15551234567")
        .await
        .unwrap();
    assert_eq!(saved.len(), 1);
}

#[tokio::test]
async fn test_model_failure_keeps_session_usable() {
    let mut h = harness(ScriptedLlm::new(vec![
        Err(CoreError::Llm("HTTP 500".into())),
        Ok(GenerateResponse::text("Sorry about that, how can I help?")),
    ]));

    let result = h.session.send_text_input("hello").await;
    assert!(matches!(result, Err(AgentError::Llm(_))));
    wait_for(&mut h.events, |e| matches!(e, VoiceSessionEvent::Error { .. })).await;
    assert!(!h.session.is_processing());

    assert!(h.session.send_text_input("hello again").await.unwrap());
    wait_for(&mut h.events, |e| {
        matches!(e, VoiceSessionEvent::AgentResponse { text } if text.starts_with("Sorry about that"))
    })
    .await;
}

#[tokio::test]
async fn test_final_transcripts_drive_turns() {
    let mut h = harness(ScriptedLlm::new(vec![Ok(GenerateResponse::text("Happy to help."))]));

    h.session.push_audio(&[1, 2, 3, 4]).await.unwrap();
    h.session.push_audio(&[5, 6]).await.unwrap();
    assert_eq!(h.stt.opened.load(Ordering::SeqCst), 1);
    assert_eq!(h.stt.audio.lock().len(), 6);

    h.stt.emit(SttEvent::Transcript(TranscriptEvent::partial("I'd like"))).await;
    h.stt
        .emit(SttEvent::Transcript(TranscriptEvent::final_result("  ", 0.5)))
        .await;
    h.stt
        .emit(SttEvent::Transcript(TranscriptEvent::final_result(
            "I'd like to book an appointment",
            3.0,
        )))
        .await;

    match wait_for(&mut h.events, |e| matches!(e, VoiceSessionEvent::Transcript { .. })).await {
        VoiceSessionEvent::Transcript { text, is_final } => {
            assert_eq!(text, "I'd like");
            assert!(!is_final);
        },
        _ => unreachable!(),
    }
    wait_for(&mut h.events, |e| {
        matches!(e, VoiceSessionEvent::AgentResponse { text } if text == "Happy to help.")
    })
    .await;

    // Only the non-empty final transcript ran a turn; both finals count as speech
    assert_eq!(h.llm.turn_calls.load(Ordering::SeqCst), 1);
    let usage = h.session.state().usage();
    assert!((usage.stt_seconds - 3.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_stt_error_reopens_stream() {
    let mut h = harness(ScriptedLlm::new(vec![]));

    h.session.push_audio(&[0; 8]).await.unwrap();
    h.stt.emit(SttEvent::Error("socket closed".into())).await;
    wait_for(&mut h.events, |e| {
        matches!(e, VoiceSessionEvent::Error { message } if message.contains("socket closed"))
    })
    .await;

    h.session.push_audio(&[0; 8]).await.unwrap();
    assert_eq!(h.stt.opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stale_stream_error_keeps_reopened_stream() {
    let mut h = harness(ScriptedLlm::new(vec![]));

    h.session.push_audio(&[1]).await.unwrap();
    h.stt.fail_next_send.store(true, Ordering::SeqCst);
    assert!(h.session.push_audio(&[2]).await.is_err());

    // Next chunk opens a replacement stream
    h.session.push_audio(&[3]).await.unwrap();
    assert_eq!(h.stt.opened.load(Ordering::SeqCst), 2);

    // The first stream reports its failure late
    h.stt.emit_on(0, SttEvent::Error("socket closed".into())).await;
    wait_for(&mut h.events, |e| {
        matches!(e, VoiceSessionEvent::Error { message } if message.contains("socket closed"))
    })
    .await;

    h.session.push_audio(&[4]).await.unwrap();
    assert_eq!(h.stt.opened.load(Ordering::SeqCst), 2);
    assert_eq!(*h.stt.audio.lock(), vec![1, 3, 4]);
}

#[tokio::test]
async fn test_synthesis_falls_back_to_request_response() {
    let mut h = harness_with_tts(ScriptedLlm::new(vec![]), RecordingTts::new(false));
    h.session.start().await;

    match wait_for(&mut h.events, |e| matches!(e, VoiceSessionEvent::Audio(_))).await {
        VoiceSessionEvent::Audio(bytes) => assert!(bytes.starts_with(b"Hello!")),
        _ => unreachable!(),
    }
    assert_eq!(h.tts.spoken.lock().len(), 1);
}

#[tokio::test]
async fn test_stop_rejects_audio_and_skips_summary() {
    let h = harness(ScriptedLlm::new(vec![]));
    h.session.push_audio(&[1]).await.unwrap();

    h.session.stop().await;
    assert!(h.session.is_stopped());
    assert!(matches!(h.session.push_audio(&[2]).await, Err(AgentError::Ended)));
    assert!(!h.session.send_text_input("hello").await.unwrap());
    assert_eq!(h.store.summary_count(), 0);
}
