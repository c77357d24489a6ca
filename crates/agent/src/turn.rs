//! Conversation turn engine
//!
//! One turn submits the system prompt, the session history and the tool
//! catalog to the model, then loops while the model asks for tools:
//!
//! ```text
//! Awaiting-Model ──no tools──────────────────────────► Answered
//!       │
//!       └──tools──► execute in order ──► resubmit ──► Awaiting-Model
//!                         │
//!                         └──end signalled──► one closing completion ──► Ended
//! ```

use chrono::{FixedOffset, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use voice_agent_config::{AgentConfig, LlmConfig, SchedulingConfig};
use voice_agent_core::{ConversationMessage, GenerateRequest, LanguageModel, Message, ToolCall};
use voice_agent_llm::{strip_tool_announcements, system_prompt};
use voice_agent_tools::{ToolContext, ToolEffect, ToolExecutor};

use crate::AgentError;

/// Spoken when the closing completion fails or comes back empty
pub const FAREWELL: &str = "Thank you for calling. Goodbye!";

/// Spoken when the model keeps requesting tools past the round limit
pub const ROUND_LIMIT_APOLOGY: &str =
    "I'm sorry, I'm having trouble completing that request. Could you please try again?";

/// Hooks invoked while a turn runs
///
/// All methods default to no-ops.
pub trait TurnObserver: Send + Sync {
    fn on_tool_call(&self, _call: &ToolCall) {}

    fn on_tool_result(&self, _call: &ToolCall, _result: &Result<Value, String>) {}

    /// Tokens billed for one completion
    fn on_usage(&self, _tokens: u64) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl TurnObserver for NoopObserver {}

/// How a turn finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    Answered,
    Ended,
}

impl TurnEnd {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::Ended => "ended",
        }
    }
}

/// Result of one turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Text to speak, already stripped of tool announcements
    pub text: String,
    pub end: TurnEnd,
    /// Side effects of successful tool calls, in execution order
    pub effects: Vec<ToolEffect>,
    pub tokens: u64,
    /// Tool-calling rounds taken
    pub rounds: usize,
}

impl TurnOutcome {
    pub fn is_ended(&self) -> bool {
        self.end == TurnEnd::Ended
    }
}

/// Drives model exchanges for a session
pub struct TurnEngine {
    llm: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolExecutor>,
    assistant_name: String,
    timezone: FixedOffset,
    temperature: f32,
    max_tokens: u32,
    closing_max_tokens: u32,
    max_rounds: usize,
}

impl TurnEngine {
    pub fn new(llm: Arc<dyn LanguageModel>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self::from_settings(
            llm,
            tools,
            &AgentConfig::default(),
            &LlmConfig::default(),
            &SchedulingConfig::default(),
        )
    }

    pub fn from_settings(
        llm: Arc<dyn LanguageModel>,
        tools: Arc<dyn ToolExecutor>,
        agent: &AgentConfig,
        llm_config: &LlmConfig,
        scheduling: &SchedulingConfig,
    ) -> Self {
        Self {
            llm,
            tools,
            assistant_name: agent.assistant_name.clone(),
            timezone: scheduling.timezone(),
            temperature: llm_config.temperature,
            max_tokens: llm_config.max_tokens,
            closing_max_tokens: llm_config.closing_max_tokens,
            max_rounds: agent.max_tool_rounds.max(1),
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Run one turn over `history`
    ///
    /// Only the first completion of each round can fail the turn; tool
    /// failures are fed back to the model and a failed closing completion
    /// falls back to [`FAREWELL`].
    pub async fn run(
        &self,
        ctx: &dyn ToolContext,
        history: &[ConversationMessage],
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome, AgentError> {
        let started = Instant::now();
        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        let catalog = self.tools.definitions();

        let mut request = GenerateRequest::new(system_prompt(&self.assistant_name, today))
            .with_messages(history.iter().map(ConversationMessage::to_message))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let mut tokens = 0u64;
        let mut effects = Vec::new();

        for round in 0..self.max_rounds {
            let response = self
                .llm
                .generate_with_tools(request.clone(), &catalog)
                .await?;
            let used = response.total_tokens();
            tokens += used;
            observer.on_usage(used);

            if !response.has_tool_calls() {
                return Ok(self.finish(
                    strip_tool_announcements(&response.text),
                    TurnEnd::Answered,
                    effects,
                    tokens,
                    round,
                    started,
                ));
            }

            let calls: Vec<ToolCall> = response
                .tool_calls
                .into_iter()
                .map(|mut call| {
                    if call.id.is_empty() {
                        call.id = Uuid::new_v4().to_string();
                    }
                    call
                })
                .collect();
            request
                .messages
                .push(Message::assistant_tool_calls(response.text, calls.clone()));

            let mut should_end = false;
            for call in &calls {
                observer.on_tool_call(call);

                let result = match self.tools.execute(ctx, call).await {
                    Ok(outcome) => {
                        should_end |= outcome.should_end();
                        if let Some(effect) = outcome.effect {
                            effects.push(effect);
                        }
                        Ok(outcome.payload)
                    },
                    Err(e) => {
                        tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                        Err(e.to_string())
                    },
                };
                observer.on_tool_result(call, &result);

                let content = match &result {
                    Ok(payload) => payload.to_string(),
                    Err(message) => json!({ "error": message }).to_string(),
                };
                request.messages.push(Message::tool(content, call.id.clone()));
            }

            if should_end {
                let closing = request.clone().with_max_tokens(self.closing_max_tokens);
                let text = match self.llm.generate(closing).await {
                    Ok(response) => {
                        let used = response.total_tokens();
                        tokens += used;
                        observer.on_usage(used);
                        strip_tool_announcements(&response.text)
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Closing completion failed");
                        String::new()
                    },
                };
                let text = if text.is_empty() {
                    FAREWELL.to_string()
                } else {
                    text
                };
                return Ok(self.finish(text, TurnEnd::Ended, effects, tokens, round + 1, started));
            }
        }

        tracing::warn!(max_rounds = self.max_rounds, "Tool round limit reached");
        metrics::counter!("voice_agent_turn_round_limit_total").increment(1);
        Ok(self.finish(
            ROUND_LIMIT_APOLOGY.to_string(),
            TurnEnd::Answered,
            effects,
            tokens,
            self.max_rounds,
            started,
        ))
    }

    fn finish(
        &self,
        text: String,
        end: TurnEnd,
        effects: Vec<ToolEffect>,
        tokens: u64,
        rounds: usize,
        started: Instant,
    ) -> TurnOutcome {
        metrics::counter!("voice_agent_turns_total", "outcome" => end.as_str()).increment(1);
        metrics::histogram!("voice_agent_turn_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::debug!(rounds, tokens, outcome = end.as_str(), "Turn complete");

        TurnOutcome {
            text,
            end,
            effects,
            tokens,
            rounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use voice_agent_core::{GenerateResponse, Role, TokenUsage, ToolDefinition};
    use voice_agent_persistence::PersistenceLayer;
    use voice_agent_tools::{AppointmentTools, SimpleToolContext};

    /// Replays scripted responses for tool-enabled calls
    struct MockLlm {
        script: Mutex<VecDeque<voice_agent_core::Result<GenerateResponse>>>,
        closing: Mutex<Option<voice_agent_core::Result<GenerateResponse>>>,
        requests: Mutex<Vec<GenerateRequest>>,
        closing_requests: Mutex<Vec<GenerateRequest>>,
    }

    impl MockLlm {
        fn new(script: Vec<voice_agent_core::Result<GenerateResponse>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                closing: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
                closing_requests: Mutex::new(Vec::new()),
            }
        }

        fn with_closing(self, reply: voice_agent_core::Result<GenerateResponse>) -> Self {
            *self.closing.lock() = Some(reply);
            self
        }
    }

    #[async_trait]
    impl LanguageModel for MockLlm {
        async fn generate(
            &self,
            request: GenerateRequest,
        ) -> voice_agent_core::Result<GenerateResponse> {
            self.closing_requests.lock().push(request);
            self.closing
                .lock()
                .take()
                .unwrap_or_else(|| Ok(GenerateResponse::text("Goodbye!")))
        }

        async fn generate_with_tools(
            &self,
            request: GenerateRequest,
            _tools: &[ToolDefinition],
        ) -> voice_agent_core::Result<GenerateResponse> {
            self.requests.lock().push(request);
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(GenerateResponse::text("fallback")))
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    fn engine(llm: Arc<MockLlm>) -> TurnEngine {
        let tools = AppointmentTools::new(PersistenceLayer::in_memory(), SchedulingConfig::default());
        TurnEngine::new(llm, Arc::new(tools))
    }

    fn tool_call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall::new(id, name, args)
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let llm = Arc::new(MockLlm::new(vec![Ok(GenerateResponse::text(
            "[Calling the fetch_slots tool] Sure, which day works for you?",
        )
        .with_usage(TokenUsage::new(40, 10)))]));
        let engine = engine(llm.clone());
        let ctx = SimpleToolContext::new();

        let history = vec![ConversationMessage::user("I need an appointment")];
        let outcome = engine.run(&ctx, &history, &NoopObserver).await.unwrap();

        assert_eq!(outcome.end, TurnEnd::Answered);
        assert_eq!(outcome.text, "Sure, which day works for you?");
        assert_eq!(outcome.tokens, 50);
        assert_eq!(outcome.rounds, 0);

        let requests = llm.requests.lock();
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[1].content, "I need an appointment");
    }

    #[tokio::test]
    async fn test_tool_errors_are_fed_back() {
        let llm = Arc::new(MockLlm::new(vec![
            Ok(GenerateResponse::tool_calls(vec![
                tool_call("c1", "teleport", json!({})),
                tool_call("c2", "fetch_slots", json!({"date": "2030-05-06"})),
            ])),
            Ok(GenerateResponse::text("Here are the slots.")),
        ]));
        let engine = engine(llm.clone());
        let ctx = SimpleToolContext::new();

        let outcome = engine
            .run(&ctx, &[ConversationMessage::user("slots?")], &NoopObserver)
            .await
            .unwrap();
        assert_eq!(outcome.text, "Here are the slots.");
        assert_eq!(outcome.rounds, 1);

        let requests = llm.requests.lock();
        let second = &requests[1].messages;
        let tool_messages: Vec<&Message> =
            second.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages.len(), 2);

        let failed: Value = serde_json::from_str(&tool_messages[0].content).unwrap();
        assert_eq!(failed["error"], "Unknown tool: teleport");
        assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("c1"));

        // The later tool still ran
        let slots: Value = serde_json::from_str(&tool_messages[1].content).unwrap();
        assert_eq!(slots["success"], true);

        let records = ctx.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].error.is_some());
    }

    #[tokio::test]
    async fn test_end_signal_runs_one_closing_completion() {
        let llm = Arc::new(
            MockLlm::new(vec![Ok(GenerateResponse::tool_calls(vec![tool_call(
                "c1",
                "end_conversation",
                json!({"reason": "caller said goodbye"}),
            )]))])
            .with_closing(Ok(GenerateResponse::text("Have a great day!")
                .with_usage(TokenUsage::new(30, 5)))),
        );
        let engine = engine(llm.clone());
        let ctx = SimpleToolContext::new();

        let outcome = engine
            .run(&ctx, &[ConversationMessage::user("bye")], &NoopObserver)
            .await
            .unwrap();

        assert!(outcome.is_ended());
        assert_eq!(outcome.text, "Have a great day!");
        assert_eq!(outcome.tokens, 35);
        assert!(matches!(
            outcome.effects.as_slice(),
            [ToolEffect::EndConversation { .. }]
        ));
        assert_eq!(llm.requests.lock().len(), 1);

        let closing = llm.closing_requests.lock();
        assert_eq!(closing.len(), 1);
        assert_eq!(closing[0].max_tokens, Some(200));
        assert_eq!(closing[0].messages.last().map(|m| m.role), Some(Role::Tool));
    }

    #[tokio::test]
    async fn test_closing_failure_falls_back() {
        let llm = Arc::new(
            MockLlm::new(vec![Ok(GenerateResponse::tool_calls(vec![tool_call(
                "c1",
                "end_conversation",
                json!({}),
            )]))])
            .with_closing(Err(voice_agent_core::Error::Llm("HTTP 503".into()))),
        );
        let engine = engine(llm);

        let outcome = engine
            .run(&SimpleToolContext::new(), &[], &NoopObserver)
            .await
            .unwrap();
        assert!(outcome.is_ended());
        assert_eq!(outcome.text, FAREWELL);
    }

    #[tokio::test]
    async fn test_round_limit() {
        let looping = || {
            Ok(GenerateResponse::tool_calls(vec![tool_call(
                "",
                "fetch_slots",
                json!({"date": "2030-05-06"}),
            )]))
        };
        let llm = Arc::new(MockLlm::new(vec![looping(), looping(), looping()]));
        let engine = engine(llm.clone()).with_max_rounds(2);
        let ctx = SimpleToolContext::new();

        let outcome = engine.run(&ctx, &[], &NoopObserver).await.unwrap();
        assert_eq!(outcome.end, TurnEnd::Answered);
        assert_eq!(outcome.text, ROUND_LIMIT_APOLOGY);
        assert_eq!(llm.requests.lock().len(), 2);

        // Empty ids are replaced before execution
        let records = ctx.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.id.is_empty()));
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let llm = Arc::new(MockLlm::new(vec![Err(voice_agent_core::Error::Llm(
            "HTTP 500".into(),
        ))]));
        let engine = engine(llm);
        let result = engine.run(&SimpleToolContext::new(), &[], &NoopObserver).await;
        assert!(matches!(result, Err(AgentError::Llm(_))));
    }

    #[tokio::test]
    async fn test_observer_sees_calls_and_usage() {
        #[derive(Default)]
        struct Recorder {
            calls: Mutex<Vec<String>>,
            results: Mutex<Vec<bool>>,
            tokens: Mutex<u64>,
        }

        impl TurnObserver for Recorder {
            fn on_tool_call(&self, call: &ToolCall) {
                self.calls.lock().push(call.name.clone());
            }

            fn on_tool_result(&self, _call: &ToolCall, result: &Result<Value, String>) {
                self.results.lock().push(result.is_ok());
            }

            fn on_usage(&self, tokens: u64) {
                *self.tokens.lock() += tokens;
            }
        }

        let llm = Arc::new(MockLlm::new(vec![
            Ok(GenerateResponse::tool_calls(vec![tool_call(
                "c1",
                "retrieve_appointments",
                json!({}),
            )])
            .with_usage(TokenUsage::new(10, 2))),
            Ok(GenerateResponse::text("Please tell me your phone number.")
                .with_usage(TokenUsage::new(20, 3))),
        ]));
        let engine = engine(llm);
        let recorder = Recorder::default();

        engine
            .run(&SimpleToolContext::new(), &[], &recorder)
            .await
            .unwrap();
        assert_eq!(*recorder.calls.lock(), vec!["retrieve_appointments"]);
        assert_eq!(*recorder.results.lock(), vec![true]);
        assert_eq!(*recorder.tokens.lock(), 35);
    }
}
