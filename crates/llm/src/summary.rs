//! End-of-call summary generation
//!
//! The model is asked for a small JSON document. Anything that does not parse
//! degrades to the raw text (or a fixed placeholder) rather than failing the
//! termination of the call.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use voice_agent_config::LlmConfig;
use voice_agent_core::{render_transcript, ConversationMessage, GenerateRequest, LanguageModel};

use crate::LlmError;

/// Summary text used whenever the model gives nothing usable
pub const FALLBACK_SUMMARY: &str = "Call completed with the appointment assistant.";

const SUMMARY_INSTRUCTIONS: &str = r#"You are analyzing a call between a user and an AI appointment assistant. Generate a comprehensive call summary.

Respond ONLY with valid JSON in this exact format (no markdown, no code blocks):
{
  "summary": "A 2-3 sentence summary of what happened in the call",
  "user_preferences": ["preference 1", "preference 2"],
  "key_topics": ["topic 1", "topic 2"]
}

Guidelines:
- "summary": Describe what the user wanted and what actions were taken
- "user_preferences": List any stated preferences (times, days, contact methods, etc.)
- "key_topics": List the main topics discussed (booking, cancellation, inquiry, etc.)"#;

/// Structured part of a call summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryContent {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub user_preferences: Vec<String>,
    #[serde(default)]
    pub key_topics: Vec<String>,
}

impl SummaryContent {
    pub fn fallback() -> Self {
        Self {
            summary: FALLBACK_SUMMARY.to_string(),
            user_preferences: Vec::new(),
            key_topics: vec!["appointment scheduling".to_string()],
        }
    }
}

/// Parse a model reply into summary content
///
/// The first balanced `{...}` object is extracted, so fenced or chatty replies
/// still parse. Unparseable replies become the summary text verbatim.
pub fn parse_summary(raw: &str) -> SummaryContent {
    let candidate = extract_json_object(raw).unwrap_or(raw);

    let mut content = match serde_json::from_str::<SummaryContent>(candidate) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!(error = %e, "Summary reply is not JSON, keeping raw text");
            SummaryContent {
                summary: raw.trim().to_string(),
                user_preferences: Vec::new(),
                key_topics: vec!["appointment scheduling".to_string()],
            }
        },
    };
    if content.summary.trim().is_empty() {
        content.summary = FALLBACK_SUMMARY.to_string();
    }
    content
}

fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    for (i, c) in s[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            },
            _ => {},
        }
    }
    None
}

/// Generates call summaries with a low-temperature completion
#[derive(Clone)]
pub struct SummaryGenerator {
    llm: Arc<dyn LanguageModel>,
    temperature: f32,
    max_tokens: u32,
}

impl SummaryGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            temperature: 0.3,
            max_tokens: 500,
        }
    }

    pub fn from_settings(llm: Arc<dyn LanguageModel>, settings: &LlmConfig) -> Self {
        Self {
            llm,
            temperature: settings.summary_temperature,
            max_tokens: settings.max_tokens,
        }
    }

    /// Summarize a call
    ///
    /// `appointments` are pre-rendered lines describing the caller's upcoming
    /// appointments. Returns the content and the tokens the completion used.
    pub async fn generate(
        &self,
        history: &[ConversationMessage],
        appointments: &[String],
    ) -> Result<(SummaryContent, u64), LlmError> {
        let mut conversation = String::from("Conversation History:\n");
        conversation.push_str(&render_transcript(history));
        if !appointments.is_empty() {
            conversation.push_str("\n\nCurrent User Appointments:\n");
            for line in appointments {
                conversation.push_str("- ");
                conversation.push_str(line);
                conversation.push('\n');
            }
        }

        let request = GenerateRequest::new(SUMMARY_INSTRUCTIONS)
            .with_user_message(conversation)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = self.llm.generate(request).await?;
        Ok((parse_summary(&response.text), response.total_tokens()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use voice_agent_core::{GenerateResponse, TokenUsage, ToolDefinition};

    struct MockLlm {
        reply: Result<String, String>,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    #[async_trait]
    impl LanguageModel for MockLlm {
        async fn generate(
            &self,
            request: GenerateRequest,
        ) -> voice_agent_core::Result<GenerateResponse> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(GenerateResponse::text(text.clone()).with_usage(TokenUsage::new(80, 20))),
                Err(e) => Err(voice_agent_core::Error::Llm(e.clone())),
            }
        }

        async fn generate_with_tools(
            &self,
            request: GenerateRequest,
            _tools: &[ToolDefinition],
        ) -> voice_agent_core::Result<GenerateResponse> {
            self.generate(request).await
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"summary\": \"Booked a checkup.\", \"key_topics\": [\"booking\"]}\n```";
        let content = parse_summary(raw);
        assert_eq!(content.summary, "Booked a checkup.");
        assert_eq!(content.key_topics, vec!["booking"]);
        assert!(content.user_preferences.is_empty());
    }

    #[test]
    fn test_parse_fallbacks() {
        let content = parse_summary("The caller asked about hours.");
        assert_eq!(content.summary, "The caller asked about hours.");
        assert_eq!(content.key_topics, vec!["appointment scheduling"]);

        let content = parse_summary(r#"{"summary": "", "key_topics": []}"#);
        assert_eq!(content.summary, FALLBACK_SUMMARY);
    }

    #[tokio::test]
    async fn test_generate_builds_transcript() {
        let llm = Arc::new(MockLlm {
            reply: Ok(r#"{"summary": "Booked.", "user_preferences": ["mornings"], "key_topics": ["booking"]}"#.into()),
            seen: Mutex::default(),
        });
        let generator = SummaryGenerator::new(llm.clone());
        let history = vec![
            ConversationMessage::assistant("Hello!"),
            ConversationMessage::user("Book me Monday morning"),
        ];

        let (content, tokens) = generator
            .generate(&history, &["Monday, May 6, 2030 at 10:00 AM: Checkup (30 min) - Status: booked".into()])
            .await
            .unwrap();
        assert_eq!(content.user_preferences, vec!["mornings"]);
        assert_eq!(tokens, 100);

        let seen = llm.seen.lock().unwrap();
        let prompt = &seen[0].messages[1].content;
        assert!(prompt.contains("Agent: Hello!\nUser: Book me Monday morning\n"));
        assert!(prompt.contains("Current User Appointments:\n- Monday, May 6, 2030"));
        assert_eq!(seen[0].temperature, Some(0.3));
    }

    #[tokio::test]
    async fn test_generate_propagates_failure() {
        let llm = Arc::new(MockLlm {
            reply: Err("HTTP 500".into()),
            seen: Mutex::default(),
        });
        let generator = SummaryGenerator::new(llm);
        assert!(generator.generate(&[], &[]).await.is_err());
    }
}
