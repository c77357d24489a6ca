//! Conversation history types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm_types::Message;

/// Speaker of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    /// Label used when rendering a transcript for summarization
    pub fn transcript_label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Agent",
        }
    }
}

/// One entry of a session's spoken history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Convert into a chat message for the language model
    pub fn to_message(&self) -> Message {
        match self.role {
            MessageRole::User => Message::user(self.content.clone()),
            MessageRole::Assistant => Message::assistant(self.content.clone()),
        }
    }
}

/// Render history as "Agent: ..." / "User: ..." lines
pub fn render_transcript(messages: &[ConversationMessage]) -> String {
    let mut out = String::new();
    for msg in messages {
        out.push_str(msg.role.transcript_label());
        out.push_str(": ");
        out.push_str(&msg.content);
        out.push('\n');
    }
    out
}
