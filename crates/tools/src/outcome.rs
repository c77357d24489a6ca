//! Structured tool results

use serde_json::{json, Value};
use uuid::Uuid;

/// Side effect a successful tool had on the outside world
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEffect {
    CallerIdentified { phone: String },
    AppointmentBooked(Uuid),
    AppointmentCancelled(Uuid),
    AppointmentRescheduled(Uuid),
    EndConversation { reason: Option<String> },
}

/// Result of a tool call that reached its handler
///
/// `payload` is what the model sees. Business failures are outcomes with
/// `success == false`, not errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub success: bool,
    pub payload: Value,
    pub effect: Option<ToolEffect>,
}

impl ToolOutcome {
    pub fn success(payload: Value) -> Self {
        Self {
            success: true,
            payload,
            effect: None,
        }
    }

    /// `{"success": false, "error": message}`
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: json!({ "success": false, "error": message.into() }),
            effect: None,
        }
    }

    /// Unsuccessful result with extra fields for the model
    pub fn failure_with(payload: Value) -> Self {
        Self {
            success: false,
            payload,
            effect: None,
        }
    }

    pub fn with_effect(mut self, effect: ToolEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Whether the conversation should end after this call
    pub fn should_end(&self) -> bool {
        matches!(self.effect, Some(ToolEffect::EndConversation { .. }))
    }

    /// Error message carried by a failure payload
    pub fn error_message(&self) -> Option<&str> {
        self.payload.get("error").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_payload() {
        let outcome = ToolOutcome::failure("Appointment not found");
        assert!(!outcome.success);
        assert_eq!(outcome.payload["success"], false);
        assert_eq!(outcome.error_message(), Some("Appointment not found"));
        assert!(!outcome.should_end());
    }

    #[test]
    fn test_should_end() {
        let outcome = ToolOutcome::success(json!({"should_end": true}))
            .with_effect(ToolEffect::EndConversation { reason: None });
        assert!(outcome.should_end());
    }
}
