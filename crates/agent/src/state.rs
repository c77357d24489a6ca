//! Per-call session state
//!
//! Everything a call mutates lives behind one `parking_lot` mutex. The lock is
//! never held across an await: callers copy out, release, do I/O, re-acquire.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use voice_agent_core::{ConversationMessage, CostBreakdown, UnitPrices, UsageCounters};
use voice_agent_tools::{CallerIdentity, ToolCallRecord, ToolContext};

/// Lifecycle status reported in snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

#[derive(Default)]
struct Inner {
    caller: Option<CallerIdentity>,
    history: Vec<ConversationMessage>,
    tool_calls: Vec<ToolCallRecord>,
    usage: UsageCounters,
    ended_at: Option<DateTime<Utc>>,
}

/// History, audit trail and usage counters of one call
pub struct SessionState {
    id: String,
    room: String,
    started_at: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl SessionState {
    pub fn new(id: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            room: room.into(),
            started_at: Utc::now(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn push_message(&self, message: ConversationMessage) {
        self.inner.lock().history.push(message);
    }

    /// Copy of the history in insertion order
    pub fn history(&self) -> Vec<ConversationMessage> {
        self.inner.lock().history.clone()
    }

    pub fn tool_calls(&self) -> Vec<ToolCallRecord> {
        self.inner.lock().tool_calls.clone()
    }

    pub fn add_speech(&self, seconds: f64) {
        self.inner.lock().usage.add_speech(seconds);
    }

    pub fn add_synthesized(&self, text: &str) {
        self.inner.lock().usage.add_synthesized(text);
    }

    pub fn add_tokens(&self, tokens: u64) {
        self.inner.lock().usage.add_tokens(tokens);
    }

    pub fn usage(&self) -> UsageCounters {
        self.inner.lock().usage
    }

    /// Record the end time; the first call wins
    pub fn mark_ended(&self) -> DateTime<Utc> {
        *self.inner.lock().ended_at.get_or_insert_with(Utc::now)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().ended_at
    }

    /// Whole seconds between start and end (or `now` while active)
    pub fn duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        let end = self.ended_at().unwrap_or(now);
        (end - self.started_at).num_seconds().max(0)
    }

    pub fn snapshot(&self, prices: &UnitPrices) -> SessionSnapshot {
        let inner = self.inner.lock();
        SessionSnapshot {
            id: self.id.clone(),
            room_name: self.room.clone(),
            user_phone: inner.caller.as_ref().map(|c| c.phone.clone()),
            user_name: inner.caller.as_ref().map(|c| c.name.clone()),
            started_at: self.started_at,
            ended_at: inner.ended_at,
            messages: inner.history.clone(),
            tool_calls: inner.tool_calls.clone(),
            cost_breakdown: inner.usage.cost(prices),
            status: if inner.ended_at.is_some() {
                SessionStatus::Ended
            } else {
                SessionStatus::Active
            },
        }
    }
}

impl ToolContext for SessionState {
    fn caller(&self) -> Option<CallerIdentity> {
        self.inner.lock().caller.clone()
    }

    fn bind_caller(&self, caller: CallerIdentity) {
        tracing::info!(session_id = %self.id, phone = %caller.phone, "Caller identified");
        self.inner.lock().caller = Some(caller);
    }

    fn begin_tool_call(&self, record: ToolCallRecord) {
        self.inner.lock().tool_calls.push(record);
    }

    fn complete_tool_call(&self, id: &str, result: &Result<Value, String>) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.tool_calls.iter_mut().rev().find(|r| r.id == id) {
            record.complete(result);
        }
    }
}

/// Point-in-time view of a session, serialized for the transport
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub room_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub messages: Vec<ConversationMessage>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub cost_breakdown: CostBreakdown,
    pub status: SessionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_reflects_state() {
        let state = SessionState::new("s-1", "room-1");
        state.push_message(ConversationMessage::assistant("Hello!"));
        state.bind_caller(CallerIdentity {
            phone: "+15551234567".into(),
            name: "Jane".into(),
        });
        state.add_tokens(120);

        let snapshot = state.snapshot(&UnitPrices::default());
        assert_eq!(snapshot.status, SessionStatus::Active);
        assert_eq!(snapshot.user_name.as_deref(), Some("Jane"));
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.cost_breakdown.llm_tokens, 120);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["room_name"], "room-1");
        assert_eq!(value["status"], "active");
        assert!(value.get("ended_at").is_none());
    }

    #[test]
    fn test_mark_ended_keeps_first_time() {
        let state = SessionState::new("s-1", "room-1");
        let first = state.mark_ended();
        let second = state.mark_ended();
        assert_eq!(first, second);
        assert_eq!(state.snapshot(&UnitPrices::default()).status, SessionStatus::Ended);
    }

    #[test]
    fn test_tool_call_audit() {
        let state = SessionState::new("s-1", "room-1");
        state.begin_tool_call(ToolCallRecord::started("c1", "fetch_slots", json!({"date": "2030-05-06"})));
        assert!(!state.tool_calls()[0].is_complete());

        state.complete_tool_call("c1", &Err("boom".to_string()));
        let records = state.tool_calls();
        assert!(records[0].is_complete());
        assert_eq!(records[0].error.as_deref(), Some("boom"));
    }
}
