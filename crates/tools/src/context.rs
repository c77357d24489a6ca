//! Session-scoped state the tools read and write
//!
//! Tool handlers never own session state. They see it through [`ToolContext`],
//! which the session implements on top of its own lock.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// The caller bound to a session by `identify_user`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerIdentity {
    pub phone: String,
    pub name: String,
}

/// One entry of the tool-call audit trail
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ToolCallRecord {
    pub fn started(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self, result: &Result<Value, String>) {
        match result {
            Ok(value) => self.result = Some(value.clone()),
            Err(err) => self.error = Some(err.clone()),
        }
        self.completed_at = Some(Utc::now());
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Access to the calling session
///
/// Methods are synchronous; implementations must not block on I/O.
pub trait ToolContext: Send + Sync {
    fn caller(&self) -> Option<CallerIdentity>;

    fn bind_caller(&self, caller: CallerIdentity);

    fn begin_tool_call(&self, record: ToolCallRecord);

    fn complete_tool_call(&self, id: &str, result: &Result<Value, String>);
}

/// Standalone context, used outside voice sessions and in tests
#[derive(Default)]
pub struct SimpleToolContext {
    caller: Mutex<Option<CallerIdentity>>,
    records: Mutex<Vec<ToolCallRecord>>,
}

impl SimpleToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caller(phone: &str, name: &str) -> Self {
        let ctx = Self::new();
        ctx.bind_caller(CallerIdentity {
            phone: phone.to_string(),
            name: name.to_string(),
        });
        ctx
    }

    pub fn records(&self) -> Vec<ToolCallRecord> {
        self.records.lock().clone()
    }
}

impl ToolContext for SimpleToolContext {
    fn caller(&self) -> Option<CallerIdentity> {
        self.caller.lock().clone()
    }

    fn bind_caller(&self, caller: CallerIdentity) {
        *self.caller.lock() = Some(caller);
    }

    fn begin_tool_call(&self, record: ToolCallRecord) {
        self.records.lock().push(record);
    }

    fn complete_tool_call(&self, id: &str, result: &Result<Value, String>) {
        if let Some(record) = self.records.lock().iter_mut().rev().find(|r| r.id == id) {
            record.complete(result);
        }
    }
}
