//! Post-call summaries

use crate::{Appointment, PersistenceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voice_agent_core::CostBreakdown;

/// Summary persisted when a call terminates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub id: Uuid,
    pub session_id: String,
    #[serde(rename = "user_phone", default, skip_serializing_if = "Option::is_none")]
    pub caller_phone: Option<String>,
    pub summary: String,
    /// Caller's upcoming appointments at the end of the call
    #[serde(rename = "appointments_booked", default)]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub user_preferences: Vec<String>,
    #[serde(default)]
    pub key_topics: Vec<String>,
    pub duration_seconds: i64,
    #[serde(rename = "cost_breakdown", default)]
    pub cost: CostBreakdown,
    pub created_at: DateTime<Utc>,
}

/// Call summary store trait
#[async_trait]
pub trait CallSummaryStore: Send + Sync {
    async fn save(&self, summary: &CallSummary) -> Result<CallSummary, PersistenceError>;

    /// Summaries for one caller, newest first
    async fn list_for_caller(&self, phone: &str) -> Result<Vec<CallSummary>, PersistenceError>;
}
