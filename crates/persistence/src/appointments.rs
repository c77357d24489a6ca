//! Appointment records
//!
//! Appointments are never deleted; cancellation is a status change. Field
//! names on the wire follow the `appointments` table columns.

use crate::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Appointment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booked => "booked",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booked" => Ok(Self::Booked),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            other => Err(PersistenceError::InvalidData(format!(
                "unknown appointment status: {}",
                other
            ))),
        }
    }
}

/// Appointment data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    #[serde(rename = "user_phone")]
    pub caller_phone: String,
    #[serde(rename = "user_name", default)]
    pub caller_name: String,
    #[serde(rename = "date_time")]
    pub start: DateTime<Utc>,
    #[serde(rename = "duration")]
    pub duration_minutes: i64,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub notes: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// New booked appointment
    pub fn new(
        caller_phone: &str,
        caller_name: &str,
        start: DateTime<Utc>,
        duration_minutes: i64,
        purpose: &str,
        notes: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            caller_phone: caller_phone.to_string(),
            caller_name: caller_name.to_string(),
            start,
            duration_minutes,
            purpose: purpose.to_string(),
            notes: notes.to_string(),
            status: AppointmentStatus::Booked,
            created_at: now,
            updated_at: now,
        }
    }

    /// Exclusive end of the appointment interval
    ///
    /// Saturates at the latest representable instant for out-of-range
    /// durations.
    pub fn end(&self) -> DateTime<Utc> {
        interval_end(self.start, self.duration_minutes).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_booked(&self) -> bool {
        self.status == AppointmentStatus::Booked
    }

    /// Half-open interval overlap: `[start, end)` against `[other_start, other_end)`
    pub fn overlaps(&self, other_start: DateTime<Utc>, other_end: DateTime<Utc>) -> bool {
        self.start < other_end && self.end() > other_start
    }

    /// Booked and starting after `now`
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.is_booked() && self.start > now
    }
}

/// `start + minutes`, or `None` when the result is not representable
pub fn interval_end(start: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    Duration::try_minutes(minutes).and_then(|d| start.checked_add_signed(d))
}

/// Appointment store trait
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn create(&self, appointment: &Appointment) -> Result<Appointment, PersistenceError>;

    /// `None` when the id is unknown
    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, PersistenceError>;

    async fn update(&self, appointment: &Appointment) -> Result<Appointment, PersistenceError>;

    /// Full history for one caller, newest first
    async fn list_for_caller(&self, phone: &str) -> Result<Vec<Appointment>, PersistenceError>;

    /// Booked appointments whose start is strictly before `end`
    async fn list_booked_starting_before(
        &self,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, PersistenceError>;

    /// Booked appointments starting within `[from, to]`, oldest first
    async fn list_booked_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, PersistenceError>;

    /// Caller's booked appointments that have not started yet
    async fn list_upcoming_for_caller(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, PersistenceError> {
        let all = self.list_for_caller(phone).await?;
        Ok(all.into_iter().filter(|a| a.is_upcoming(now)).collect())
    }
}
