//! Reminder thresholds and notification sinks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use voice_agent_persistence::Appointment;

/// Lead time at which a reminder is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReminderThreshold {
    #[serde(rename = "24_hours")]
    TwentyFourHours,
    #[serde(rename = "1_hour")]
    OneHour,
    #[serde(rename = "on_day")]
    OnDay,
}

impl ReminderThreshold {
    pub const ALL: [ReminderThreshold; 3] = [Self::TwentyFourHours, Self::OneHour, Self::OnDay];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwentyFourHours => "24_hours",
            Self::OneHour => "1_hour",
            Self::OnDay => "on_day",
        }
    }
}

impl fmt::Display for ReminderThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where reminders go (SMS, email, push...)
///
/// Delivery is fire-and-forget: the scheduler has already marked the
/// threshold as sent and will not retry.
#[async_trait]
pub trait ReminderNotifier: Send + Sync + 'static {
    async fn notify(&self, appointment: &Appointment, threshold: ReminderThreshold);
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl ReminderNotifier for LoggingNotifier {
    async fn notify(&self, appointment: &Appointment, threshold: ReminderThreshold) {
        tracing::info!(
            appointment_id = %appointment.id,
            caller = %appointment.caller_phone,
            threshold = %threshold,
            start = %appointment.start,
            "Reminder sent"
        );
    }
}
