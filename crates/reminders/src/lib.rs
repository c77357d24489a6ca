//! Appointment reminders
//!
//! A single background worker, independent of calls, that tracks upcoming
//! appointments and notifies once per appointment per lead time.

pub mod notifier;
pub mod scheduler;

pub use notifier::{LoggingNotifier, ReminderNotifier, ReminderThreshold};
pub use scheduler::{due_thresholds, ReminderRecord, ReminderScheduler};
