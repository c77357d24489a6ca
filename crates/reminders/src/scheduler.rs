//! Reminder scheduler
//!
//! Tracking state lives only in memory and is re-seeded from the store's
//! forward window at startup. Each tick re-reads every tracked appointment,
//! so cancellations and reschedules made elsewhere are picked up.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use voice_agent_config::{RemindersConfig, SchedulingConfig};
use voice_agent_persistence::{AppointmentStore, PersistenceError};

use crate::notifier::{ReminderNotifier, ReminderThreshold};

/// Per-appointment reminder state
#[derive(Debug, Clone, Serialize)]
pub struct ReminderRecord {
    pub appointment_id: Uuid,
    pub reminders_sent: BTreeMap<ReminderThreshold, bool>,
    pub next_check: DateTime<Utc>,
}

impl ReminderRecord {
    fn new(appointment_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            appointment_id,
            reminders_sent: ReminderThreshold::ALL.iter().map(|t| (*t, false)).collect(),
            next_check: now,
        }
    }

    pub fn is_sent(&self, threshold: ReminderThreshold) -> bool {
        self.reminders_sent.get(&threshold).copied().unwrap_or(false)
    }
}

/// Thresholds whose window contains `start - now`
///
/// `on_day` additionally requires the appointment to fall on a different
/// calendar day than `now` in the business timezone.
pub fn due_thresholds(
    now: DateTime<Utc>,
    start: DateTime<Utc>,
    tz: &FixedOffset,
) -> Vec<ReminderThreshold> {
    let until = start - now;
    if until <= Duration::zero() {
        return Vec::new();
    }

    let mut due = Vec::new();
    if until <= Duration::hours(24) + Duration::minutes(1) {
        due.push(ReminderThreshold::TwentyFourHours);
    }
    if until <= Duration::hours(1) + Duration::minutes(1) {
        due.push(ReminderThreshold::OneHour);
    }
    if until <= Duration::hours(24)
        && now.with_timezone(tz).date_naive() != start.with_timezone(tz).date_naive()
    {
        due.push(ReminderThreshold::OnDay);
    }
    due
}

/// Reminder scheduler
pub struct ReminderScheduler {
    appointments: Arc<dyn AppointmentStore>,
    /// Default sink for thresholds without a registered notifier
    notifier: Arc<dyn ReminderNotifier>,
    routes: RwLock<HashMap<ReminderThreshold, Arc<dyn ReminderNotifier>>>,
    records: RwLock<HashMap<Uuid, ReminderRecord>>,
    tick: std::time::Duration,
    window: Duration,
    tz: FixedOffset,
}

impl ReminderScheduler {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn ReminderNotifier>,
        config: &RemindersConfig,
        scheduling: &SchedulingConfig,
    ) -> Self {
        Self {
            appointments,
            notifier,
            routes: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
            tick: std::time::Duration::from_secs(config.tick_seconds.max(1)),
            window: Duration::days(config.window_days),
            tz: scheduling.timezone(),
        }
    }

    /// Send `threshold` reminders to `notifier` instead of the default sink
    ///
    /// Registering again for the same threshold replaces the previous one.
    pub fn register_notifier(&self, threshold: ReminderThreshold, notifier: Arc<dyn ReminderNotifier>) {
        self.routes.write().insert(threshold, notifier);
    }

    fn notifier_for(&self, threshold: ReminderThreshold) -> Arc<dyn ReminderNotifier> {
        self.routes
            .read()
            .get(&threshold)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.notifier))
    }

    /// Start tracking an appointment; already tracked ones keep their state
    pub fn track(&self, appointment_id: Uuid) {
        self.records
            .write()
            .entry(appointment_id)
            .or_insert_with(|| ReminderRecord::new(appointment_id, Utc::now()));
        metrics::gauge!("voice_agent_reminders_tracked").set(self.tracked_count() as f64);
    }

    /// Stop tracking; returns whether the appointment was tracked
    pub fn untrack(&self, appointment_id: Uuid) -> bool {
        let removed = self.records.write().remove(&appointment_id).is_some();
        if removed {
            metrics::gauge!("voice_agent_reminders_tracked").set(self.tracked_count() as f64);
        }
        removed
    }

    /// Forget fired thresholds, e.g. after a reschedule
    pub fn retrack(&self, appointment_id: Uuid) {
        self.records
            .write()
            .insert(appointment_id, ReminderRecord::new(appointment_id, Utc::now()));
    }

    pub fn status(&self, appointment_id: Uuid) -> Option<ReminderRecord> {
        self.records.read().get(&appointment_id).cloned()
    }

    pub fn tracked_count(&self) -> usize {
        self.records.read().len()
    }

    /// Seed tracking from booked appointments starting within the window
    pub async fn load_pending(&self, now: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let upcoming = self
            .appointments
            .list_booked_in_window(now, now + self.window)
            .await?;
        for apt in &upcoming {
            self.track(apt.id);
        }
        tracing::info!(count = upcoming.len(), "Loaded pending appointments for reminders");
        Ok(upcoming.len())
    }

    /// One scan over every tracked appointment
    ///
    /// Returns the reminders that fired during this scan.
    pub async fn check_at(&self, now: DateTime<Utc>) -> Vec<(Uuid, ReminderThreshold)> {
        let ids: Vec<Uuid> = self.records.read().keys().copied().collect();
        let mut fired = Vec::new();

        for id in ids {
            let appointment = match self.appointments.get(id).await {
                Ok(Some(apt)) => apt,
                Ok(None) => {
                    self.untrack(id);
                    continue;
                },
                Err(e) => {
                    tracing::warn!(appointment_id = %id, error = %e, "Failed to fetch appointment for reminders");
                    continue;
                },
            };

            if !appointment.is_booked() || appointment.start <= now {
                self.untrack(id);
                continue;
            }

            for threshold in due_thresholds(now, appointment.start, &self.tz) {
                if !self.mark_sent(id, threshold) {
                    continue;
                }
                tracing::debug!(appointment_id = %id, threshold = threshold.as_str(), "Reminder due");
                self.notifier_for(threshold).notify(&appointment, threshold).await;
                metrics::counter!("voice_agent_reminders_sent_total", "threshold" => threshold.as_str())
                    .increment(1);
                fired.push((id, threshold));
            }

            if let Some(record) = self.records.write().get_mut(&id) {
                record.next_check = now + Duration::from_std(self.tick).unwrap_or(Duration::minutes(1));
            }
        }

        fired
    }

    /// Flip a threshold to sent; `false` if it already was, or the
    /// appointment stopped being tracked meanwhile
    fn mark_sent(&self, id: Uuid, threshold: ReminderThreshold) -> bool {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(&id) else {
            return false;
        };
        let sent = record.reminders_sent.entry(threshold).or_insert(false);
        if *sent {
            return false;
        }
        *sent = true;
        true
    }

    /// Spawn the periodic worker
    ///
    /// Send `true` on the returned channel to stop it.
    pub fn start(self: &Arc<Self>) -> (watch::Sender<bool>, JoinHandle<()>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(scheduler.tick);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately
            interval_timer.tick().await;

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let fired = scheduler.check_at(Utc::now()).await;
                        if !fired.is_empty() {
                            tracing::debug!(fired = fired.len(), tracked = scheduler.tracked_count(), "Reminder tick");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Reminder scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        });

        (shutdown_tx, handle)
    }
}
