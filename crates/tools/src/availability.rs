//! Availability checking and slot generation
//!
//! Overlap uses half-open intervals: an appointment occupies
//! `[start, start + duration)`, so back-to-back bookings do not conflict.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use uuid::Uuid;
use voice_agent_config::SchedulingConfig;
use voice_agent_persistence::{interval_end, Appointment, AppointmentStore, PersistenceError};

/// A bookable interval on a given day
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub available: bool,
}

/// Decides whether an interval is free of booked appointments
#[derive(Clone)]
pub struct AvailabilityChecker {
    appointments: Arc<dyn AppointmentStore>,
}

impl AvailabilityChecker {
    pub fn new(appointments: Arc<dyn AppointmentStore>) -> Self {
        Self { appointments }
    }

    /// `true` when no booked appointment overlaps `[start, start + duration)`
    ///
    /// Store failures are returned as errors, never as "unavailable".
    pub async fn is_available(
        &self,
        start: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<bool, PersistenceError> {
        self.is_available_excluding(start, duration_minutes, None).await
    }

    /// Same as [`Self::is_available`] but ignores one appointment, so a
    /// reschedule never conflicts with its own current slot
    pub async fn is_available_excluding(
        &self,
        start: DateTime<Utc>,
        duration_minutes: i64,
        exclude: Option<Uuid>,
    ) -> Result<bool, PersistenceError> {
        // An interval that cannot be represented is never bookable
        let Some(end) = interval_end(start, duration_minutes) else {
            return Ok(false);
        };
        let candidates = self.appointments.list_booked_starting_before(end).await?;
        Ok(interval_is_free(&candidates, start, end, exclude))
    }

    /// All slots of `date` in business hours that have not started by `now`
    ///
    /// Booked appointments for the day are fetched once and every slot is
    /// checked against that snapshot.
    pub async fn slots_for_date(
        &self,
        date: NaiveDate,
        scheduling: &SchedulingConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, PersistenceError> {
        let starts = slot_starts(date, scheduling);
        let slot_minutes = scheduling.slot_minutes as i64;
        let Some(last) = starts.last() else {
            return Ok(Vec::new());
        };
        let day_end = *last + Duration::minutes(slot_minutes);
        let candidates = self.appointments.list_booked_starting_before(day_end).await?;

        Ok(starts
            .into_iter()
            .filter(|start| *start >= now)
            .map(|start| Slot {
                start,
                duration_minutes: slot_minutes,
                available: interval_is_free(
                    &candidates,
                    start,
                    start + Duration::minutes(slot_minutes),
                    None,
                ),
            })
            .collect())
    }
}

fn interval_is_free(
    candidates: &[Appointment],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<Uuid>,
) -> bool {
    !candidates
        .iter()
        .filter(|a| a.is_booked() && Some(a.id) != exclude)
        .any(|a| a.overlaps(start, end))
}

/// Slot start instants for one local business day
pub fn slot_starts(date: NaiveDate, scheduling: &SchedulingConfig) -> Vec<DateTime<Utc>> {
    let tz = scheduling.timezone();
    let step = scheduling.slot_minutes.max(1);
    let mut starts = Vec::new();

    for hour in scheduling.open_hour..scheduling.close_hour {
        let mut minute = 0;
        while minute < 60 {
            if let Some(local) = NaiveTime::from_hms_opt(hour, minute, 0)
                .map(|t| date.and_time(t))
                .and_then(|naive| naive.and_local_timezone(tz).single())
            {
                starts.push(local.with_timezone(&Utc));
            }
            minute += step;
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use voice_agent_persistence::{AppointmentStatus, InMemoryStore};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    async fn checker_with(apts: Vec<Appointment>) -> AvailabilityChecker {
        let store = Arc::new(InMemoryStore::new());
        for apt in &apts {
            AppointmentStore::create(store.as_ref(), apt).await.unwrap();
        }
        AvailabilityChecker::new(store)
    }

    #[tokio::test]
    async fn test_overlap_scenario() {
        let booked = Appointment::new("+1", "A", utc("2025-03-01T14:00:00Z"), 30, "", "");
        let checker = checker_with(vec![booked]).await;

        assert!(!checker.is_available(utc("2025-03-01T14:15:00Z"), 30).await.unwrap());
        assert!(checker.is_available(utc("2025-03-01T14:30:00Z"), 30).await.unwrap());
        assert!(checker.is_available(utc("2025-03-01T13:30:00Z"), 30).await.unwrap());
        assert!(!checker.is_available(utc("2025-03-01T13:00:00Z"), 120).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_does_not_block() {
        let mut apt = Appointment::new("+1", "A", utc("2025-03-01T14:00:00Z"), 30, "", "");
        apt.status = AppointmentStatus::Cancelled;
        let checker = checker_with(vec![apt]).await;
        assert!(checker.is_available(utc("2025-03-01T14:00:00Z"), 30).await.unwrap());
    }

    #[tokio::test]
    async fn test_excluding_self() {
        let apt = Appointment::new("+1", "A", utc("2025-03-01T14:00:00Z"), 30, "", "");
        let id = apt.id;
        let checker = checker_with(vec![apt]).await;
        assert!(!checker.is_available(utc("2025-03-01T14:00:00Z"), 60).await.unwrap());
        assert!(checker
            .is_available_excluding(utc("2025-03-01T14:00:00Z"), 60, Some(id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unrepresentable_interval_is_unavailable() {
        let checker = checker_with(Vec::new()).await;
        assert!(!checker
            .is_available(utc("2030-05-06T10:00:00Z"), 1_000_000_000_000_000)
            .await
            .unwrap());
    }

    #[test]
    fn test_slot_starts() {
        let date = NaiveDate::from_ymd_opt(2030, 5, 6).unwrap();
        let sched = SchedulingConfig::default();
        let starts = slot_starts(date, &sched);
        assert_eq!(starts.len(), 16);
        assert_eq!(starts[0], Utc.with_ymd_and_hms(2030, 5, 6, 9, 0, 0).unwrap());
        assert_eq!(starts[15], Utc.with_ymd_and_hms(2030, 5, 6, 16, 30, 0).unwrap());

        let shifted = SchedulingConfig {
            utc_offset_minutes: 120,
            ..SchedulingConfig::default()
        };
        assert_eq!(
            slot_starts(date, &shifted)[0],
            Utc.with_ymd_and_hms(2030, 5, 6, 7, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_slots_for_date() {
        let booked = Appointment::new("+1", "A", utc("2030-05-06T10:00:00Z"), 60, "", "");
        let checker = checker_with(vec![booked]).await;
        let date = NaiveDate::from_ymd_opt(2030, 5, 6).unwrap();

        let slots = checker
            .slots_for_date(date, &SchedulingConfig::default(), utc("2030-05-06T09:10:00Z"))
            .await
            .unwrap();
        // 9:00 has started and is skipped
        assert_eq!(slots.len(), 15);
        assert_eq!(slots[0].start, utc("2030-05-06T09:30:00Z"));
        let unavailable: Vec<_> = slots.iter().filter(|s| !s.available).map(|s| s.start).collect();
        assert_eq!(
            unavailable,
            vec![utc("2030-05-06T10:00:00Z"), utc("2030-05-06T10:30:00Z")]
        );
    }
}
