//! Process-local store used for development and tests

use crate::{
    Appointment, AppointmentStore, CallSummary, CallSummaryStore, Caller, CallerStore,
    PersistenceError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    callers: HashMap<String, Caller>,
    appointments: HashMap<Uuid, Appointment>,
    summaries: Vec<CallSummary>,
}

/// In-memory implementation of every store trait
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn appointment_count(&self) -> usize {
        self.tables.read().appointments.len()
    }

    pub fn summary_count(&self) -> usize {
        self.tables.read().summaries.len()
    }
}

#[async_trait]
impl CallerStore for InMemoryStore {
    async fn get_by_phone(&self, phone: &str) -> Result<Option<Caller>, PersistenceError> {
        Ok(self.tables.read().callers.get(phone).cloned())
    }

    async fn create(&self, caller: &Caller) -> Result<Caller, PersistenceError> {
        let mut tables = self.tables.write();
        if tables.callers.contains_key(&caller.phone_number) {
            return Err(PersistenceError::InvalidData(format!(
                "caller {} already exists",
                caller.phone_number
            )));
        }
        tables
            .callers
            .insert(caller.phone_number.clone(), caller.clone());
        Ok(caller.clone())
    }

    async fn update(&self, caller: &Caller) -> Result<Caller, PersistenceError> {
        let mut tables = self.tables.write();
        let existing = tables
            .callers
            .get_mut(&caller.phone_number)
            .ok_or_else(|| PersistenceError::NotFound(caller.phone_number.clone()))?;
        *existing = Caller {
            updated_at: Utc::now(),
            ..caller.clone()
        };
        Ok(existing.clone())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn create(&self, appointment: &Appointment) -> Result<Appointment, PersistenceError> {
        self.tables
            .write()
            .appointments
            .insert(appointment.id, appointment.clone());
        tracing::debug!(appointment_id = %appointment.id, "Appointment stored in memory");
        Ok(appointment.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, PersistenceError> {
        Ok(self.tables.read().appointments.get(&id).cloned())
    }

    async fn update(&self, appointment: &Appointment) -> Result<Appointment, PersistenceError> {
        let mut tables = self.tables.write();
        let existing = tables
            .appointments
            .get_mut(&appointment.id)
            .ok_or_else(|| PersistenceError::NotFound(appointment.id.to_string()))?;
        *existing = Appointment {
            updated_at: Utc::now(),
            ..appointment.clone()
        };
        Ok(existing.clone())
    }

    async fn list_for_caller(&self, phone: &str) -> Result<Vec<Appointment>, PersistenceError> {
        let mut list: Vec<Appointment> = self
            .tables
            .read()
            .appointments
            .values()
            .filter(|a| a.caller_phone == phone)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.start.cmp(&a.start));
        Ok(list)
    }

    async fn list_booked_starting_before(
        &self,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, PersistenceError> {
        let mut list: Vec<Appointment> = self
            .tables
            .read()
            .appointments
            .values()
            .filter(|a| a.is_booked() && a.start < end)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.start.cmp(&a.start));
        Ok(list)
    }

    async fn list_booked_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, PersistenceError> {
        let mut list: Vec<Appointment> = self
            .tables
            .read()
            .appointments
            .values()
            .filter(|a| a.is_booked() && a.start >= from && a.start <= to)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(list)
    }
}

#[async_trait]
impl CallSummaryStore for InMemoryStore {
    async fn save(&self, summary: &CallSummary) -> Result<CallSummary, PersistenceError> {
        self.tables.write().summaries.push(summary.clone());
        Ok(summary.clone())
    }

    async fn list_for_caller(&self, phone: &str) -> Result<Vec<CallSummary>, PersistenceError> {
        let mut list: Vec<CallSummary> = self
            .tables
            .read()
            .summaries
            .iter()
            .filter(|s| s.caller_phone.as_deref() == Some(phone))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }
}
