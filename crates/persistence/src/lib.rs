//! Persistence layer for the appointment voice agent
//!
//! Provides storage for:
//! - Callers (identified by normalized phone number)
//! - Appointments (booked/cancelled/completed, never deleted)
//! - Call summaries (written once per terminated call)
//!
//! Two backends: a process-local [`InMemoryStore`] and a PostgREST
//! (Supabase-style) REST store.

pub mod appointments;
pub mod callers;
pub mod client;
pub mod error;
pub mod memory;
pub mod summaries;

pub use appointments::{interval_end, Appointment, AppointmentStatus, AppointmentStore};
pub use callers::{Caller, CallerStore};
pub use client::{RestAppointmentStore, RestCallSummaryStore, RestCallerStore, RestClient, RestConfig};
pub use error::PersistenceError;
pub use memory::InMemoryStore;
pub use summaries::{CallSummary, CallSummaryStore};

use std::sync::Arc;
use voice_agent_config::{PersistenceConfig, StoreBackend};

/// Initialize the persistence layer for the configured backend
pub fn init(config: &PersistenceConfig) -> Result<PersistenceLayer, PersistenceError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(PersistenceLayer::in_memory())
        },
        StoreBackend::Rest => {
            let client = RestClient::new(RestConfig::from_settings(config)?)?;
            Ok(PersistenceLayer {
                callers: Arc::new(RestCallerStore::new(client.clone())),
                appointments: Arc::new(RestAppointmentStore::new(client.clone())),
                summaries: Arc::new(RestCallSummaryStore::new(client)),
            })
        },
    }
}

/// Combined persistence layer with all stores
#[derive(Clone)]
pub struct PersistenceLayer {
    pub callers: Arc<dyn CallerStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub summaries: Arc<dyn CallSummaryStore>,
}

impl PersistenceLayer {
    /// All three stores backed by one shared in-memory store
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(InMemoryStore::new()))
    }

    /// Wrap an existing in-memory store (tests keep a handle to inspect it)
    pub fn from_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            callers: store.clone(),
            appointments: store.clone(),
            summaries: store,
        }
    }
}
