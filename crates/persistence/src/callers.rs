//! Caller records, keyed by normalized phone number

use crate::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An identified caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caller {
    pub id: Uuid,
    pub phone_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Caller {
    pub fn new(phone_number: &str, name: &str, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone_number: phone_number.to_string(),
            name: name.to_string(),
            email,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// Caller store trait
#[async_trait]
pub trait CallerStore: Send + Sync {
    /// Lookup by normalized phone; `None` when no caller is registered
    async fn get_by_phone(&self, phone: &str) -> Result<Option<Caller>, PersistenceError>;

    async fn create(&self, caller: &Caller) -> Result<Caller, PersistenceError>;

    async fn update(&self, caller: &Caller) -> Result<Caller, PersistenceError>;
}
