//! PostgREST client and store implementations
//!
//! Talks to a Supabase-style REST endpoint at `{url}/rest/v1/{table}` with
//! `apikey` + bearer authentication and `Prefer: return=representation`.

use crate::{
    Appointment, AppointmentStore, CallSummary, CallSummaryStore, Caller, CallerStore,
    PersistenceError,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;
use voice_agent_config::PersistenceConfig;

/// REST store configuration
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl RestConfig {
    pub fn from_settings(config: &PersistenceConfig) -> Result<Self, PersistenceError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| PersistenceError::Connection("persistence.api_key is not set".into()))?;
        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }
}

/// PostgREST client wrapper
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    config: RestConfig,
}

impl RestClient {
    pub fn new(config: RestConfig) -> Result<Self, PersistenceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(Self::build_headers(&config.api_key)?)
            .build()?;

        tracing::info!(url = %config.url, "REST store client initialized");

        Ok(Self { client, config })
    }

    fn build_headers(api_key: &str) -> Result<HeaderMap, PersistenceError> {
        let invalid = |e: reqwest::header::InvalidHeaderValue| {
            PersistenceError::Connection(format!("invalid api key header: {}", e))
        };
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(api_key).map_err(invalid)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(invalid)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        Ok(headers)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client.request(method, self.table_url(table))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Vec<T>, PersistenceError> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(PersistenceError::Http {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, PersistenceError> {
        self.send(self.request(Method::GET, table).query(query)).await
    }

    async fn insert<T: Serialize + DeserializeOwned>(
        &self,
        table: &str,
        row: &T,
    ) -> Result<T, PersistenceError> {
        let rows: Vec<T> = self.send(self.request(Method::POST, table).json(row)).await?;
        first_row(rows, table)
    }

    async fn patch<T: Serialize + DeserializeOwned>(
        &self,
        table: &str,
        id: Uuid,
        row: &T,
    ) -> Result<T, PersistenceError> {
        let req = self
            .request(Method::PATCH, table)
            .query(&[("id", format!("eq.{}", id))])
            .json(row);
        let rows: Vec<T> = self.send(req).await?;
        first_row(rows, table)
    }
}

fn first_row<T>(rows: Vec<T>, table: &str) -> Result<T, PersistenceError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| PersistenceError::NotFound(format!("{}: no row returned", table)))
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Callers in the `users` table
#[derive(Clone)]
pub struct RestCallerStore {
    client: RestClient,
}

impl RestCallerStore {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CallerStore for RestCallerStore {
    async fn get_by_phone(&self, phone: &str) -> Result<Option<Caller>, PersistenceError> {
        let rows: Vec<Caller> = self
            .client
            .select("users", &[("phone_number", eq(phone))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create(&self, caller: &Caller) -> Result<Caller, PersistenceError> {
        let created = self.client.insert("users", caller).await?;
        tracing::info!(caller_id = %created.id, "Caller created");
        Ok(created)
    }

    async fn update(&self, caller: &Caller) -> Result<Caller, PersistenceError> {
        let row = Caller {
            updated_at: Utc::now(),
            ..caller.clone()
        };
        self.client.patch("users", caller.id, &row).await
    }
}

/// Appointments in the `appointments` table
#[derive(Clone)]
pub struct RestAppointmentStore {
    client: RestClient,
}

impl RestAppointmentStore {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AppointmentStore for RestAppointmentStore {
    async fn create(&self, appointment: &Appointment) -> Result<Appointment, PersistenceError> {
        let created = self.client.insert("appointments", appointment).await?;
        tracing::info!(
            appointment_id = %created.id,
            start = %created.start,
            "Appointment created"
        );
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, PersistenceError> {
        let rows: Vec<Appointment> = self
            .client
            .select("appointments", &[("id", eq(id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update(&self, appointment: &Appointment) -> Result<Appointment, PersistenceError> {
        let row = Appointment {
            updated_at: Utc::now(),
            ..appointment.clone()
        };
        self.client.patch("appointments", appointment.id, &row).await
    }

    async fn list_for_caller(&self, phone: &str) -> Result<Vec<Appointment>, PersistenceError> {
        self.client
            .select(
                "appointments",
                &[("user_phone", eq(phone)), ("order", "date_time.desc".into())],
            )
            .await
    }

    async fn list_booked_starting_before(
        &self,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, PersistenceError> {
        self.client
            .select(
                "appointments",
                &[
                    ("status", eq("booked")),
                    ("date_time", format!("lt.{}", timestamp(end))),
                    ("order", "date_time.desc".into()),
                ],
            )
            .await
    }

    async fn list_booked_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, PersistenceError> {
        self.client
            .select(
                "appointments",
                &[
                    ("status", eq("booked")),
                    ("date_time", format!("gte.{}", timestamp(from))),
                    ("date_time", format!("lte.{}", timestamp(to))),
                    ("order", "date_time.asc".into()),
                ],
            )
            .await
    }
}

/// Summaries in the `call_summaries` table
#[derive(Clone)]
pub struct RestCallSummaryStore {
    client: RestClient,
}

impl RestCallSummaryStore {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CallSummaryStore for RestCallSummaryStore {
    async fn save(&self, summary: &CallSummary) -> Result<CallSummary, PersistenceError> {
        self.client.insert("call_summaries", summary).await
    }

    async fn list_for_caller(&self, phone: &str) -> Result<Vec<CallSummary>, PersistenceError> {
        self.client
            .select(
                "call_summaries",
                &[("user_phone", eq(phone)), ("order", "created_at.desc".into())],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RestClient {
        RestClient::new(RestConfig {
            url: "https://db.example.com".to_string(),
            api_key: "anon-key".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_table_url() {
        assert_eq!(
            client().table_url("appointments"),
            "https://db.example.com/rest/v1/appointments"
        );
    }

    #[test]
    fn test_headers() {
        let headers = RestClient::build_headers("anon-key").unwrap();
        assert_eq!(headers["apikey"], "anon-key");
        assert_eq!(headers[AUTHORIZATION], "Bearer anon-key");
        assert_eq!(headers["Prefer"], "return=representation");
        assert!(RestClient::build_headers("bad\nkey").is_err());
    }

    #[test]
    fn test_config_requires_key() {
        let mut settings = PersistenceConfig {
            url: "https://db.example.com/".to_string(),
            ..Default::default()
        };
        assert!(RestConfig::from_settings(&settings).is_err());
        settings.api_key = Some("k".to_string());
        let config = RestConfig::from_settings(&settings).unwrap();
        assert_eq!(config.url, "https://db.example.com");
    }

    #[test]
    fn test_timestamp_format() {
        use chrono::TimeZone;
        let t = Utc.with_ymd_and_hms(2030, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(timestamp(t), "2030-01-02T15:04:05Z");
    }
}
