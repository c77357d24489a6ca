//! HTTP Endpoints
//!
//! Read-only REST API over appointments, slots, summaries and reminders,
//! plus the WebSocket upgrade for live calls.

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use voice_agent_tools::utils::{format_clock, format_rfc3339, normalize_phone};

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::ws_handler;
use crate::ServerError;

const FALLBACK_ORIGIN: &str = "http://localhost:3000";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.settings.server.cors_origins,
        state.settings.server.cors_enabled,
    );

    Router::new()
        .route("/", get(root))
        .route("/api/docs", get(api_docs))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/appointments", get(list_appointments))
        .route("/api/slots", get(list_slots))
        .route("/api/summaries", get(list_summaries))
        .route("/api/reminders/:appointment_id", get(reminder_status))
        .route("/api/stats", get(stats))
        .route("/ws", get(ws_handler))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Trace span carrying the id assigned by `SetRequestIdLayer`
fn request_span(request: &Request) -> tracing::Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

/// Build CORS layer from configured origins
///
/// - disabled: permissive
/// - enabled without (valid) origins: `http://localhost:3000` only
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    let allowed = if parsed_origins.is_empty() {
        if !origins.is_empty() {
            tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        } else {
            tracing::info!("No CORS origins configured, defaulting to localhost:3000");
        }
        vec![HeaderValue::from_static(FALLBACK_ORIGIN)]
    } else {
        tracing::info!("CORS configured with {} origins", parsed_origins.len());
        parsed_origins
    };

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Voice Agent API",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/api/docs",
    }))
}

async fn api_docs() -> impl IntoResponse {
    Json(json!({
        "endpoints": [
            {"method": "GET", "path": "/health", "description": "Liveness, uptime and active sessions"},
            {"method": "GET", "path": "/metrics", "description": "Prometheus metrics"},
            {"method": "GET", "path": "/api/appointments", "description": "Booked appointments for a caller", "query": ["phone"]},
            {"method": "GET", "path": "/api/slots", "description": "Slot availability for a date", "query": ["date"]},
            {"method": "GET", "path": "/api/summaries", "description": "Call summaries for a caller", "query": ["phone"]},
            {"method": "GET", "path": "/api/reminders/:appointment_id", "description": "Reminder status for an appointment"},
            {"method": "GET", "path": "/api/stats", "description": "Connection and reminder counts"},
            {"method": "GET", "path": "/ws", "description": "WebSocket upgrade for a live call"},
        ],
        "websocket": {
            "endpoint": "/ws?room=<name>",
            "binary": "PCM16 audio in both directions",
            "incoming": [
                {"type": "text_input", "payload": "Typed caller input"},
                {"type": "audio", "payload": "Base64 PCM16 audio chunk"},
                {"type": "end_call", "payload": null},
                {"type": "get_session", "payload": null},
                {"type": "ping", "payload": null},
            ],
            "outgoing": [
                "connected",
                "transcript",
                "agent_response",
                "tool_call",
                "tool_result",
                "call_summary",
                "call_end",
                "session",
                "error",
                "pong",
            ],
        },
    }))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "active_sessions": state.sessions.count(),
    }))
}

#[derive(Debug, Deserialize)]
struct PhoneQuery {
    phone: Option<String>,
}

impl PhoneQuery {
    fn normalized(&self) -> Result<String, ServerError> {
        let phone = self.phone.as_deref().map(normalize_phone).unwrap_or_default();
        if phone.trim_start_matches('+').is_empty() {
            return Err(ServerError::InvalidRequest(
                "phone parameter is required".to_string(),
            ));
        }
        Ok(phone)
    }
}

async fn list_appointments(
    State(state): State<AppState>,
    Query(query): Query<PhoneQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let phone = query.normalized()?;
    let appointments = state
        .persistence()
        .appointments
        .list_for_caller(&phone)
        .await?;

    Ok(Json(json!({
        "count": appointments.len(),
        "appointments": appointments,
    })))
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

async fn list_slots(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let raw = query.date.as_deref().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ServerError::InvalidRequest(
            "date parameter is required (format: YYYY-MM-DD)".to_string(),
        ));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ServerError::InvalidRequest("Invalid date format. Use YYYY-MM-DD".to_string())
    })?;

    let scheduling = &state.settings.scheduling;
    let tz = scheduling.timezone();
    let slots = state
        .tools
        .availability()
        .slots_for_date(date, scheduling, Utc::now())
        .await?;

    let slots: Vec<_> = slots
        .iter()
        .map(|slot| {
            json!({
                "date_time": format_rfc3339(slot.start, &tz),
                "time": format_clock(slot.start, &tz),
                "available": slot.available,
                "duration": slot.duration_minutes,
            })
        })
        .collect();

    Ok(Json(json!({ "date": raw, "slots": slots })))
}

async fn list_summaries(
    State(state): State<AppState>,
    Query(query): Query<PhoneQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let phone = query.normalized()?;
    let summaries = state.persistence().summaries.list_for_caller(&phone).await?;

    Ok(Json(json!({
        "count": summaries.len(),
        "summaries": summaries,
    })))
}

async fn reminder_status(
    State(state): State<AppState>,
    Path(appointment_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let id = Uuid::parse_str(appointment_id.trim())
        .map_err(|_| ServerError::InvalidRequest("Invalid appointment id".to_string()))?;
    let reminders = state
        .reminders()
        .ok_or_else(|| ServerError::NotFound("Reminders are disabled".to_string()))?;

    let record = reminders
        .status(id)
        .ok_or_else(|| ServerError::NotFound(format!("No reminders tracked for {}", id)))?;
    Ok(Json(record))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "active_connections": state.sessions.count(),
        "tracked_reminders": state.reminders().map(|r| r.tracked_count()).unwrap_or(0),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
