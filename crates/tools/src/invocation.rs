//! Typed tool arguments
//!
//! A model-issued [`ToolCall`] is decoded once, at the boundary, into a
//! [`ToolInvocation`]. Missing or mistyped fields surface here as
//! [`ToolError::InvalidArguments`] instead of deep inside the handlers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use uuid::Uuid;
use voice_agent_core::ToolCall;

use crate::schemas::{
    BOOK_APPOINTMENT, CANCEL_APPOINTMENT, END_CONVERSATION, FETCH_SLOTS, IDENTIFY_USER,
    MODIFY_APPOINTMENT, RETRIEVE_APPOINTMENTS,
};
use crate::ToolError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdentifyArgs {
    pub phone_number: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FetchSlotsArgs {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookArgs {
    pub date_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub duration: Option<i64>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Which appointments `retrieve_appointments` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieveScope {
    #[default]
    Upcoming,
    All,
}

impl RetrieveScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetrieveArgs {
    #[serde(rename = "type", default, deserialize_with = "lenient_scope")]
    pub scope: RetrieveScope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CancelArgs {
    pub appointment_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModifyArgs {
    pub appointment_id: Uuid,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub new_date_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub new_duration: Option<i64>,
    #[serde(default)]
    pub new_purpose: Option<String>,
    #[serde(default)]
    pub new_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct EndConversationArgs {
    #[serde(default)]
    pub reason: Option<String>,
}

/// A decoded tool request
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    IdentifyUser(IdentifyArgs),
    FetchSlots(FetchSlotsArgs),
    BookAppointment(BookArgs),
    RetrieveAppointments(RetrieveArgs),
    CancelAppointment(CancelArgs),
    ModifyAppointment(ModifyArgs),
    EndConversation(EndConversationArgs),
}

impl ToolInvocation {
    /// Decode a model tool call
    pub fn from_call(call: &ToolCall) -> Result<Self, ToolError> {
        let args = call.arguments_json();
        let invocation = match call.name.as_str() {
            IDENTIFY_USER => Self::IdentifyUser(decode(IDENTIFY_USER, args)?),
            FETCH_SLOTS => Self::FetchSlots(decode(FETCH_SLOTS, args)?),
            BOOK_APPOINTMENT => Self::BookAppointment(decode(BOOK_APPOINTMENT, args)?),
            RETRIEVE_APPOINTMENTS => {
                Self::RetrieveAppointments(decode(RETRIEVE_APPOINTMENTS, args)?)
            },
            CANCEL_APPOINTMENT => Self::CancelAppointment(decode(CANCEL_APPOINTMENT, args)?),
            MODIFY_APPOINTMENT => Self::ModifyAppointment(decode(MODIFY_APPOINTMENT, args)?),
            END_CONVERSATION => Self::EndConversation(decode(END_CONVERSATION, args)?),
            other => return Err(ToolError::UnknownTool(other.to_string())),
        };
        Ok(invocation)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IdentifyUser(_) => IDENTIFY_USER,
            Self::FetchSlots(_) => FETCH_SLOTS,
            Self::BookAppointment(_) => BOOK_APPOINTMENT,
            Self::RetrieveAppointments(_) => RETRIEVE_APPOINTMENTS,
            Self::CancelAppointment(_) => CANCEL_APPOINTMENT,
            Self::ModifyAppointment(_) => MODIFY_APPOINTMENT,
            Self::EndConversation(_) => END_CONVERSATION,
        }
    }
}

fn decode<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::invalid(tool, e.to_string()))
}

/// Largest float that still holds every integer exactly (2^53)
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Accept 30, 30.0 or "30"; null and "" mean absent
fn lenient_minutes<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT)
                    .map(|f| f as i64)
            })
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected whole minutes, got {}", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected minutes, got {:?}", s))),
        Some(other) => Err(D::Error::custom(format!("expected minutes, got {}", other))),
    }
}

/// Empty string means "not supplied"
fn optional_timestamp<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| D::Error::custom(format!("invalid RFC 3339 timestamp {:?}: {}", s, e))),
    }
}

/// Missing or empty scope defaults to upcoming
fn lenient_scope<'de, D: Deserializer<'de>>(d: D) -> Result<RetrieveScope, D::Error> {
    match Option::<String>::deserialize(d)?.as_deref().map(str::trim) {
        None | Some("") | Some("upcoming") => Ok(RetrieveScope::Upcoming),
        Some("all") => Ok(RetrieveScope::All),
        Some(other) => Err(D::Error::custom(format!(
            "type must be \"upcoming\" or \"all\", got {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall::new("call_1", name, args)
    }

    #[test]
    fn test_decode_book() {
        let inv = ToolInvocation::from_call(&call(
            BOOK_APPOINTMENT,
            json!({"date_time": "2025-03-01T14:00:00Z", "duration": 45.0, "purpose": "Checkup"}),
        ))
        .unwrap();
        match inv {
            ToolInvocation::BookAppointment(args) => {
                assert_eq!(args.date_time, Utc.with_ymd_and_hms(2025, 3, 1, 14, 0, 0).unwrap());
                assert_eq!(args.duration, Some(45));
                assert_eq!(args.purpose.as_deref(), Some("Checkup"));
                assert_eq!(args.notes, None);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field() {
        let err = ToolInvocation::from_call(&call(BOOK_APPOINTMENT, json!({"duration": 30})))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref tool, .. } if tool == BOOK_APPOINTMENT));

        let err = ToolInvocation::from_call(&call(FETCH_SLOTS, json!({"date": "tomorrow"})))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }

    #[test]
    fn test_unknown_tool() {
        let err = ToolInvocation::from_call(&call("process_payment", json!({}))).unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[test]
    fn test_modify_blank_fields_are_absent() {
        let id = Uuid::new_v4();
        let inv = ToolInvocation::from_call(&call(
            MODIFY_APPOINTMENT,
            json!({"appointment_id": id.to_string(), "new_date_time": "", "new_duration": "", "new_notes": "bring forms"}),
        ))
        .unwrap();
        let ToolInvocation::ModifyAppointment(args) = inv else {
            panic!("expected modify");
        };
        assert_eq!(args.appointment_id, id);
        assert_eq!(args.new_date_time, None);
        assert_eq!(args.new_duration, None);
        assert_eq!(args.new_notes.as_deref(), Some("bring forms"));
    }

    #[test]
    fn test_retrieve_scope_default() {
        let inv = ToolInvocation::from_call(&call(RETRIEVE_APPOINTMENTS, json!({}))).unwrap();
        assert_eq!(
            inv,
            ToolInvocation::RetrieveAppointments(RetrieveArgs {
                scope: RetrieveScope::Upcoming
            })
        );
        let inv =
            ToolInvocation::from_call(&call(RETRIEVE_APPOINTMENTS, json!({"type": "all"}))).unwrap();
        assert_eq!(inv.name(), RETRIEVE_APPOINTMENTS);
        assert!(ToolInvocation::from_call(&call(RETRIEVE_APPOINTMENTS, json!({"type": "past"}))).is_err());
    }

    #[test]
    fn test_fractional_minutes_rejected() {
        let err = ToolInvocation::from_call(&call(
            BOOK_APPOINTMENT,
            json!({"date_time": "2025-03-01T14:00:00Z", "duration": 12.5}),
        ));
        assert!(err.is_err());
    }

    #[test]
    fn test_float_minutes_must_fit() {
        let ok = ToolInvocation::from_call(&call(
            BOOK_APPOINTMENT,
            json!({"date_time": "2025-03-01T14:00:00Z", "duration": 45.0}),
        ))
        .unwrap();
        assert!(matches!(ok, ToolInvocation::BookAppointment(BookArgs { duration: Some(45), .. })));

        let huge = ToolInvocation::from_call(&call(
            BOOK_APPOINTMENT,
            json!({"date_time": "2025-03-01T14:00:00Z", "duration": 1e300}),
        ));
        assert!(huge.is_err());
    }
}
