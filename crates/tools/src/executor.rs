//! Tool executor
//!
//! Maps decoded tool invocations onto the appointment stores. One executor is
//! shared by every session; per-call state (caller identity, audit trail)
//! lives behind the [`ToolContext`] passed into each call.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Instant;
use uuid::Uuid;

use voice_agent_config::SchedulingConfig;
use voice_agent_core::{ToolCall, ToolDefinition};
use voice_agent_persistence::{Appointment, AppointmentStatus, Caller, PersistenceLayer};

use crate::availability::AvailabilityChecker;
use crate::context::{CallerIdentity, ToolCallRecord, ToolContext};
use crate::invocation::{
    BookArgs, CancelArgs, EndConversationArgs, FetchSlotsArgs, IdentifyArgs, ModifyArgs,
    RetrieveArgs, RetrieveScope, ToolInvocation,
};
use crate::outcome::{ToolEffect, ToolOutcome};
use crate::schemas::tool_definitions;
use crate::utils::{
    clean_optional, format_clock, format_display, format_rfc3339, normalize_email,
    normalize_phone,
};
use crate::ToolError;

const NOT_IDENTIFIED: &str =
    "User not identified. Please identify the user first by asking for their phone number.";
const NOT_IDENTIFIED_SHORT: &str = "User not identified. Please identify the user first.";
const INVALID_DURATION: &str = "Invalid duration: must be between 1 and 1440 minutes";

/// Longest appointment the tools will book or reschedule to
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;

fn valid_duration(minutes: i64) -> bool {
    (1..=MAX_DURATION_MINUTES).contains(&minutes)
}

/// Tool executor trait
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one model tool call on behalf of the session behind `ctx`
    ///
    /// The call is recorded in the context's audit trail before it runs and
    /// completed afterwards, whatever the outcome.
    async fn execute(&self, ctx: &dyn ToolContext, call: &ToolCall)
        -> Result<ToolOutcome, ToolError>;

    /// Tool catalog offered to the model
    fn definitions(&self) -> Vec<ToolDefinition>;
}

/// The appointment tool set
#[derive(Clone)]
pub struct AppointmentTools {
    persistence: PersistenceLayer,
    availability: AvailabilityChecker,
    scheduling: SchedulingConfig,
}

impl AppointmentTools {
    pub fn new(persistence: PersistenceLayer, scheduling: SchedulingConfig) -> Self {
        let availability = AvailabilityChecker::new(persistence.appointments.clone());
        Self {
            persistence,
            availability,
            scheduling,
        }
    }

    pub fn availability(&self) -> &AvailabilityChecker {
        &self.availability
    }

    /// Run an already decoded invocation (no audit recording)
    pub async fn run(
        &self,
        ctx: &dyn ToolContext,
        invocation: ToolInvocation,
    ) -> Result<ToolOutcome, ToolError> {
        match invocation {
            ToolInvocation::IdentifyUser(args) => self.identify_user(ctx, args).await,
            ToolInvocation::FetchSlots(args) => self.fetch_slots(args).await,
            ToolInvocation::BookAppointment(args) => self.book_appointment(ctx, args).await,
            ToolInvocation::RetrieveAppointments(args) => {
                self.retrieve_appointments(ctx, args).await
            },
            ToolInvocation::CancelAppointment(args) => self.cancel_appointment(ctx, args).await,
            ToolInvocation::ModifyAppointment(args) => self.modify_appointment(ctx, args).await,
            ToolInvocation::EndConversation(args) => Ok(self.end_conversation(args)),
        }
    }

    fn display(&self, t: chrono::DateTime<Utc>) -> String {
        format_display(t, &self.scheduling.timezone())
    }

    async fn identify_user(
        &self,
        ctx: &dyn ToolContext,
        args: IdentifyArgs,
    ) -> Result<ToolOutcome, ToolError> {
        let phone = normalize_phone(&args.phone_number);
        if phone.trim_start_matches('+').is_empty() {
            return Ok(ToolOutcome::failure(
                "A valid phone number is required to identify the user.",
            ));
        }

        let name = clean_optional(args.name.as_deref());
        let email = match clean_optional(args.email.as_deref()) {
            None => None,
            Some(raw) => match normalize_email(&raw) {
                Ok(email) => Some(email),
                Err(reason) => {
                    return Ok(ToolOutcome::failure_with(json!({
                        "success": false,
                        "invalid_field": "email",
                        "error": format!("Invalid email address: {}. Please ask the user to repeat it.", reason),
                    })));
                },
            },
        };

        let existing = self.persistence.callers.get_by_phone(&phone).await?;

        let (caller, is_new_user, name_backfilled, email_backfilled) = match existing {
            None => {
                let Some(name) = name else {
                    return Ok(ToolOutcome::failure_with(json!({
                        "success": false,
                        "name_required": true,
                        "is_new_user": true,
                        "phone_number": phone,
                        "error": "New caller. Name is required for new registration.",
                        "message": "This phone number is not registered yet. Please ask for the user's full name to complete registration.",
                    })));
                };
                let caller = Caller::new(&phone, &name, email);
                let created = self.persistence.callers.create(&caller).await?;
                tracing::info!(caller_id = %created.id, "Registered new caller");
                (created, true, false, false)
            },
            Some(mut caller) => {
                let mut name_backfilled = false;
                let mut email_backfilled = false;
                if let Some(name) = name.filter(|_| !caller.has_name()) {
                    caller.name = name;
                    name_backfilled = true;
                }
                if let Some(email) = email.filter(|_| !caller.has_email()) {
                    caller.email = Some(email);
                    email_backfilled = true;
                }
                if name_backfilled || email_backfilled {
                    caller = self.persistence.callers.update(&caller).await?;
                }
                (caller, false, name_backfilled, email_backfilled)
            },
        };

        ctx.bind_caller(CallerIdentity {
            phone: caller.phone_number.clone(),
            name: caller.name.clone(),
        });

        Ok(ToolOutcome::success(json!({
            "success": true,
            "user_id": caller.id.to_string(),
            "phone_number": caller.phone_number,
            "name": caller.name,
            "is_new_user": is_new_user,
            "name_backfilled": name_backfilled,
            "email_backfilled": email_backfilled,
            "message": format!("User identified: {} ({})", caller.name, caller.phone_number),
        }))
        .with_effect(ToolEffect::CallerIdentified {
            phone: caller.phone_number,
        }))
    }

    async fn fetch_slots(&self, args: FetchSlotsArgs) -> Result<ToolOutcome, ToolError> {
        let tz = self.scheduling.timezone();
        let slots = self
            .availability
            .slots_for_date(args.date, &self.scheduling, Utc::now())
            .await?;

        let date = args.date.format("%Y-%m-%d").to_string();
        let available = slots.iter().filter(|s| s.available).count();
        let rendered: Vec<Value> = slots
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

        Ok(ToolOutcome::success(json!({
            "success": true,
            "date": date,
            "slots": rendered,
            "total_slots": slots.len(),
            "available_slots": available,
            "message": format!(
                "Found {} available slots out of {} total for {}",
                available,
                slots.len(),
                date
            ),
        })))
    }

    async fn book_appointment(
        &self,
        ctx: &dyn ToolContext,
        args: BookArgs,
    ) -> Result<ToolOutcome, ToolError> {
        let Some(caller) = ctx.caller() else {
            return Ok(ToolOutcome::failure(NOT_IDENTIFIED));
        };

        let duration = args
            .duration
            .unwrap_or(self.scheduling.default_duration_minutes);
        if !valid_duration(duration) {
            return Ok(ToolOutcome::failure(INVALID_DURATION));
        }
        if args.date_time < Utc::now() {
            return Ok(ToolOutcome::failure("Cannot book appointments in the past"));
        }

        // Re-checked here, at write time, whatever the model was quoted earlier
        if !self.availability.is_available(args.date_time, duration).await? {
            return Ok(ToolOutcome::failure(
                "This time slot is already booked. Please choose another time.",
            ));
        }

        let appointment = Appointment::new(
            &caller.phone,
            &caller.name,
            args.date_time,
            duration,
            args.purpose.as_deref().unwrap_or_default().trim(),
            args.notes.as_deref().unwrap_or_default().trim(),
        );
        let created = self.persistence.appointments.create(&appointment).await?;
        let when = self.display(created.start);

        tracing::info!(
            appointment_id = %created.id,
            start = %created.start,
            duration = created.duration_minutes,
            "Appointment booked"
        );

        Ok(ToolOutcome::success(json!({
            "success": true,
            "appointment_id": created.id.to_string(),
            "date_time": when,
            "duration": created.duration_minutes,
            "purpose": created.purpose,
            "message": format!("Appointment successfully booked for {}", when),
        }))
        .with_effect(ToolEffect::AppointmentBooked(created.id)))
    }

    async fn retrieve_appointments(
        &self,
        ctx: &dyn ToolContext,
        args: RetrieveArgs,
    ) -> Result<ToolOutcome, ToolError> {
        let Some(caller) = ctx.caller() else {
            return Ok(ToolOutcome::failure(NOT_IDENTIFIED));
        };

        let appointments = match args.scope {
            RetrieveScope::Upcoming => {
                self.persistence
                    .appointments
                    .list_upcoming_for_caller(&caller.phone, Utc::now())
                    .await?
            },
            RetrieveScope::All => {
                self.persistence
                    .appointments
                    .list_for_caller(&caller.phone)
                    .await?
            },
        };

        let scope = args.scope.as_str();
        let rendered: Vec<Value> = appointments
            .iter()
            .map(|apt| {
                json!({
                    "id": apt.id.to_string(),
                    "date_time": self.display(apt.start),
                    "duration": apt.duration_minutes,
                    "purpose": apt.purpose,
                    "status": apt.status.as_str(),
                    "notes": apt.notes,
                })
            })
            .collect();
        let message = if appointments.is_empty() {
            format!("No {} appointments found", scope)
        } else {
            format!("Found {} {} appointment(s)", appointments.len(), scope)
        };

        Ok(ToolOutcome::success(json!({
            "success": true,
            "appointments": rendered,
            "count": appointments.len(),
            "type": scope,
            "message": message,
        })))
    }

    /// Shared guard for cancel/modify: identified, exists, owned
    async fn owned_appointment(
        &self,
        ctx: &dyn ToolContext,
        id: Uuid,
        verb: &str,
    ) -> Result<Result<Appointment, ToolOutcome>, ToolError> {
        let Some(caller) = ctx.caller() else {
            return Ok(Err(ToolOutcome::failure(NOT_IDENTIFIED_SHORT)));
        };
        let Some(appointment) = self.persistence.appointments.get(id).await? else {
            return Ok(Err(ToolOutcome::failure("Appointment not found")));
        };
        if appointment.caller_phone != caller.phone {
            tracing::warn!(appointment_id = %id, "Rejected access to another caller's appointment");
            return Ok(Err(ToolOutcome::failure(format!(
                "You can only {} your own appointments",
                verb
            ))));
        }
        Ok(Ok(appointment))
    }

    async fn cancel_appointment(
        &self,
        ctx: &dyn ToolContext,
        args: CancelArgs,
    ) -> Result<ToolOutcome, ToolError> {
        let mut appointment = match self.owned_appointment(ctx, args.appointment_id, "cancel").await? {
            Ok(apt) => apt,
            Err(rejection) => return Ok(rejection),
        };
        if appointment.status == AppointmentStatus::Cancelled {
            return Ok(ToolOutcome::failure("Appointment is already cancelled"));
        }

        appointment.status = AppointmentStatus::Cancelled;
        if let Some(reason) = clean_optional(args.reason.as_deref()) {
            appointment.notes = format!("{}\nCancellation reason: {}", appointment.notes, reason);
        }
        let updated = self.persistence.appointments.update(&appointment).await?;
        let when = self.display(updated.start);

        tracing::info!(appointment_id = %updated.id, "Appointment cancelled");

        Ok(ToolOutcome::success(json!({
            "success": true,
            "appointment_id": updated.id.to_string(),
            "date_time": when,
            "message": format!("Appointment on {} has been cancelled", when),
        }))
        .with_effect(ToolEffect::AppointmentCancelled(updated.id)))
    }

    async fn modify_appointment(
        &self,
        ctx: &dyn ToolContext,
        args: ModifyArgs,
    ) -> Result<ToolOutcome, ToolError> {
        let mut appointment = match self.owned_appointment(ctx, args.appointment_id, "modify").await? {
            Ok(apt) => apt,
            Err(rejection) => return Ok(rejection),
        };
        if appointment.status == AppointmentStatus::Cancelled {
            return Ok(ToolOutcome::failure("Cannot modify a cancelled appointment"));
        }

        let new_start = args.new_date_time;
        let new_duration = args
            .new_duration
            .filter(|d| *d != appointment.duration_minutes);
        if new_duration.is_some_and(|d| !valid_duration(d)) {
            return Ok(ToolOutcome::failure(INVALID_DURATION));
        }

        // A new time or a new length both occupy a different interval
        if new_start.is_some() || new_duration.is_some() {
            let start = new_start.unwrap_or(appointment.start);
            let duration = new_duration.unwrap_or(appointment.duration_minutes);
            if start < Utc::now() {
                return Ok(ToolOutcome::failure("Cannot reschedule to a past time"));
            }
            if !self
                .availability
                .is_available_excluding(start, duration, Some(appointment.id))
                .await?
            {
                return Ok(ToolOutcome::failure("The new time slot is not available"));
            }
        }

        let mut changes = Vec::new();
        if let Some(start) = new_start {
            appointment.start = start;
            changes.push(format!("rescheduled to {}", self.display(start)));
        }
        if let Some(duration) = new_duration {
            appointment.duration_minutes = duration;
            changes.push(format!("duration changed to {} minutes", duration));
        }
        if let Some(purpose) = clean_optional(args.new_purpose.as_deref()) {
            appointment.purpose = purpose;
            changes.push("purpose updated".to_string());
        }
        if let Some(notes) = clean_optional(args.new_notes.as_deref()) {
            appointment.notes = notes;
            changes.push("notes updated".to_string());
        }

        if changes.is_empty() {
            return Ok(ToolOutcome::failure("No changes specified"));
        }

        let updated = self.persistence.appointments.update(&appointment).await?;
        tracing::info!(appointment_id = %updated.id, changes = ?changes, "Appointment modified");

        let outcome = ToolOutcome::success(json!({
            "success": true,
            "appointment_id": updated.id.to_string(),
            "changes": changes,
            "new_date_time": self.display(updated.start),
            "new_duration": updated.duration_minutes,
            "message": format!("Appointment modified: {}", changes.join(", ")),
        }));
        if new_start.is_some() || new_duration.is_some() {
            Ok(outcome.with_effect(ToolEffect::AppointmentRescheduled(updated.id)))
        } else {
            Ok(outcome)
        }
    }

    fn end_conversation(&self, args: EndConversationArgs) -> ToolOutcome {
        let reason = clean_optional(args.reason.as_deref());
        ToolOutcome::success(json!({
            "success": true,
            "action": "end_conversation",
            "reason": reason.clone().unwrap_or_default(),
            "message": "Conversation ended",
            "should_end": true,
        }))
        .with_effect(ToolEffect::EndConversation { reason })
    }
}

#[async_trait]
impl ToolExecutor for AppointmentTools {
    async fn execute(
        &self,
        ctx: &dyn ToolContext,
        call: &ToolCall,
    ) -> Result<ToolOutcome, ToolError> {
        let call_id = if call.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            call.id.clone()
        };
        ctx.begin_tool_call(ToolCallRecord::started(
            &call_id,
            &call.name,
            call.arguments_json(),
        ));

        let started = Instant::now();
        let result = match ToolInvocation::from_call(call) {
            Ok(invocation) => self.run(ctx, invocation).await,
            Err(e) => Err(e),
        };

        let audit = match &result {
            Ok(outcome) => Ok(outcome.payload.clone()),
            Err(e) => Err(e.to_string()),
        };
        ctx.complete_tool_call(&call_id, &audit);

        let label = match &result {
            Ok(outcome) if outcome.success => "success",
            Ok(_) => "rejected",
            Err(e) => e.kind(),
        };
        metrics::counter!(
            "voice_agent_tool_calls_total",
            "tool" => call.name.clone(),
            "outcome" => label
        )
        .increment(1);
        metrics::histogram!("voice_agent_tool_duration_seconds", "tool" => call.name.clone())
            .record(started.elapsed().as_secs_f64());

        tracing::debug!(
            tool = %call.name,
            call_id = %call_id,
            outcome = label,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool call finished"
        );

        result
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        tool_definitions()
    }
}
