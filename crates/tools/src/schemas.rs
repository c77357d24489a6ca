//! Tool catalog offered to the language model

use serde_json::json;
use voice_agent_core::ToolDefinition;

pub const IDENTIFY_USER: &str = "identify_user";
pub const FETCH_SLOTS: &str = "fetch_slots";
pub const BOOK_APPOINTMENT: &str = "book_appointment";
pub const RETRIEVE_APPOINTMENTS: &str = "retrieve_appointments";
pub const CANCEL_APPOINTMENT: &str = "cancel_appointment";
pub const MODIFY_APPOINTMENT: &str = "modify_appointment";
pub const END_CONVERSATION: &str = "end_conversation";

/// Definitions for every supported tool, in a stable order
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            IDENTIFY_USER,
            "Identify the caller by phone number. Call this before booking or retrieving \
             appointments. If the caller is new, their name is required to register them; \
             email is optional.",
            json!({
                "type": "object",
                "properties": {
                    "phone_number": {
                        "type": "string",
                        "description": "The caller's phone number, e.g. +1234567890"
                    },
                    "name": {
                        "type": "string",
                        "description": "The caller's full name (required for new callers)"
                    },
                    "email": {
                        "type": "string",
                        "description": "The caller's email address (optional)"
                    }
                },
                "required": ["phone_number"]
            }),
        ),
        ToolDefinition::new(
            FETCH_SLOTS,
            "Fetch appointment time slots for a given date. Returns each slot with its availability.",
            json!({
                "type": "object",
                "properties": {
                    "date": {
                        "type": "string",
                        "description": "The date to check availability for in YYYY-MM-DD format"
                    }
                },
                "required": ["date"]
            }),
        ),
        ToolDefinition::new(
            BOOK_APPOINTMENT,
            "Book an appointment for the caller. Requires the caller to be identified first.",
            json!({
                "type": "object",
                "properties": {
                    "date_time": {
                        "type": "string",
                        "description": "Appointment start in ISO 8601 format (e.g., 2024-01-15T10:00:00Z)"
                    },
                    "duration": {
                        "type": "integer",
                        "description": "Duration of the appointment in minutes (default 30)"
                    },
                    "purpose": {
                        "type": "string",
                        "description": "The purpose or reason for the appointment"
                    },
                    "notes": {
                        "type": "string",
                        "description": "Any additional notes for the appointment"
                    }
                },
                "required": ["date_time"]
            }),
        ),
        ToolDefinition::new(
            RETRIEVE_APPOINTMENTS,
            "Retrieve the caller's appointments: upcoming ones or the full history.",
            json!({
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["upcoming", "all"],
                        "description": "'upcoming' for future booked appointments, 'all' for the full history"
                    }
                },
                "required": ["type"]
            }),
        ),
        ToolDefinition::new(
            CANCEL_APPOINTMENT,
            "Cancel an existing appointment by its ID.",
            json!({
                "type": "object",
                "properties": {
                    "appointment_id": {
                        "type": "string",
                        "description": "The ID of the appointment to cancel"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Optional reason for cancellation"
                    }
                },
                "required": ["appointment_id"]
            }),
        ),
        ToolDefinition::new(
            MODIFY_APPOINTMENT,
            "Modify an existing appointment's time, duration, purpose or notes.",
            json!({
                "type": "object",
                "properties": {
                    "appointment_id": {
                        "type": "string",
                        "description": "The ID of the appointment to modify"
                    },
                    "new_date_time": {
                        "type": "string",
                        "description": "New start in ISO 8601 format (optional)"
                    },
                    "new_duration": {
                        "type": "integer",
                        "description": "New duration in minutes (optional)"
                    },
                    "new_purpose": {
                        "type": "string",
                        "description": "New purpose/reason (optional)"
                    },
                    "new_notes": {
                        "type": "string",
                        "description": "New notes (optional)"
                    }
                },
                "required": ["appointment_id"]
            }),
        ),
        ToolDefinition::new(
            END_CONVERSATION,
            "End the current conversation. Use this when the caller says goodbye, wants to \
             end the call, or the conversation has naturally concluded.",
            json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "Reason for ending the conversation"
                    }
                },
                "required": []
            }),
        ),
    ]
}
