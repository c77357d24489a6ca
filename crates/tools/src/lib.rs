//! Appointment tools for the voice agent
//!
//! The model drives bookings through seven tools. Each call is decoded into a
//! typed [`ToolInvocation`], executed against the persistence layer and
//! returned as a [`ToolOutcome`] whose payload goes back to the model.
//!
//! # Example
//!
//! ```ignore
//! use voice_agent_tools::{AppointmentTools, SimpleToolContext, ToolExecutor};
//!
//! let tools = AppointmentTools::new(persistence, settings.scheduling.clone());
//! let ctx = SimpleToolContext::new();
//! let outcome = tools.execute(&ctx, &call).await?;
//! ```

pub mod availability;
pub mod context;
pub mod error;
pub mod executor;
pub mod invocation;
pub mod outcome;
pub mod schemas;
pub mod utils;

pub use availability::{slot_starts, AvailabilityChecker, Slot};
pub use context::{CallerIdentity, SimpleToolContext, ToolCallRecord, ToolContext};
pub use error::ToolError;
pub use executor::{AppointmentTools, ToolExecutor};
pub use invocation::{RetrieveScope, ToolInvocation};
pub use outcome::{ToolEffect, ToolOutcome};
pub use schemas::{tool_definitions, END_CONVERSATION};
