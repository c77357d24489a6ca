//! Business-hours, pricing and reminder configuration

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use voice_agent_core::UnitPrices;

/// Bookable hours and slot layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// First slot starts at this hour (local)
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,

    /// Slots are generated while start < close hour
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,

    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,

    /// Duration used when a booking does not specify one
    #[serde(default = "default_duration")]
    pub default_duration_minutes: i64,

    /// Offset of the business timezone from UTC, in minutes
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_open_hour() -> u32 {
    9
}
fn default_close_hour() -> u32 {
    17
}
fn default_slot_minutes() -> u32 {
    30
}
fn default_duration() -> i64 {
    30
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            open_hour: default_open_hour(),
            close_hour: default_close_hour(),
            slot_minutes: default_slot_minutes(),
            default_duration_minutes: default_duration(),
            utc_offset_minutes: 0,
        }
    }
}

impl SchedulingConfig {
    /// Business timezone; falls back to UTC for out-of-range offsets
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

/// Per-unit prices for cost accounting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_stt_per_minute")]
    pub stt_per_minute: f64,

    #[serde(default = "default_tts_per_character")]
    pub tts_per_character: f64,

    #[serde(default = "default_llm_per_token")]
    pub llm_per_token: f64,
}

fn default_stt_per_minute() -> f64 {
    0.0043
}
fn default_tts_per_character() -> f64 {
    0.000015
}
fn default_llm_per_token() -> f64 {
    0.00003
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            stt_per_minute: default_stt_per_minute(),
            tts_per_character: default_tts_per_character(),
            llm_per_token: default_llm_per_token(),
        }
    }
}

impl PricingConfig {
    pub fn unit_prices(&self) -> UnitPrices {
        UnitPrices {
            stt_per_minute: self.stt_per_minute,
            tts_per_character: self.tts_per_character,
            llm_per_token: self.llm_per_token,
        }
    }
}

/// Reminder scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,

    /// Forward window scanned at startup
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

fn default_true() -> bool {
    true
}
fn default_tick_seconds() -> u64 {
    60
}
fn default_window_days() -> i64 {
    30
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_seconds: default_tick_seconds(),
            window_days: default_window_days(),
        }
    }
}
