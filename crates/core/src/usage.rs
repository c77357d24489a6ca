//! Usage counters and per-call cost accounting

use serde::{Deserialize, Serialize};

/// Per-unit prices applied to usage counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitPrices {
    pub stt_per_minute: f64,
    pub tts_per_character: f64,
    pub llm_per_token: f64,
}

impl Default for UnitPrices {
    fn default() -> Self {
        Self {
            stt_per_minute: 0.0043,
            tts_per_character: 0.000015,
            llm_per_token: 0.00003,
        }
    }
}

/// Running usage totals for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub stt_seconds: f64,
    pub tts_characters: u64,
    pub llm_tokens: u64,
}

impl UsageCounters {
    pub fn add_speech(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.stt_seconds += seconds;
        }
    }

    pub fn add_synthesized(&mut self, text: &str) {
        self.tts_characters += text.chars().count() as u64;
    }

    pub fn add_tokens(&mut self, tokens: u64) {
        self.llm_tokens += tokens;
    }

    pub fn stt_minutes(&self) -> f64 {
        self.stt_seconds / 60.0
    }

    /// Price the counters
    pub fn cost(&self, prices: &UnitPrices) -> CostBreakdown {
        let stt_minutes = self.stt_minutes();
        let stt_cost = stt_minutes * prices.stt_per_minute;
        let tts_cost = self.tts_characters as f64 * prices.tts_per_character;
        let llm_cost = self.llm_tokens as f64 * prices.llm_per_token;

        CostBreakdown {
            stt_cost,
            tts_cost,
            llm_cost,
            total_cost: stt_cost + tts_cost + llm_cost,
            stt_minutes,
            tts_characters: self.tts_characters,
            llm_tokens: self.llm_tokens,
        }
    }
}

/// Priced usage, persisted with the call summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub stt_cost: f64,
    pub tts_cost: f64,
    pub llm_cost: f64,
    pub total_cost: f64,
    pub stt_minutes: f64,
    pub tts_characters: u64,
    pub llm_tokens: u64,
}
