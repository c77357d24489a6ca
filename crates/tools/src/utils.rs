//! Argument cleaning and display formatting shared by the tools

use chrono::{DateTime, FixedOffset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .unwrap()
});

/// Country code assumed for bare ten-digit numbers
pub const DEFAULT_COUNTRY_CODE: &str = "1";

/// Canonical phone form: `+` followed by digits
///
/// Ten digits without a leading `+` get [`DEFAULT_COUNTRY_CODE`].
/// Empty when `raw` has no digits.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return digits;
    }
    if !raw.trim_start().starts_with('+') && digits.len() == 10 {
        return format!("+{}{}", DEFAULT_COUNTRY_CODE, digits);
    }
    format!("+{}", digits)
}

/// Treat blank, "null" and "undefined" as absent
pub fn clean_optional(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty()
        || value.eq_ignore_ascii_case("null")
        || value.eq_ignore_ascii_case("undefined")
    {
        None
    } else {
        Some(value.to_string())
    }
}

/// Validate and lowercase an email address
pub fn normalize_email(raw: &str) -> Result<String, &'static str> {
    let email = raw.trim().trim_end_matches(['.', ',', ';', ':']).trim();
    if email.len() < 5 {
        return Err("email is too short");
    }
    if email.len() > 254 {
        return Err("email is too long");
    }
    if email.contains("..") {
        return Err("email cannot contain consecutive dots");
    }
    let Some((local, _)) = email.split_once('@') else {
        return Err("email must contain @");
    };
    if local.len() > 64 || local.starts_with('.') || local.ends_with('.') {
        return Err("invalid local part");
    }
    if !EMAIL_PATTERN.is_match(email) {
        return Err("invalid email format");
    }
    Ok(email.to_lowercase())
}

/// "Monday, January 2, 2006 at 3:04 PM" in the business timezone
pub fn format_display(t: DateTime<Utc>, tz: &FixedOffset) -> String {
    t.with_timezone(tz)
        .format("%A, %B %-d, %Y at %-I:%M %p")
        .to_string()
}

/// "3:04 PM" in the business timezone
pub fn format_clock(t: DateTime<Utc>, tz: &FixedOffset) -> String {
    t.with_timezone(tz).format("%-I:%M %p").to_string()
}

/// RFC 3339 timestamp with the business offset
pub fn format_rfc3339(t: DateTime<Utc>, tz: &FixedOffset) -> String {
    t.with_timezone(tz).to_rfc3339()
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
