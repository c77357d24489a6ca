//! Removal of tool announcements from model text
//!
//! Some models narrate their tool use ("[Calling the fetch_slots tool]")
//! in the spoken answer. Those fragments must never reach speech synthesis.

use once_cell::sync::Lazy;
use regex::Regex;

static ANNOUNCEMENTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\[Calling the \w+ tool[^\]]*\]",
        r"\[Using \w+ tool[^\]]*\]",
        r"\[Call \w+ tool[^\]]*\]",
        r"\[Calling \w+[^\]]*\]",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip bracketed tool announcements and collapse whitespace
pub fn strip_tool_announcements(text: &str) -> String {
    let mut cleaned = text.to_string();
    for pattern in ANNOUNCEMENTS.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    WHITESPACE.replace_all(cleaned.trim(), " ").into_owned()
}
