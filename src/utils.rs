//! Small text and time helpers shared by the fetchers and the store.
//!
//! - Log-friendly truncation of upstream payloads
//! - Whitespace normalisation for scraped cell text
//! - Feed date parsing with a capture-time fallback
//! - Decomposition of a capture instant into filterable buckets

use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Date format used by RSS `pubDate` elements, e.g. `Thu, 16 Jan 2025 09:30:00 -0500`.
pub const FEED_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes (moved back to the nearest char
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Collapse every run of whitespace into one space and trim both ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s.trim(), " ").into_owned()
}

/// Parse a feed date, falling back to `captured_at` when it does not match
/// [`FEED_DATE_FORMAT`].
///
/// # Arguments
///
/// * `raw` - The text of the `pubDate` element, if any
/// * `captured_at` - The instant the current cycle started
pub fn parse_feed_date(raw: Option<&str>, captured_at: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return captured_at;
    };
    match DateTime::parse_from_str(raw.trim(), FEED_DATE_FORMAT) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            debug!(raw, error = %e, "Unparseable feed date; using capture time");
            captured_at
        }
    }
}

/// Year, month, day and `HH:MM:SS` of a capture instant, all in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureBucket {
    pub year: i64,
    pub month: i64,
    pub day: i64,
    pub time: String,
}

impl CaptureBucket {
    pub fn of(captured_at: DateTime<Utc>) -> Self {
        Self {
            year: i64::from(captured_at.year()),
            month: i64::from(captured_at.month()),
            day: i64::from(captured_at.day()),
            time: captured_at.format("%H:%M:%S").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let s = "é".repeat(10);
        let result = truncate_for_log(&s, 3);
        assert!(result.starts_with('é'));
        assert!(result.contains("…(+18 bytes)"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Vanguard \n\t Total  "), "Vanguard Total");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_parse_feed_date() {
        let fallback = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let parsed = parse_feed_date(Some("Thu, 16 Jan 2025 09:30:00 -0500"), fallback);
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 1, 16, 14, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_feed_date_falls_back() {
        let fallback = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_feed_date(Some("yesterday-ish"), fallback), fallback);
        assert_eq!(parse_feed_date(Some("N/A"), fallback), fallback);
        assert_eq!(parse_feed_date(None, fallback), fallback);
    }

    #[test]
    fn test_capture_bucket() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 8, 5, 9).unwrap();
        assert_eq!(
            CaptureBucket::of(at),
            CaptureBucket {
                year: 2025,
                month: 3,
                day: 7,
                time: "08:05:09".to_string(),
            }
        );
    }
}
