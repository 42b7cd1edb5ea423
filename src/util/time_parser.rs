//! Timestamp parser for `# Time:` annotations.
//!
//! Supports the two dialects seen in slow logs:
//! - RFC 3339 (MySQL 5.7+, Percona 5.7+): `2018-12-17T15:18:58.744913Z`
//! - Legacy compact (MySQL 5.6, MariaDB): `181217 15:18:58`, hour may be
//!   space-padded (`181217  5:18:58`). Interpreted as UTC.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Error type for timestamp parsing failures.
#[derive(Debug, Clone)]
pub struct TimeParseError {
    pub input: String,
    pub message: String,
}

impl std::fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse time '{}': {}", self.input, self.message)
    }
}

impl std::error::Error for TimeParseError {}

/// Parse the value of a `# Time:` annotation.
///
/// Tries RFC 3339 first and falls back to the legacy compact format.
///
/// # Examples
///
/// ```
/// use qdigest::util::parse_log_time;
///
/// let a = parse_log_time("2018-12-17T15:18:58Z").unwrap();
/// let b = parse_log_time("181217 15:18:58").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn parse_log_time(input: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let input = input.trim();

    if let Some(ts) = try_parse_rfc3339(input) {
        return Ok(ts);
    }

    if let Some(ts) = try_parse_legacy(input) {
        return Ok(ts);
    }

    Err(TimeParseError {
        input: input.to_string(),
        message: "Unrecognized format. Expected RFC 3339 (2018-12-17T15:18:58.744913Z) \
                  or YYMMDD HH:MM:SS (181217 15:18:58)"
            .to_string(),
    })
}

/// Try to parse as RFC 3339 with an explicit offset.
fn try_parse_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Try to parse as `YYMMDD H:MM:SS`.
fn try_parse_legacy(input: &str) -> Option<DateTime<Utc>> {
    let (date, time) = input.split_once(char::is_whitespace)?;
    if date.len() != 6 || !date.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let normalized = format!("{} {}", date, time.trim_start());
    let naive = NaiveDateTime::parse_from_str(&normalized, "%y%m%d %H:%M:%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}
