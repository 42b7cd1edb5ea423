//! Slow-log record parser.
//!
//! Turns one [`RawRecordBlock`] into a [`QueryEvent`]. Lines are classified
//! by their first four characters (case-insensitive):
//!
//! ```text
//! # Time: 2018-12-17T15:18:58.744913Z
//! # User@Host: app[app] @  [10.0.0.2]  Id: 3502988
//! # Schema: shop  Last_errno: 0  Killed: 0
//! # Query_time: 0.000030  Lock_time: 0.000000  Rows_sent: 0  Rows_examined: 0  Rows_affected: 0
//! # Bytes_sent: 561
//! SET timestamp=1545059940;
//! SELECT * FROM orders WHERE id = 42;
//! ```
//!
//! MariaDB and MySQL 5.6 emit a reduced `# Query_time` line without
//! `Rows_affected` and report it, together with `Bytes_sent`, on a separate
//! `# Rows_affected:` line. MySQL 8 with `log_slow_extra` appends
//! `Thread_id`, `Errno`, `Killed` and `Bytes_sent` (among others) to the
//! reduced line instead. All three layouts are accepted.
//!
//! Malformed fields never abort the block: they are logged and left at zero.

use std::str::FromStr;

use tracing::{debug, warn};

use super::normalize;
use crate::storage::model::{QueryEvent, RawRecordBlock};
use crate::util::parse_log_time;

/// Classification of one buffered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Time,
    UserHost,
    Schema,
    Thread,
    QueryTime,
    BytesSent,
    RowsAffected,
    /// `SET ...`, `USE ...` and unknown `# ` annotations.
    Ignored,
    Statement,
}

fn classify(line: &str) -> LineKind {
    let Some(prefix) = line.get(..4) else {
        return if line.starts_with('#') {
            LineKind::Ignored
        } else {
            LineKind::Statement
        };
    };
    match prefix.to_ascii_uppercase().as_str() {
        "# TI" => LineKind::Time,
        "# US" => LineKind::UserHost,
        "# SC" => LineKind::Schema,
        "# TH" => LineKind::Thread,
        "# QU" => LineKind::QueryTime,
        "# BY" => LineKind::BytesSent,
        "# RO" => LineKind::RowsAffected,
        "SET " | "USE " => LineKind::Ignored,
        p if p.starts_with("# ") => LineKind::Ignored,
        _ => LineKind::Statement,
    }
}

/// Leading field names of the `# Query_time` line, richest layout first.
const QUERY_TIME_LAYOUTS: &[&[&str]] = &[
    &["Query_time", "Lock_time", "Rows_sent", "Rows_examined", "Rows_affected"],
    &["Query_time", "Lock_time", "Rows_sent", "Rows_examined", "Thread_id", "Errno", "Killed"],
    &["Query_time", "Lock_time", "Rows_sent", "Rows_examined"],
];

/// Parse one record block.
///
/// Returns `None` when the block holds no statement line.
pub fn parse_block(block: &RawRecordBlock) -> Option<QueryEvent> {
    let mut event = QueryEvent {
        line: block.last_line,
        ..QueryEvent::default()
    };
    let mut statement: Option<&str> = None;

    for line in block.lines() {
        if line.is_empty() {
            continue;
        }
        match classify(line) {
            LineKind::Time => parse_time(line, block.line, &mut event),
            LineKind::UserHost => parse_user_host(line, block.line, &mut event),
            LineKind::Schema | LineKind::Thread => parse_schema(line, block.line, &mut event),
            LineKind::QueryTime => parse_query_time(line, block.line, &mut event),
            LineKind::BytesSent | LineKind::RowsAffected => {
                parse_bytes_and_rows(line, block.line, &mut event)
            }
            LineKind::Ignored => {}
            LineKind::Statement => statement = Some(line),
        }
    }

    let Some(statement) = statement else {
        debug!(line = block.line, "record without statement, skipped");
        return None;
    };

    let (fingerprint, key) = normalize::fingerprint_with_key(statement);
    event.statement = statement.to_string();
    event.fingerprint = fingerprint;
    event.key = key;
    Some(event)
}

/// Split an annotation into `(key, value)` pairs.
///
/// `# Schema: shop  Last_errno: 0` → `[("Schema", "shop"), ("Last_errno", "0")]`.
/// A key directly followed by another key gets an empty value.
fn fields(line: &str) -> Vec<(&str, &str)> {
    let body = line.trim_start_matches('#');
    let mut result = Vec::new();
    let mut tokens = body.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        let Some(key) = token.strip_suffix(':') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        let value = match tokens.peek() {
            Some(next) if !next.ends_with(':') => tokens.next().unwrap_or(""),
            _ => "",
        };
        result.push((key, value));
    }

    result
}

fn field<'a>(fields: &[(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| *v)
}

/// Parse a numeric field, logging and returning `None` when it is missing
/// or malformed.
fn number<T: FromStr>(fields: &[(&str, &str)], key: &str, line: u64) -> Option<T> {
    let Some(raw) = field(fields, key) else {
        debug!(line, field = key, "field missing");
        return None;
    };
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(line, field = key, value = raw, "non-numeric field value");
            None
        }
    }
}

fn parse_time(line: &str, block_line: u64, event: &mut QueryEvent) {
    let value = line
        .split_once(':')
        .map(|(_, rest)| rest.trim())
        .unwrap_or_default();
    match parse_log_time(value) {
        Ok(ts) => event.time = Some(ts),
        Err(e) => warn!(line = block_line, error = %e, "unparsable timestamp"),
    }
}

/// `# User@Host: alt[user] @ host [ip]  Id: 42`
///
/// The client is the bracketed address when present, else the host name.
fn parse_user_host(line: &str, block_line: u64, event: &mut QueryEvent) {
    let Some((_, rest)) = line.split_once(':') else {
        warn!(line = block_line, "malformed User@Host line");
        return;
    };
    let (identity, remainder) = rest.split_once(" @ ").unwrap_or((rest, ""));

    let identity = identity.trim();
    match identity.split_once('[') {
        Some((alt, user)) => {
            event.alt_user = alt.trim().to_string();
            event.user = user.trim_end_matches(']').trim().to_string();
        }
        None => event.user = identity.to_string(),
    }

    let (location, id) = match remainder.find("Id:") {
        Some(pos) => (&remainder[..pos], Some(remainder[pos + 3..].trim())),
        None => (remainder, None),
    };

    let ip = location
        .split_once('[')
        .and_then(|(_, r)| r.split_once(']'))
        .map(|(ip, _)| ip.trim())
        .unwrap_or("");
    event.client = if ip.is_empty() {
        location
            .split_whitespace()
            .find(|t| !t.starts_with('['))
            .unwrap_or("")
            .to_string()
    } else {
        ip.to_string()
    };

    if let Some(id) = id {
        match id.parse() {
            Ok(v) => event.session_id = v,
            Err(_) => warn!(line = block_line, value = id, "non-numeric connection id"),
        }
    }
}

/// `# Schema: ... Last_errno: ... Killed: ...` and the
/// `# Thread_id: ... Schema: ... QC_hit: ...` variant.
fn parse_schema(line: &str, block_line: u64, event: &mut QueryEvent) {
    let fields = fields(line);
    if let Some(schema) = field(&fields, "Schema") {
        event.schema = schema.to_string();
    }
    if let Some(id) = field(&fields, "Thread_id") {
        if let Ok(v) = id.parse() {
            event.session_id = v;
        }
    }
    if field(&fields, "Last_errno").is_some() {
        event.last_errno = number(&fields, "Last_errno", block_line).unwrap_or(0);
    }
    if field(&fields, "Killed").is_some() {
        event.killed = number(&fields, "Killed", block_line).unwrap_or(0);
    }
}

fn parse_query_time(line: &str, block_line: u64, event: &mut QueryEvent) {
    let fields = fields(line);
    let keys: Vec<&str> = fields.iter().map(|(k, _)| *k).collect();

    let known = QUERY_TIME_LAYOUTS
        .iter()
        .any(|layout| keys.len() >= layout.len() && keys[..layout.len()] == layout[..]);
    if !known {
        warn!(line = block_line, text = line, "unrecognized Query_time layout");
        return;
    }

    event.duration = number(&fields, "Query_time", block_line).unwrap_or(0.0);
    event.lock_time = number(&fields, "Lock_time", block_line).unwrap_or(0.0);
    event.rows_sent = number(&fields, "Rows_sent", block_line).unwrap_or(0);
    event.rows_examined = number(&fields, "Rows_examined", block_line).unwrap_or(0);

    // trailing fields differ per layout
    if field(&fields, "Rows_affected").is_some() {
        event.rows_affected = number(&fields, "Rows_affected", block_line).unwrap_or(0);
    }
    if let Some(id) = field(&fields, "Thread_id").and_then(|v| v.parse().ok()) {
        event.session_id = id;
    }
    if field(&fields, "Errno").is_some() {
        event.last_errno = number(&fields, "Errno", block_line).unwrap_or(0);
    }
    if field(&fields, "Killed").is_some() {
        event.killed = number(&fields, "Killed", block_line).unwrap_or(0);
    }
    if field(&fields, "Bytes_sent").is_some() {
        event.bytes_sent = number(&fields, "Bytes_sent", block_line).unwrap_or(0);
    }
}

/// `# Bytes_sent: 561` and `# Rows_affected: 0  Bytes_sent: 61`.
fn parse_bytes_and_rows(line: &str, block_line: u64, event: &mut QueryEvent) {
    let fields = fields(line);
    if field(&fields, "Rows_affected").is_some() {
        event.rows_affected = number(&fields, "Rows_affected", block_line).unwrap_or(0);
    }
    if field(&fields, "Bytes_sent").is_some() {
        event.bytes_sent = number(&fields, "Bytes_sent", block_line).unwrap_or(0);
    }
}
