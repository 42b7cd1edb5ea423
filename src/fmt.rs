//! Shared formatting helpers for renderers.
//!
//! All pure formatting functions live here so renderers only deal with
//! layout.

use chrono::{DateTime, Utc};

/// Format byte count as human-readable size: `"1.5 GiB"`, `"50.0 KiB"`,
/// `"512 B"`.
pub fn format_bytes(bytes: u64) -> String {
    let f = bytes as f64;
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1} GiB", f / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", f / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KiB", f / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Format fractional seconds the way durations are usually read:
/// `"45µs"`, `"12.3ms"`, `"1.234s"`, `"2m3.5s"`, `"1h2m3s"`.
///
/// Sub-microsecond precision is dropped.
pub fn format_secs(secs: f64) -> String {
    if !secs.is_finite() || secs <= 0.0 {
        return "0s".to_string();
    }
    let micros = (secs * 1e6).round();
    if micros < 1.0 {
        return "0s".to_string();
    }

    if micros < 1_000.0 {
        format!("{}µs", micros)
    } else if micros < 1_000_000.0 {
        format!("{}ms", trim_decimals(micros / 1_000.0, 3))
    } else if secs < 60.0 {
        format!("{}s", trim_decimals(micros / 1e6, 6))
    } else {
        let whole = secs.trunc() as u64;
        let frac = secs - whole as f64;
        let (h, m, s) = (whole / 3600, (whole % 3600) / 60, whole % 60);
        let s = trim_decimals(s as f64 + frac, 3);
        if h > 0 {
            format!("{}h{}m{}s", h, m, s)
        } else {
            format!("{}m{}s", m, s)
        }
    }
}

/// `"0.004M (4321)"`
pub fn format_millions(n: u64) -> String {
    format!("{:.3}M ({})", n as f64 / 1_000_000.0, n)
}

/// RFC 3339 timestamp or `"-"`.
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
}

fn trim_decimals(v: f64, precision: usize) -> String {
    let s = format!("{:.*}", precision, v);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}
