//! Snapshot structures handed to renderers and persisted to the cache.
//!
//! A [`Snapshot`] is a point-in-time view of the aggregator state: global
//! metadata plus one [`RankedEntry`] per fingerprint, already ordered. The
//! cache stores a [`CacheRecord`] instead, which keeps the raw sample vectors
//! so a later run can rank the same data under a different sort key.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::{AggregateEntry, EntryTotals};
use crate::config::SortSpec;
use crate::stats::{self, DistributionStats};

/// Placeholder stored in every text field when the preamble is unreadable.
pub const UNPARSABLE: &str = "unable to parse line";

/// Server identity taken from the log preamble.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub binary: String,
    pub version_short: String,
    pub version: String,
    pub version_description: String,
    pub tcp_port: u16,
    pub unix_socket: String,
}

impl ServerInfo {
    pub fn unparsable() -> Self {
        Self {
            binary: UNPARSABLE.to_string(),
            version_short: UNPARSABLE.to_string(),
            version: UNPARSABLE.to_string(),
            version_description: UNPARSABLE.to_string(),
            tcp_port: 0,
            unix_socket: UNPARSABLE.to_string(),
        }
    }
}

/// Global counters and derived throughput for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMeta {
    pub server: ServerInfo,
    pub query_count: u64,
    pub cum_bytes: u64,
    pub cum_lines: u64,
    pub unique_queries: u64,
    /// Lookups where the stored fingerprint differed from the event's.
    pub key_collisions: u64,
    /// Earliest observed query timestamp.
    pub start: Option<DateTime<Utc>>,
    /// Latest observed query timestamp.
    pub end: Option<DateTime<Utc>>,
    /// Wall-clock seconds spent analysing.
    pub analysis_secs: f64,
    pub lines_per_sec: f64,
    pub queries_per_sec: f64,
    pub bytes_per_sec: f64,
}

impl GlobalMeta {
    pub fn new(server: ServerInfo) -> Self {
        Self {
            server,
            ..Self::default()
        }
    }

    /// Widen the observed time span. Comparison based, so arrival order
    /// does not matter.
    pub fn observe(&mut self, time: Option<DateTime<Utc>>) {
        let Some(t) = time else { return };
        if self.start.is_none_or(|s| t < s) {
            self.start = Some(t);
        }
        if self.end.is_none_or(|e| t > e) {
            self.end = Some(t);
        }
    }

    /// Observed time span in seconds, if at least one timestamp was seen.
    pub fn span_secs(&self) -> Option<f64> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some((e - s).num_microseconds().unwrap_or(0) as f64 / 1e6),
            _ => None,
        }
    }

    /// Queries per second of captured log time (0 when the span is empty).
    pub fn capture_qps(&self) -> f64 {
        match self.span_secs() {
            Some(span) if span > 0.0 => self.query_count as f64 / span,
            _ => 0.0,
        }
    }

    /// Fill the analysis throughput fields from the elapsed wall-clock time.
    pub fn set_throughput(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        self.analysis_secs = secs;
        if secs > 0.0 {
            self.lines_per_sec = self.cum_lines as f64 / secs;
            self.queries_per_sec = self.query_count as f64 / secs;
            self.bytes_per_sec = self.cum_bytes as f64 / secs;
        } else {
            self.lines_per_sec = 0.0;
            self.queries_per_sec = 0.0;
            self.bytes_per_sec = 0.0;
        }
    }
}

/// Totals of one fingerprint plus its derived distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub totals: EntryTotals,
    pub stats: DistributionStats,
}

/// Point-in-time aggregate view delivered to renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: GlobalMeta,
    /// Ordered according to the [`SortSpec`] the snapshot was built with.
    pub entries: Vec<RankedEntry>,
    pub is_final: bool,
}

impl Snapshot {
    /// Compute statistics for every entry and order them.
    pub fn build<'a>(
        mut meta: GlobalMeta,
        entries: impl IntoIterator<Item = &'a AggregateEntry>,
        sort: SortSpec,
        is_final: bool,
    ) -> Self {
        let span = meta.span_secs();
        let mut ranked: Vec<RankedEntry> = entries
            .into_iter()
            .map(|entry| RankedEntry {
                totals: entry.totals.clone(),
                stats: stats::distribution(&entry.samples.duration, entry.totals.cum_duration, span),
            })
            .collect();
        stats::rank(&mut ranked, sort);
        meta.unique_queries = ranked.len() as u64;

        Self {
            meta,
            entries: ranked,
            is_final,
        }
    }

    /// First `limit` entries in rank order.
    pub fn top(&self, limit: usize) -> &[RankedEntry] {
        &self.entries[..limit.min(self.entries.len())]
    }
}

/// Cached form of a final snapshot, before any top-N trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub meta: GlobalMeta,
    pub entries: Vec<AggregateEntry>,
}

impl CacheRecord {
    /// Rebuild a final snapshot ranked by `sort`.
    pub fn to_snapshot(&self, sort: SortSpec) -> Snapshot {
        Snapshot::build(self.meta.clone(), &self.entries, sort, true)
    }
}
