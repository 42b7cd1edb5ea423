//! Settings consumed by the ingestion core.
//!
//! The binary maps command-line flags onto [`DigestConfig`]; the library
//! never reads the environment itself.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Capacity of the block and event queues.
pub const QUEUE_CAPACITY: usize = 1000;

/// Default number of entries shown by renderers.
pub const DEFAULT_LIMIT: usize = 20;

/// Field entries are ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Cumulative query time.
    #[default]
    Time,
    Count,
    Bytes,
    LockTime,
    RowsSent,
    RowsExamined,
    RowsAffected,
}

impl SortKey {
    pub const ALL: [SortKey; 7] = [
        SortKey::Time,
        SortKey::Count,
        SortKey::Bytes,
        SortKey::LockTime,
        SortKey::RowsSent,
        SortKey::RowsExamined,
        SortKey::RowsAffected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Time => "time",
            SortKey::Count => "count",
            SortKey::Bytes => "bytes",
            SortKey::LockTime => "locktime",
            SortKey::RowsSent => "rowssent",
            SortKey::RowsExamined => "rowsexamined",
            SortKey::RowsAffected => "rowsaffected",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    /// Case-insensitive; accepts the short aliases `lock`, `sent`,
    /// `examined` and `affected`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time" => Ok(SortKey::Time),
            "count" => Ok(SortKey::Count),
            "bytes" => Ok(SortKey::Bytes),
            "lock" | "locktime" => Ok(SortKey::LockTime),
            "sent" | "rowssent" => Ok(SortKey::RowsSent),
            "examined" | "rowsexamined" => Ok(SortKey::RowsExamined),
            "affected" | "rowsaffected" => Ok(SortKey::RowsAffected),
            other => Err(format!(
                "unknown sort key '{}' (expected one of: time, count, bytes, lock[time], \
                 [rows]sent, [rows]examined, [rows]affected)",
                other
            )),
        }
    }
}

/// Sort key plus direction. Descending unless `reverse` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub key: SortKey,
    pub reverse: bool,
}

impl SortSpec {
    pub fn new(key: SortKey, reverse: bool) -> Self {
        Self { key, reverse }
    }
}

/// Configuration of one digest run.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    /// Worker count override; `None` uses the available parallelism.
    pub workers: Option<usize>,
    /// Interval between non-final snapshots; zero disables them.
    pub refresh: Duration,
    pub sort: SortSpec,
    /// Number of entries presented. Applied after caching.
    pub limit: usize,
    /// Read and write the sidecar cache.
    pub cache: bool,
    /// Input is a stream (stdin or a followed file); disables the cache.
    pub follow: bool,
    /// Draw a line progress bar on stderr while digesting a file.
    pub progress: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            workers: None,
            refresh: Duration::ZERO,
            sort: SortSpec::default(),
            limit: DEFAULT_LIMIT,
            cache: true,
            follow: false,
            progress: false,
        }
    }
}

impl DigestConfig {
    /// Number of parser workers to spawn (at least one).
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Whether the sidecar cache may be read or written for this run.
    pub fn use_cache(&self) -> bool {
        self.cache && !self.follow
    }

    /// A progress bar needs a known line count, so streams never get one.
    pub fn use_progress(&self) -> bool {
        self.progress && !self.follow
    }
}
