//! Per-occurrence structures flowing through the ingestion pipeline.
//!
//! ```text
//! Framer ──RawRecordBlock──▶ Worker ──QueryEvent──▶ Aggregator
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of line slots in a single record block.
///
/// Folded statement continuations share one slot, so this bounds the number
/// of annotation lines plus statements, not the number of physical lines.
pub const MAX_RECORD_LINES: usize = 32;

/// Raised when a record block has no free line slot left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOverflow {
    /// Source line number of the rejected line.
    pub line: u64,
    /// Number of slots already in use.
    pub capacity: usize,
}

impl fmt::Display for RecordOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {} exceeds record capacity of {} lines",
            self.line, self.capacity
        )
    }
}

impl std::error::Error for RecordOverflow {}

/// Raw lines describing one query occurrence between two boundary markers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecordBlock {
    lines: Vec<String>,
    /// Source line number of the first line of the block (1-based).
    pub line: u64,
    /// Source line number of the last line folded into the block.
    pub last_line: u64,
}

impl RawRecordBlock {
    /// Create an empty block starting at source line `line`.
    pub fn new(line: u64) -> Self {
        Self {
            lines: Vec::new(),
            line,
            last_line: line,
        }
    }

    /// Append a line in a fresh slot.
    pub fn push(&mut self, text: String, line: u64) -> Result<(), RecordOverflow> {
        if self.lines.len() >= MAX_RECORD_LINES {
            return Err(RecordOverflow {
                line,
                capacity: MAX_RECORD_LINES,
            });
        }
        self.lines.push(text);
        self.last_line = line;
        Ok(())
    }

    /// Concatenate `text` onto the last slot with a separating space.
    ///
    /// Falls back to [`push`](Self::push) when the block is empty.
    pub fn fold(&mut self, text: &str, line: u64) -> Result<(), RecordOverflow> {
        match self.lines.last_mut() {
            Some(last) => {
                last.push(' ');
                last.push_str(text);
                self.last_line = line;
                Ok(())
            }
            None => self.push(text.to_string(), line),
        }
    }

    /// Last buffered line, if any.
    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Aggregation key: 128-bit XXH3 digest of a fingerprint string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FingerprintKey(pub u128);

impl FingerprintKey {
    pub fn of(fingerprint: &str) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(fingerprint.as_bytes()))
    }

    /// First 10 hex characters, used as a compact query id in reports.
    pub fn short(&self) -> String {
        let full = self.to_string();
        full[..10].to_string()
    }
}

impl fmt::Display for FingerprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// One parsed query occurrence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryEvent {
    /// `None` when the record carried no (parsable) `# Time` line.
    pub time: Option<DateTime<Utc>>,
    pub user: String,
    pub alt_user: String,
    pub client: String,
    pub session_id: u64,
    pub schema: String,
    pub last_errno: u32,
    pub killed: u32,
    /// Query_time, seconds.
    pub duration: f64,
    /// Lock_time, seconds.
    pub lock_time: f64,
    pub rows_sent: u64,
    pub rows_examined: u64,
    pub rows_affected: u64,
    pub bytes_sent: u64,
    pub statement: String,
    pub fingerprint: String,
    pub key: FingerprintKey,
    /// Last source line of the record this event came from.
    pub line: u64,
}

impl Default for FingerprintKey {
    fn default() -> Self {
        Self::of("")
    }
}
