//! Single-writer reducer for query events.
//!
//! ```text
//! Running ──event queue closed──▶ Draining ──finish()──▶ Done
//! ```
//!
//! While running, the aggregator races the refresh ticker against incoming
//! events. Every tick produces a non-final [`Snapshot`]; `finish` produces the
//! final one and hands it to the cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, never, select, tick};
use tracing::{debug, error, info};

use super::IngestError;
use super::slowlog::FrameSummary;
use crate::config::{DigestConfig, SortSpec};
use crate::storage::CacheStore;
use crate::storage::model::{AggregateEntry, CacheRecord, FingerprintKey, GlobalMeta, QueryEvent, ServerInfo, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Running,
    Draining,
    Done,
}

/// Owner of all per-fingerprint accumulators and global counters.
pub struct Aggregator {
    state: AggregatorState,
    meta: GlobalMeta,
    entries: HashMap<FingerprintKey, AggregateEntry>,
    sort: SortSpec,
    refresh: Duration,
    started: Instant,
    /// Highest source line seen so far; stands in for the line count in
    /// non-final snapshots.
    max_line: u64,
}

impl Aggregator {
    pub fn new(server: ServerInfo, config: &DigestConfig, started: Instant) -> Self {
        Self {
            state: AggregatorState::Running,
            meta: GlobalMeta::new(server),
            entries: HashMap::new(),
            sort: config.sort,
            refresh: config.refresh,
            started,
            max_line: 0,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn meta(&self) -> &GlobalMeta {
        &self.meta
    }

    /// Number of distinct fingerprints seen.
    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Fold one event into its entry and the global counters.
    pub fn fold(&mut self, event: QueryEvent) {
        let entry = self
            .entries
            .entry(event.key)
            .or_insert_with(|| AggregateEntry::new(&event));

        if entry.totals.fingerprint != event.fingerprint {
            error!(
                key = %event.key,
                stored = %entry.totals.fingerprint,
                incoming = %event.fingerprint,
                "fingerprint key collision"
            );
            self.meta.key_collisions += 1;
        }
        entry.record(&event);

        self.meta.query_count += 1;
        self.meta.cum_bytes += event.bytes_sent;
        self.meta.observe(event.time);
        self.max_line = self.max_line.max(event.line);
    }

    /// Consume events until the queue is closed, emitting a non-final
    /// snapshot to `sink` on every refresh tick.
    pub fn consume(&mut self, events: &Receiver<QueryEvent>, sink: &mut dyn FnMut(&Snapshot)) {
        let ticker = if self.refresh.is_zero() {
            never()
        } else {
            tick(self.refresh)
        };

        while self.state == AggregatorState::Running {
            select! {
                recv(ticker) -> _ => {
                    let snapshot = self.snapshot();
                    debug!(queries = snapshot.meta.query_count, unique = self.len(), "periodic snapshot");
                    sink(&snapshot);
                }
                recv(events) -> msg => match msg {
                    Ok(event) => self.fold(event),
                    // closed and empty: everything sent has been folded
                    Err(_) => self.state = AggregatorState::Draining,
                },
            }
        }
    }

    /// Non-final snapshot of the current state.
    pub fn snapshot(&self) -> Snapshot {
        let mut meta = self.meta.clone();
        meta.cum_lines = self.max_line;
        meta.set_throughput(self.started.elapsed());
        Snapshot::build(meta, self.entries.values(), self.sort, false)
    }

    /// Produce the final snapshot and write it to `cache` when given.
    ///
    /// A failed cache write is fatal.
    pub fn finish(&mut self, summary: FrameSummary, cache: Option<&CacheStore>) -> Result<Snapshot, IngestError> {
        self.meta.cum_lines = summary.lines;
        self.meta.unique_queries = self.len() as u64;
        self.meta.set_throughput(self.started.elapsed());

        let mut entries: Vec<AggregateEntry> = std::mem::take(&mut self.entries).into_values().collect();
        entries.sort_unstable_by_key(|e| e.totals.key);
        entries.iter_mut().for_each(AggregateEntry::seal);
        let record = CacheRecord {
            meta: self.meta.clone(),
            entries,
        };
        let snapshot = record.to_snapshot(self.sort);
        self.state = AggregatorState::Done;

        info!(
            queries = record.meta.query_count,
            unique = record.meta.unique_queries,
            lines = record.meta.cum_lines,
            overflowed = summary.overflowed_lines,
            elapsed_secs = record.meta.analysis_secs,
            "digest complete"
        );

        if let Some(store) = cache {
            store.store(&record)?;
        }

        Ok(snapshot)
    }
}
