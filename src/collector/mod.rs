//! Slow-log ingestion pipeline.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────┐  blocks  ┌──────────┐  events  ┌────────────┐
//!  BufRead ──────▶│  Framer  │────────▶│ Worker×N │────────▶│ Aggregator │──▶ Snapshot
//!                 └──────────┘ bounded  └──────────┘ bounded  └─────┬──────┘
//!                   (thread)              (threads)      (calling thread)
//!                                                                   ▼
//!                                                             CacheStore
//! ```
//!
//! Both queues are bounded, so a slow consumer blocks its producer instead of
//! growing memory. The aggregator stops when every worker has dropped its
//! event sender, which happens once the framer has closed the block queue.
//!
//! # Usage
//!
//! ```
//! use std::io::Cursor;
//! use qdigest::collector::Pipeline;
//! use qdigest::config::DigestConfig;
//!
//! let log = "# Time: 181217 15:18:58\n# Query_time: 1.5  Lock_time: 0.0  Rows_sent: 1  Rows_examined: 10\nSELECT * FROM t WHERE id = 1;\n";
//! let snapshot = Pipeline::new(DigestConfig::default())
//!     .run(Cursor::new(log), &mut |_| {})
//!     .unwrap();
//! assert_eq!(snapshot.meta.query_count, 1);
//! assert_eq!(snapshot.entries[0].totals.fingerprint, "select * from t where id = ?;");
//! ```

pub mod aggregator;
pub mod pool;
pub mod progress;
pub mod slowlog;

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::Instant;

use crossbeam::channel::bounded;
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::config::{DigestConfig, QUEUE_CAPACITY};
use crate::storage::model::Snapshot;
use crate::storage::{CacheError, CacheStore};
use crate::util::count_lines;

pub use aggregator::{Aggregator, AggregatorState};
use pool::WorkerStats;
use slowlog::{FrameSummary, Framer};

/// Fatal ingestion errors.
#[derive(Debug)]
pub enum IngestError {
    /// The input holds no `# Time` line.
    NoRecordBoundary,
    Io(io::Error),
    /// The final result could not be written to the cache.
    Cache(CacheError),
    /// A pipeline thread panicked.
    ThreadPanic(&'static str),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::NoRecordBoundary => {
                write!(f, "unable to find initial '{}' entry", slowlog::BOUNDARY)
            }
            IngestError::Io(e) => write!(f, "read error: {}", e),
            IngestError::Cache(e) => write!(f, "cache write failed: {}", e),
            IngestError::ThreadPanic(name) => write!(f, "{} thread panicked", name),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Io(e) => Some(e),
            IngestError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for IngestError {
    fn from(e: io::Error) -> Self {
        IngestError::Io(e)
    }
}

impl From<CacheError> for IngestError {
    fn from(e: CacheError) -> Self {
        IngestError::Cache(e)
    }
}

/// Wires framer, workers and aggregator for one input.
pub struct Pipeline {
    config: DigestConfig,
}

impl Pipeline {
    pub fn new(config: DigestConfig) -> Self {
        Self { config }
    }

    /// Digest a static file, answering from its cache when possible.
    pub fn run_file(&self, path: &Path, sink: &mut dyn FnMut(&Snapshot)) -> Result<Snapshot, IngestError> {
        let store = self.config.use_cache().then(|| CacheStore::for_source(path));

        if let Some(store) = &store {
            match store.load() {
                Ok(record) => {
                    info!(path = %store.path().display(), "using cached results");
                    return Ok(record.to_snapshot(self.config.sort));
                }
                Err(CacheError::Missing) => debug!("no cache"),
                Err(e) => info!(reason = %e, "cache not used"),
            }
        }

        let lines = count_lines(File::open(path)?)?;
        info!(path = %path.display(), lines, "digesting");

        let bar = self.config.use_progress().then(|| progress::line_bar(lines));
        let reader = BufReader::new(File::open(path)?);
        let result = self.ingest(reader, store.as_ref(), bar.as_ref(), sink);
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        result
    }

    /// Digest a stream without caching.
    pub fn run<R: BufRead + Send>(&self, reader: R, sink: &mut dyn FnMut(&Snapshot)) -> Result<Snapshot, IngestError> {
        self.ingest(reader, None, None, sink)
    }

    fn ingest<R: BufRead + Send>(
        &self,
        reader: R,
        cache: Option<&CacheStore>,
        bar: Option<&ProgressBar>,
        sink: &mut dyn FnMut(&Snapshot),
    ) -> Result<Snapshot, IngestError> {
        let started = Instant::now();
        let (framer, server) = Framer::open(reader)?;
        let framer = match bar {
            Some(bar) => framer.with_progress(progress::line_hook(bar)),
            None => framer,
        };
        let mut aggregator = Aggregator::new(server, &self.config, started);

        let (block_tx, block_rx) = bounded(QUEUE_CAPACITY);
        let (event_tx, event_rx) = bounded(QUEUE_CAPACITY);
        let workers = self.config.worker_count();
        debug!(workers, "starting pipeline");

        let summary = thread::scope(|s| -> Result<FrameSummary, IngestError> {
            let framer = s.spawn(move || framer.run(&block_tx));
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let blocks = block_rx.clone();
                    let events = event_tx.clone();
                    s.spawn(move || pool::worker(id, blocks, events))
                })
                .collect();
            drop(block_rx);
            drop(event_tx);

            aggregator.consume(&event_rx, sink);

            let mut parsed = WorkerStats::default();
            let mut panicked = false;
            for handle in handles {
                match handle.join() {
                    Ok(stats) => parsed.merge(stats),
                    Err(_) => panicked = true,
                }
            }
            let framed = framer.join().map_err(|_| IngestError::ThreadPanic("framer"))?;
            if panicked {
                return Err(IngestError::ThreadPanic("worker"));
            }
            debug!(
                blocks = parsed.blocks,
                events = parsed.events,
                dropped = parsed.dropped,
                "workers finished"
            );
            framed
        })?;

        aggregator.finish(summary, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SortKey, SortSpec};
    use crate::storage::model::MAX_RECORD_LINES;
    use std::fmt::Write as _;
    use std::io::Cursor;

    const PREAMBLE: &str = "/usr/sbin/mysqld, Version: 5.7.24-log (MySQL Community Server (GPL)). started with:\n\
                            Tcp port: 3306  Unix socket: /var/run/mysqld/mysqld.sock\n\
                            Time                 Id Command    Argument\n";

    fn record(out: &mut String, second: u32, duration: f64, statement: &str) {
        record_in(out, "shop", second, duration, statement);
    }

    fn record_in(out: &mut String, schema: &str, second: u32, duration: f64, statement: &str) {
        writeln!(out, "# Time: 2018-12-17T15:18:{:02}.000000Z", second).unwrap();
        writeln!(out, "# User@Host: app[app] @  [10.0.0.2]  Id: 42").unwrap();
        writeln!(out, "# Schema: {}  Last_errno: 0  Killed: 0", schema).unwrap();
        writeln!(
            out,
            "# Query_time: {:.6}  Lock_time: 0.000010  Rows_sent: 1  Rows_examined: 5  Rows_affected: 0",
            duration
        )
        .unwrap();
        writeln!(out, "# Bytes_sent: 100").unwrap();
        writeln!(out, "SET timestamp=1545059938;").unwrap();
        writeln!(out, "{}", statement).unwrap();
    }

    fn sample_log() -> String {
        let mut log = PREAMBLE.to_string();
        record(&mut log, 0, 0.5, "SELECT * FROM orders WHERE id = 1;");
        record(&mut log, 1, 1.5, "SELECT * FROM orders\n  WHERE id = 2;");
        record(&mut log, 2, 4.0, "UPDATE stock SET qty = 3 WHERE sku = 'x';");
        record(&mut log, 10, 0.25, "select * from orders where id=99;");
        log
    }

    fn config(workers: usize) -> DigestConfig {
        DigestConfig {
            workers: Some(workers),
            ..DigestConfig::default()
        }
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let log = sample_log();
        let snapshot = Pipeline::new(config(4))
            .run(Cursor::new(log.clone()), &mut |_| {})
            .unwrap();

        assert!(snapshot.is_final);
        assert_eq!(snapshot.meta.server.version, "5.7.24-log");
        assert_eq!(snapshot.meta.query_count, 4);
        assert_eq!(snapshot.meta.cum_bytes, 400);
        assert_eq!(snapshot.meta.cum_lines, log.matches('\n').count() as u64);
        assert_eq!(snapshot.meta.unique_queries, 2);
        assert_eq!(snapshot.meta.span_secs(), Some(10.0));

        let top = &snapshot.entries[0];
        assert_eq!(top.totals.fingerprint, "update stock set qty = ? where sku = ?;");
        let orders = &snapshot.entries[1];
        assert_eq!(orders.totals.fingerprint, "select * from orders where id = ?;");
        assert_eq!(orders.totals.count, 3);
        assert_eq!(orders.totals.cum_duration, 2.25);
        assert_eq!(orders.totals.schema, "shop");
    }

    #[test]
    fn test_worker_count_does_not_change_result() {
        let one = Pipeline::new(config(1))
            .run(Cursor::new(sample_log()), &mut |_| {})
            .unwrap();
        let many = Pipeline::new(config(8))
            .run(Cursor::new(sample_log()), &mut |_| {})
            .unwrap();
        assert_eq!(one.entries, many.entries);
    }

    #[test]
    fn test_worker_count_invariance_with_inexact_times() {
        let mut log = PREAMBLE.to_string();
        for i in 0..600u32 {
            let schema = if i == 0 { "first" } else { "later" };
            let duration = 0.1 * f64::from(i % 7 + 1) + 0.000_013;
            record_in(&mut log, schema, i % 60, duration, &format!("SELECT * FROM t WHERE id = {};", i));
            record_in(&mut log, schema, i % 60, 0.3, &format!("SELECT * FROM u WHERE id = {};", i));
        }

        let one = Pipeline::new(config(1))
            .run(Cursor::new(log.clone()), &mut |_| {})
            .unwrap();
        for workers in [2, 4, 8] {
            let many = Pipeline::new(config(workers))
                .run(Cursor::new(log.clone()), &mut |_| {})
                .unwrap();
            assert_eq!(one.entries, many.entries);
        }
        assert!(one.entries.iter().all(|e| e.totals.schema == "first"));
        assert_eq!(one.entries[0].totals.count, 600);
    }

    #[test]
    fn test_no_loss_under_backpressure() {
        let mut log = PREAMBLE.to_string();
        let total = QUEUE_CAPACITY * 3;
        for i in 0..total {
            record(&mut log, (i % 60) as u32, 0.001, &format!("SELECT * FROM t WHERE id = {};", i));
        }
        let snapshot = Pipeline::new(config(3))
            .run(Cursor::new(log), &mut |_| {})
            .unwrap();
        assert_eq!(snapshot.meta.query_count, total as u64);
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].totals.count, total as u64);
    }

    #[test]
    fn test_overflowing_record_is_still_parsed() {
        let mut log = PREAMBLE.to_string();
        log.push_str("# Time: 2018-12-17T15:18:58.000000Z\n");
        log.push_str("# Query_time: 1.0  Lock_time: 0.0  Rows_sent: 1  Rows_examined: 1  Rows_affected: 0\n");
        log.push_str("SELECT 1;\n");
        for i in 0..MAX_RECORD_LINES {
            log.push_str(&format!("# Note_{}: 1\n", i));
        }
        record(&mut log, 5, 2.0, "SELECT 2 FROM t;");

        let snapshot = Pipeline::new(config(2))
            .run(Cursor::new(log), &mut |_| {})
            .unwrap();
        assert_eq!(snapshot.meta.query_count, 2);
    }

    #[test]
    fn test_missing_boundary_is_fatal() {
        let log = format!("{}SELECT 1;\n", PREAMBLE);
        let result = Pipeline::new(config(2)).run(Cursor::new(log), &mut |_| {});
        assert!(matches!(result, Err(IngestError::NoRecordBoundary)));
    }

    #[test]
    fn test_run_file_writes_then_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.log");
        std::fs::write(&path, sample_log()).unwrap();

        let pipeline = Pipeline::new(config(2));
        let first = pipeline.run_file(&path, &mut |_| {}).unwrap();
        assert!(dir.path().join("slow.log.cache").exists());

        let resorted = Pipeline::new(DigestConfig {
            sort: SortSpec::new(SortKey::Count, false),
            ..config(2)
        });
        let second = resorted.run_file(&path, &mut |_| {}).unwrap();
        assert_eq!(second.meta, first.meta);
        assert_eq!(second.entries[0].totals.count, 3);
    }

    #[test]
    fn test_run_file_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.log");
        std::fs::write(&path, sample_log()).unwrap();

        let pipeline = Pipeline::new(DigestConfig {
            cache: false,
            ..config(2)
        });
        pipeline.run_file(&path, &mut |_| {}).unwrap();
        assert!(!dir.path().join("slow.log.cache").exists());
    }

    #[test]
    fn test_run_file_reingests_stale_cache() {
        use std::time::{Duration, SystemTime};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.log");
        let cache = dir.path().join("slow.log.cache");
        std::fs::write(&path, sample_log()).unwrap();

        let pipeline = Pipeline::new(config(2));
        let first = pipeline.run_file(&path, &mut |_| {}).unwrap();
        assert_eq!(first.meta.query_count, 4);

        let earlier = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&cache)
            .unwrap()
            .set_modified(earlier)
            .unwrap();

        let mut grown = sample_log();
        record(&mut grown, 20, 7.0, "DELETE FROM carts WHERE id = 5;");
        std::fs::write(&path, grown).unwrap();

        let second = pipeline.run_file(&path, &mut |_| {}).unwrap();
        assert_eq!(second.meta.query_count, 5);
        assert_eq!(second.entries[0].totals.fingerprint, "delete from carts where id = ?;");

        let rewritten = CacheStore::for_source(&path).load().unwrap();
        assert_eq!(rewritten.meta.query_count, 5);
        assert!(std::fs::metadata(&cache).unwrap().modified().unwrap() > earlier);
    }

    #[test]
    fn test_run_file_with_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.log");
        std::fs::write(&path, sample_log()).unwrap();

        let pipeline = Pipeline::new(DigestConfig {
            progress: true,
            cache: false,
            ..config(2)
        });
        let snapshot = pipeline.run_file(&path, &mut |_| {}).unwrap();
        assert_eq!(snapshot.meta.query_count, 4);
    }
}
