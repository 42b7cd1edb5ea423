//! Data models for the digest pipeline.
//!
//! - [`event`]: per-occurrence structures (RawRecordBlock, QueryEvent, FingerprintKey)
//! - [`aggregate`]: per-fingerprint accumulators (AggregateEntry)
//! - [`snapshot`]: renderer and cache structures (GlobalMeta, Snapshot, CacheRecord)
//!
//! # Lifecycle
//!
//! ```text
//! RawRecordBlock   created by the framer, consumed once by a worker
//!   └── QueryEvent  produced by a worker, folded once by the aggregator
//!         └── AggregateEntry   owned by the aggregator only
//!               └── Snapshot / CacheRecord   copies handed outwards
//! ```

mod aggregate;
mod event;
mod snapshot;

pub use aggregate::{AggregateEntry, EntryTotals, Samples};
pub use event::{FingerprintKey, MAX_RECORD_LINES, QueryEvent, RawRecordBlock, RecordOverflow};
pub use snapshot::{CacheRecord, GlobalMeta, RankedEntry, ServerInfo, Snapshot, UNPARSABLE};
