//! Parser workers.
//!
//! Each worker pulls blocks from the shared block queue, parses and
//! fingerprints them and forwards the resulting events. Workers hold no
//! state, so any number of them can share the two queues.

use crossbeam::channel::{Receiver, Sender};
use tracing::{debug, trace};

use super::slowlog::parse_block;
use crate::storage::model::{QueryEvent, RawRecordBlock};

/// Counters reported by one worker on exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub blocks: u64,
    pub events: u64,
    pub dropped: u64,
}

impl WorkerStats {
    /// Add another worker's counters to these.
    pub fn merge(&mut self, other: WorkerStats) {
        self.blocks += other.blocks;
        self.events += other.events;
        self.dropped += other.dropped;
    }
}

/// Run one worker until the block queue is closed and drained, or the event
/// queue has no receiver left.
pub fn worker(id: usize, blocks: Receiver<RawRecordBlock>, events: Sender<QueryEvent>) -> WorkerStats {
    let mut stats = WorkerStats::default();

    for block in blocks.iter() {
        stats.blocks += 1;

        let Some(event) = parse_block(&block) else {
            stats.dropped += 1;
            continue;
        };
        if event.fingerprint.is_empty() {
            trace!(line = block.line, "empty fingerprint, dropped");
            stats.dropped += 1;
            continue;
        }

        if events.send(event).is_err() {
            debug!(worker = id, "event queue closed");
            break;
        }
        stats.events += 1;
    }

    debug!(
        worker = id,
        blocks = stats.blocks,
        events = stats.events,
        dropped = stats.dropped,
        "worker finished"
    );
    stats
}
