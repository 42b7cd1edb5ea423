//! Per-fingerprint accumulators owned by the aggregator.

use serde::{Deserialize, Serialize};

use super::event::{FingerprintKey, QueryEvent};

/// Cumulative counters for one fingerprint.
///
/// Times are summed as integer microseconds and exposed as seconds, so
/// folding events in any order yields bit-identical totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryTotals {
    pub key: FingerprintKey,
    pub fingerprint: String,
    /// Schema of the occurrence with the lowest source line.
    pub schema: String,
    /// Source line the schema was taken from.
    pub first_line: u64,
    pub count: u64,
    /// Seconds, derived from `duration_us`.
    pub cum_duration: f64,
    /// Seconds, derived from `lock_time_us`.
    pub cum_lock_time: f64,
    pub duration_us: u64,
    pub lock_time_us: u64,
    pub cum_rows_sent: u64,
    pub cum_rows_examined: u64,
    pub cum_rows_affected: u64,
    pub cum_bytes_sent: u64,
    pub cum_errored: u64,
    pub cum_killed: u64,
}

/// Per-occurrence sample vectors kept for distribution statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Samples {
    pub duration: Vec<f64>,
    pub bytes_sent: Vec<f64>,
    pub lock_time: Vec<f64>,
    pub rows_sent: Vec<f64>,
    pub rows_examined: Vec<f64>,
    pub rows_affected: Vec<f64>,
}

/// Accumulator for all occurrences sharing one fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub totals: EntryTotals,
    pub samples: Samples,
}

/// Seconds to whole microseconds, the resolution of slow-log timings.
pub fn to_micros(secs: f64) -> u64 {
    (secs.max(0.0) * 1e6).round() as u64
}

fn from_micros(us: u64) -> f64 {
    us as f64 / 1e6
}

impl AggregateEntry {
    /// Empty entry seeded from one occurrence of a fingerprint.
    pub fn new(event: &QueryEvent) -> Self {
        Self {
            totals: EntryTotals {
                key: event.key,
                fingerprint: event.fingerprint.clone(),
                schema: event.schema.clone(),
                first_line: event.line,
                ..EntryTotals::default()
            },
            samples: Samples::default(),
        }
    }

    /// Fold one occurrence into the entry.
    pub fn record(&mut self, event: &QueryEvent) {
        let t = &mut self.totals;
        if event.line < t.first_line {
            t.first_line = event.line;
            t.schema.clone_from(&event.schema);
        }
        t.count += 1;
        if event.last_errno != 0 {
            t.cum_errored += 1;
        }
        t.cum_killed += u64::from(event.killed);
        t.duration_us += to_micros(event.duration);
        t.lock_time_us += to_micros(event.lock_time);
        t.cum_duration = from_micros(t.duration_us);
        t.cum_lock_time = from_micros(t.lock_time_us);
        t.cum_rows_sent += event.rows_sent;
        t.cum_rows_examined += event.rows_examined;
        t.cum_rows_affected += event.rows_affected;
        t.cum_bytes_sent += event.bytes_sent;

        let s = &mut self.samples;
        s.duration.push(event.duration);
        s.bytes_sent.push(event.bytes_sent as f64);
        s.lock_time.push(event.lock_time);
        s.rows_sent.push(event.rows_sent as f64);
        s.rows_examined.push(event.rows_examined as f64);
        s.rows_affected.push(event.rows_affected as f64);
    }

    /// Sort every sample vector so the entry no longer depends on the
    /// order occurrences arrived in.
    pub fn seal(&mut self) {
        let s = &mut self.samples;
        for v in [
            &mut s.duration,
            &mut s.bytes_sent,
            &mut s.lock_time,
            &mut s.rows_sent,
            &mut s.rows_examined,
            &mut s.rows_affected,
        ] {
            v.sort_unstable_by(f64::total_cmp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(duration: f64, errno: u32, killed: u32) -> QueryEvent {
        let fingerprint = "select ?".to_string();
        QueryEvent {
            key: FingerprintKey::of(&fingerprint),
            fingerprint,
            schema: "shop".to_string(),
            duration,
            lock_time: 0.5,
            rows_sent: 2,
            rows_examined: 10,
            rows_affected: 1,
            bytes_sent: 100,
            last_errno: errno,
            killed,
            ..QueryEvent::default()
        }
    }

    #[test]
    fn test_record_accumulates_sums_and_samples() {
        let first = event(1.0, 0, 0);
        let mut entry = AggregateEntry::new(&first);
        entry.record(&first);
        entry.record(&event(3.0, 1064, 1));

        let t = &entry.totals;
        assert_eq!(t.count, 2);
        assert_eq!(t.schema, "shop");
        assert_eq!(t.cum_duration, 4.0);
        assert_eq!(t.cum_lock_time, 1.0);
        assert_eq!(t.cum_rows_sent, 4);
        assert_eq!(t.cum_rows_examined, 20);
        assert_eq!(t.cum_rows_affected, 2);
        assert_eq!(t.cum_bytes_sent, 200);
        assert_eq!(t.cum_errored, 1);
        assert_eq!(t.cum_killed, 1);
        assert_eq!(entry.samples.duration, vec![1.0, 3.0]);
        assert_eq!(entry.samples.bytes_sent, vec![100.0, 100.0]);
    }

    #[test]
    fn test_sums_do_not_depend_on_order() {
        let durations = [0.1, 0.2, 0.3, 0.000_137, 12.345_678];
        let fold = |order: &[f64]| {
            let mut entry = AggregateEntry::new(&event(order[0], 0, 0));
            for &d in order {
                entry.record(&event(d, 0, 0));
            }
            entry.seal();
            entry
        };

        let forward = fold(&durations);
        let mut reversed = durations;
        reversed.reverse();
        let backward = fold(&reversed);

        assert_eq!(forward, backward);
        assert_eq!(forward.totals.duration_us, 12_945_815);
        assert_eq!(forward.totals.cum_duration, 12.945815);
        assert_eq!(forward.samples.duration[0], 0.000_137);
    }

    #[test]
    fn test_schema_comes_from_lowest_line() {
        let mut late = event(1.0, 0, 0);
        late.line = 90;
        late.schema = "archive".to_string();
        let mut early = event(1.0, 0, 0);
        early.line = 10;

        let mut entry = AggregateEntry::new(&late);
        entry.record(&late);
        entry.record(&early);
        assert_eq!(entry.totals.schema, "shop");
        assert_eq!(entry.totals.first_line, 10);
    }

    #[test]
    fn test_to_micros_rounds() {
        assert_eq!(to_micros(0.000_001), 1);
        assert_eq!(to_micros(0.1), 100_000);
        assert_eq!(to_micros(-1.0), 0);
    }
}
