//! Distribution statistics derived from per-entry sample vectors.
//!
//! Computed at snapshot time only; the aggregator never keeps derived values.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::config::{SortKey, SortSpec};
use crate::storage::model::{EntryTotals, RankedEntry};

/// Query-time distribution of one fingerprint, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub p50: f64,
    pub p95: f64,
    /// `100 * cumulative time / observed span`; may exceed 100 when queries
    /// overlap.
    pub concurrency: f64,
}

/// Compute the distribution of `samples`.
///
/// `span_secs` is the observed wall-clock span of the whole log; concurrency
/// is 0 when it is unknown or empty.
pub fn distribution(samples: &[f64], cum_duration: f64, span_secs: Option<f64>) -> DistributionStats {
    let concurrency = match span_secs {
        Some(span) if span > 0.0 => 100.0 * cum_duration / span,
        _ => 0.0,
    };

    if samples.is_empty() {
        return DistributionStats {
            concurrency,
            ..DistributionStats::default()
        };
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;

    DistributionStats {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean,
        stddev: stddev(&sorted, mean),
        p50: percentile(&sorted, 0.50),
        p95: percentile(&sorted, 0.95),
        concurrency,
    }
}

/// Sample standard deviation (n - 1 denominator); 0 below two samples.
fn stddev(samples: &[f64], mean: f64) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let ss: f64 = samples.iter().map(|x| (x - mean) * (x - mean)).sum();
    (ss / (samples.len() - 1) as f64).sqrt()
}

/// Linear interpolation between closest ranks; `sorted` must be ascending
/// and non-empty.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn sort_value(totals: &EntryTotals, key: SortKey) -> f64 {
    match key {
        SortKey::Time => totals.cum_duration,
        SortKey::Count => totals.count as f64,
        SortKey::Bytes => totals.cum_bytes_sent as f64,
        SortKey::LockTime => totals.cum_lock_time,
        SortKey::RowsSent => totals.cum_rows_sent as f64,
        SortKey::RowsExamined => totals.cum_rows_examined as f64,
        SortKey::RowsAffected => totals.cum_rows_affected as f64,
    }
}

/// Order entries by `sort`; descending unless reversed. Ties fall back to
/// the fingerprint key so equal values keep a stable order across runs.
pub fn rank(entries: &mut [RankedEntry], sort: SortSpec) {
    entries.sort_unstable_by(|a, b| {
        compare(&a.totals, &b.totals, sort).then_with(|| a.totals.key.cmp(&b.totals.key))
    });
}

/// Rank order of two entries under `sort`.
pub fn compare(a: &EntryTotals, b: &EntryTotals, sort: SortSpec) -> Ordering {
    let ord = sort_value(a, sort.key).total_cmp(&sort_value(b, sort.key));
    if sort.reverse { ord } else { ord.reverse() }
}
