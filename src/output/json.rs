use std::io::{self, Write};

use serde::Serialize;

use crate::stats::DistributionStats;
use crate::storage::model::{GlobalMeta, RankedEntry, Snapshot};

#[derive(Serialize)]
struct Report<'a> {
    #[serde(rename = "final")]
    is_final: bool,
    meta: &'a GlobalMeta,
    queries: Vec<QueryReport<'a>>,
}

#[derive(Serialize)]
struct QueryReport<'a> {
    pos: usize,
    id: String,
    fingerprint: &'a str,
    schema: &'a str,
    calls: u64,
    cum_errored: u64,
    cum_killed: u64,
    cum_query_time: f64,
    cum_lock_time: f64,
    cum_rows_sent: u64,
    cum_rows_examined: u64,
    cum_rows_affected: u64,
    cum_bytes_sent: u64,
    stats: &'a DistributionStats,
}

impl<'a> QueryReport<'a> {
    fn new(pos: usize, entry: &'a RankedEntry) -> Self {
        let t = &entry.totals;
        Self {
            pos,
            id: t.key.to_string(),
            fingerprint: &t.fingerprint,
            schema: &t.schema,
            calls: t.count,
            cum_errored: t.cum_errored,
            cum_killed: t.cum_killed,
            cum_query_time: t.cum_duration,
            cum_lock_time: t.cum_lock_time,
            cum_rows_sent: t.cum_rows_sent,
            cum_rows_examined: t.cum_rows_examined,
            cum_rows_affected: t.cum_rows_affected,
            cum_bytes_sent: t.cum_bytes_sent,
            stats: &entry.stats,
        }
    }
}

pub(super) fn render(snapshot: &Snapshot, limit: usize, w: &mut dyn Write) -> io::Result<()> {
    let report = Report {
        is_final: snapshot.is_final,
        meta: &snapshot.meta,
        queries: snapshot
            .top(limit)
            .iter()
            .enumerate()
            .map(|(idx, entry)| QueryReport::new(idx + 1, entry))
            .collect(),
    };
    serde_json::to_writer_pretty(&mut *w, &report).map_err(io::Error::other)?;
    writeln!(w)
}
