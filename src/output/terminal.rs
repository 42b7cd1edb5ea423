use std::io::{self, Write};

use crate::fmt::{format_bytes, format_millions, format_secs, format_time};
use crate::storage::model::Snapshot;

pub(super) fn render(snapshot: &Snapshot, limit: usize, w: &mut dyn Write) -> io::Result<()> {
    let meta = &snapshot.meta;
    let server = &meta.server;

    if !snapshot.is_final {
        writeln!(w, "\n# Partial results")?;
    }

    writeln!(w, "\n# Server Info\n")?;
    writeln!(w, "  Binary             : {}", server.binary)?;
    writeln!(w, "  VersionShort       : {}", server.version_short)?;
    writeln!(w, "  Version            : {}", server.version)?;
    writeln!(w, "  VersionDescription : {}", server.version_description)?;
    writeln!(w, "  TCPPort            : {}", server.tcp_port)?;
    writeln!(w, "  UnixSocket         : {}", server.unix_socket)?;

    writeln!(w, "\n# Internal Analyzer Statistics\n")?;
    writeln!(w, "  Duration  : {:>14.3}s", meta.analysis_secs)?;
    writeln!(
        w,
        "  Log lines : {:>14.3}M ({})",
        meta.cum_lines as f64 / 1_000_000.0,
        meta.cum_lines
    )?;
    writeln!(w, "  Lines/s   : {:>14.3}", meta.lines_per_sec)?;
    writeln!(w, "  Bytes/s   : {:>14.3}", meta.bytes_per_sec)?;
    writeln!(w, "  Queries/s : {:>14.3}", meta.queries_per_sec)?;

    let span = meta.span_secs().unwrap_or(0.0);
    writeln!(w, "\n# Global Statistics\n")?;
    writeln!(w, "  Total queries      : {}", format_millions(meta.query_count))?;
    writeln!(
        w,
        "  Total bytes        : {} ({})",
        format_millions(meta.cum_bytes),
        format_bytes(meta.cum_bytes)
    )?;
    writeln!(w, "  Total fingerprints : {}", meta.unique_queries)?;
    writeln!(w, "  Capture start      : {}", format_time(meta.start))?;
    writeln!(w, "  Capture end        : {}", format_time(meta.end))?;
    writeln!(w, "  Duration           : {} ({} s)", format_secs(span), span as u64)?;
    writeln!(w, "  QPS                : {:.0}", meta.capture_qps())?;
    if meta.key_collisions > 0 {
        writeln!(w, "  Key collisions     : {}", meta.key_collisions)?;
    }

    writeln!(w, "\n# Queries")?;
    for (idx, entry) in snapshot.top(limit).iter().enumerate() {
        let t = &entry.totals;
        let s = &entry.stats;
        writeln!(w, "\n# Query #{}: {}\n", idx + 1, t.key.short())?;
        writeln!(w, "  Fingerprint     : {}", t.fingerprint)?;
        writeln!(w, "  Schema          : {}", t.schema)?;
        writeln!(w, "  Calls           : {}", t.count)?;
        writeln!(w, "  CumErrored      : {}", t.cum_errored)?;
        writeln!(w, "  CumKilled       : {}", t.cum_killed)?;
        writeln!(w, "  CumQueryTime    : {}", format_secs(t.cum_duration))?;
        writeln!(w, "  CumLockTime     : {}", format_secs(t.cum_lock_time))?;
        writeln!(w, "  CumRowsSent     : {}", t.cum_rows_sent)?;
        writeln!(w, "  CumRowsExamined : {}", t.cum_rows_examined)?;
        writeln!(w, "  CumRowsAffected : {}", t.cum_rows_affected)?;
        writeln!(w, "  CumBytesSent    : {}", t.cum_bytes_sent)?;
        writeln!(w, "  Concurrency     : {:.2}%", s.concurrency)?;
        writeln!(w, "  min / max time  : {} / {}", format_secs(s.min), format_secs(s.max))?;
        writeln!(w, "  mean time       : {}", format_secs(s.mean))?;
        writeln!(w, "  p50 time        : {}", format_secs(s.p50))?;
        writeln!(w, "  p95 time        : {}", format_secs(s.p95))?;
        writeln!(w, "  stddev time     : {}", format_secs(s.stddev))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support;

    fn rendered(limit: usize) -> String {
        let mut out = Vec::new();
        render(&test_support::snapshot(), limit, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_terminal_report_sections() {
        let text = rendered(20);
        assert!(text.contains("# Server Info"));
        assert!(text.contains("  Version            : 5.7.24-log"));
        assert!(text.contains("  TCPPort            : 3306"));
        assert!(text.contains("  Total queries      : 0.000M (3)"));
        assert!(text.contains("  Duration           : 10s (10 s)"));
        assert!(text.contains("# Query #1: "));
        assert!(text.contains("  Fingerprint     : select * from t where id = ?;"));
        assert!(text.contains("  Calls           : 2"));
        assert!(text.contains("  Concurrency     : 40.00%"));
        assert!(text.contains("  p95 time        : 2s"));
        assert!(text.contains("# Query #2: "));
        assert!(!text.contains("# Partial results"));
    }

    #[test]
    fn test_terminal_respects_limit() {
        let text = rendered(1);
        assert!(text.contains("# Query #1: "));
        assert!(!text.contains("# Query #2: "));
    }
}
