use std::io::{self, Write};

use crate::fmt::{format_millions, format_secs, format_time};
use crate::storage::model::Snapshot;

const COLUMNS: &[&str] = &[
    "1_Pos",
    "2_QueryID",
    "3_Fingerprint",
    "4_Schema",
    "5_Calls",
    "6_CumErrored",
    "7_CumKilled",
    "8_CumQueryTime(s)",
    "9_CumLockTime(s)",
    "10_CumRowsSent",
    "11_CumRowsExamined",
    "12_CumRowsAffected",
    "13_CumBytesSent",
    "14_Concurrency(%)",
    "15_Min(s)",
    "16_Max(s)",
    "17_Mean(s)",
    "18_P50(s)",
    "19_P95(s)",
    "20_StdDev(s)",
];

/// `;` inside a fingerprint would shift every following column.
fn field(s: &str) -> String {
    s.trim_end_matches(';').replace(';', ",")
}

pub(super) fn render(snapshot: &Snapshot, limit: usize, w: &mut dyn Write) -> io::Result<()> {
    let meta = &snapshot.meta;
    let server = &meta.server;
    let span = meta.span_secs().unwrap_or(0.0);

    write!(w, "# Binary:{};", server.binary)?;
    write!(w, "VersionShort:{};", server.version_short)?;
    write!(w, "Version:{};", server.version)?;
    write!(w, "VersionDescription:{};", server.version_description)?;
    write!(w, "TCPPort:{};", server.tcp_port)?;
    write!(w, "UnixSocket:{};", server.unix_socket)?;
    write!(w, "Total queries:{};", format_millions(meta.query_count))?;
    write!(w, "Total bytes:{};", format_millions(meta.cum_bytes))?;
    write!(w, "Total fingerprints:{};", meta.unique_queries)?;
    write!(w, "Capture start:{};", format_time(meta.start))?;
    write!(w, "Capture end:{};", format_time(meta.end))?;
    write!(w, "Duration:{} ({} s);", format_secs(span), span as u64)?;
    writeln!(w, "QPS:{:.0}", meta.capture_qps())?;

    writeln!(w, "# {}", COLUMNS.join(";"))?;

    for (idx, entry) in snapshot.top(limit).iter().enumerate() {
        let t = &entry.totals;
        let s = &entry.stats;
        write!(
            w,
            "{};{};{};{};{};",
            idx + 1,
            t.key.short(),
            field(&t.fingerprint),
            field(&t.schema),
            t.count
        )?;
        write!(
            w,
            "{};{};{:.6};{:.6};{};",
            t.cum_errored, t.cum_killed, t.cum_duration, t.cum_lock_time, t.cum_rows_sent
        )?;
        write!(
            w,
            "{};{};{};{:.2}%;{:.6};{:.6};",
            t.cum_rows_examined, t.cum_rows_affected, t.cum_bytes_sent, s.concurrency, s.min, s.max
        )?;
        writeln!(w, "{:.6};{:.6};{:.6};{:.6}", s.mean, s.p50, s.p95, s.stddev)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support;

    #[test]
    fn test_greppable_columns_line_up() {
        let mut out = Vec::new();
        render(&test_support::snapshot(), 20, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("# Binary:/usr/sbin/mysqld;"));
        assert!(lines[0].ends_with("QPS:0"));
        assert_eq!(lines[1].split(';').count(), COLUMNS.len());

        let row: Vec<&str> = lines[2].split(';').collect();
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[0], "1");
        assert_eq!(row[2], "select * from t where id = ?");
        assert_eq!(row[3], "shop");
        assert_eq!(row[4], "2");
        assert_eq!(row[7], "4.000000");
        assert_eq!(row[13], "40.00%");
    }
}
