//! Report renderers.
//!
//! Every renderer receives the final (or a periodic) [`Snapshot`] and the
//! number of entries to show. Entries are already ranked.

mod greppable;
mod json;
mod terminal;

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use crate::storage::model::Snapshot;

/// Available report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable report.
    #[default]
    Terminal,
    /// Pretty-printed JSON document.
    Json,
    /// One `;`-separated line per entry.
    Greppable,
    /// Renders nothing; useful for benchmarking and cache warm-up.
    Null,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Terminal,
        OutputFormat::Json,
        OutputFormat::Greppable,
        OutputFormat::Null,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Terminal => "terminal",
            OutputFormat::Json => "json",
            OutputFormat::Greppable => "greppable",
            OutputFormat::Null => "null",
        }
    }

    /// Write `snapshot` showing at most `limit` entries.
    pub fn render(&self, snapshot: &Snapshot, limit: usize, w: &mut dyn Write) -> io::Result<()> {
        match self {
            OutputFormat::Terminal => terminal::render(snapshot, limit, w),
            OutputFormat::Json => json::render(snapshot, limit, w),
            OutputFormat::Greppable => greppable::render(snapshot, limit, w),
            OutputFormat::Null => Ok(()),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::ALL
            .into_iter()
            .find(|o| o.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = OutputFormat::ALL.iter().map(|o| o.as_str()).collect();
                format!("unknown output '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::SortSpec;
    use crate::storage::model::{AggregateEntry, GlobalMeta, QueryEvent, ServerInfo, Snapshot};
    use chrono::{TimeZone, Utc};

    /// Two-entry snapshot spanning ten seconds.
    pub fn snapshot() -> Snapshot {
        let mut meta = GlobalMeta::new(ServerInfo {
            binary: "/usr/sbin/mysqld".to_string(),
            version_short: "5.7.24".to_string(),
            version: "5.7.24-log".to_string(),
            version_description: "MySQL Community Server (GPL)".to_string(),
            tcp_port: 3306,
            unix_socket: "/var/run/mysqld/mysqld.sock".to_string(),
        });
        meta.observe(Some(Utc.with_ymd_and_hms(2018, 12, 17, 15, 18, 0).unwrap()));
        meta.observe(Some(Utc.with_ymd_and_hms(2018, 12, 17, 15, 18, 10).unwrap()));
        meta.query_count = 3;
        meta.cum_bytes = 300;
        meta.cum_lines = 30;

        let slow = QueryEvent {
            fingerprint: "select * from t where id = ?;".to_string(),
            schema: "shop".to_string(),
            duration: 2.0,
            bytes_sent: 100,
            ..QueryEvent::default()
        };
        let fast = QueryEvent {
            fingerprint: "select ?;".to_string(),
            duration: 0.001,
            bytes_sent: 100,
            ..QueryEvent::default()
        };
        let mut a = AggregateEntry::new(&slow);
        a.record(&slow);
        a.record(&slow);
        let mut b = AggregateEntry::new(&fast);
        b.record(&fast);

        Snapshot::build(meta, &[a, b], SortSpec::default(), true)
    }
}
