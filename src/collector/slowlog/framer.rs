//! Slow-log framer: byte stream → record blocks.
//!
//! A slow log starts with a three-line preamble written by the server at
//! startup (and again after every `FLUSH LOGS`):
//!
//! ```text
//! /usr/sbin/mysqld, Version: 5.7.24-log (MySQL Community Server (GPL)). started with:
//! Tcp port: 3306  Unix socket: /var/run/mysqld/mysqld.sock
//! Time                 Id Command    Argument
//! ```
//!
//! followed by records, each introduced by a `# Time` line. MySQL 5.6 and
//! MariaDB write `# Time` only when the second changes, so a `# User@Host`
//! line following a statement also starts a record; that record inherits the
//! last `# Time` line seen. The framer only cuts the stream at those
//! boundaries and folds multi-line statements; field semantics are left to
//! the parser.

use std::io::BufRead;

use crossbeam::channel::Sender;
use tracing::{debug, info, warn};

use crate::collector::IngestError;
use crate::storage::model::{RawRecordBlock, ServerInfo};

/// Prefix marking the start of a record.
pub const BOUNDARY: &str = "# Time";

/// Starts a record when the current block already holds a statement.
const SECONDARY_BOUNDARY: &str = "# User@Host";

/// Lines read before records start.
const PREAMBLE_LINES: usize = 3;

/// Called with the number of physical lines read since the previous call.
pub type LineHook = Box<dyn FnMut(u64) + Send>;

/// Totals reported once the stream is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Newline-terminated lines read, preamble included.
    pub lines: u64,
    /// Blocks handed to the queue.
    pub blocks: u64,
    /// Lines dropped because their block was full.
    pub overflowed_lines: u64,
}

/// Cuts a slow-log stream into [`RawRecordBlock`]s.
pub struct Framer<R> {
    reader: R,
    buf: Vec<u8>,
    /// Physical line number of the last line read (1-based).
    line: u64,
    summary: FrameSummary,
    /// Boundary line consumed while reading the preamble.
    pending: Option<(String, u64)>,
    progress: Option<LineHook>,
}

impl<R: BufRead> Framer<R> {
    /// Read the preamble and return the framer positioned after it.
    pub fn open(reader: R) -> Result<(Self, ServerInfo), IngestError> {
        let mut framer = Self {
            reader,
            buf: Vec::with_capacity(4096),
            line: 0,
            summary: FrameSummary::default(),
            pending: None,
            progress: None,
        };

        let mut preamble = Vec::with_capacity(PREAMBLE_LINES);
        while preamble.len() < PREAMBLE_LINES {
            let Some(text) = framer.next_line()? else {
                break;
            };
            if text.starts_with(BOUNDARY) {
                framer.pending = Some((text, framer.line));
                break;
            }
            preamble.push(text);
        }

        let identity = preamble.first().map(String::as_str).unwrap_or("");
        let listeners = preamble.get(1).map(String::as_str).unwrap_or("");
        let server = match parse_server_info(identity, listeners) {
            Some(info) => {
                info!(
                    binary = %info.binary,
                    version = %info.version,
                    port = info.tcp_port,
                    "server identity"
                );
                info
            }
            None => {
                warn!("unable to parse server information; beginning of log might be missing");
                ServerInfo::unparsable()
            }
        };

        Ok((framer, server))
    }

    /// Report every line read from now on to `hook`.
    pub fn with_progress(mut self, hook: LineHook) -> Self {
        self.progress = Some(hook);
        self
    }

    /// Frame the rest of the stream, sending every block to `blocks`.
    ///
    /// Returns once the stream ends or the receiving side is gone.
    pub fn run(mut self, blocks: &Sender<RawRecordBlock>) -> Result<FrameSummary, IngestError> {
        // preamble lines were read before the hook was attached
        if let Some(hook) = self.progress.as_mut() {
            hook(self.line);
        }

        let (first, first_line) = match self.pending.take() {
            Some(pending) => pending,
            None => self.seek_boundary()?,
        };

        let mut last_time = first.clone();
        let mut block = RawRecordBlock::new(first_line);
        self.append(&mut block, first, first_line);

        while let Some(text) = self.next_line()? {
            let line = self.line;

            if text.starts_with(BOUNDARY) {
                last_time.clone_from(&text);
                let full = std::mem::replace(&mut block, RawRecordBlock::new(line));
                if !self.ship(blocks, full) {
                    return Ok(self.summary);
                }
            } else if text.starts_with(SECONDARY_BOUNDARY) && has_statement(&block) {
                let mut next = RawRecordBlock::new(line);
                self.append(&mut next, last_time.clone(), line);
                let full = std::mem::replace(&mut block, next);
                if !self.ship(blocks, full) {
                    return Ok(self.summary);
                }
            }

            if text.is_empty() || is_repeated_header(&text) {
                continue;
            }

            self.append(&mut block, text, line);
        }

        self.ship(blocks, block);
        debug!(
            lines = self.summary.lines,
            blocks = self.summary.blocks,
            overflowed = self.summary.overflowed_lines,
            "framing finished"
        );

        Ok(self.summary)
    }

    /// Skip lines until the first record boundary.
    fn seek_boundary(&mut self) -> Result<(String, u64), IngestError> {
        while let Some(text) = self.next_line()? {
            if text.starts_with(BOUNDARY) {
                return Ok((text, self.line));
            }
        }
        Err(IngestError::NoRecordBoundary)
    }

    /// Buffer `text`, folding it onto the previous line when that one is an
    /// unterminated statement.
    fn append(&mut self, block: &mut RawRecordBlock, text: String, line: u64) {
        let fold = !text.starts_with('#')
            && block
                .last()
                .is_some_and(|prev| !prev.ends_with(';') && !prev.starts_with('#'));

        let result = if fold {
            block.fold(&text, line)
        } else {
            block.push(text, line)
        };

        if let Err(e) = result {
            warn!(line = e.line, capacity = e.capacity, "record block full, line dropped");
            self.summary.overflowed_lines += 1;
        }
    }

    fn ship(&mut self, blocks: &Sender<RawRecordBlock>, block: RawRecordBlock) -> bool {
        if blocks.send(block).is_err() {
            debug!("block queue closed, framing stopped");
            return false;
        }
        self.summary.blocks += 1;
        true
    }

    /// Next line, lossily decoded and stripped of its line ending.
    fn next_line(&mut self) -> Result<Option<String>, IngestError> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }

        self.line += 1;
        if let Some(hook) = self.progress.as_mut() {
            hook(1);
        }
        if self.buf.last() == Some(&b'\n') {
            self.summary.lines += 1;
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }

        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Whether `block` already holds a non-annotation line.
fn has_statement(block: &RawRecordBlock) -> bool {
    block.lines().iter().any(|l| !l.starts_with('#'))
}

/// Preamble lines repeated mid-stream after a log flush or restart.
fn is_repeated_header(line: &str) -> bool {
    let first = line.split(' ').next().unwrap_or("");
    first.ends_with("mysqld,") || first == "Tcp" || first == "Time"
}

/// Parse `<binary>, Version: <x.y.z><suffix> (<description>). started with:`
/// plus the `Tcp port: N  Unix socket: path` line.
fn parse_server_info(identity: &str, listeners: &str) -> Option<ServerInfo> {
    let (binary, rest) = identity.split_once(',')?;
    if binary.is_empty() {
        return None;
    }

    let rest = rest.trim_start().strip_prefix("Version:")?.trim_start();
    let short_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_digit() || *b == b'.')
        .count();
    if short_len == 0 {
        return None;
    }
    let version_short = &rest[..short_len];

    let rest = &rest[short_len..];
    let suffix_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        .count();
    let suffix = &rest[..suffix_len];

    let rest = rest[suffix_len..].trim_start().strip_prefix('(')?;
    let end = rest.rfind("). started")?;
    let description = &rest[..end];

    let tcp_port = listeners
        .split_whitespace()
        .nth(2)
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);
    let unix_socket = listeners
        .split(':')
        .nth(2)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    Some(ServerInfo {
        binary: binary.to_string(),
        version_short: version_short.to_string(),
        version: format!("{}{}", version_short, suffix),
        version_description: description.to_string(),
        tcp_port,
        unix_socket,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::model::{MAX_RECORD_LINES, UNPARSABLE};
    use crossbeam::channel::unbounded;
    use std::io::Cursor;

    const PREAMBLE: &str = "/usr/sbin/mysqld, Version: 5.7.24-log (MySQL Community Server (GPL)). started with:\n\
                            Tcp port: 3306  Unix socket: /var/run/mysqld/mysqld.sock\n\
                            Time                 Id Command    Argument\n";

    fn frame(input: &str) -> Result<(ServerInfo, Vec<RawRecordBlock>, FrameSummary), IngestError> {
        let (framer, server) = Framer::open(Cursor::new(input.as_bytes().to_vec()))?;
        let (tx, rx) = unbounded();
        let summary = framer.run(&tx)?;
        drop(tx);
        Ok((server, rx.iter().collect(), summary))
    }

    #[test]
    fn test_preamble_parsed() {
        let input = format!("{}# Time: 2018-12-17T15:18:58.744913Z\nSELECT 1;\n", PREAMBLE);
        let (server, blocks, summary) = frame(&input).unwrap();

        assert_eq!(server.binary, "/usr/sbin/mysqld");
        assert_eq!(server.version_short, "5.7.24");
        assert_eq!(server.version, "5.7.24-log");
        assert_eq!(server.version_description, "MySQL Community Server (GPL)");
        assert_eq!(server.tcp_port, 3306);
        assert_eq!(server.unix_socket, "/var/run/mysqld/mysqld.sock");

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].line, 4);
        assert_eq!(blocks[0].lines(), &["# Time: 2018-12-17T15:18:58.744913Z", "SELECT 1;"]);
        assert_eq!(summary.lines, 5);
        assert_eq!(summary.blocks, 1);
    }

    #[test]
    fn test_unparsable_preamble_is_not_fatal() {
        let input = "garbage\nmore garbage\nstill garbage\n# Time: 181217 15:18:58\nSELECT 1;\n";
        let (server, blocks, _) = frame(input).unwrap();
        assert_eq!(server.binary, UNPARSABLE);
        assert_eq!(server.tcp_port, 0);
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_log_without_preamble() {
        let input = "# Time: 181217 15:18:58\nSELECT 1;\n# Time: 181217 15:18:59\nSELECT 2;\n";
        let (server, blocks, summary) = frame(input).unwrap();
        assert_eq!(server, ServerInfo::unparsable());
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].line, 1);
        assert_eq!(blocks[1].line, 3);
        assert_eq!(summary.lines, 4);
    }

    #[test]
    fn test_no_boundary_is_fatal() {
        let input = format!("{}SELECT 1;\n", PREAMBLE);
        assert!(matches!(frame(&input), Err(IngestError::NoRecordBoundary)));
        assert!(matches!(frame(""), Err(IngestError::NoRecordBoundary)));
    }

    #[test]
    fn test_multiline_statement_folds() {
        let input = format!(
            "{}# Time: 181217 15:18:58\n# Query_time: 1.0  Lock_time: 0.0  Rows_sent: 1  Rows_examined: 1\nSELECT *\n  FROM t\n  WHERE id = 1;\nSELECT 2;\n",
            PREAMBLE
        );
        let (_, blocks, _) = frame(&input).unwrap();
        assert_eq!(
            blocks[0].lines(),
            &[
                "# Time: 181217 15:18:58",
                "# Query_time: 1.0  Lock_time: 0.0  Rows_sent: 1  Rows_examined: 1",
                "SELECT *   FROM t   WHERE id = 1;",
                "SELECT 2;",
            ]
        );
        assert_eq!(blocks[0].last_line, 9);
    }

    #[test]
    fn test_repeated_headers_and_blank_lines_skipped() {
        let input = format!(
            "{}# Time: 181217 15:18:58\nSELECT 1;\n\n{}# Time: 181217 15:18:59\nSELECT 2;\n",
            PREAMBLE, PREAMBLE
        );
        let (_, blocks, summary) = frame(&input).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].lines(), &["# Time: 181217 15:18:58", "SELECT 1;"]);
        assert_eq!(blocks[1].lines(), &["# Time: 181217 15:18:59", "SELECT 2;"]);
        assert_eq!(summary.lines, 11);
    }

    #[test]
    fn test_overflow_drops_lines() {
        let mut input = format!("{}# Time: 181217 15:18:58\n", PREAMBLE);
        for i in 0..MAX_RECORD_LINES + 5 {
            input.push_str(&format!("# Extra_{}: 1\n", i));
        }
        input.push_str("# Time: 181217 15:18:59\nSELECT 2;\n");

        let (_, blocks, summary) = frame(&input).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), MAX_RECORD_LINES);
        assert_eq!(summary.overflowed_lines, 6);
        assert_eq!(blocks[1].lines(), &["# Time: 181217 15:18:59", "SELECT 2;"]);
    }

    #[test]
    fn test_crlf_and_unterminated_tail() {
        let input = "# Time: 181217 15:18:58\r\nSELECT 1;\r\n# Time: 181217 15:18:59\r\nSELECT 2;";
        let (_, blocks, summary) = frame(input).unwrap();
        assert_eq!(blocks[1].lines(), &["# Time: 181217 15:18:59", "SELECT 2;"]);
        assert_eq!(summary.lines, 3);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut input = b"# Time: 181217 15:18:58\nSELECT '".to_vec();
        input.extend_from_slice(&[0xff, 0xfe]);
        input.extend_from_slice(b"';\n");
        let (framer, _) = Framer::open(Cursor::new(input)).unwrap();
        let (tx, rx) = unbounded();
        framer.run(&tx).unwrap();
        drop(tx);
        let blocks: Vec<_> = rx.iter().collect();
        assert!(blocks[0].lines()[1].contains('\u{FFFD}'));
    }

    #[test]
    fn test_parse_server_info_variants() {
        let info = parse_server_info(
            "/usr/sbin/mysqld, Version: 10.3.11-MariaDB-1:10.3.11+maria~bionic-log (mariadb.org binary distribution). started with:",
            "Tcp port: 0  Unix socket: /run/mysqld/mysqld.sock",
        );
        // uppercase letters are outside the version suffix alphabet
        assert!(info.is_none());

        let info = parse_server_info(
            "/usr/sbin/mysqld, Version: 8.0.13 (MySQL Community Server - GPL). started with:",
            "Tcp port: 3306  Unix socket: /tmp/mysql.sock",
        )
        .unwrap();
        assert_eq!(info.version, "8.0.13");
        assert_eq!(info.version_description, "MySQL Community Server - GPL");
        assert_eq!(info.unix_socket, "/tmp/mysql.sock");
    }

    #[test]
    fn test_stops_when_receiver_gone() {
        let input = "# Time: 181217 15:18:58\nSELECT 1;\n# Time: 181217 15:18:59\nSELECT 2;\n";
        let (framer, _) = Framer::open(Cursor::new(input.as_bytes().to_vec())).unwrap();
        let (tx, rx) = unbounded();
        drop(rx);
        let summary = framer.run(&tx).unwrap();
        assert_eq!(summary.blocks, 0);
    }

    #[test]
    fn test_progress_hook_sees_every_line() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU64, Ordering};

        let input = format!(
            "{}# Time: 181217 15:18:58\nSELECT 1;\n\n# Time: 181217 15:18:59\nSELECT 2;\n",
            PREAMBLE
        );
        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();

        let (framer, _) = Framer::open(Cursor::new(input.into_bytes())).unwrap();
        let framer = framer.with_progress(Box::new(move |n| {
            counter.fetch_add(n, Ordering::Relaxed);
        }));
        let (tx, _rx) = unbounded();
        let summary = framer.run(&tx).unwrap();

        assert_eq!(summary.lines, 8);
        assert_eq!(seen.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn test_user_host_starts_record_without_time() {
        let input = format!(
            "{}# Time: 190307 10:07:54\n\
             # User@Host: app[app] @ localhost []\n\
             # Query_time: 1.0  Lock_time: 0.0  Rows_sent: 1  Rows_examined: 1\n\
             SET timestamp=1551953274;\n\
             SELECT 1;\n\
             # User@Host: app[app] @ localhost []\n\
             # Query_time: 2.0  Lock_time: 0.0  Rows_sent: 1  Rows_examined: 1\n\
             SET timestamp=1551953274;\n\
             SELECT 2;\n",
            PREAMBLE
        );
        let (_, blocks, summary) = frame(&input).unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(summary.blocks, 2);
        assert_eq!(blocks[0].lines().last().map(String::as_str), Some("SELECT 1;"));
        assert_eq!(blocks[1].line, 9);
        assert_eq!(
            blocks[1].lines(),
            &[
                "# Time: 190307 10:07:54",
                "# User@Host: app[app] @ localhost []",
                "# Query_time: 2.0  Lock_time: 0.0  Rows_sent: 1  Rows_examined: 1",
                "SET timestamp=1551953274;",
                "SELECT 2;",
            ]
        );
    }

    #[test]
    fn test_user_host_after_time_stays_in_record() {
        let input = "# Time: 190307 10:07:54\n# User@Host: app[app] @ localhost []\nSELECT 1;\n";
        let (_, blocks, _) = frame(input).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].len(), 3);
    }
}
