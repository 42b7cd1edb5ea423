//! Utility modules for qdigest.

mod time_parser;

use std::io::{self, Read};

pub use time_parser::{TimeParseError, parse_log_time};

/// Counts newline bytes in a stream.
///
/// Used to size static inputs before ingestion; a trailing line without a
/// newline is not counted.
pub fn count_lines<R: Read>(mut reader: R) -> io::Result<u64> {
    let mut buf = vec![0u8; 32 * 1024];
    let mut count = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(count),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        count += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
    }
}
