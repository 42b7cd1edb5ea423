//! MySQL / MariaDB / Percona slow-query log reader.
//!
//! Frames the log into record blocks, parses each block into a
//! [`QueryEvent`](crate::storage::model::QueryEvent) and fingerprints its
//! statement. Static files and followed files share the same framer.

pub mod framer;
pub mod normalize;
pub mod parser;
pub mod tailer;

pub use framer::{BOUNDARY, FrameSummary, Framer, LineHook};
pub use normalize::{fingerprint, fingerprint_with_key};
pub use parser::parse_block;
pub use tailer::Follower;
