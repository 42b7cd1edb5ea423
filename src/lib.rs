//! qdigest - slow-query log digest library.
//!
//! Reads MySQL / MariaDB / Percona slow-query logs, groups statements by
//! fingerprint and computes per-fingerprint statistics. Used by the `qdigest`
//! binary:
//! - [`collector`] - framing, parsing and aggregation pipeline
//! - [`storage`] - data model and result cache
//! - [`output`] - report renderers

pub mod collector;
pub mod config;
pub mod fmt;
pub mod output;
pub mod stats;
pub mod storage;
pub mod util;
