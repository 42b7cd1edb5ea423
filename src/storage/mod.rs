//! Data models and the on-disk result cache.

pub mod cache;
pub mod model;

pub use cache::{CacheError, CacheStore};
