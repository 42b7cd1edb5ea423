//! Sidecar cache of final results.
//!
//! The cache for `slow.log` lives next to it as `slow.log.cache`:
//!
//! ```text
//! "QDC1" | version: u16 LE | zstd(bincode(CacheRecord))
//! ```
//!
//! A cache older than its source is stale and ignored.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::model::CacheRecord;

const MAGIC: &[u8; 4] = b"QDC1";
const FORMAT_VERSION: u16 = 2;
const HEADER_LEN: usize = MAGIC.len() + 2;
const ZSTD_LEVEL: i32 = 3;

/// Reasons a cache could not be used. None of them are fatal for reads.
#[derive(Debug)]
pub enum CacheError {
    /// No sidecar file.
    Missing,
    /// The source was modified after the cache was written.
    Stale,
    Io(io::Error),
    /// Wrong magic or unsupported version.
    Format(String),
    Decode(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Missing => write!(f, "cache file not found"),
            CacheError::Stale => write!(f, "cache is older than its source"),
            CacheError::Io(e) => write!(f, "cache I/O error: {}", e),
            CacheError::Format(msg) => write!(f, "invalid cache format: {}", msg),
            CacheError::Decode(msg) => write!(f, "cache decode error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        CacheError::Io(e)
    }
}

/// Cache location for one source file.
#[derive(Debug, Clone)]
pub struct CacheStore {
    source: PathBuf,
    path: PathBuf,
}

impl CacheStore {
    pub fn for_source(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let mut path = source.clone().into_os_string();
        path.push(".cache");
        Self {
            source,
            path: PathBuf::from(path),
        }
    }

    /// Sidecar file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached record if it is present and fresh.
    pub fn load(&self) -> Result<CacheRecord, CacheError> {
        let cache_meta = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CacheError::Missing),
            Err(e) => return Err(e.into()),
        };
        let source_meta = fs::metadata(&self.source)?;
        if source_meta.modified()? > cache_meta.modified()? {
            return Err(CacheError::Stale);
        }

        let data = fs::read(&self.path)?;
        let record = decode(&data)?;
        debug!(path = %self.path.display(), entries = record.entries.len(), "cache loaded");
        Ok(record)
    }

    /// Write `record`, replacing any previous cache atomically.
    pub fn store(&self, record: &CacheRecord) -> Result<(), CacheError> {
        let data = encode(record)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;

        info!(path = %self.path.display(), bytes = data.len(), "cache written");
        Ok(())
    }
}

fn encode(record: &CacheRecord) -> Result<Vec<u8>, CacheError> {
    let raw = bincode::serialize(record).map_err(io::Error::other)?;
    let compressed = zstd::encode_all(&raw[..], ZSTD_LEVEL)?;

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

fn decode(data: &[u8]) -> Result<CacheRecord, CacheError> {
    if data.len() < HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
        return Err(CacheError::Format("bad magic".to_string()));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != FORMAT_VERSION {
        return Err(CacheError::Format(format!(
            "unsupported version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let raw = zstd::decode_all(&data[HEADER_LEN..]).map_err(|e| CacheError::Decode(e.to_string()))?;
    bincode::deserialize(&raw).map_err(|e| CacheError::Decode(e.to_string()))
}
