//! Follow source for a growing slow-log file.
//!
//! [`Follower`] is a blocking [`Read`] adapter: it forwards bytes as they are
//! appended and sleeps while there is nothing new. Rotation is detected via
//! inode change (Unix) or a size smaller than the read offset; the new file is
//! then read from its start.
//!
//! The stream only ends when the stop flag is raised.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};

/// Delay between polls when no new data is available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reads a file from the start and keeps reading what gets appended.
pub struct Follower {
    path: PathBuf,
    file: File,
    offset: u64,
    inode: u64,
    poll: Duration,
    stop: Option<Arc<AtomicBool>>,
}

impl Follower {
    /// Open `path` for following, starting at offset 0.
    ///
    /// Returns `Err` if the file does not exist or cannot be opened.
    pub fn new(path: PathBuf) -> io::Result<Self> {
        let file = File::open(&path)?;
        let inode = get_inode(&file.metadata()?);

        Ok(Self {
            path,
            file,
            offset: 0,
            inode,
            poll: DEFAULT_POLL_INTERVAL,
            stop: None,
        })
    }

    /// Report end-of-stream once `flag` is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    fn stopped(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Re-open the file when it was rotated or truncated. Returns whether it
    /// was re-opened.
    fn check_rotation(&mut self) -> io::Result<bool> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            // rotation in progress, try next time
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        let current_inode = get_inode(&metadata);
        if current_inode != self.inode || metadata.len() < self.offset {
            info!(path = %self.path.display(), "log rotated, reading from start");
            self.file = File::open(&self.path)?;
            self.inode = current_inode;
            self.offset = 0;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Read for Follower {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.stopped() {
                debug!("follow stopped");
                return Ok(0);
            }

            let n = self.file.read(buf)?;
            if n > 0 {
                self.offset += n as u64;
                return Ok(n);
            }

            if self.check_rotation()? {
                continue;
            }
            std::thread::sleep(self.poll);
        }
    }
}

/// Extract inode from file metadata (Linux-specific).
#[cfg(unix)]
fn get_inode(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

/// Fallback for non-Unix: always returns 0, relying on size-based rotation detection.
#[cfg(not(unix))]
fn get_inode(_metadata: &fs::Metadata) -> u64 {
    0
}
