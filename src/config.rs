//! Configuration options for serieslog operations.

use std::time::Duration;

use crate::model::{Timestamp, MAX_TIMESTAMP};

/// Default read-ahead for cached data-file reads (1 MiB).
pub const DEFAULT_READ_AHEAD: usize = 1024 * 1024;

/// Default interval for re-checking file size while a blocking read waits.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Tunables shared by every file a series opens.
///
/// A `Config` is passed when opening stores, readers, and writers; the
/// defaults are sensible for most workloads.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of bytes fetched on a data-file cache miss.
    ///
    /// Sequential scans are served from this single read-ahead window; a
    /// request outside the window replaces it.
    pub read_ahead: usize,

    /// How often a blocking read re-stats the file while waiting for growth.
    ///
    /// Appends made through the same process wake waiters immediately; this
    /// interval only bounds how quickly appends from *other* processes are
    /// observed.
    pub poll_interval: Duration,

    /// Whether to flush file data after every write.
    ///
    /// Off by default; turn on when durability of each record matters more
    /// than append throughput.
    pub sync_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_ahead: DEFAULT_READ_AHEAD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sync_writes: false,
        }
    }
}

/// Options for opening a [`SeriesReader`](crate::SeriesReader).
///
/// # Range semantics
///
/// `from` is exclusive: the first entry returned is the first one with a
/// timestamp strictly greater than `from`. `to` is inclusive: the reader
/// terminates once it sees an entry with a timestamp beyond `to`.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Start reading after this timestamp; `None` starts at the first record.
    pub from: Option<Timestamp>,
    /// Stop once an entry's timestamp exceeds this bound.
    pub to: Timestamp,
    /// Whether to keep waiting for future appends instead of terminating at
    /// the size observed when the reader was opened.
    pub follow: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            from: None,
            to: MAX_TIMESTAMP,
            follow: true,
        }
    }
}

impl ScanOptions {
    /// Options for a bounded scan of what is currently on disk.
    pub fn snapshot() -> Self {
        Self {
            follow: false,
            ..Self::default()
        }
    }
}
