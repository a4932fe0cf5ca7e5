//! Error and Result types for serieslog operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::Timestamp;

/// A convenience `Result` type for serieslog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all storage and stream operations.
///
/// Variants map onto the failure classes callers are expected to react to
/// differently: [`Error::NotFound`] supports fall-back to auto-creation,
/// [`Error::Locked`] and [`Error::WouldBlock`] are caller-retriable, and the
/// format errors ([`Error::InvalidMagic`]) are fatal for the affected pair.
#[derive(Debug, Error)]
pub enum Error {
    /// Series files absent when opened read-only.
    #[error("series file not found: {path}")]
    NotFound {
        /// Path of the missing file.
        path: PathBuf,
    },

    /// File magic missing, truncated, or not matching.
    #[error("invalid file magic: {path}")]
    InvalidMagic {
        /// Path of the offending file.
        path: PathBuf,
    },

    /// Exclusive lock already held by another opener.
    #[error("file locked by another writer: {path}")]
    Locked {
        /// Path of the locked file.
        path: PathBuf,
    },

    /// Non-monotonic timestamp rejected by the writer layer.
    #[error("timestamp {timestamp} out of order, must be at least {min}")]
    NonMonotonic {
        /// The rejected timestamp.
        timestamp: Timestamp,
        /// The minimum acceptable timestamp.
        min: Timestamp,
    },

    /// Timestamp does not fit the 48-bit on-disk field.
    #[error("timestamp {0} exceeds the 48-bit range")]
    TimestampRange(Timestamp),

    /// Data file offset does not fit the 48-bit on-disk field.
    #[error("data offset {0} exceeds the 48-bit range")]
    OffsetRange(u64),

    /// Payload does not fit the 32-bit size field of an index block.
    #[error("payload of {0} bytes exceeds the 32-bit size field")]
    PayloadTooLarge(usize),

    /// Non-blocking read with no data available yet.
    #[error("read past current end of file would block")]
    WouldBlock,

    /// Fewer bytes written than requested.
    #[error("partial write: wrote {written} of {expected} bytes")]
    PartialWrite {
        /// Bytes actually written.
        written: usize,
        /// Bytes requested.
        expected: usize,
    },

    /// Operation on a handle that has already been closed.
    #[error("handle already closed")]
    Closed,

    /// Series name unusable as a file name suffix.
    #[error("invalid series name: {0:?}")]
    InvalidSeriesName(String),

    /// A background read task failed or panicked.
    #[error("background read task failed: {0}")]
    TaskFailed(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns `true` for the caller-retriable "no data yet" condition.
    pub fn is_would_block(&self) -> bool {
        matches!(self, Error::WouldBlock)
    }
}
