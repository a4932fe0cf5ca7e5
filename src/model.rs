//! Core data types for serieslog.
//!
//! This module defines the fundamental data structures used throughout the
//! API: records for writing, entries for reading, and the access mode for
//! opening a series.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Timestamp in milliseconds since the Unix epoch.
///
/// On disk, timestamps occupy a 6-byte big-endian field, so only values up to
/// [`MAX_TIMESTAMP`] are storable. Timestamps within one series are strictly
/// increasing; no two records in the same series may share a timestamp.
pub type Timestamp = u64;

/// Largest timestamp representable in the 48-bit on-disk field.
pub const MAX_TIMESTAMP: Timestamp = (1 << 48) - 1;

/// Access mode for opening a series.
///
/// A series may be opened read-only by any number of concurrent readers and
/// read-write by at most one writer, enforced by an exclusive advisory lock
/// on the index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Shared read access, no lock taken.
    ReadOnly,
    /// Exclusive append access, guarded by the index-file lock.
    ReadWrite,
}

/// A record to be appended to a series.
///
/// The value is an opaque, self-describing payload; the storage layer never
/// interprets its contents. Each record's length is carried in the index, so
/// variable-length encodings work natively.
///
/// A missing timestamp is filled in from the wall clock at write time by
/// [`SeriesWriter::write`](crate::SeriesWriter::write).
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use serieslog::Record;
///
/// // Timestamped explicitly...
/// let record = Record::with_timestamp(1_700_000_000_000, Bytes::from_static(b"42"));
/// // ...or stamped by the writer's clock.
/// let record = Record::new(Bytes::from_static(b"43"));
/// assert!(record.timestamp.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The record timestamp; `None` defers to the writer's clock.
    pub timestamp: Option<Timestamp>,
    /// The opaque record payload.
    pub value: Bytes,
}

impl Record {
    /// Creates a record that will be stamped by the writer's clock.
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            timestamp: None,
            value: value.into(),
        }
    }

    /// Creates a record with an explicit timestamp.
    pub fn with_timestamp(timestamp: Timestamp, value: impl Into<Bytes>) -> Self {
        Self {
            timestamp: Some(timestamp),
            value: value.into(),
        }
    }
}

impl From<Bytes> for Record {
    fn from(value: Bytes) -> Self {
        Record::new(value)
    }
}

impl From<Vec<u8>> for Record {
    fn from(value: Vec<u8>) -> Self {
        Record::new(value)
    }
}

/// An entry read from a series.
///
/// Entries carry the stored record plus the metadata a merged, multi-series
/// consumer needs: the originating series name and the entry's ordinal block
/// number within that series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Name of the series this entry belongs to.
    pub series: String,
    /// 0-based block number of the entry within its series.
    pub ptr: u64,
    /// The stored timestamp.
    pub timestamp: Timestamp,
    /// The stored payload.
    pub value: Bytes,
}

/// A record tagged with its destination series, as consumed by the
/// [`Multiplexer`](crate::Multiplexer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedRecord {
    /// Name of the series to append to.
    pub series: String,
    /// The record to append.
    pub record: Record,
}

impl RoutedRecord {
    /// Creates a routed record.
    pub fn new(series: impl Into<String>, record: impl Into<Record>) -> Self {
        Self {
            series: series.into(),
            record: record.into(),
        }
    }
}

impl From<Entry> for RoutedRecord {
    /// Re-routes a read entry for writing, keeping its original timestamp.
    fn from(entry: Entry) -> Self {
        RoutedRecord {
            series: entry.series,
            record: Record::with_timestamp(entry.timestamp, entry.value),
        }
    }
}

/// Validates that a series name is usable as a file name suffix.
///
/// Names become the `<name>` part of `idx-<name>` / `dat-<name>`, so they
/// must be non-empty and free of path separators and NUL bytes.
pub(crate) fn validate_series_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidSeriesName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_accept_plain_series_names() {
        assert!(validate_series_name("cpu-load").is_ok());
        assert!(validate_series_name("room.temperature").is_ok());
    }

    #[test]
    fn should_reject_unusable_series_names() {
        assert!(validate_series_name("").is_err());
        assert!(validate_series_name("a/b").is_err());
        assert!(validate_series_name("a\\b").is_err());
        assert!(validate_series_name("a\0b").is_err());
    }

    #[test]
    fn should_keep_timestamp_when_rerouting_an_entry() {
        // given
        let entry = Entry {
            series: "orders".to_string(),
            ptr: 7,
            timestamp: 1234,
            value: Bytes::from_static(b"payload"),
        };

        // when
        let routed = RoutedRecord::from(entry);

        // then
        assert_eq!(routed.series, "orders");
        assert_eq!(routed.record.timestamp, Some(1234));
        assert_eq!(routed.record.value.as_ref(), b"payload");
    }
}
