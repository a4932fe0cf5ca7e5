//! Appending records to a single series with monotonicity enforcement.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Access, Record, Timestamp};
use crate::series::SeriesStore;

/// A sink for records.
///
/// Implemented by [`SeriesWriter`] for plain records and by
/// [`Multiplexer`](crate::Multiplexer) for series-tagged ones.
#[async_trait]
pub trait RecordSink: Send {
    type Item: Send + 'static;

    async fn write(&mut self, item: Self::Item) -> Result<()>;

    /// Flushes and releases the underlying resources. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// The exclusive writer of one series.
///
/// At most one `SeriesWriter` may hold a series at a time; a second open
/// waits until the holder closes. Timestamps must be strictly increasing
/// across the whole life of the series, including previous writers. A record
/// without a timestamp is stamped from the clock.
///
/// A rejected write leaves the series untouched.
pub struct SeriesWriter {
    store: Arc<SeriesStore>,
    last_timestamp: Option<Timestamp>,
    clock: Arc<dyn Clock>,
}

impl SeriesWriter {
    /// Opens `name` in `dir` for appending, creating the series if absent.
    pub async fn open(dir: impl AsRef<Path>, name: &str, config: &Config) -> Result<Self> {
        Self::open_with_clock(dir, name, config, Arc::new(SystemClock)).await
    }

    /// Opens with an explicit clock for timestamp defaulting.
    pub async fn open_with_clock(
        dir: impl AsRef<Path>,
        name: &str,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = Arc::new(SeriesStore::open(dir, name, Access::ReadWrite, config).await?);

        // Resume the monotonicity floor from the last record on disk.
        let len = store.len().await?;
        let last_timestamp = if len > 0 {
            let (timestamp, _) = store.read(len - 1, false).await?;
            Some(timestamp)
        } else {
            None
        };

        Ok(Self {
            store,
            last_timestamp,
            clock,
        })
    }

    /// Appends one record and returns the timestamp it was stored under.
    pub async fn write(&mut self, record: impl Into<Record> + Send) -> Result<Timestamp> {
        let record = record.into();
        let timestamp = record
            .timestamp
            .unwrap_or_else(|| self.clock.now_millis());

        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                warn!(
                    series = self.store.name(),
                    timestamp,
                    min = last + 1,
                    "rejecting out-of-order record"
                );
                return Err(Error::NonMonotonic {
                    timestamp,
                    min: last + 1,
                });
            }
        }

        self.store.write(timestamp, record.value).await?;
        self.last_timestamp = Some(timestamp);
        Ok(timestamp)
    }

    /// Timestamp of the most recent record, if any.
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.last_timestamp
    }

    /// Name of the series being written.
    pub fn series(&self) -> &str {
        self.store.name()
    }
}

#[async_trait]
impl RecordSink for SeriesWriter {
    type Item = Record;

    async fn write(&mut self, item: Record) -> Result<()> {
        SeriesWriter::write(self, item).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.store.close().await;
        Ok(())
    }
}
