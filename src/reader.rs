//! Sequential, time-bounded reading of a single series.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, ScanOptions};
use crate::error::Result;
use crate::model::{Access, Entry, Timestamp};
use crate::series::SeriesStore;

/// A source of time-ordered entries.
///
/// `read` returns the next entry, `None` once the source is exhausted, or
/// [`Error::WouldBlock`](crate::Error::WouldBlock) when `blocking` is off and
/// the next entry has not been appended yet.
#[async_trait]
pub trait EntryRead: Send {
    async fn read(&mut self, blocking: bool) -> Result<Option<Entry>>;

    /// Releases the underlying resources. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Reads one series in timestamp order, within the bounds of its
/// [`ScanOptions`].
///
/// The start bound is resolved to a block number once, at open; records
/// appended later with smaller timestamps can never be visited because
/// appends are monotonic. Without `follow` the end is pinned to the record
/// count observed at open, so the scan terminates even while a writer keeps
/// appending.
pub struct SeriesReader {
    store: Arc<SeriesStore>,
    ptr: u64,
    limit: u64,
    to: Timestamp,
}

impl SeriesReader {
    /// Opens `name` in `dir` for reading. Creates the series if absent, so a
    /// follower can start before the first writer.
    pub async fn open(
        dir: impl AsRef<Path>,
        name: &str,
        options: ScanOptions,
        config: &Config,
    ) -> Result<Self> {
        let store = SeriesStore::open(dir, name, Access::ReadOnly, config).await?;
        Self::with_store(Arc::new(store), options).await
    }

    pub(crate) async fn with_store(store: Arc<SeriesStore>, options: ScanOptions) -> Result<Self> {
        // `from` is exclusive, so position at the first timestamp above it.
        let ptr = match options.from {
            Some(from) => store.search(from.saturating_add(1)).await?,
            None => 0,
        };
        let limit = if options.follow {
            u64::MAX
        } else {
            store.len().await?
        };
        Ok(Self {
            store,
            ptr,
            limit,
            to: options.to,
        })
    }

    /// Name of the series being read.
    pub fn series(&self) -> &str {
        self.store.name()
    }
}

#[async_trait]
impl EntryRead for SeriesReader {
    async fn read(&mut self, blocking: bool) -> Result<Option<Entry>> {
        if self.ptr >= self.limit {
            return Ok(None);
        }
        let (timestamp, value) = self.store.read(self.ptr, blocking).await?;
        if timestamp > self.to {
            return Ok(None);
        }
        let entry = Entry {
            series: self.store.name().to_string(),
            ptr: self.ptr,
            timestamp,
            value,
        };
        self.ptr += 1;
        Ok(Some(entry))
    }

    async fn close(&mut self) -> Result<()> {
        self.store.close().await;
        Ok(())
    }
}
