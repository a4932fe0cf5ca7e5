//! The per-series storage engine.
//!
//! A series is a pair of append-only files in one directory: `idx-<name>`
//! holds fixed 16-byte index blocks ordered by timestamp, `dat-<name>` holds
//! the payloads back to back. Both start with the 4-byte magic.
//!
//! [`SeriesStore`] owns the pair and exposes the record-level operations:
//! read by block number, timestamp search, and ordered append. All
//! operations funnel through one async mutex, so appends are serialized and
//! the index never interleaves.
//!
//! Opening read-write takes an exclusive advisory lock on both files,
//! waiting until a competing writer releases them. Read-only opens take no
//! lock but first ensure the pair exists with its magic in place, so a
//! reader may be started before any writer.

use std::path::Path;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::block::{BlockAppender, BlockReadOptions, BlockReader};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::file::ByteFile;
use crate::model::{validate_series_name, Access, Timestamp, MAX_TIMESTAMP};
use crate::serde::{timestamp_prefix, IndexBlock, INDEX_BLOCK_SIZE, MAGIC, MAGIC_LEN};

pub struct SeriesStore {
    name: String,
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    idx: ByteFile,
    dat: ByteFile,
    reader: BlockReader,
    appender: Option<BlockAppender>,
    closed: bool,
}

impl SeriesStore {
    /// Opens the series `name` in `dir`, creating the file pair if absent.
    pub async fn open(
        dir: impl AsRef<Path>,
        name: &str,
        access: Access,
        config: &Config,
    ) -> Result<Self> {
        validate_series_name(name)?;
        let dir = dir.as_ref();
        let mut idx = ByteFile::new(dir.join(format!("idx-{name}")), config);
        let mut dat = ByteFile::new(dir.join(format!("dat-{name}")), config);

        let opened = Self::open_files(&mut idx, &mut dat, access).await;
        if let Err(e) = opened {
            idx.close();
            dat.close();
            return Err(e);
        }

        let reader = BlockReader::new(MAGIC_LEN, INDEX_BLOCK_SIZE);
        let appender = match access {
            Access::ReadWrite => Some(BlockAppender::new(&idx, MAGIC_LEN, INDEX_BLOCK_SIZE)),
            Access::ReadOnly => None,
        };
        debug!(series = name, ?access, "series opened");

        Ok(Self {
            name: name.to_string(),
            inner: Mutex::new(StoreInner {
                idx,
                dat,
                reader,
                appender,
                closed: false,
            }),
        })
    }

    async fn open_files(idx: &mut ByteFile, dat: &mut ByteFile, access: Access) -> Result<()> {
        match access {
            Access::ReadWrite => {
                // Wait for a competing writer to release the pair.
                idx.open_read_write(true, true).await?;
                dat.open_read_write(true, true).await?;
                Self::seed_magic(idx).await?;
                Self::seed_magic(dat).await?;
            }
            Access::ReadOnly => {
                Self::probe(idx).await;
                Self::probe(dat).await;
                idx.open_read()?;
                dat.open_read()?;
            }
        }
        Self::verify_magic(idx).await?;
        Self::verify_magic(dat).await?;
        Ok(())
    }

    /// Best-effort creation pass before a read-only open. Briefly takes the
    /// write lock to lay down the file and its magic; a held lock means a
    /// writer already did, so failures are ignored.
    async fn probe(file: &mut ByteFile) {
        if file.open_read_write(false, true).await.is_ok() {
            let _ = Self::seed_magic(file).await;
        }
        file.close();
    }

    async fn seed_magic(file: &mut ByteFile) -> Result<()> {
        if file.size() == 0 {
            file.write(Some(0), MAGIC.to_vec()).await?;
        }
        Ok(())
    }

    async fn verify_magic(file: &mut ByteFile) -> Result<()> {
        let head = file
            .read(0, MAGIC.len(), false, None)
            .await
            .map_err(|e| match e {
                Error::WouldBlock => Error::InvalidMagic {
                    path: file.path().to_path_buf(),
                },
                other => other,
            })?;
        if head.as_ref() != MAGIC {
            return Err(Error::InvalidMagic {
                path: file.path().to_path_buf(),
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of records currently in the series.
    pub async fn len(&self) -> Result<u64> {
        let inner = self.inner.lock().await;
        inner.ensure_open()?;
        inner.idx.refresh_size();
        Ok(inner.reader.len(&inner.idx))
    }

    /// Reads record `n`, waiting for it to be appended when `blocking`.
    pub async fn read(&self, n: u64, blocking: bool) -> Result<(Timestamp, Bytes)> {
        let mut inner = self.inner.lock().await;
        inner.ensure_open()?;
        let StoreInner {
            idx, dat, reader, ..
        } = &mut *inner;

        let opts = BlockReadOptions {
            blocking,
            cached: false,
        };
        let block = IndexBlock::decode(&reader.read_block(idx, n, opts).await?);
        let value = dat
            .cached_read(block.data_offset, block.data_size as usize, true)
            .await?;
        Ok((block.timestamp, value))
    }

    /// Returns the number of the first record with a timestamp at or above
    /// `timestamp`, which is the record count when there is none.
    pub async fn search(&self, timestamp: Timestamp) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        inner.ensure_open()?;
        inner.idx.refresh_size();
        if timestamp > MAX_TIMESTAMP {
            return Ok(inner.reader.len(&inner.idx));
        }
        let needle = timestamp_prefix(timestamp)?;
        let StoreInner { idx, reader, .. } = &mut *inner;
        reader
            .bisect(idx, |block| block[..needle.len()].cmp(&needle))
            .await
    }

    /// Appends one record and returns its block number.
    ///
    /// The payload lands in the data file before the index block that
    /// references it, so a visible index entry always has its data.
    pub(crate) async fn write(&self, timestamp: Timestamp, value: Bytes) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        inner.ensure_open()?;

        if timestamp > MAX_TIMESTAMP {
            return Err(Error::TimestampRange(timestamp));
        }
        let data_offset = inner.dat.size();
        if data_offset > MAX_TIMESTAMP {
            return Err(Error::OffsetRange(data_offset));
        }
        let data_size =
            u32::try_from(value.len()).map_err(|_| Error::PayloadTooLarge(value.len()))?;

        let block = IndexBlock {
            timestamp,
            data_offset,
            data_size,
        }
        .encode()?;

        let StoreInner {
            idx, dat, appender, ..
        } = &mut *inner;
        let appender = appender.as_mut().ok_or(Error::Closed)?;

        dat.write(Some(data_offset), value.to_vec()).await?;
        appender.append(idx, block.to_vec()).await
    }

    /// Closes both files. Idempotent; later operations fail with
    /// [`Error::Closed`].
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.idx.close();
        inner.dat.close();
        inner.closed = true;
        debug!(series = %self.name, "series closed");
    }
}

impl StoreInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }
}
