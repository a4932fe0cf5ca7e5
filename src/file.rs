//! Positioned byte-level file access with blocking reads and read-ahead.
//!
//! [`ByteFile`] wraps a file descriptor with the primitives the block layer
//! needs: positional reads that can wait for the file to grow, appends that
//! publish the new size to waiters, an exclusive-lock handshake for writers,
//! and a single read-ahead window for sequential payload scans.
//!
//! Growth by the same process is observed immediately through a watch
//! channel; growth by other processes is picked up by re-checking the file
//! size every [`Config::poll_interval`].

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fs2::FileExt as _;
use tokio::sync::watch;
use tokio::task;
use tracing::trace;

use crate::config::Config;
use crate::error::{Error, Result};

pub(crate) struct ByteFile {
    path: PathBuf,
    file: Option<Arc<std::fs::File>>,
    locked: bool,
    size_tx: watch::Sender<u64>,
    cache_offset: u64,
    cache: Bytes,
    read_ahead: usize,
    poll_interval: Duration,
    sync_writes: bool,
}

impl ByteFile {
    pub fn new(path: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            path: path.into(),
            file: None,
            locked: false,
            size_tx: watch::channel(0).0,
            cache_offset: 0,
            cache: Bytes::new(),
            read_ahead: config.read_ahead,
            poll_interval: config.poll_interval,
            sync_writes: config.sync_writes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current known size of the file in bytes.
    pub fn size(&self) -> u64 {
        *self.size_tx.borrow()
    }

    /// Opens the file for shared reading. No lock is taken.
    pub fn open_read(&mut self) -> Result<()> {
        let file = std::fs::File::open(&self.path).map_err(|e| self.map_open_error(e))?;
        let size = file.metadata()?.len();
        self.file = Some(Arc::new(file));
        self.size_tx.send_replace(size);
        Ok(())
    }

    /// Opens the file for reading and appending, taking the exclusive lock.
    ///
    /// Never truncates. With `blocking` the call waits for the lock on a
    /// blocking thread; otherwise a held lock surfaces as [`Error::Locked`].
    pub async fn open_read_write(&mut self, blocking: bool, create: bool) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(&self.path)
            .map_err(|e| self.map_open_error(e))?;
        let file = Arc::new(file);

        if blocking {
            let handle = Arc::clone(&file);
            task::spawn_blocking(move || handle.lock_exclusive())
                .await
                .map_err(|e| Error::TaskFailed(e.to_string()))??;
        } else {
            file.try_lock_exclusive().map_err(|e| {
                if e.kind() == io::ErrorKind::WouldBlock {
                    Error::Locked {
                        path: self.path.clone(),
                    }
                } else {
                    Error::Io(e)
                }
            })?;
        }
        self.locked = true;

        let size = file.metadata()?.len();
        self.file = Some(file);
        self.size_tx.send_replace(size);
        Ok(())
    }

    /// Reads up to `size` bytes at `offset`.
    ///
    /// The read waits (or fails with [`Error::WouldBlock`] when not
    /// `blocking`) until at least `min_size` bytes past `offset` exist;
    /// `min_size` defaults to `size`. Once available, everything between
    /// `offset` and the current end of file is returned, capped at `size`.
    pub async fn read(
        &mut self,
        offset: u64,
        size: usize,
        blocking: bool,
        min_size: Option<usize>,
    ) -> Result<Bytes> {
        let min = min_size.unwrap_or(size);
        let need = offset + min as u64;

        if self.size() < need {
            self.refresh_size();
        }
        if self.size() < need {
            if !blocking {
                return Err(Error::WouldBlock);
            }
            self.wait_for(need).await?;
        }

        let file = self.require_file()?;
        let available = self.size().saturating_sub(offset);
        let len = (size as u64).min(available) as usize;

        let handle = Arc::clone(file);
        let data = task::spawn_blocking(move || -> io::Result<Vec<u8>> {
            let mut buf = vec![0u8; len];
            handle.read_exact_at(&mut buf, offset)?;
            Ok(buf)
        })
        .await
        .map_err(|e| Error::TaskFailed(e.to_string()))??;

        Ok(Bytes::from(data))
    }

    /// Reads through the single read-ahead window.
    ///
    /// A request inside the current window is served without touching the
    /// file; a miss fetches `read_ahead` bytes (or `size`, whichever is
    /// larger) and replaces the window. Safe because the file is append-only
    /// and cached bytes never change.
    pub async fn cached_read(&mut self, offset: u64, size: usize, blocking: bool) -> Result<Bytes> {
        let end = offset + size as u64;
        let cache_end = self.cache_offset + self.cache.len() as u64;
        if offset >= self.cache_offset && end <= cache_end {
            let start = (offset - self.cache_offset) as usize;
            return Ok(self.cache.slice(start..start + size));
        }

        trace!(path = %self.path.display(), offset, size, "read-ahead cache miss");
        let fetch = self.read_ahead.max(size);
        let data = self.read(offset, fetch, blocking, Some(size)).await?;
        self.cache_offset = offset;
        self.cache = data.clone();
        Ok(data.slice(..size))
    }

    /// Writes `data` at `offset`, defaulting to the current end of file.
    ///
    /// Returns the offset written at and the number of bytes written. The
    /// published size is updated before a short write is reported, so readers
    /// never see less than what landed on disk.
    pub async fn write(&mut self, offset: Option<u64>, data: Vec<u8>) -> Result<(u64, usize)> {
        let file = self.require_file()?;
        let offset = offset.unwrap_or_else(|| self.size());
        let expected = data.len();
        let sync = self.sync_writes;

        let handle = Arc::clone(file);
        let written = task::spawn_blocking(move || -> io::Result<usize> {
            let written = handle.write_at(&data, offset)?;
            if sync {
                handle.sync_data()?;
            }
            Ok(written)
        })
        .await
        .map_err(|e| Error::TaskFailed(e.to_string()))??;

        let new_size = self.size().max(offset + written as u64);
        self.size_tx.send_replace(new_size);

        if written < expected {
            return Err(Error::PartialWrite { written, expected });
        }
        Ok((offset, written))
    }

    /// Re-checks the size on disk, waking blocked readers if it grew.
    pub fn refresh_size(&self) {
        if let Ok(meta) = std::fs::metadata(&self.path) {
            if meta.len() != self.size() {
                self.size_tx.send_replace(meta.len());
            }
        }
    }

    /// Releases the lock, if held, and drops the descriptor. Idempotent.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if self.locked {
                let _ = fs2::FileExt::unlock(&*file);
            }
        }
        self.locked = false;
        self.cache = Bytes::new();
        self.cache_offset = 0;
    }

    async fn wait_for(&self, need: u64) -> Result<()> {
        let mut rx = self.size_tx.subscribe();
        loop {
            if *rx.borrow_and_update() >= need {
                return Ok(());
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(Error::Closed);
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    self.refresh_size();
                }
            }
        }
    }

    fn require_file(&self) -> Result<&Arc<std::fs::File>> {
        self.file.as_ref().ok_or(Error::Closed)
    }

    fn map_open_error(&self, e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::NotFound {
            Error::NotFound {
                path: self.path.clone(),
            }
        } else {
            Error::Io(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> Config {
        Config {
            poll_interval: Duration::from_millis(5),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn should_roundtrip_written_bytes() {
        // given
        let dir = tempdir().unwrap();
        let mut file = ByteFile::new(dir.path().join("f"), &config());
        file.open_read_write(false, true).await.unwrap();

        // when
        let (offset, written) = file.write(None, b"hello".to_vec()).await.unwrap();
        let data = file.read(0, 5, false, None).await.unwrap();

        // then
        assert_eq!(offset, 0);
        assert_eq!(written, 5);
        assert_eq!(data.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn should_append_at_end_by_default() {
        // given
        let dir = tempdir().unwrap();
        let mut file = ByteFile::new(dir.path().join("f"), &config());
        file.open_read_write(false, true).await.unwrap();
        file.write(None, b"abc".to_vec()).await.unwrap();

        // when
        let (offset, _) = file.write(None, b"def".to_vec()).await.unwrap();

        // then
        assert_eq!(offset, 3);
        assert_eq!(file.size(), 6);
        let data = file.read(0, 6, false, None).await.unwrap();
        assert_eq!(data.as_ref(), b"abcdef");
    }

    #[tokio::test]
    async fn should_fail_non_blocking_read_past_end() {
        // given
        let dir = tempdir().unwrap();
        let mut file = ByteFile::new(dir.path().join("f"), &config());
        file.open_read_write(false, true).await.unwrap();
        file.write(None, b"ab".to_vec()).await.unwrap();

        // when
        let result = file.read(0, 3, false, None).await;

        // then
        assert!(matches!(result, Err(Error::WouldBlock)));
    }

    #[tokio::test]
    async fn should_block_until_another_handle_appends() {
        // given
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        let mut writer = ByteFile::new(&path, &config());
        writer.open_read_write(false, true).await.unwrap();
        writer.write(None, b"a".to_vec()).await.unwrap();

        let mut reader = ByteFile::new(&path, &config());
        reader.open_read().unwrap();

        // when
        let append = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer.write(None, b"bc".to_vec()).await.unwrap();
        });
        let data = reader.read(0, 3, true, None).await.unwrap();
        append.await.unwrap();

        // then
        assert_eq!(data.as_ref(), b"abc");
    }

    #[tokio::test]
    async fn should_report_locked_to_a_second_writer() {
        // given
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        let mut first = ByteFile::new(&path, &config());
        first.open_read_write(false, true).await.unwrap();

        // when
        let mut second = ByteFile::new(&path, &config());
        let result = second.open_read_write(false, true).await;

        // then
        assert!(matches!(result, Err(Error::Locked { .. })));
    }

    #[tokio::test]
    async fn should_allow_locking_again_after_close() {
        // given
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        let mut first = ByteFile::new(&path, &config());
        first.open_read_write(false, true).await.unwrap();
        first.close();

        // when
        let mut second = ByteFile::new(&path, &config());
        let result = second.open_read_write(false, true).await;

        // then
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn should_not_truncate_existing_content_on_open() {
        // given
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        let mut file = ByteFile::new(&path, &config());
        file.open_read_write(false, true).await.unwrap();
        file.write(None, b"keep".to_vec()).await.unwrap();
        file.close();

        // when
        let mut reopened = ByteFile::new(&path, &config());
        reopened.open_read_write(false, true).await.unwrap();

        // then
        assert_eq!(reopened.size(), 4);
    }

    #[tokio::test]
    async fn should_return_not_found_for_missing_read_only_file() {
        // given
        let dir = tempdir().unwrap();
        let mut file = ByteFile::new(dir.path().join("absent"), &config());

        // when
        let result = file.open_read();

        // then
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn should_serve_repeat_reads_from_the_cache_window() {
        // given
        let dir = tempdir().unwrap();
        let mut file = ByteFile::new(dir.path().join("f"), &config());
        file.open_read_write(false, true).await.unwrap();
        file.write(None, b"0123456789".to_vec()).await.unwrap();

        // when
        let first = file.cached_read(0, 4, false).await.unwrap();
        let second = file.cached_read(4, 4, false).await.unwrap();

        // then
        assert_eq!(first.as_ref(), b"0123");
        assert_eq!(second.as_ref(), b"4567");
    }

    #[tokio::test]
    async fn should_close_idempotently() {
        // given
        let dir = tempdir().unwrap();
        let mut file = ByteFile::new(dir.path().join("f"), &config());
        file.open_read_write(false, true).await.unwrap();

        // when
        file.close();
        file.close();

        // then
        assert!(matches!(
            file.read(0, 1, false, None).await,
            Err(Error::Closed) | Err(Error::WouldBlock)
        ));
    }
}
