//! Fixed-size block access on top of [`ByteFile`].
//!
//! A block region starts at a byte offset inside the file (past the magic)
//! and is addressed by 0-based block number. Only whole blocks count: a
//! trailing partial block, such as one mid-append, is invisible until it is
//! complete.

use std::cmp::Ordering;

use bytes::Bytes;

use crate::error::Result;
use crate::file::ByteFile;

/// How a single block read should behave.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockReadOptions {
    /// Wait for the block to exist instead of failing with `WouldBlock`.
    pub blocking: bool,
    /// Serve the read through the file's read-ahead window.
    pub cached: bool,
}

/// Reads fixed-size blocks from a region of a [`ByteFile`].
pub(crate) struct BlockReader {
    offset: u64,
    block_size: usize,
}

impl BlockReader {
    pub fn new(offset: u64, block_size: usize) -> Self {
        Self { offset, block_size }
    }

    /// Number of complete blocks currently in the region.
    pub fn len(&self, file: &ByteFile) -> u64 {
        file.size().saturating_sub(self.offset) / self.block_size as u64
    }

    /// Reads block `n`.
    pub async fn read_block(
        &self,
        file: &mut ByteFile,
        n: u64,
        opts: BlockReadOptions,
    ) -> Result<Bytes> {
        let at = self.offset + n * self.block_size as u64;
        if opts.cached {
            file.cached_read(at, self.block_size, opts.blocking).await
        } else {
            file.read(at, self.block_size, opts.blocking, None).await
        }
    }

    /// Lower-bound binary search over the ordered block region.
    ///
    /// `cmp` reports how the probed block compares to the needle. Returns the
    /// number of the first block that is not `Less`, which is `len` when every
    /// block is. With duplicate keys the lowest matching block wins.
    pub async fn bisect<F>(&self, file: &mut ByteFile, cmp: F) -> Result<u64>
    where
        F: Fn(&[u8]) -> Ordering,
    {
        let opts = BlockReadOptions {
            blocking: false,
            cached: false,
        };
        let mut lo = 0;
        let mut hi = self.len(file);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let block = self.read_block(file, mid, opts).await?;
            if cmp(&block) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }
}

/// Appends fixed-size blocks to the end of a region.
pub(crate) struct BlockAppender {
    offset: u64,
    block_size: usize,
    ptr: u64,
}

impl BlockAppender {
    /// Creates an appender positioned after the last complete block on disk.
    pub fn new(file: &ByteFile, offset: u64, block_size: usize) -> Self {
        let ptr = file.size().saturating_sub(offset) / block_size as u64;
        Self {
            offset,
            block_size,
            ptr,
        }
    }

    /// Appends one block and returns its block number.
    pub async fn append(&mut self, file: &mut ByteFile, block: Vec<u8>) -> Result<u64> {
        assert_eq!(block.len(), self.block_size);
        let at = self.offset + self.ptr * self.block_size as u64;
        file.write(Some(at), block).await?;
        let n = self.ptr;
        self.ptr += 1;
        Ok(n)
    }
}
