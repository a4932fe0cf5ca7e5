//! On-disk encoding of file headers and index blocks.
//!
//! Both files of a series start with a 4-byte magic. The index file then
//! holds fixed 16-byte blocks; the data file holds raw payloads back to
//! back, addressed by the offsets and sizes the index records.
//!
//! Index block layout, all fields big-endian:
//!
//! ```text
//! +--------------+----------------+---------------+
//! | timestamp 6B | data offset 6B | data size 4B  |
//! +--------------+----------------+---------------+
//! ```

use crate::error::{Error, Result};
use crate::model::Timestamp;

/// File magic, the UTF-8 encoding of U+1F4C8 (chart increasing).
pub(crate) const MAGIC: [u8; 4] = [0xF0, 0x9F, 0x93, 0x88];

/// Length of the magic prefix in bytes.
pub(crate) const MAGIC_LEN: u64 = MAGIC.len() as u64;

/// Size of one encoded index block in bytes.
pub(crate) const INDEX_BLOCK_SIZE: usize = 16;

/// Number of bytes in the big-endian timestamp field.
pub(crate) const TIMESTAMP_LEN: usize = 6;

/// A decoded index block: one record's timestamp and data-file location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexBlock {
    pub timestamp: Timestamp,
    pub data_offset: u64,
    pub data_size: u32,
}

impl IndexBlock {
    /// Encodes the block into its 16-byte on-disk form.
    ///
    /// The timestamp and offset must have been range-checked against the
    /// 48-bit field by the caller; out-of-range values are rejected here as
    /// a final guard.
    pub fn encode(&self) -> Result<[u8; INDEX_BLOCK_SIZE]> {
        let mut buf = [0u8; INDEX_BLOCK_SIZE];
        buf[0..6].copy_from_slice(&encode_u48(self.timestamp).ok_or(Error::TimestampRange(self.timestamp))?);
        buf[6..12].copy_from_slice(&encode_u48(self.data_offset).ok_or(Error::OffsetRange(self.data_offset))?);
        buf[12..16].copy_from_slice(&self.data_size.to_be_bytes());
        Ok(buf)
    }

    /// Decodes a 16-byte on-disk block.
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            timestamp: decode_u48(&buf[0..6]),
            data_offset: decode_u48(&buf[6..12]),
            data_size: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        }
    }
}

/// Encodes a value into 6 big-endian bytes, or `None` if it does not fit.
pub(crate) fn encode_u48(value: u64) -> Option<[u8; TIMESTAMP_LEN]> {
    if value >= 1 << 48 {
        return None;
    }
    let bytes = value.to_be_bytes();
    Some([bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]])
}

/// Decodes 6 big-endian bytes into a value.
pub(crate) fn decode_u48(buf: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[2..8].copy_from_slice(&buf[..TIMESTAMP_LEN]);
    u64::from_be_bytes(bytes)
}

/// Encodes a timestamp as the 6-byte prefix an index block starts with,
/// for byte-wise comparison during binary search.
pub(crate) fn timestamp_prefix(timestamp: Timestamp) -> Result<[u8; TIMESTAMP_LEN]> {
    encode_u48(timestamp).ok_or(Error::TimestampRange(timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_roundtrip_an_index_block() {
        // given
        let block = IndexBlock {
            timestamp: 1_700_000_000_000,
            data_offset: 4 + 1024,
            data_size: 77,
        };

        // when
        let encoded = block.encode().unwrap();
        let decoded = IndexBlock::decode(&encoded);

        // then
        assert_eq!(decoded, block);
    }

    #[test]
    fn should_encode_fields_big_endian() {
        let block = IndexBlock {
            timestamp: 0x0102_0304_0506,
            data_offset: 0x0A0B_0C0D_0E0F,
            data_size: 0x1122_3344,
        };
        let encoded = block.encode().unwrap();
        assert_eq!(
            encoded,
            [
                0x01, 0x02, 0x03, 0x04, 0x05, 0x06, // timestamp
                0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, // data offset
                0x11, 0x22, 0x33, 0x44, // data size
            ]
        );
    }

    #[test]
    fn should_reject_values_beyond_48_bits() {
        assert!(encode_u48((1 << 48) - 1).is_some());
        assert!(encode_u48(1 << 48).is_none());

        let block = IndexBlock {
            timestamp: 1 << 48,
            data_offset: 0,
            data_size: 0,
        };
        assert!(matches!(block.encode(), Err(Error::TimestampRange(_))));
    }

    #[test]
    fn should_order_timestamp_prefixes_like_timestamps() {
        let a = timestamp_prefix(999).unwrap();
        let b = timestamp_prefix(1000).unwrap();
        let c = timestamp_prefix(70_000).unwrap();
        assert!(a < b);
        assert!(b < c);
    }
}
