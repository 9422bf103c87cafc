//! Record framing inside segments.
//!
//! ```text
//! | length (4, big-endian) | payload (length) | length | payload | ...
//! ```

use crate::address::{Address, ADDRESS_SIZE};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the length prefix in front of every payload.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload a single frame can describe.
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize - LENGTH_PREFIX_SIZE;

/// Builds the on-disk frame for `payload`.
///
/// Callers must have checked `payload.len() <= MAX_PAYLOAD_LEN`.
pub(crate) fn encode_frame(payload: &[u8]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    frame
}

/// Total on-disk size of a frame carrying `payload_len` bytes.
#[must_use]
pub const fn frame_len(payload_len: usize) -> u64 {
    (LENGTH_PREFIX_SIZE + payload_len) as u64
}

/// Reads a frame's payload length from its prefix.
///
/// Returns `None` unless `prefix` is exactly [`LENGTH_PREFIX_SIZE`] bytes.
#[must_use]
pub fn decode_length(prefix: &[u8]) -> Option<u32> {
    let raw: [u8; LENGTH_PREFIX_SIZE] = prefix.try_into().ok()?;
    Some(u32::from_be_bytes(raw))
}

/// A record read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedRecord {
    /// Cursor immediately after this record; pass it to `retrieve` to resume.
    pub next: Address,
    /// The record payload.
    pub payload: Bytes,
}

impl RetrievedRecord {
    /// Encodes the record as the next cursor (8 bytes) followed by the
    /// payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ADDRESS_SIZE + self.payload.len());
        buf.extend_from_slice(&self.next.to_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Splits a buffer produced by [`to_bytes`](Self::to_bytes).
    ///
    /// Returns `None` if the buffer is shorter than a cursor.
    #[must_use]
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < ADDRESS_SIZE {
            return None;
        }
        let (cursor, payload) = buf.split_at(ADDRESS_SIZE);
        Some(Self {
            next: Address::from_bytes(cursor)?,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}
