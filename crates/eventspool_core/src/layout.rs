//! Store directory layout and bookkeeping files.
//!
//! ```text
//! <base_dir>/<id>/
//! ├─ LOCK                          # advisory lock, single owner
//! ├─ <N>                           # segment N: length-prefixed records
//! ├─ <N>-offsetFile                # durable length of segment N (u64 BE)
//! ├─ <N>-bookKeepingOffsetFile     # provisional length at rollover (u64 BE)
//! ├─ flushedCounter                # ASCII decimal index of the flushed segment
//! └─ cleanoffsetFile               # clean boundary address (u64 BE)
//! ```
//!
//! Bookkeeping files are tiny and always replaced whole, so a crash leaves
//! either the old or the new value.

use crate::address::{Address, ADDRESS_SIZE};
use crate::error::{StoreError, StoreResult};
use eventspool_storage::{StorageBackend, StorageDir};
use std::sync::Arc;
use tracing::warn;

/// Name of the flushed-counter file.
pub const FLUSHED_COUNTER_FILE: &str = "flushedCounter";
/// Name of the clean-offset file.
pub const CLEAN_OFFSET_FILE: &str = "cleanoffsetFile";
/// Suffix of durable segment length files.
pub const OFFSET_SUFFIX: &str = "-offsetFile";
/// Suffix of provisional segment length files.
pub const BOOKKEEPING_SUFFIX: &str = "-bookKeepingOffsetFile";

/// Size of an encoded segment length.
const LENGTH_SIZE: usize = 8;

/// Name of segment `n`.
#[must_use]
pub fn segment_file(segment: u32) -> String {
    segment.to_string()
}

/// Name of the durable length file of segment `n`.
#[must_use]
pub fn offset_file(segment: u32) -> String {
    format!("{segment}{OFFSET_SUFFIX}")
}

/// Name of the provisional length file of segment `n`.
#[must_use]
pub fn bookkeeping_file(segment: u32) -> String {
    format!("{segment}{BOOKKEEPING_SUFFIX}")
}

/// A file recognised in a store directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreFile {
    /// Segment data.
    Segment(u32),
    /// Durable segment length.
    Offset(u32),
    /// Provisional segment length.
    BookKeeping(u32),
    /// Flushed counter.
    FlushedCounter,
    /// Clean boundary.
    CleanOffset,
}

impl StoreFile {
    /// Classifies a file name, or `None` for foreign files.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            FLUSHED_COUNTER_FILE => return Some(Self::FlushedCounter),
            CLEAN_OFFSET_FILE => return Some(Self::CleanOffset),
            _ => {}
        }
        if let Some(n) = name.strip_suffix(OFFSET_SUFFIX) {
            return parse_index(n).map(Self::Offset);
        }
        if let Some(n) = name.strip_suffix(BOOKKEEPING_SUFFIX) {
            return parse_index(n).map(Self::BookKeeping);
        }
        parse_index(name).map(Self::Segment)
    }

    /// Segment index the file belongs to, if any.
    #[must_use]
    pub fn segment(self) -> Option<u32> {
        match self {
            Self::Segment(n) | Self::Offset(n) | Self::BookKeeping(n) => Some(n),
            Self::FlushedCounter | Self::CleanOffset => None,
        }
    }
}

fn parse_index(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Encodes a segment length.
#[must_use]
pub fn encode_length(length: u64) -> [u8; LENGTH_SIZE] {
    length.to_be_bytes()
}

/// Decodes a segment length read from `name`.
///
/// # Errors
///
/// Returns `Corrupted` unless `data` is exactly 8 bytes.
pub fn decode_length(name: &str, data: &[u8]) -> StoreResult<u64> {
    let raw: [u8; LENGTH_SIZE] = data.try_into().map_err(|_| {
        StoreError::corrupted(format!("{name} holds {} bytes, expected 8", data.len()))
    })?;
    Ok(u64::from_be_bytes(raw))
}

/// Decodes the flushed counter. Empty content means "nothing flushed".
///
/// # Errors
///
/// Returns `Corrupted` if the content is not a decimal segment index.
pub fn decode_counter(data: &[u8]) -> StoreResult<Option<u32>> {
    let text = std::str::from_utf8(data)
        .map_err(|_| StoreError::corrupted("flushedCounter is not ASCII"))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }
    parse_index(text)
        .map(Some)
        .ok_or_else(|| StoreError::corrupted(format!("flushedCounter holds {text:?}")))
}

/// Decodes the clean boundary.
///
/// # Errors
///
/// Returns `Corrupted` unless `data` is exactly 8 bytes.
pub fn decode_clean(data: &[u8]) -> StoreResult<Address> {
    Address::from_bytes(data).ok_or_else(|| {
        StoreError::corrupted(format!(
            "{CLEAN_OFFSET_FILE} holds {} bytes, expected {ADDRESS_SIZE}",
            data.len()
        ))
    })
}

/// Bookkeeping access for one store directory.
#[derive(Debug, Clone)]
pub struct Layout {
    dir: Arc<dyn StorageDir>,
}

impl Layout {
    /// Wraps a store directory.
    #[must_use]
    pub fn new(dir: Arc<dyn StorageDir>) -> Self {
        Self { dir }
    }

    /// The underlying directory.
    #[must_use]
    pub fn dir(&self) -> &Arc<dyn StorageDir> {
        &self.dir
    }

    /// Creates (or truncates) segment `n` for appending.
    ///
    /// Length files left by an earlier incarnation of the segment are
    /// removed first so they cannot describe the new content.
    pub fn create_segment(&self, segment: u32) -> StoreResult<Box<dyn StorageBackend>> {
        for stale in [bookkeeping_file(segment), offset_file(segment)] {
            if self.dir.remove(&stale)? {
                warn!(file = %stale, "removed stale length file");
            }
        }
        Ok(self.dir.create(&segment_file(segment))?)
    }

    /// Opens segment `n`, failing with `SegmentMissing` if it is gone.
    pub fn open_segment(&self, segment: u32) -> StoreResult<Box<dyn StorageBackend>> {
        match self.dir.open(&segment_file(segment)) {
            Ok(handle) => Ok(handle),
            Err(e) if e.is_not_found() => Err(StoreError::SegmentMissing { segment }),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns true if any file of segment `n` is still present.
    pub fn segment_has_files(&self, segment: u32) -> StoreResult<bool> {
        for name in [
            segment_file(segment),
            offset_file(segment),
            bookkeeping_file(segment),
        ] {
            if self.dir.exists(&name)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Deletes segment `n` and its length files; missing files are ignored.
    pub fn remove_segment(&self, segment: u32) -> StoreResult<()> {
        self.dir.remove(&segment_file(segment))?;
        self.dir.remove(&offset_file(segment))?;
        self.dir.remove(&bookkeeping_file(segment))?;
        Ok(())
    }

    /// Reads a length file, `None` if absent.
    pub fn read_length(&self, name: &str) -> StoreResult<Option<u64>> {
        self.dir
            .read_file(name)?
            .map(|data| decode_length(name, &data))
            .transpose()
    }

    /// Reads the durable length of segment `n`.
    pub fn durable_length(&self, segment: u32) -> StoreResult<Option<u64>> {
        self.read_length(&offset_file(segment))
    }

    /// Reads the flushed counter, `None` if absent or empty.
    pub fn read_flushed_counter(&self) -> StoreResult<Option<u32>> {
        match self.dir.read_file(FLUSHED_COUNTER_FILE)? {
            Some(data) if data.is_empty() => {
                warn!("empty flushed counter file");
                Ok(None)
            }
            Some(data) => decode_counter(&data),
            None => Ok(None),
        }
    }

    /// Reads the clean boundary, zero if absent.
    pub fn read_clean(&self) -> StoreResult<Address> {
        match self.dir.read_file(CLEAN_OFFSET_FILE)? {
            Some(data) => decode_clean(&data),
            None => Ok(Address::ZERO),
        }
    }

    /// Persists a segment length to `name`.
    pub fn persist_length(&self, name: &str, length: u64) -> StoreResult<()> {
        self.persist(name, &encode_length(length))
    }

    /// Persists the flushed counter.
    pub fn persist_flushed_counter(&self, segment: u32) -> StoreResult<()> {
        self.persist(FLUSHED_COUNTER_FILE, segment.to_string().as_bytes())
    }

    /// Persists the clean boundary.
    pub fn persist_clean(&self, clean: Address) -> StoreResult<()> {
        self.persist(CLEAN_OFFSET_FILE, &clean.to_bytes())
    }

    /// Replaces a bookkeeping file. A failed write is accepted only when the
    /// file already holds exactly `data`.
    fn persist(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        let err = match self.dir.write_file(name, data) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        match self.dir.read_file(name) {
            Ok(Some(existing)) if existing == data => {
                warn!(file = name, error = %err, "bookkeeping write failed but content already matches");
                Ok(())
            }
            _ => Err(err.into()),
        }
    }
}
