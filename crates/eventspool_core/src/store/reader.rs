//! Reader role: positioned replay over flushed segments.

use super::SegmentedLogStore;
use crate::address::Address;
use crate::error::{StoreError, StoreResult};
use crate::layout::segment_file;
use crate::record::{decode_length, RetrievedRecord, LENGTH_PREFIX_SIZE};
use crate::state::EngineState;
use bytes::Bytes;
use eventspool_storage::StorageBackend;
use tracing::{debug, trace, warn};

/// State owned by the reader role.
#[derive(Default)]
pub(super) struct ReaderState {
    position: Option<ReadPosition>,
}

impl ReaderState {
    pub(super) fn reset(&mut self) {
        self.position = None;
    }

    /// Segment and offset the next `retrieve_next` reads from.
    pub(super) fn cursor(&self) -> Option<Address> {
        self.position
            .as_ref()
            .map(|p| Address::new(p.segment, p.offset as u32))
    }
}

/// An open read stream inside one segment.
struct ReadPosition {
    segment: u32,
    offset: u64,
    /// Durable length once the segment is known to be sealed. The flushed
    /// segment has none; its length is the live flushed offset.
    sealed_length: Option<u64>,
    stream: Box<dyn StorageBackend>,
}

impl ReadPosition {
    fn limit(&self, state: &EngineState) -> u64 {
        self.sealed_length
            .unwrap_or_else(|| u64::from(state.flushed.offset()))
    }
}

impl SegmentedLogStore {
    /// Positions the reader at `cursor` and returns the first record there.
    ///
    /// A zero cursor starts at the clean boundary. A cursor at or past the
    /// flushed boundary cannot be served yet: it is registered as the skip
    /// pointer and `Ok(None)` is returned. Read faults are transient and
    /// also return `Ok(None)` with the reader unpositioned.
    ///
    /// # Errors
    ///
    /// Fatal, closing the store:
    /// - `AlreadyReclaimed` if `cursor` lies below the clean boundary
    /// - `SegmentMissing` if a segment holding flushed data is gone
    pub fn retrieve(&self, cursor: Address) -> StoreResult<Option<RetrievedRecord>> {
        let mut reader = self.reader.lock();
        self.ensure_open()?;

        reader.reset();
        self.state.write().skip = None;

        let result = self.seek(&mut reader, cursor);
        self.settle(&mut reader, result)
    }

    /// Returns the record after the last one read, crossing into the next
    /// segment when the current one is exhausted.
    ///
    /// At the flushed boundary it returns `Ok(None)` and stays positioned,
    /// so the caller can poll after the writer flushes again.
    ///
    /// # Errors
    ///
    /// Returns `NotPositioned` (fatal) without a successful `retrieve`
    /// first.
    pub fn retrieve_next(&self) -> StoreResult<Option<RetrievedRecord>> {
        let mut reader = self.reader.lock();
        self.ensure_open()?;

        let result = self.advance(&mut reader);
        self.settle(&mut reader, result)
    }

    /// Applies the reader fault policy to the outcome of a read.
    fn settle(
        &self,
        reader: &mut ReaderState,
        result: StoreResult<Option<RetrievedRecord>>,
    ) -> StoreResult<Option<RetrievedRecord>> {
        match result {
            Ok(record) => Ok(record),
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "read failed, reader reset");
                reader.reset();
                Ok(None)
            }
            Err(e) => {
                reader.reset();
                Err(self.fail(e))
            }
        }
    }

    fn seek(
        &self,
        reader: &mut ReaderState,
        cursor: Address,
    ) -> StoreResult<Option<RetrievedRecord>> {
        let state = *self.state.read();

        if !cursor.is_zero() && cursor < state.clean {
            return Err(StoreError::AlreadyReclaimed {
                requested: cursor,
                clean: state.clean,
            });
        }
        let target = if cursor.is_zero() { state.clean } else { cursor };
        if !state.is_flushed(target) {
            self.register_skip(target);
            return Ok(None);
        }

        let (target, sealed_length) = self.normalize(target, &state)?;
        if !state.is_flushed(target) {
            self.register_skip(target);
            return Ok(None);
        }

        let mut position = ReadPosition {
            segment: target.segment(),
            offset: u64::from(target.offset()),
            sealed_length,
            stream: self.layout.open_segment(target.segment())?,
        };
        let record = read_record(&mut position, &state)?;
        debug!(%cursor, %target, next = %record.next, "reader positioned");
        reader.position = Some(position);
        Ok(Some(record))
    }

    fn advance(&self, reader: &mut ReaderState) -> StoreResult<Option<RetrievedRecord>> {
        let state = *self.state.read();
        let Some(position) = reader.position.as_mut() else {
            return Err(StoreError::NotPositioned);
        };

        loop {
            if position.sealed_length.is_none() && position.segment < state.flushed.segment() {
                position.sealed_length = Some(self.segment_length(position.segment, &state)?);
            }
            if position.offset < position.limit(&state) {
                return read_record(position, &state).map(Some);
            }
            if position.segment >= state.flushed.segment() {
                trace!(segment = position.segment, "reader at flushed boundary");
                return Ok(None);
            }

            let segment = position.segment + 1;
            *position = ReadPosition {
                segment,
                offset: 0,
                sealed_length: None,
                stream: self.layout.open_segment(segment)?,
            };
            debug!(segment, "reader moved to next segment");
        }
    }

    /// Walks a flushed target forward over exhausted sealed segments.
    ///
    /// Returns the target together with its segment's durable length when
    /// that segment is sealed.
    fn normalize(&self, target: Address, state: &EngineState) -> StoreResult<(Address, Option<u64>)> {
        let mut target = target;
        while target.segment() < state.flushed.segment() {
            let length = self.segment_length(target.segment(), state)?;
            if u64::from(target.offset()) < length {
                return Ok((target, Some(length)));
            }
            target = Address::new(target.segment() + 1, 0);
        }
        Ok((target, None))
    }

    /// Durable length of a segment at or below the flushed segment.
    fn segment_length(&self, segment: u32, state: &EngineState) -> StoreResult<u64> {
        if segment == state.flushed.segment() {
            return Ok(u64::from(state.flushed.offset()));
        }
        match self.layout.durable_length(segment)? {
            Some(length) => Ok(length),
            None if !self.layout.dir().exists(&segment_file(segment))? => {
                Err(StoreError::SegmentMissing { segment })
            }
            None => Err(StoreError::corrupted(format!(
                "sealed segment {segment} has no durable length"
            ))),
        }
    }

    fn register_skip(&self, target: Address) {
        debug!(%target, "cursor ahead of flushed data, registering skip pointer");
        self.state.write().skip = Some(target);
    }
}

/// Reads the frame at the position and advances past it.
fn read_record(position: &mut ReadPosition, state: &EngineState) -> StoreResult<RetrievedRecord> {
    let limit = position.limit(state);
    let start = position.offset;

    let prefix = position.stream.read_at(start, LENGTH_PREFIX_SIZE)?;
    let len = decode_length(&prefix)
        .ok_or_else(|| StoreError::corrupted("short length prefix"))?;
    let body = start + LENGTH_PREFIX_SIZE as u64;
    let end = body + u64::from(len);
    if end > limit {
        return Err(StoreError::corrupted(format!(
            "torn record at {}:{start}: {len} bytes run past durable length {limit}",
            position.segment
        )));
    }

    let payload = position.stream.read_at(body, len as usize)?;
    position.offset = end;

    let next = match position.sealed_length {
        Some(sealed) if end >= sealed => Address::new(position.segment + 1, 0),
        _ => Address::new(position.segment, end as u32),
    };
    Ok(RetrievedRecord {
        next,
        payload: Bytes::from(payload),
    })
}

/// Faults a caller can retry by calling `retrieve` again.
fn is_transient(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Storage(_) | StoreError::Io(_) | StoreError::Corrupted { .. }
    )
}
