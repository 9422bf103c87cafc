//! Writer role: append, rollover and flush.

use super::SegmentedLogStore;
use crate::address::Address;
use crate::error::{StoreError, StoreResult};
use crate::layout::{bookkeeping_file, offset_file};
use crate::record::{encode_frame, frame_len, MAX_PAYLOAD_LEN};
use eventspool_storage::StorageBackend;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// A segment closed by rollover whose length is not yet durable.
struct SealedSegment {
    segment: u32,
    length: u64,
    stream: Box<dyn StorageBackend>,
}

/// State owned by the writer role.
pub(super) struct WriterState {
    /// Open segment, attached lazily on the first append.
    stream: Option<Box<dyn StorageBackend>>,
    segment: u32,
    offset: u64,
    /// Provisional seal length of a segment re-attached at recovery.
    seal_at: Option<u64>,
    pending: VecDeque<SealedSegment>,
}

impl WriterState {
    pub(super) fn resume(position: Address, seal_at: Option<u64>) -> Self {
        Self {
            stream: None,
            segment: position.segment(),
            offset: u64::from(position.offset()),
            seal_at,
            pending: VecDeque::new(),
        }
    }

    fn position(&self) -> Address {
        // offsets never pass the block size, which fits in u32
        Address::new(self.segment, self.offset as u32)
    }

    fn must_roll(&self, frame_len: u64, block_size: u64) -> bool {
        self.offset > 0
            && (self.offset + frame_len > block_size
                || self.seal_at.is_some_and(|seal| self.offset >= seal))
    }

    /// Drops every handle after a fatal error.
    fn abandon(&mut self) {
        self.stream = None;
        self.pending.clear();
    }
}

impl SegmentedLogStore {
    /// Appends one record.
    ///
    /// Returns the cursor just past the record, or `None` while a reader's
    /// skip pointer (registered by a `retrieve` ahead of the flushed
    /// boundary) has not been passed yet. The record is not visible to
    /// readers until the next [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns `RecordTooLarge` (nothing written) if the record can never
    /// fit a segment; any I/O failure is fatal and closes the store.
    pub fn store(&self, record: &[u8]) -> StoreResult<Option<Address>> {
        if record.len() > MAX_PAYLOAD_LEN {
            return Err(StoreError::RecordTooLarge { len: record.len() });
        }

        let mut writer = self.writer.lock();
        if self.is_closed() {
            writer.abandon();
            return Err(StoreError::Closed);
        }

        self.append(&mut writer, record).map_err(|e| {
            warn!(error = %e, "error while storing the bytes");
            writer.abandon();
            self.fail(e)
        })
    }

    /// Makes everything stored so far durable and visible to readers.
    ///
    /// Calling it with nothing pending does nothing.
    ///
    /// # Errors
    ///
    /// Any failure is fatal and closes the store.
    pub fn flush(&self) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        if self.is_closed() {
            writer.abandon();
            return Err(StoreError::Closed);
        }

        self.flush_locked(&mut writer).map_err(|e| {
            writer.abandon();
            self.fail(e)
        })
    }

    fn append(&self, w: &mut WriterState, record: &[u8]) -> StoreResult<Option<Address>> {
        let len = frame_len(record.len());
        if w.must_roll(len, self.block_size) {
            self.roll(w)?;
        }

        let stream = match w.stream.take() {
            Some(stream) => stream,
            None => self.attach(w)?,
        };
        let stream = w.stream.insert(stream);
        stream.append(&encode_frame(record))?;
        w.offset += len;

        let next = w.position();
        let mut state = self.state.write();
        state.write = next;
        match state.skip {
            Some(skip) if next <= skip => Ok(None),
            Some(skip) => {
                debug!(%skip, %next, "write position passed skip pointer");
                state.skip = None;
                Ok(Some(next))
            }
            None => Ok(Some(next)),
        }
    }

    /// Opens the segment at the write position: a fresh segment is
    /// created, a re-attached one loses any tail past the flushed length.
    fn attach(&self, w: &WriterState) -> StoreResult<Box<dyn StorageBackend>> {
        if w.offset == 0 {
            debug!(segment = w.segment, "creating segment");
            return self.layout.create_segment(w.segment);
        }

        let mut stream = self.layout.open_segment(w.segment)?;
        let size = stream.size()?;
        if size < w.offset {
            return Err(StoreError::corrupted(format!(
                "segment {} holds {size} bytes, less than its flushed length {}",
                w.segment, w.offset
            )));
        }
        if size > w.offset {
            warn!(
                segment = w.segment,
                discarded = size - w.offset,
                "discarding unflushed tail of re-attached segment"
            );
            stream.truncate(w.offset)?;
        }
        Ok(stream)
    }

    /// Seals the open segment and moves the write position to the next one.
    fn roll(&self, w: &mut WriterState) -> StoreResult<()> {
        let segment = w.segment;
        let length = w.offset;
        let next = segment
            .checked_add(1)
            .ok_or_else(|| StoreError::invariant_violation("segment index space exhausted"))?;

        let mut stream = match w.stream.take() {
            Some(stream) => stream,
            None => self.attach(w)?,
        };
        stream.flush()?;
        self.layout
            .persist_length(&bookkeeping_file(segment), length)?;

        debug!(segment, length, "segment sealed, pending flush");
        w.pending.push_back(SealedSegment {
            segment,
            length,
            stream,
        });
        w.segment = next;
        w.offset = 0;
        w.seal_at = None;
        Ok(())
    }

    fn flush_locked(&self, w: &mut WriterState) -> StoreResult<()> {
        if w.pending.is_empty() && self.state.read().flushed == w.position() {
            return Ok(());
        }

        let mut finalized = Vec::with_capacity(w.pending.len());
        while let Some(sealed) = w.pending.front_mut() {
            sealed.stream.sync()?;
            self.layout
                .persist_length(&offset_file(sealed.segment), sealed.length)?;
            if let Err(e) = self.layout.dir().remove(&bookkeeping_file(sealed.segment)) {
                warn!(segment = sealed.segment, error = %e, "could not remove superseded bookkeeping file");
            }
            finalized.push(sealed.segment);
            w.pending.pop_front();
        }

        let Some(stream) = w.stream.as_mut() else {
            debug!(?finalized, "flush with no open segment");
            return Ok(());
        };
        stream.sync()?;
        self.layout.persist_length(&offset_file(w.segment), w.offset)?;
        self.layout.persist_flushed_counter(w.segment)?;

        let flushed = w.position();
        let mut state = self.state.write();
        state.flushed = flushed;
        state.check_invariants()?;

        debug!(%flushed, ?finalized, "flushed");
        Ok(())
    }
}
