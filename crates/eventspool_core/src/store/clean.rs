//! Reclamation of segments below the clean boundary.

use super::SegmentedLogStore;
use crate::address::Address;
use crate::error::StoreResult;
use tracing::{debug, info};

impl SegmentedLogStore {
    /// Declares everything before `cursor` reclaimable and deletes the
    /// segments that lie wholly below it.
    ///
    /// The boundary is clamped to `[clean, flushed]`, so it never moves
    /// backwards and never passes data that is not durable. The boundary is
    /// persisted before anything is deleted; an interrupted deletion is
    /// finished on the next open.
    ///
    /// # Errors
    ///
    /// Any failure is fatal and closes the store.
    pub fn clean(&self, cursor: Address) -> StoreResult<()> {
        let mut reader = self.reader.lock();
        self.ensure_open()?;

        let result = self.advance_clean(cursor).and_then(|boundary| {
            if reader.cursor().is_some_and(|at| at < boundary) {
                debug!(%boundary, "reader positioned below clean boundary, resetting");
                reader.reset();
            }
            self.delete_below(boundary.segment())
        });
        result.map_err(|e| {
            reader.reset();
            self.fail(e)
        })
    }

    fn advance_clean(&self, cursor: Address) -> StoreResult<Address> {
        let current = *self.state.read();
        let boundary = current.clamp_clean(cursor);
        if boundary == current.clean {
            return Ok(boundary);
        }

        self.layout.persist_clean(boundary)?;
        let mut state = self.state.write();
        state.clean = boundary;
        state.check_invariants()?;
        debug!(requested = %cursor, %boundary, "clean boundary advanced");
        Ok(boundary)
    }

    /// Deletes every segment from the first undeleted one up to, not
    /// including, `segment`, one segment at a time.
    pub(super) fn delete_below(&self, segment: u32) -> StoreResult<()> {
        let first = self.state.read().cleaned_segment;
        if first >= segment {
            return Ok(());
        }

        for victim in first..segment {
            self.layout.remove_segment(victim)?;
            self.state.write().cleaned_segment = victim + 1;
        }
        info!(from = first, to = segment, "deleted reclaimed segments");
        Ok(())
    }
}
