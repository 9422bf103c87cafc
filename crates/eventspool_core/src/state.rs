//! Watermarks of one store instance.

use crate::address::Address;
use crate::error::{StoreError, StoreResult};

/// All positions the store tracks, in one place.
///
/// Built once by recovery and updated by every operation. The boundaries
/// always satisfy `clean <= flushed <= write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineState {
    /// Current append position: open segment and its length.
    pub write: Address,
    /// Durability boundary. Bytes before it are on stable storage and
    /// readable.
    pub flushed: Address,
    /// Reclamation boundary. Bytes before it may be deleted.
    pub clean: Address,
    /// Lowest segment index whose files have not been deleted yet.
    pub cleaned_segment: u32,
    /// Reader resumption point registered ahead of the flushed boundary.
    pub skip: Option<Address>,
}

impl EngineState {
    /// Checks `clean <= flushed <= write`.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` naming the pair out of order.
    pub fn check_invariants(&self) -> StoreResult<()> {
        if self.clean > self.flushed {
            return Err(StoreError::invariant_violation(format!(
                "clean boundary {} is ahead of flushed boundary {}",
                self.clean, self.flushed
            )));
        }
        if self.flushed > self.write {
            return Err(StoreError::invariant_violation(format!(
                "flushed boundary {} is ahead of write position {}",
                self.flushed, self.write
            )));
        }
        if self.cleaned_segment > self.clean.segment() {
            return Err(StoreError::invariant_violation(format!(
                "segment {} was deleted below clean boundary {}",
                self.cleaned_segment - 1,
                self.clean
            )));
        }
        Ok(())
    }

    /// Returns true if `addr` can be served from durable data right now.
    #[must_use]
    pub fn is_flushed(&self, addr: Address) -> bool {
        addr < self.flushed
    }

    /// Clamps a clean request to `[clean, flushed]`.
    #[must_use]
    pub fn clamp_clean(&self, requested: Address) -> Address {
        requested.min(self.flushed).max(self.clean)
    }
}
