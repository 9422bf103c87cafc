//! Startup: rebuild watermarks from bookkeeping files.

use super::reader::ReaderState;
use super::writer::WriterState;
use super::{LocalDir, SegmentedLogStore};
use crate::address::Address;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::layout::{bookkeeping_file, Layout};
use crate::state::EngineState;
use eventspool_storage::StorageDir;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info};

/// What recovery learned from the bookkeeping files.
#[derive(Debug)]
struct Recovered {
    state: EngineState,
    /// Provisional seal length of the flushed segment, when it was rolled
    /// over after the last flush.
    seal_at: Option<u64>,
}

impl SegmentedLogStore {
    pub(super) fn setup(
        config: StoreConfig,
        dir: Arc<dyn StorageDir>,
        local: Option<LocalDir>,
    ) -> StoreResult<Self> {
        let block_size = config.effective_block_size(dir.default_block_size())?;
        let layout = Layout::new(dir);

        if !config.restore {
            info!(id = %config.id, "restore disabled, wiping store");
            layout.dir().clear()?;
        }

        let Recovered { state, seal_at } = recover(&layout)?;
        info!(
            id = %config.id,
            block_size,
            flushed = %state.flushed,
            clean = %state.clean,
            "store opened"
        );

        let store = Self {
            config,
            block_size,
            layout,
            writer: Mutex::new(WriterState::resume(state.write, seal_at)),
            reader: Mutex::new(ReaderState::default()),
            state: RwLock::new(state),
            closed: AtomicBool::new(false),
            local,
        };

        // finish a clean that was interrupted after its intent was persisted
        store.delete_below(state.clean.segment())?;
        Ok(store)
    }
}

fn recover(layout: &Layout) -> StoreResult<Recovered> {
    let clean = layout.read_clean()?;

    let (flushed, seal_at) = match layout.read_flushed_counter()? {
        Some(segment) => {
            let length = layout.durable_length(segment)?.unwrap_or(0);
            let offset = u32::try_from(length).map_err(|_| {
                StoreError::corrupted(format!("segment {segment} length {length} exceeds u32"))
            })?;
            let seal_at = layout
                .read_length(&bookkeeping_file(segment))?
                .filter(|&provisional| provisional > length);
            (Address::new(segment, offset), seal_at)
        }
        None => (Address::ZERO, None),
    };

    let state = EngineState {
        write: flushed,
        flushed,
        clean,
        cleaned_segment: first_undeleted(layout, clean.segment())?,
        skip: None,
    };
    state.check_invariants()?;

    debug!(?state, ?seal_at, "recovered watermarks");
    Ok(Recovered { state, seal_at })
}

/// Segments are deleted in ascending order, so whatever an interrupted
/// clean left behind is a contiguous run ending just below the boundary.
fn first_undeleted(layout: &Layout, clean_segment: u32) -> StoreResult<u32> {
    let mut first = clean_segment;
    while first > 0 && layout.segment_has_files(first - 1)? {
        first -= 1;
    }
    Ok(first)
}
