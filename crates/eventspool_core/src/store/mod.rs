//! The segmented log store.
//!
//! ## Roles
//!
//! One **writer** calls [`store`](SegmentedLogStore::store) and
//! [`flush`](SegmentedLogStore::flush); one **reader** calls
//! [`retrieve`](SegmentedLogStore::retrieve),
//! [`retrieve_next`](SegmentedLogStore::retrieve_next) and
//! [`clean`](SegmentedLogStore::clean). Each role owns its own lock and
//! streams, so the two may run on different threads. Watermarks live in a
//! shared [`EngineState`]; a role lock is always taken before the state lock.
//!
//! ## Segment lifecycle
//!
//! ```text
//! open ──rollover──▶ sealed (pending flush) ──flush──▶ flushed ──clean──▶ deleted
//! ```
//!
//! ## Failure policy
//!
//! - Fatal errors close the store: the failing role drops its streams and
//!   every later call returns [`StoreError::Closed`]
//! - I/O faults while reading are transient: the reader becomes
//!   unpositioned and the call returns `Ok(None)`

mod clean;
mod reader;
mod recovery;
mod writer;


use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::layout::Layout;
use crate::state::EngineState;
use eventspool_storage::{DirLock, FileDir, StorageDir, StorageError};
use parking_lot::{Mutex, RwLock};
use reader::ReaderState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use writer::WriterState;

/// A durable, segmented append-only log.
///
/// # Example
///
/// ```rust
/// use eventspool_core::{Address, SegmentedLogStore, StoreConfig};
/// use eventspool_storage::InMemoryDir;
/// use std::sync::Arc;
///
/// let config = StoreConfig::new("memory", "example").block_size(16);
/// let store = SegmentedLogStore::open_with_dir(config, Arc::new(InMemoryDir::new())).unwrap();
///
/// for record in [b"first-rec1", b"second-rec", b"third-rec3"] {
///     store.store(record).unwrap();
/// }
/// store.flush().unwrap();
///
/// let first = store.retrieve(Address::ZERO).unwrap().unwrap();
/// assert_eq!(&first.payload[..], b"first-rec1");
/// let second = store.retrieve_next().unwrap().unwrap();
/// assert_eq!(&second.payload[..], b"second-rec");
/// ```
pub struct SegmentedLogStore {
    config: StoreConfig,
    block_size: u64,
    layout: Layout,
    state: RwLock<EngineState>,
    writer: Mutex<WriterState>,
    reader: Mutex<ReaderState>,
    closed: AtomicBool,
    local: Option<LocalDir>,
}

/// A store directory on local disk and the lock held on it.
struct LocalDir {
    dir: FileDir,
    _lock: DirLock,
}

impl SegmentedLogStore {
    /// Opens the store at `<base_dir>/<id>` on local disk, recovering the
    /// previous run unless `restore` is false.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The base directory is missing or not a directory
    /// - Another instance holds the store (`StoreLocked`)
    /// - Recovery finds inconsistent bookkeeping
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;

        let base = &config.base_dir;
        if !base.exists() {
            return Err(StoreError::BaseDirMissing { path: base.clone() });
        }
        if !base.is_dir() {
            return Err(StoreError::NotADirectory { path: base.clone() });
        }

        let dir = FileDir::open(&config.store_dir())?;
        let lock = dir.lock().map_err(|e| match e {
            StorageError::Locked(_) => StoreError::StoreLocked,
            e => e.into(),
        })?;

        let local = LocalDir {
            dir: dir.clone(),
            _lock: lock,
        };
        Self::setup(config, Arc::new(dir), Some(local))
    }

    /// Opens a store hosted by an arbitrary [`StorageDir`].
    ///
    /// `config.base_dir` and `config.id` are only validated; `dir` is the
    /// store directory itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or recovery fails.
    pub fn open_with_dir(config: StoreConfig, dir: Arc<dyn StorageDir>) -> StoreResult<Self> {
        config.validate()?;
        Self::setup(config, dir, None)
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the segment size cap in effect.
    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Returns a snapshot of the watermarks.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Re-validates `clean <= flushed <= write`.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the watermarks are out of order.
    pub fn check_invariants(&self) -> StoreResult<()> {
        self.state.read().check_invariants()
    }

    /// Returns true once the store has been closed by a fatal error.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flushes pending data and releases streams and the directory lock.
    ///
    /// Dropping a store without calling `close` releases everything
    /// without flushing, exactly like a crash.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn close(self) -> StoreResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.flush()?;
        info!(id = %self.config.id, state = ?self.state(), "store closed");
        Ok(())
    }

    /// Drops the store without flushing and deletes all of its files.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be removed.
    pub fn destroy(self) -> StoreResult<()> {
        let dir = Arc::clone(self.layout.dir());
        let local = self.local.as_ref().map(|local| local.dir.clone());
        info!(id = %self.config.id, "destroying store");
        drop(self);

        dir.clear()?;
        if let Some(local) = local {
            local.remove_all()?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Closes the store if `err` is fatal, then hands the error back.
    fn fail(&self, err: StoreError) -> StoreError {
        if err.is_fatal() && !self.closed.swap(true, Ordering::SeqCst) {
            error!(id = %self.config.id, error = %err, "fatal store error, closing");
        }
        err
    }
}

impl std::fmt::Debug for SegmentedLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentedLogStore")
            .field("id", &self.config.id)
            .field("block_size", &self.block_size)
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
