//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores, restarting
//! them cleanly or after a simulated crash, and replaying their content.

use eventspool_core::{Address, SegmentedLogStore, StoreConfig, StoreResult};
use eventspool_storage::InMemoryDir;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Identifier used for every fixture store.
pub const TEST_STORE_ID: &str = "test";

/// Where a test store keeps its files.
enum Backing {
    Memory(InMemoryDir),
    File(TempDir),
}

/// A test store that can be restarted against the same data.
pub struct TestStore {
    store: Option<SegmentedLogStore>,
    config: StoreConfig,
    backing: Backing,
}

impl TestStore {
    /// Creates an in-memory test store with the given segment cap.
    pub fn memory(block_size: u64) -> Self {
        let dir = InMemoryDir::new();
        let config = StoreConfig::new("memory", TEST_STORE_ID).block_size(block_size);
        let store = open_memory(&config, &dir).expect("Failed to open in-memory store");
        Self {
            store: Some(store),
            config,
            backing: Backing::Memory(dir),
        }
    }

    /// Creates a file-based test store in a temporary directory.
    pub fn file(block_size: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = StoreConfig::new(temp_dir.path(), TEST_STORE_ID).block_size(block_size);
        let store = SegmentedLogStore::open(config.clone()).expect("Failed to open file store");
        Self {
            store: Some(store),
            config,
            backing: Backing::File(temp_dir),
        }
    }

    /// The live store.
    pub fn log(&self) -> &SegmentedLogStore {
        self.store.as_ref().expect("store is open")
    }

    /// The configuration used for every (re)open.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The in-memory disk, if this is a memory store.
    pub fn memory_dir(&self) -> Option<&InMemoryDir> {
        match &self.backing {
            Backing::Memory(dir) => Some(dir),
            Backing::File(_) => None,
        }
    }

    /// The store directory, if this is a file store.
    pub fn path(&self) -> Option<std::path::PathBuf> {
        match &self.backing {
            Backing::Memory(_) => None,
            Backing::File(_) => Some(self.config.store_dir()),
        }
    }

    /// Closes the store (flushing it) and opens it again.
    pub fn reopen(&mut self) -> StoreResult<()> {
        if let Some(store) = self.store.take() {
            store.close()?;
        }
        self.store = Some(self.open_again()?);
        Ok(())
    }

    /// Drops the store without flushing, as a process crash would, and
    /// recovers it from whatever reached the disk.
    pub fn crash(&mut self) -> StoreResult<()> {
        drop(self.store.take());
        self.store = Some(self.open_again()?);
        Ok(())
    }

    fn open_again(&self) -> StoreResult<SegmentedLogStore> {
        match &self.backing {
            Backing::Memory(dir) => open_memory(&self.config, dir),
            Backing::File(_) => SegmentedLogStore::open(self.config.clone()),
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = SegmentedLogStore;

    fn deref(&self) -> &Self::Target {
        self.log()
    }
}

fn open_memory(config: &StoreConfig, dir: &InMemoryDir) -> StoreResult<SegmentedLogStore> {
    SegmentedLogStore::open_with_dir(config.clone(), Arc::new(dir.clone()))
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use eventspool_testkit::with_memory_store;
///
/// with_memory_store(64, |store| {
///     store.store(b"hello").unwrap();
///     store.flush().unwrap();
/// });
/// ```
pub fn with_memory_store<F, R>(block_size: u64, f: F) -> R
where
    F: FnOnce(&SegmentedLogStore) -> R,
{
    let test_store = TestStore::memory(block_size);
    f(test_store.log())
}

/// Runs a test with a temporary file-based store.
pub fn with_file_store<F, R>(block_size: u64, f: F) -> R
where
    F: FnOnce(&SegmentedLogStore, &Path) -> R,
{
    let test_store = TestStore::file(block_size);
    let path = test_store.path().expect("File store should have a path");
    f(test_store.log(), &path)
}

/// Stores every record and returns the issued cursors.
pub fn store_all<R: AsRef<[u8]>>(
    store: &SegmentedLogStore,
    records: &[R],
) -> StoreResult<Vec<Option<Address>>> {
    records.iter().map(|r| store.store(r.as_ref())).collect()
}

/// Replays every flushed record from `from` with `retrieve` followed by
/// `retrieve_next` until the flushed boundary.
pub fn replay_from(store: &SegmentedLogStore, from: Address) -> StoreResult<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    let mut next = store.retrieve(from)?;
    while let Some(record) = next {
        out.push(record.payload.to_vec());
        next = store.retrieve_next()?;
    }
    Ok(out)
}

/// Replays every flushed record from the clean boundary.
pub fn replay_all(store: &SegmentedLogStore) -> StoreResult<Vec<Vec<u8>>> {
    replay_from(store, Address::ZERO)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Ten-byte payload with a recognisable index.
    pub fn numbered_record(i: usize) -> Vec<u8> {
        format!("record-{:03}", i % 1000).into_bytes()
    }

    /// Creates an in-memory store holding `count` flushed records.
    pub fn populated_store(count: usize, block_size: u64) -> (TestStore, Vec<Vec<u8>>) {
        let test_store = TestStore::memory(block_size);
        let records: Vec<_> = (0..count).map(numbered_record).collect();
        store_all(test_store.log(), &records).expect("Failed to store records");
        test_store.flush().expect("Failed to flush");
        (test_store, records)
    }
}
