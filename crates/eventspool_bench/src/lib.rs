//! Benchmark utilities.

use eventspool_core::{SegmentedLogStore, StoreConfig, StoreResult};
use eventspool_storage::InMemoryDir;
use rand::Rng;
use std::sync::Arc;

/// Segment cap used by the store benchmarks.
pub const BENCH_BLOCK_SIZE: u64 = 1024 * 1024;

/// Generate random record data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a batch of random records with the specified payload size.
pub fn generate_records(count: usize, payload_size: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| random_data(payload_size)).collect()
}

/// Opens an empty in-memory store.
pub fn memory_store(block_size: u64) -> StoreResult<SegmentedLogStore> {
    let config = StoreConfig::new("memory", "bench").block_size(block_size);
    SegmentedLogStore::open_with_dir(config, Arc::new(InMemoryDir::new()))
}

/// Stores and flushes every record.
pub fn fill(store: &SegmentedLogStore, records: &[Vec<u8>]) -> StoreResult<()> {
    for record in records {
        store.store(record)?;
    }
    store.flush()
}
