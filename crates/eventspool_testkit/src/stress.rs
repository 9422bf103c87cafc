//! Stress tests for EventSpool.
//!
//! These tests verify behavior under heavy load and concurrent access.

use eventspool_core::{Address, SegmentedLogStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of records to store.
    pub records: usize,
    /// Payload size of each record in bytes.
    pub record_size: usize,
    /// Flush after this many stores.
    pub flush_every: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            records: 10_000,
            record_size: 256,
            flush_every: 100,
        }
    }
}

impl StressConfig {
    /// Payload of record `i`: its index followed by filler.
    pub fn payload(&self, i: usize) -> Vec<u8> {
        let mut data = vec![0xABu8; self.record_size.max(8)];
        data[..8].copy_from_slice(&(i as u64).to_be_bytes());
        data
    }
}

fn payload_index(payload: &[u8]) -> Option<usize> {
    let bytes: [u8; 8] = payload.get(..8)?.try_into().ok()?;
    usize::try_from(u64::from_be_bytes(bytes)).ok()
}

/// Stores `config.records` records, flushing periodically.
pub fn stress_sequential_stores(store: &SegmentedLogStore, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.records {
        match store.store(&config.payload(i)) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
        if (i + 1) % config.flush_every.max(1) == 0 && store.flush().is_err() {
            failed += 1;
        }
    }
    if store.flush().is_err() {
        failed += 1;
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Populates the store, then replays it from the clean boundary.
///
/// A replayed record counts as failed when it is out of order.
pub fn stress_sequential_replay(store: &SegmentedLogStore, config: &StressConfig) -> StressTestResult {
    stress_sequential_stores(store, config);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut expected = 0usize;

    let mut next = store.retrieve(Address::ZERO);
    loop {
        match next {
            Ok(Some(record)) => {
                if payload_index(&record.payload) == Some(expected) {
                    successful += 1;
                } else {
                    failed += 1;
                }
                expected += 1;
            }
            Ok(None) => break,
            Err(_) => {
                failed += 1;
                break;
            }
        }
        next = store.retrieve_next();
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Stores, flushes, consumes and cleans in rounds of `flush_every`
/// records, the way a consumer acknowledging batches would.
pub fn stress_consume_and_clean(store: &SegmentedLogStore, config: &StressConfig) -> StressTestResult {
    let batch = config.flush_every.max(1);
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut cursor = Address::ZERO;

    for first in (0..config.records).step_by(batch) {
        let last = (first + batch).min(config.records);
        for i in first..last {
            if store.store(&config.payload(i)).is_err() {
                failed += 1;
            }
        }
        if store.flush().is_err() {
            failed += 1;
            continue;
        }

        let mut next = store.retrieve(cursor);
        for i in first..last {
            match next {
                Ok(Some(record)) if payload_index(&record.payload) == Some(i) => {
                    cursor = record.next;
                    successful += 1;
                }
                _ => failed += 1,
            }
            next = if i + 1 < last {
                store.retrieve_next()
            } else {
                Ok(None)
            };
        }
        if store.clean(cursor).is_err() {
            failed += 1;
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Runs one writer thread against a tailing reader on the calling thread.
///
/// The reader polls until it has seen every record; a record counts as
/// failed when it arrives out of order.
pub fn stress_concurrent_tail(store: Arc<SegmentedLogStore>, config: &StressConfig) -> StressTestResult {
    let write_failures = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let writer = {
        let store = Arc::clone(&store);
        let write_failures = Arc::clone(&write_failures);
        let config = config.clone();
        thread::spawn(move || {
            let result = stress_sequential_stores(&store, &config);
            write_failures.fetch_add(result.failed_ops, Ordering::Relaxed);
        })
    };

    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut positioned = false;
    while successful + failed < config.records {
        let polled = if positioned {
            store.retrieve_next()
        } else {
            store.retrieve(Address::ZERO)
        };
        match polled {
            Ok(Some(record)) => {
                positioned = true;
                if payload_index(&record.payload) == Some(successful + failed) {
                    successful += 1;
                } else {
                    failed += 1;
                }
            }
            Ok(None) if writer.is_finished() && write_failures.load(Ordering::Relaxed) > 0 => break,
            Ok(None) => thread::yield_now(),
            Err(_) => {
                failed += 1;
                break;
            }
        }
    }

    writer.join().expect("Writer thread panicked");
    failed += write_failures.load(Ordering::Relaxed);

    StressTestResult::new(successful, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;

    fn small_config() -> StressConfig {
        StressConfig {
            records: 1_000,
            record_size: 64,
            flush_every: 37,
        }
    }

    #[test]
    fn test_sequential_stores() {
        let test_store = TestStore::memory(4096);
        let result = stress_sequential_stores(&test_store, &small_config());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 1_000);
    }

    #[test]
    fn test_sequential_replay() {
        let test_store = TestStore::memory(1000);
        let result = stress_sequential_replay(&test_store, &small_config());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 1_000);
    }

    #[test]
    fn test_consume_and_clean() {
        let test_store = TestStore::memory(512);
        let result = stress_consume_and_clean(&test_store, &small_config());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 1_000);

        // everything below the last segment is gone
        let state = test_store.state();
        assert_eq!(state.clean, state.flushed);
        assert_eq!(state.cleaned_segment, state.clean.segment());
    }

    #[test]
    fn test_concurrent_tail() {
        let dir = eventspool_storage::InMemoryDir::new();
        let config = eventspool_core::StoreConfig::new("memory", "tail").block_size(700);
        let store = SegmentedLogStore::open_with_dir(config, Arc::new(dir)).unwrap();

        let result = stress_concurrent_tail(Arc::new(store), &small_config());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 1_000);
    }

    #[test]
    fn test_file_backed_stores() {
        let test_store = TestStore::file(8192);
        let config = StressConfig {
            records: 200,
            ..small_config()
        };
        let result = stress_sequential_replay(&test_store, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 200);
    }
}
