//! Crash recovery testing for EventSpool.
//!
//! This module provides utilities for testing crash recovery behavior.
//! It simulates crashes at every storage mutation of a workload and
//! verifies that the store recovers to a consistent prefix of what was
//! written.
//!
//! ## Test Strategy
//!
//! 1. **Crash after flush** - Flushed records survive
//! 2. **Crash before flush** - Unflushed records are discarded
//! 3. **Crash mid-rollover** - Provisional lengths do not leak into replay
//! 4. **Crash mid-clean** - Deletion resumes on the next open
//! 5. **Crash sweep** - Every mutation point of a workload, torn appends
//!    included
//!
//! ## Usage
//!
//! ```rust
//! use eventspool_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new(32);
//! harness.run_all_tests();
//! assert!(harness.all_passed(), "{}", harness.summary());
//! ```

use crate::fixtures::{replay_all, scenarios::numbered_record, store_all};
use eventspool_core::{Address, SegmentedLogStore, StoreConfig, StoreError, StoreResult};
use eventspool_storage::{InMemoryDir, StorageBackend, StorageDir, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Budget of storage mutations shared by a directory and its handles.
#[derive(Debug)]
struct CrashBudget {
    remaining: AtomicUsize,
    crashed: AtomicBool,
}

impl CrashBudget {
    /// Consumes one mutation; returns false once the crash point is hit.
    fn take(&self) -> bool {
        if self.crashed.load(Ordering::SeqCst) {
            return false;
        }
        let ok = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !ok {
            self.crashed.store(true, Ordering::SeqCst);
        }
        ok
    }
}

fn simulated_crash(op: &str) -> StorageError {
    StorageError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("simulated crash during {op}"),
    ))
}

/// A storage backend wrapper that can simulate crashes.
///
/// The append that hits the crash point writes the first half of its data
/// before failing, leaving a torn record behind.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    budget: Arc<CrashBudget>,
}

impl CrashableBackend {
    fn check(&self, op: &str) -> StorageResult<()> {
        if self.budget.take() {
            Ok(())
        } else {
            Err(simulated_crash(op))
        }
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        if !self.budget.take() {
            let partial_len = bytes.len() / 2;
            if partial_len > 0 {
                let _ = self.inner.append(&bytes[..partial_len]);
                let _ = self.inner.flush();
            }
            return Err(simulated_crash("partial write"));
        }
        self.inner.append(bytes)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check("flush")?;
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check("sync")?;
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check("truncate")?;
        self.inner.truncate(new_size)
    }
}

/// A directory whose mutations start failing after a set number of calls.
#[derive(Debug)]
pub struct CrashableDir {
    inner: InMemoryDir,
    budget: Arc<CrashBudget>,
}

impl CrashableDir {
    /// Wraps `inner`, crashing after `mutations` successful mutations.
    pub fn new(inner: InMemoryDir, mutations: usize) -> Self {
        Self {
            inner,
            budget: Arc::new(CrashBudget {
                remaining: AtomicUsize::new(mutations),
                crashed: AtomicBool::new(false),
            }),
        }
    }

    /// Wraps `inner` without a crash point.
    pub fn unlimited(inner: InMemoryDir) -> Self {
        Self::new(inner, usize::MAX)
    }

    /// Returns whether the crash point has been reached.
    pub fn has_crashed(&self) -> bool {
        self.budget.crashed.load(Ordering::SeqCst)
    }

    /// Mutations performed so far (meaningful for `unlimited` dirs).
    pub fn mutations(&self) -> usize {
        usize::MAX - self.budget.remaining.load(Ordering::SeqCst)
    }

    fn check(&self, op: &str) -> StorageResult<()> {
        if self.budget.take() {
            Ok(())
        } else {
            Err(simulated_crash(op))
        }
    }

    fn wrap(&self, inner: Box<dyn StorageBackend>) -> Box<dyn StorageBackend> {
        Box::new(CrashableBackend {
            inner,
            budget: Arc::clone(&self.budget),
        })
    }
}

impl StorageDir for CrashableDir {
    fn create(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        self.check("create")?;
        Ok(self.wrap(self.inner.create(name)?))
    }

    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        Ok(self.wrap(self.inner.open(name)?))
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        self.inner.exists(name)
    }

    fn read_file(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.read_file(name)
    }

    fn write_file(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        self.check("write_file")?;
        self.inner.write_file(name, data)
    }

    fn remove(&self, name: &str) -> StorageResult<bool> {
        self.check("remove")?;
        self.inner.remove(name)
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        self.inner.list()
    }

    fn clear(&self) -> StorageResult<()> {
        self.check("clear")?;
        self.inner.clear()
    }
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected records after recovery.
    pub expected_records: usize,
    /// Actual records after recovery.
    pub actual_records: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, records: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_records: records,
            actual_records: records,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_records: expected,
            actual_records: actual,
            error: Some(error.to_string()),
        }
    }

    fn check(description: &str, expected: &[Vec<u8>], actual: &[Vec<u8>]) -> Self {
        if expected == actual {
            Self::pass(description, actual.len())
        } else {
            Self::fail(
                description,
                expected.len(),
                actual.len(),
                "recovered records differ",
            )
        }
    }
}

/// Test harness for crash recovery scenarios on an in-memory disk.
pub struct CrashRecoveryHarness {
    /// Segment cap used by every scenario.
    pub block_size: u64,
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new crash recovery harness.
    pub fn new(block_size: u64) -> Self {
        Self {
            block_size,
            results: Vec::new(),
        }
    }

    fn config(&self) -> StoreConfig {
        StoreConfig::new("memory", "crash").block_size(self.block_size)
    }

    fn open(&self, dir: Arc<dyn StorageDir>) -> StoreResult<SegmentedLogStore> {
        SegmentedLogStore::open_with_dir(self.config(), dir)
    }

    fn record(&mut self, description: &str, outcome: StoreResult<CrashRecoveryResult>) -> CrashRecoveryResult {
        let result = outcome.unwrap_or_else(|e: StoreError| {
            CrashRecoveryResult::fail(description, 0, 0, &e.to_string())
        });
        self.results.push(result.clone());
        result
    }

    /// Tests that flushed records survive a crash.
    pub fn test_flushed_data_survives(&mut self) -> CrashRecoveryResult {
        let description = "Flushed records survive crash";
        let outcome = (|| -> StoreResult<CrashRecoveryResult> {
            let disk = InMemoryDir::new();
            let records: Vec<_> = (0..10).map(numbered_record).collect();

            let store = self.open(Arc::new(disk.clone()))?;
            store_all(&store, &records)?;
            store.flush()?;
            drop(store);

            let store = self.open(Arc::new(disk))?;
            Ok(CrashRecoveryResult::check(description, &records, &replay_all(&store)?))
        })();
        self.record(description, outcome)
    }

    /// Tests that records stored after the last flush are discarded.
    pub fn test_unflushed_data_discarded(&mut self) -> CrashRecoveryResult {
        let description = "Unflushed records are discarded";
        let outcome = (|| -> StoreResult<CrashRecoveryResult> {
            let disk = InMemoryDir::new();
            let records: Vec<_> = (0..8).map(numbered_record).collect();

            let store = self.open(Arc::new(disk.clone()))?;
            store_all(&store, &records[..5])?;
            store.flush()?;
            store_all(&store, &records[5..])?;
            drop(store);

            let store = self.open(Arc::new(disk))?;
            Ok(CrashRecoveryResult::check(description, &records[..5], &replay_all(&store)?))
        })();
        self.record(description, outcome)
    }

    /// Tests a crash right after a rollover sealed a segment.
    pub fn test_crash_after_rollover(&mut self) -> CrashRecoveryResult {
        let description = "Rollover before crash leaks nothing";
        let outcome = (|| -> StoreResult<CrashRecoveryResult> {
            let disk = InMemoryDir::new();
            let records: Vec<_> = (0..12).map(numbered_record).collect();

            let store = self.open(Arc::new(disk.clone()))?;
            store_all(&store, &records[..3])?;
            store.flush()?;
            // enough to seal at least one more segment
            store_all(&store, &records[3..])?;
            drop(store);

            let store = self.open(Arc::new(disk.clone()))?;
            let after_crash = replay_all(&store)?;

            // the recovered store keeps working
            store_all(&store, &records[3..])?;
            store.flush()?;
            drop(store);
            let store = self.open(Arc::new(disk))?;

            if after_crash != records[..3] {
                return Ok(CrashRecoveryResult::fail(
                    description,
                    3,
                    after_crash.len(),
                    "unflushed records visible after crash",
                ));
            }
            Ok(CrashRecoveryResult::check(description, &records, &replay_all(&store)?))
        })();
        self.record(description, outcome)
    }

    /// Tests a crash after the clean boundary was persisted but before the
    /// segments below it were deleted.
    pub fn test_crash_during_clean(&mut self) -> CrashRecoveryResult {
        let description = "Interrupted clean resumes";
        let outcome = (|| -> StoreResult<CrashRecoveryResult> {
            let disk = InMemoryDir::new();
            let records: Vec<_> = (0..9).map(numbered_record).collect();

            let store = self.open(Arc::new(disk.clone()))?;
            let cursors = store_all(&store, &records)?;
            store.flush()?;
            drop(store);

            // crash on the first segment removal, right after the boundary
            // write
            let boundary = cursors[5].unwrap_or(Address::ZERO);
            let crashing = CrashableDir::new(disk.clone(), 1);
            let store = self.open(Arc::new(crashing))?;
            let crashed = store.clean(boundary).is_err();
            drop(store);

            let store = self.open(Arc::new(disk.clone()))?;
            let recovered = replay_all(&store)?;
            // a boundary inside segment 0 has nothing to delete
            let deletes = boundary.segment() > 0;
            if deletes && (!crashed || disk.contents("0").is_some()) {
                return Ok(CrashRecoveryResult::fail(
                    description,
                    3,
                    recovered.len(),
                    "segments below the boundary were not deleted",
                ));
            }
            Ok(CrashRecoveryResult::check(description, &records[6..], &recovered))
        })();
        self.record(description, outcome)
    }

    /// Crashes a workload at every storage mutation in turn and checks that
    /// recovery yields a prefix of the stored records that includes every
    /// record acknowledged by a successful flush.
    pub fn test_crash_sweep(&mut self) -> CrashRecoveryResult {
        let description = "Crash at every mutation point";
        let records: Vec<_> = (0..10).map(numbered_record).collect();

        let total = {
            let dir = Arc::new(CrashableDir::unlimited(InMemoryDir::new()));
            let outcome = self.open(dir.clone()).and_then(|store| run_workload(&store, &records));
            if let Err(e) = outcome {
                let result = CrashRecoveryResult::fail(description, 0, 0, &e.to_string());
                self.results.push(result.clone());
                return result;
            }
            dir.mutations()
        };

        for crash_at in 0..total {
            let disk = InMemoryDir::new();
            let dir = Arc::new(CrashableDir::new(disk.clone(), crash_at));
            let mut acknowledged = 0;
            if let Ok(store) = self.open(dir.clone()) {
                acknowledged = run_workload(&store, &records).unwrap_or_else(|_| {
                    // only what a successful flush covered is promised
                    acknowledged_before_crash(&records, crash_at, self.block_size)
                });
            }

            let outcome = self
                .open(Arc::new(disk))
                .and_then(|store| replay_all(&store));
            let recovered = match outcome {
                Ok(recovered) => recovered,
                Err(e) => {
                    let result = CrashRecoveryResult::fail(
                        description,
                        acknowledged,
                        0,
                        &format!("recovery after crash at mutation {crash_at}: {e}"),
                    );
                    self.results.push(result.clone());
                    return result;
                }
            };

            let is_prefix = records.starts_with(&recovered);
            if !is_prefix || recovered.len() < acknowledged {
                let result = CrashRecoveryResult::fail(
                    description,
                    acknowledged,
                    recovered.len(),
                    &format!("crash at mutation {crash_at} recovered a bad prefix"),
                );
                self.results.push(result.clone());
                return result;
            }
        }

        let result = CrashRecoveryResult::pass(description, records.len());
        self.results.push(result.clone());
        result
    }

    /// Runs all crash recovery tests.
    pub fn run_all_tests(&mut self) -> Vec<CrashRecoveryResult> {
        vec![
            self.test_flushed_data_survives(),
            self.test_unflushed_data_discarded(),
            self.test_crash_after_rollover(),
            self.test_crash_during_clean(),
            self.test_crash_sweep(),
        ]
    }

    /// Returns a summary of all test results.
    pub fn summary(&self) -> String {
        let passed = self.results.iter().filter(|r| r.passed).count();
        let mut summary = format!(
            "Crash recovery: {}/{} passed\n",
            passed,
            self.results.len()
        );
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            summary.push_str(&format!("  [{}] {}", status, result.description));
            if let Some(error) = &result.error {
                summary.push_str(&format!(" ({})", error));
            }
            summary.push('\n');
        }
        summary
    }

    /// Returns whether all tests passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

/// Stores records in two flushed halves; returns how many were flushed.
fn run_workload(store: &SegmentedLogStore, records: &[Vec<u8>]) -> StoreResult<usize> {
    let half = records.len() / 2;
    store_all(store, &records[..half])?;
    store.flush()?;
    store_all(store, &records[half..])?;
    store.flush()?;
    Ok(records.len())
}

/// Number of records a successful first flush covered when the workload
/// crashed at mutation `crash_at`.
fn acknowledged_before_crash(records: &[Vec<u8>], crash_at: usize, block_size: u64) -> usize {
    let half = records.len() / 2;
    let probe = Arc::new(CrashableDir::unlimited(InMemoryDir::new()));
    let config = StoreConfig::new("memory", "probe").block_size(block_size);
    let Ok(store) = SegmentedLogStore::open_with_dir(config, probe.clone()) else {
        return 0;
    };
    if store_all(&store, &records[..half]).is_err() || store.flush().is_err() {
        return 0;
    }
    if probe.mutations() <= crash_at {
        half
    } else {
        0
    }
}
