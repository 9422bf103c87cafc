//! In-memory storage for testing.
//!
//! [`InMemoryDir`] is cheaply cloneable; clones share the same files, so a
//! test can drop a store and reopen it against the same "disk". Appends stay
//! in the handle's private buffer until `flush`/`sync`, which makes dropping
//! a handle behave like a process crash.

use crate::backend::{StorageBackend, StorageDir};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type SharedBuf = Arc<RwLock<Vec<u8>>>;

/// Countdown of injected failures shared by a directory and its handles.
#[derive(Debug, Default)]
struct Faults {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl Faults {
    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_read(&self) -> StorageResult<()> {
        if Self::take(&self.reads) {
            return Err(injected("read"));
        }
        Ok(())
    }

    fn check_write(&self) -> StorageResult<()> {
        if Self::take(&self.writes) {
            return Err(injected("write"));
        }
        Ok(())
    }
}

fn injected(op: &str) -> StorageError {
    StorageError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("injected {op} failure"),
    ))
}

/// An in-memory file handle.
///
/// # Example
///
/// ```rust
/// use eventspool_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let offset = backend.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: SharedBuf,
    pending: Vec<u8>,
    faults: Arc<Faults>,
}

impl InMemoryBackend {
    /// Creates a new empty, unshared backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend over pre-existing visible data.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            ..Self::default()
        }
    }

    /// Returns a copy of the visible (flushed) data.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    fn push_pending(&mut self) {
        if !self.pending.is_empty() {
            self.data.write().append(&mut self.pending);
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.faults.check_read()?;

        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        self.faults.check_write()?;
        let offset = self.size()?;
        self.pending.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.faults.check_write()?;
        self.push_pending();
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok((self.data.read().len() + self.pending.len()) as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        // memory has no cache below the visible buffer
        self.flush()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.faults.check_write()?;
        self.push_pending();

        let mut data = self.data.write();
        let current_size = data.len() as u64;

        if new_size > current_size {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, current_size
                ),
            )));
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: RwLock<BTreeMap<String, SharedBuf>>,
    faults: Arc<Faults>,
    block_size: Option<u64>,
}

/// An in-memory [`StorageDir`].
///
/// # Example
///
/// ```rust
/// use eventspool_storage::{InMemoryDir, StorageDir};
///
/// let dir = InMemoryDir::new();
/// dir.write_file("flushedCounter", b"3").unwrap();
///
/// let same_disk = dir.clone();
/// assert_eq!(same_disk.read_file("flushedCounter").unwrap().unwrap(), b"3");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryDir {
    inner: Arc<MemoryFiles>,
}

impl InMemoryDir {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty directory that reports `size` as its preferred
    /// segment size.
    #[must_use]
    pub fn with_block_size(size: u64) -> Self {
        Self {
            inner: Arc::new(MemoryFiles {
                block_size: Some(size),
                ..MemoryFiles::default()
            }),
        }
    }

    /// Makes the next `count` reads (handle reads and `read_file`) fail.
    pub fn fail_next_reads(&self, count: usize) {
        self.inner.faults.reads.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` mutations (appends, flushes, truncates,
    /// `write_file`, `remove`) fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.faults.writes.store(count, Ordering::SeqCst);
    }

    /// Returns the visible content of a file, if present.
    #[must_use]
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.inner
            .files
            .read()
            .get(name)
            .map(|buf| buf.read().clone())
    }

    fn handle(&self, data: SharedBuf) -> Box<dyn StorageBackend> {
        Box::new(InMemoryBackend {
            data,
            pending: Vec::new(),
            faults: Arc::clone(&self.inner.faults),
        })
    }
}

impl StorageDir for InMemoryDir {
    fn create(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        self.inner.faults.check_write()?;
        let buf = {
            let mut files = self.inner.files.write();
            let buf = files.entry(name.to_string()).or_default();
            buf.write().clear();
            Arc::clone(buf)
        };
        Ok(self.handle(buf))
    }

    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        let buf = self
            .inner
            .files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        Ok(self.handle(buf))
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.inner.files.read().contains_key(name))
    }

    fn read_file(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.faults.check_read()?;
        Ok(self.contents(name))
    }

    fn write_file(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        self.inner.faults.check_write()?;
        let mut files = self.inner.files.write();
        let buf = files.entry(name.to_string()).or_default();
        *buf.write() = data.to_vec();
        Ok(())
    }

    fn remove(&self, name: &str) -> StorageResult<bool> {
        self.inner.faults.check_write()?;
        Ok(self.inner.files.write().remove(name).is_some())
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        Ok(self.inner.files.read().keys().cloned().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        self.inner.files.write().clear();
        Ok(())
    }

    fn default_block_size(&self) -> Option<u64> {
        self.inner.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn memory_append_is_buffered_until_flush() {
        let mut backend = InMemoryBackend::new();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
        assert!(backend.data().is_empty());
        assert!(matches!(
            backend.read_at(0, 5),
            Err(StorageError::ReadPastEnd { size: 0, .. })
        ));

        backend.flush().unwrap();
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn memory_with_data() {
        let backend = InMemoryBackend::with_data(b"preloaded".to_vec());
        assert_eq!(backend.size().unwrap(), 9);
        assert_eq!(backend.read_at(0, 9).unwrap(), b"preloaded");
    }

    #[test]
    fn memory_truncate_flushes_then_cuts() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello world").unwrap();

        backend.truncate(5).unwrap();
        assert_eq!(backend.size().unwrap(), 5);
        assert_eq!(backend.read_at(0, 5).unwrap(), b"hello");
        assert!(backend.truncate(100).is_err());
    }

    #[test]
    fn dir_handles_share_visible_bytes() {
        let dir = InMemoryDir::new();
        let mut writer = dir.create("0").unwrap();
        let reader = dir.open("0").unwrap();

        writer.append(b"abc").unwrap();
        assert!(reader.read_at(0, 3).is_err());
        writer.sync().unwrap();
        assert_eq!(reader.read_at(0, 3).unwrap(), b"abc");
    }

    #[test]
    fn dropped_handle_loses_pending_bytes() {
        let dir = InMemoryDir::new();
        {
            let mut writer = dir.create("0").unwrap();
            writer.append(b"durable").unwrap();
            writer.sync().unwrap();
            writer.append(b"lost").unwrap();
        }
        assert_eq!(dir.contents("0").unwrap(), b"durable");
    }

    #[test]
    fn dir_create_truncates_existing() {
        let dir = InMemoryDir::new();
        dir.write_file("0", b"stale").unwrap();
        let segment = dir.create("0").unwrap();
        assert_eq!(segment.size().unwrap(), 0);
        assert_eq!(dir.contents("0").unwrap(), b"");
    }

    #[test]
    fn dir_block_size_is_shared_by_clones() {
        assert_eq!(InMemoryDir::new().default_block_size(), None);
        let dir = InMemoryDir::with_block_size(4096);
        assert_eq!(dir.clone().default_block_size(), Some(4096));
    }

    #[test]
    fn dir_remove_list_clear() {
        let dir = InMemoryDir::new();
        dir.write_file("1", b"").unwrap();
        dir.write_file("0", b"").unwrap();
        assert_eq!(dir.list().unwrap(), vec!["0", "1"]);

        assert!(dir.remove("0").unwrap());
        assert!(!dir.remove("0").unwrap());
        assert!(matches!(dir.open("0"), Err(e) if e.is_not_found()));

        dir.clear().unwrap();
        assert!(dir.list().unwrap().is_empty());
    }

    #[test]
    fn injected_faults_count_down() {
        let dir = InMemoryDir::new();
        dir.write_file("x", b"1").unwrap();

        dir.fail_next_reads(1);
        assert!(dir.read_file("x").is_err());
        assert!(dir.read_file("x").is_ok());

        dir.fail_next_writes(2);
        assert!(dir.write_file("x", b"2").is_err());
        assert!(dir.remove("x").is_err());
        assert!(dir.write_file("x", b"2").is_ok());
        assert_eq!(dir.contents("x").unwrap(), b"2");
    }
}
