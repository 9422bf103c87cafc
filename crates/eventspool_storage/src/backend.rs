//! Storage capability traits.

use crate::error::StorageResult;
use std::fmt::Debug;

/// A handle on one file of a [`StorageDir`].
///
/// Handles are **opaque byte stores**. The log engine uses one handle per
/// segment for appending and a separate handle per segment for reading.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` only observes bytes that have been pushed with `flush` (or
///   `sync`) through some handle on the same file
/// - `sync` ensures all appended data is durable
/// - Handles must be `Send + Sync` so roles can move between threads
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The read would extend beyond the visible end of the file
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the file.
    ///
    /// Returns the offset where the data was written. The bytes may stay
    /// buffered inside the handle until [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered appends down to the storage layer.
    ///
    /// Afterwards other handles on the same file can read the bytes, but
    /// they are not guaranteed to survive a machine crash.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the logical size of the file in bytes, buffered appends
    /// included.
    ///
    /// This is the offset where the next `append` will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Flushes and forces all appended data to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the file to the given size.
    ///
    /// Used when a segment is re-attached after a restart and carries an
    /// unflushed tail that must be discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The truncation fails
    /// - `new_size` is greater than current size
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}

/// A flat namespace of named files hosting one log store.
///
/// This is the "segmented byte-stream filesystem": open-for-append,
/// open-for-read, durable small-file replacement, delete and exists. File
/// names are single path components chosen by the engine.
pub trait StorageDir: Send + Sync + Debug {
    /// Creates `name`, truncating it if it already exists, and returns a
    /// handle positioned at offset zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    fn create(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>>;

    /// Opens an existing file for reading and appending.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound) if
    /// the file does not exist, or an I/O error.
    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>>;

    /// Returns true if `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if existence cannot be determined.
    fn exists(&self, name: &str) -> StorageResult<bool>;

    /// Reads the whole content of a small file, or `None` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    fn read_file(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically and durably replaces the content of a small file.
    ///
    /// Readers observe either the old or the new content, never a mix.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or the sync fails.
    fn write_file(&self, name: &str, data: &[u8]) -> StorageResult<()>;

    /// Deletes `name`. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    fn remove(&self, name: &str) -> StorageResult<bool>;

    /// Lists the names of all files, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be enumerated.
    fn list(&self) -> StorageResult<Vec<String>>;

    /// Deletes every file in the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be removed.
    fn clear(&self) -> StorageResult<()>;

    /// Preferred size of one segment on this storage, if it has one.
    fn default_block_size(&self) -> Option<u64> {
        None
    }
}
