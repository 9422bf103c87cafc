//! Local-disk storage: one directory per store, one OS file per name.
//!
//! ```text
//! <root>/
//! ├─ LOCK                        # advisory lock, single owner
//! ├─ 0, 1, 2 ...                 # segment files
//! └─ ... bookkeeping files       # replaced atomically via temp + rename
//! ```

use crate::backend::{StorageBackend, StorageDir};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Name of the advisory lock file. It is never listed and survives
/// [`StorageDir::clear`].
pub const LOCK_FILE: &str = "LOCK";

/// Prefix of temporary files used by atomic replacement.
const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".tmp";

/// Filesystem allocation units per segment when the store sets no cap.
pub const SEGMENT_ALLOCATION_UNITS: u64 = 16 * 1024;

/// A file-based storage handle.
///
/// Appends go through a write buffer; reads use a second, independent OS
/// handle so they never disturb the append position.
///
/// # Durability
///
/// - `flush()` empties the write buffer into the OS
/// - `sync()` additionally calls `File::sync_data()`
///
/// # Example
///
/// ```no_run
/// use eventspool_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::create(Path::new("0")).unwrap();
/// backend.append(b"persistent data").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    reader: Mutex<File>,
    writer: BufWriter<File>,
    size: u64,
}

impl FileBackend {
    /// Opens an existing file, or creates it, keeping its content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::from_file(path, file)
    }

    /// Creates a file, truncating any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::from_file(path, file)
    }

    fn from_file(path: &Path, mut file: File) -> StorageResult<Self> {
        let size = file.seek(SeekFrom::End(0))?;
        let reader = File::open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: Mutex::new(reader),
            writer: BufWriter::new(file),
            size,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.reader.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        match file.read_exact(&mut buffer) {
            Ok(()) => Ok(buffer),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                let size = file.metadata()?.len();
                Err(StorageError::ReadPastEnd { offset, len, size })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        self.writer.write_all(data)?;
        self.size += data.len() as u64;

        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.size {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, self.size
                ),
            )));
        }

        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(new_size)?;
        file.seek(SeekFrom::End(0))?;
        file.sync_all()?;
        self.size = new_size;

        Ok(())
    }
}

/// Exclusive advisory lock on a [`FileDir`], released on drop.
#[derive(Debug)]
pub struct DirLock {
    _file: File,
}

/// A directory on local disk acting as a [`StorageDir`].
#[derive(Debug, Clone)]
pub struct FileDir {
    root: PathBuf,
}

impl FileDir {
    /// Opens the directory at `root`, creating it (and its parents) if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or `root` exists
    /// and is not a directory.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        if !root.is_dir() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a directory: {}", root.display()),
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Takes the exclusive advisory lock on this directory (non-blocking).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another holder owns the lock.
    pub fn lock(&self) -> StorageResult<DirLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(self.root.display().to_string()));
        }

        Ok(DirLock { _file: file })
    }

    /// Removes the directory and everything in it.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    pub fn remove_all(self) -> StorageResult<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Syncs the directory so that creates, renames and deletes are durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.root)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced
        Ok(())
    }
}

fn validate_name(name: &str) -> StorageResult<()> {
    let plain = !name.is_empty()
        && !name.starts_with(TEMP_PREFIX)
        && !name.contains(['/', '\\'])
        && name != LOCK_FILE;
    if plain {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

fn is_store_file(name: &str) -> bool {
    name != LOCK_FILE && !name.starts_with(TEMP_PREFIX)
}

impl StorageDir for FileDir {
    fn create(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        let backend = FileBackend::create(&self.path(name)?)?;
        self.sync_directory()?;
        Ok(Box::new(backend))
    }

    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        let path = self.path(name)?;
        if !path.is_file() {
            return Err(StorageError::NotFound(name.to_string()));
        }
        Ok(Box::new(FileBackend::open(&path)?))
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.path(name)?.is_file())
    }

    fn read_file(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.path(name)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write-then-rename:
    /// 1. Write to a temporary file
    /// 2. Sync the temporary file
    /// 3. Rename it over the target
    /// 4. Sync the directory so the rename is durable
    fn write_file(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        let target = self.path(name)?;
        let temp = self.root.join(format!("{TEMP_PREFIX}{name}{TEMP_SUFFIX}"));

        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &target)?;
        self.sync_directory()
    }

    fn remove(&self, name: &str) -> StorageResult<bool> {
        match fs::remove_file(self.path(name)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_store_file(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn clear(&self) -> StorageResult<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_name().to_str() == Some(LOCK_FILE) {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        self.sync_directory()
    }

    /// A whole number of filesystem allocation units, 64 MiB on the usual
    /// 4 KiB granularity.
    fn default_block_size(&self) -> Option<u64> {
        fs2::allocation_granularity(&self.root)
            .ok()
            .and_then(|unit| unit.checked_mul(SEGMENT_ALLOCATION_UNITS))
            .filter(|&size| size > 0 && size <= u64::from(u32::MAX))
    }
}
