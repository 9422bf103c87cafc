//! # EventSpool Storage
//!
//! Storage capability underneath the EventSpool segmented log.
//!
//! The log engine never talks to a filesystem directly. It asks a
//! [`StorageDir`] for named files and drives each segment through a
//! [`StorageBackend`] handle. Anything that can open a file for append,
//! read it at an offset, make it durable, delete it and tell whether it
//! exists can host the engine.
//!
//! ## Design Principles
//!
//! - Backends are **opaque byte stores**; record framing, cursors and
//!   bookkeeping formats belong to `eventspool_core`
//! - Appended bytes may sit in a buffer until `flush`; only `sync` promises
//!   they survive a crash
//! - Small bookkeeping files are replaced atomically with `write_file`
//! - Everything is `Send + Sync` so the writer and reader roles can live on
//!   different threads
//!
//! ## Available Implementations
//!
//! - [`FileDir`] / [`FileBackend`] - local disk
//! - [`InMemoryDir`] / [`InMemoryBackend`] - tests and ephemeral stores, with
//!   injectable I/O faults
//!
//! ## Example
//!
//! ```rust
//! use eventspool_storage::{InMemoryDir, StorageBackend, StorageDir};
//!
//! let dir = InMemoryDir::new();
//! let mut segment = dir.create("0").unwrap();
//! let offset = segment.append(b"hello world").unwrap();
//! segment.sync().unwrap();
//!
//! let reader = dir.open("0").unwrap();
//! assert_eq!(reader.read_at(offset, 5).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{StorageBackend, StorageDir};
pub use error::{StorageError, StorageResult};
pub use file::{DirLock, FileBackend, FileDir, LOCK_FILE};
pub use memory::{InMemoryBackend, InMemoryDir};
