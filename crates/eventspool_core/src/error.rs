//! Error types for the log store.

use crate::address::Address;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in log store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] eventspool_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configured base directory does not exist.
    #[error("base directory does not exist: {}", path.display())]
    BaseDirMissing {
        /// The configured path.
        path: PathBuf,
    },

    /// The configured base directory is not a directory.
    #[error("base directory is not a directory: {}", path.display())]
    NotADirectory {
        /// The configured path.
        path: PathBuf,
    },

    /// Another instance holds the store directory.
    #[error("store locked: another instance has exclusive access")]
    StoreLocked,

    /// Configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A segment that should hold flushed data is gone.
    #[error("segment file {segment} does not exist")]
    SegmentMissing {
        /// The missing segment index.
        segment: u32,
    },

    /// The requested address lies below the clean boundary.
    #[error("the data for address {requested} has already been deleted (clean boundary {clean})")]
    AlreadyReclaimed {
        /// The requested address.
        requested: Address,
        /// The clean boundary at the time of the request.
        clean: Address,
    },

    /// `retrieve_next` was called without a positioned reader.
    #[error("reader is not positioned: call retrieve first")]
    NotPositioned,

    /// The `clean <= flushed <= write` ordering does not hold.
    #[error("watermark invariant violated: {message}")]
    InvariantViolation {
        /// Description of the violation.
        message: String,
    },

    /// A bookkeeping file or segment frame is malformed.
    #[error("corrupted store: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The record cannot be addressed by a 32-bit segment offset.
    #[error("record of {len} bytes is too large for a segment")]
    RecordTooLarge {
        /// Payload length in bytes.
        len: usize,
    },

    /// The store was closed, explicitly or by an earlier fatal error.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Returns true if the error leaves the store unusable.
    ///
    /// A store that reported a fatal error has closed its handles and
    /// answers every later call with [`StoreError::Closed`].
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidConfig { .. } | Self::RecordTooLarge { .. })
    }
}
