//! # EventSpool Core
//!
//! Durable, segmented, append-only log engine.
//!
//! A producer appends opaque records and periodically flushes them to
//! stable storage; a consumer replays flushed records from any cursor and
//! tells the store when older data may be reclaimed. Every record gets an
//! [`Address`] (segment index, byte offset) that callers persist to resume
//! later.
//!
//! This crate provides:
//! - Segmented append path with size-capped rollover
//! - Flush protocol with per-segment durable length files
//! - Positioned replay across segment boundaries
//! - Clean boundary and segment reclamation
//! - Crash recovery from bookkeeping files
//!
//! Storage is reached through [`eventspool_storage::StorageDir`], so the
//! engine runs unchanged on local disk or in memory.
//!
//! ## Watermarks
//!
//! ```text
//!   deleted  │   reclaimable   │   readable    │ written, not durable
//! ───────────┼─────────────────┼───────────────┼──────────────────────▶
//!     cleaned_segment        clean          flushed                write
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod address;
mod config;
mod error;
pub mod layout;
mod record;
mod state;
mod store;

pub use address::{Address, ParseAddressError, ADDRESS_SIZE};
pub use config::{
    StoreConfig, BASE_DIR_KEY, BLOCK_SIZE_KEY, DEFAULT_BLOCK_SIZE, ID_KEY, RESTORE_KEY,
};
pub use error::{StoreError, StoreResult};
pub use record::{decode_length, frame_len, RetrievedRecord, LENGTH_PREFIX_SIZE, MAX_PAYLOAD_LEN};
pub use state::EngineState;
pub use store::SegmentedLogStore;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
