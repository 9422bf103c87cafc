//! # EventSpool Testkit
//!
//! Test utilities for EventSpool.
//!
//! This crate provides:
//! - Test fixtures and store helpers
//! - Property-based test generators using proptest
//! - Crash recovery harnesses
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use eventspool_testkit::prelude::*;
//!
//! let (store, records) = scenarios::populated_store(5, 64);
//! assert_eq!(replay_all(&store).unwrap(), records);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::{CrashRecoveryHarness, CrashRecoveryResult, CrashableDir};
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
