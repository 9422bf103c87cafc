//! CLI command implementations.

pub mod clean;
pub mod dump;
pub mod inspect;
pub mod verify;

use eventspool_core::StoreConfig;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the CLI itself, before a store is touched.
#[derive(Debug, Error)]
pub enum CliError {
    /// Neither `--base-dir` nor a config file named the base directory.
    #[error("store location required: pass --base-dir and --id, or --config")]
    MissingLocation,

    /// The store directory does not exist.
    #[error("no store found at {}", .0.display())]
    NoStore(PathBuf),

    /// The configuration file could not be used.
    #[error("cannot read config {}: {reason}", path.display())]
    BadConfig {
        /// Config file path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// `verify` found problems.
    #[error("verification failed with {0} problem(s)")]
    VerifyFailed(usize),
}

/// Where a command finds its store.
#[derive(Debug, Default)]
pub struct StoreLocation {
    /// `--base-dir`
    pub base_dir: Option<PathBuf>,
    /// `--id`
    pub id: Option<String>,
    /// `--config`
    pub config: Option<PathBuf>,
}

impl StoreLocation {
    /// Builds the store configuration from the config file and flags.
    ///
    /// Operator commands never wipe a store, so `restore` is always forced
    /// on.
    pub fn resolve(&self) -> Result<StoreConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => {
                let bad = |reason: String| CliError::BadConfig {
                    path: path.clone(),
                    reason,
                };
                let text = fs::read_to_string(path).map_err(|e| bad(e.to_string()))?;
                serde_json::from_str::<StoreConfig>(&text).map_err(|e| bad(e.to_string()))?
            }
            None => {
                let (Some(base_dir), Some(id)) = (&self.base_dir, &self.id) else {
                    return Err(CliError::MissingLocation);
                };
                StoreConfig::new(base_dir, id.as_str())
            }
        };

        if let Some(base_dir) = &self.base_dir {
            config.base_dir = base_dir.clone();
        }
        if let Some(id) = &self.id {
            config.id = id.clone();
        }
        config.restore = true;

        if !config.store_dir().is_dir() {
            return Err(CliError::NoStore(config.store_dir()));
        }
        Ok(config)
    }
}
