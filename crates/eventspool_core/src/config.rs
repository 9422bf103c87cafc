//! Store configuration.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Segment size cap used when neither the configuration nor the backend
/// provides one.
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Property key for the store identifier.
pub const ID_KEY: &str = "id";
/// Property key for the base directory.
pub const BASE_DIR_KEY: &str = "baseDir";
/// Property key for the restore flag.
pub const RESTORE_KEY: &str = "restore";
/// Property key for the segment size cap.
pub const BLOCK_SIZE_KEY: &str = "blockSize";

/// Configuration for opening a [`SegmentedLogStore`](crate::SegmentedLogStore).
///
/// The store lives in `<base_dir>/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Directory hosting one sub-directory per store. Must already exist.
    pub base_dir: PathBuf,

    /// Store identifier, a single path component.
    pub id: String,

    /// Keep the data of a previous run. `false` wipes the store on open.
    #[serde(default = "default_restore")]
    pub restore: bool,

    /// Segment size cap in bytes. `None` defers to the backend, then to
    /// [`DEFAULT_BLOCK_SIZE`].
    #[serde(default)]
    pub block_size: Option<u64>,
}

const fn default_restore() -> bool {
    true
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, id: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            id: id.into(),
            restore: true,
            block_size: None,
        }
    }

    /// Sets whether previous data is restored on open.
    #[must_use]
    pub fn restore(mut self, value: bool) -> Self {
        self.restore = value;
        self
    }

    /// Sets the segment size cap.
    #[must_use]
    pub fn block_size(mut self, size: u64) -> Self {
        self.block_size = Some(size);
        self
    }

    /// Builds a configuration from flat host properties
    /// (`id`, `baseDir`, `restore`, `blockSize`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `id` or `baseDir` is missing or a value
    /// does not parse.
    pub fn from_properties(props: &HashMap<String, String>) -> StoreResult<Self> {
        let id = props
            .get(ID_KEY)
            .ok_or_else(|| StoreError::invalid_config("id can't be null"))?;
        let base_dir = props
            .get(BASE_DIR_KEY)
            .ok_or_else(|| StoreError::invalid_config("baseDir can't be null"))?;

        let mut config = Self::new(base_dir, id.as_str());

        if let Some(restore) = props.get(RESTORE_KEY) {
            config.restore = restore.trim().parse().map_err(|_| {
                StoreError::invalid_config(format!("{RESTORE_KEY} must be true or false"))
            })?;
        }
        if let Some(size) = props.get(BLOCK_SIZE_KEY) {
            let size = size.trim().parse().map_err(|_| {
                StoreError::invalid_config(format!("{BLOCK_SIZE_KEY} must be an integer"))
            })?;
            config.block_size = Some(size);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the store cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> StoreResult<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(StoreError::invalid_config("baseDir cannot be empty"));
        }

        let mut components = Path::new(&self.id).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal {
            return Err(StoreError::invalid_config(format!(
                "id {:?} must be a single directory name",
                self.id
            )));
        }

        if let Some(size) = self.block_size {
            check_block_size(size)?;
        }
        Ok(())
    }

    /// Directory holding this store's files.
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.base_dir.join(&self.id)
    }

    /// Resolves the segment size cap, falling back to `backend_default`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the backend suggests an unusable size.
    pub fn effective_block_size(&self, backend_default: Option<u64>) -> StoreResult<u64> {
        let size = self
            .block_size
            .or(backend_default.filter(|&size| size > 0))
            .unwrap_or(DEFAULT_BLOCK_SIZE);
        check_block_size(size)?;
        Ok(size)
    }
}

fn check_block_size(size: u64) -> StoreResult<()> {
    if size == 0 || size > u64::from(u32::MAX) {
        return Err(StoreError::invalid_config(format!(
            "blockSize {size} must be between 1 and {}",
            u32::MAX
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = StoreConfig::new("/data", "sink-1");
        assert!(config.restore);
        assert_eq!(config.block_size, None);
        assert_eq!(config.store_dir(), PathBuf::from("/data/sink-1"));
        assert_eq!(config.effective_block_size(None).unwrap(), DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new("/data", "s").restore(false).block_size(16);
        assert!(!config.restore);
        assert_eq!(config.effective_block_size(Some(4096)).unwrap(), 16);
    }

    #[test]
    fn backend_default_is_fallback() {
        let config = StoreConfig::new("/data", "s");
        assert_eq!(config.effective_block_size(Some(4096)).unwrap(), 4096);
        assert_eq!(
            config.effective_block_size(Some(0)).unwrap(),
            DEFAULT_BLOCK_SIZE
        );
    }

    #[test]
    fn from_properties_reads_host_keys() {
        let config = StoreConfig::from_properties(&props(&[
            ("id", "flume"),
            ("baseDir", "/tmp/spool"),
            ("restore", "false"),
            ("blockSize", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.id, "flume");
        assert_eq!(config.base_dir, PathBuf::from("/tmp/spool"));
        assert!(!config.restore);
        assert_eq!(config.block_size, Some(1024));
    }

    #[test]
    fn from_properties_requires_id_and_base_dir() {
        assert!(StoreConfig::from_properties(&props(&[("baseDir", "/tmp")])).is_err());
        assert!(StoreConfig::from_properties(&props(&[("id", "x")])).is_err());
        assert!(StoreConfig::from_properties(&props(&[
            ("id", "x"),
            ("baseDir", "/tmp"),
            ("blockSize", "big"),
        ]))
        .is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(StoreConfig::new("/d", "../up").validate().is_err());
        assert!(StoreConfig::new("/d", "a/b").validate().is_err());
        assert!(StoreConfig::new("/d", "").validate().is_err());
        assert!(StoreConfig::new("", "x").validate().is_err());
        assert!(StoreConfig::new("/d", "x").block_size(0).validate().is_err());
        assert!(StoreConfig::new("/d", "x")
            .block_size(u64::from(u32::MAX) + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn json_round_trip_uses_camel_case() {
        let json = r#"{"baseDir":"/data","id":"s1","blockSize":16}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert!(config.restore);
        assert_eq!(config.block_size, Some(16));
        assert!(serde_json::to_string(&config).unwrap().contains("\"baseDir\""));
    }
}
