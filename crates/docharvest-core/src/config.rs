//! Harvest settings, persisted as JSON in the user's config directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::archive::DEFAULT_MAX_PER_ARCHIVE;
use crate::error::{HarvestError, Result};

/// Settings for a harvesting run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Messages per structural scan request.
    pub scan_batch_size: usize,
    /// Messages per full fetch batch.
    pub fetch_batch_size: usize,
    /// Attachments per archive shard.
    pub max_per_archive: usize,
    /// Include the message body in the summary.
    pub include_body: bool,
    /// Carry base64 shard data on the completion event.
    pub inline_base64: bool,
    /// Root of the working store.
    pub work_dir: PathBuf,
    /// Where archives are written.
    pub output_dir: PathBuf,
    /// Idle time after which a leftover working namespace is swept.
    pub work_expiry_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            scan_batch_size: 100,
            fetch_batch_size: 10,
            max_per_archive: DEFAULT_MAX_PER_ARCHIVE,
            include_body: true,
            inline_base64: false,
            work_dir: std::env::temp_dir().join("docharvest"),
            output_dir: PathBuf::from("."),
            work_expiry_secs: 600,
        }
    }
}

impl HarvestConfig {
    /// Default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docharvest")
            .join("config.json")
    }

    /// Loads the config from `path`, or defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Config` if the file exists but is unreadable
    /// or invalid.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HarvestError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| HarvestError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config to `path` as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Config` if the file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HarvestError::Config(format!("{}: {e}", parent.display())))?;
        }
        let contents =
            serde_json::to_string_pretty(self).map_err(|e| HarvestError::Config(e.to_string()))?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| HarvestError::Config(format!("{}: {e}", path.display())))?;

        info!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Checks that every size is usable.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Config` naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("scan_batch_size", self.scan_batch_size),
            ("fetch_batch_size", self.fetch_batch_size),
            ("max_per_archive", self.max_per_archive),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(HarvestError::Config(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }

    /// Working store expiry window.
    #[must_use]
    pub const fn work_expiry(&self) -> Duration {
        Duration::from_secs(self.work_expiry_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarvestConfig::default();
        assert_eq!(config.scan_batch_size, 100);
        assert_eq!(config.fetch_batch_size, 10);
        assert_eq!(config.max_per_archive, 300);
        assert!(config.include_body);
        assert!(!config.inline_base64);
        assert_eq!(config.work_expiry(), Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = HarvestConfig {
            fetch_batch_size: 0,
            ..HarvestConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fetch_batch_size"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: HarvestConfig = serde_json::from_str(r#"{"fetch_batch_size": 25}"#).unwrap();
        assert_eq!(config.fetch_batch_size, 25);
        assert_eq!(config.scan_batch_size, 100);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = HarvestConfig {
            include_body: false,
            max_per_archive: 50,
            ..HarvestConfig::default()
        };
        config.save_to(&path).await.unwrap();

        let loaded = HarvestConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = HarvestConfig::load_from(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(loaded, HarvestConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = HarvestConfig::load_from(&path).await.unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }
}
