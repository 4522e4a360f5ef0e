//! Queue configuration loading and management.
//!
//! Configuration can be created programmatically, loaded from TOML or JSON, or
//! discovered by walking up from the current directory looking for
//! `ocrqueue.toml`.

use crate::{OcrQueueError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File name searched for by [`QueueConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "ocrqueue.toml";

/// Runtime configuration of an [`OcrRequestQueue`](crate::OcrRequestQueue).
///
/// # Example
///
/// ```rust
/// use ocrqueue::QueueConfig;
///
/// let config = QueueConfig::default();
/// assert!(config.effective_worker_count() >= 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of worker tasks (None = number of available processors)
    #[serde(default)]
    pub worker_count: Option<usize>,

    /// Delay before the single retry of a failed temp file deletion
    #[serde(default = "default_cleanup_retry_delay_ms")]
    pub cleanup_retry_delay_ms: u64,
}

fn default_cleanup_retry_delay_ms() -> u64 {
    100
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            cleanup_retry_delay_ms: default_cleanup_retry_delay_ms(),
        }
    }
}

impl QueueConfig {
    /// Workers started when the pool spins up.
    pub fn effective_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn cleanup_retry_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_retry_delay_ms)
    }

    /// Reject settings the queue cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == Some(0) {
            return Err(OcrQueueError::validation("worker_count must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `OcrQueueError::Validation` if the file can't be read and
    /// `OcrQueueError::Serialization` if it is not valid TOML.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            OcrQueueError::validation(format!("Failed to read config file {}: {}", path.as_ref().display(), e))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| OcrQueueError::serialization_with_source(format!("Invalid TOML in {}", path.as_ref().display()), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            OcrQueueError::validation(format!("Failed to read config file {}: {}", path.as_ref().display(), e))
        })?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| OcrQueueError::serialization_with_source(format!("Invalid JSON in {}", path.as_ref().display()), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, picking the format from its extension (`.json` or TOML otherwise).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Discover `ocrqueue.toml` in the current directory or any parent.
    ///
    /// # Returns
    ///
    /// - `Some(config)` if found
    /// - `None` if no config file found
    pub fn discover() -> Result<Option<Self>> {
        let current = std::env::current_dir().map_err(OcrQueueError::Io)?;
        Self::discover_from(&current)
    }

    /// Same as [`discover`](Self::discover), starting at `start`.
    pub fn discover_from(start: &Path) -> Result<Option<Self>> {
        let mut current = Some(start);

        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Ok(Some(Self::from_toml_file(candidate)?));
            }
            current = dir.parent();
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert!(config.worker_count.is_none());
        assert_eq!(config.cleanup_retry_delay_ms, 100);
        assert_eq!(config.effective_worker_count(), num_cpus::get().max(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        fs::write(
            &config_path,
            r#"
worker_count = 3
cleanup_retry_delay_ms = 5
        "#,
        )
        .unwrap();

        let config = QueueConfig::from_toml_file(&config_path).unwrap();
        assert_eq!(config.worker_count, Some(3));
        assert_eq!(config.effective_worker_count(), 3);
        assert_eq!(config.cleanup_retry_delay(), Duration::from_millis(5));
    }

    #[test]
    fn test_from_toml_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "").unwrap();

        let config = QueueConfig::from_toml_file(&config_path).unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("queue.json");
        fs::write(&config_path, r#"{"worker_count": 2}"#).unwrap();

        let config = QueueConfig::from_file(&config_path).unwrap();
        assert_eq!(config.worker_count, Some(2));
        assert_eq!(config.cleanup_retry_delay_ms, 100);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "worker_count = 0").unwrap();

        let err = QueueConfig::from_toml_file(&config_path).unwrap_err();
        assert!(matches!(err, OcrQueueError::Validation { .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "worker_count = \"many\"").unwrap();

        let err = QueueConfig::from_toml_file(&config_path).unwrap_err();
        assert!(matches!(err, OcrQueueError::Serialization { .. }));
        assert!(err.to_string().contains("Invalid TOML"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("ocrqueue.json");
        fs::write(&config_path, "{\"worker_count\": ").unwrap();

        let err = QueueConfig::from_file(&config_path).unwrap_err();
        assert!(matches!(err, OcrQueueError::Serialization { .. }));
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = QueueConfig::from_toml_file(dir.path().join("absent.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_discover_from_parent_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "worker_count = 4").unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = QueueConfig::discover_from(&nested).unwrap();
        assert_eq!(config.unwrap().worker_count, Some(4));
    }
}
