//! Configuration for artifact handling.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for staging and storing artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Directory for staged downloads.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Largest artifact accepted, in bytes.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Leading path segment of object keys.
    #[serde(default = "default_category")]
    pub category: String,

    /// Whole-transfer timeout for a download.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Buffer size for local reads and writes in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("genbroker")
}

fn default_max_size_bytes() -> u64 {
    2 * 1024 * 1024 * 1024 // 2 GiB
}

fn default_category() -> String {
    "ai_generated".to_string()
}

fn default_download_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_buffer_size() -> usize {
    64 * 1024
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_size_bytes: default_max_size_bytes(),
            category: default_category(),
            download_timeout_secs: default_download_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl ArtifactConfig {
    /// Sets the staging directory.
    pub fn with_temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = path.into();
        self
    }

    /// Sets the size limit.
    pub fn with_max_size_bytes(mut self, max: u64) -> Self {
        self.max_size_bytes = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ArtifactConfig::default();
        assert_eq!(config.max_size_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.category, "ai_generated");
        assert_eq!(config.download_timeout_secs, 300);
    }

    #[test]
    fn test_builder() {
        let config = ArtifactConfig::default()
            .with_temp_dir("/var/tmp/stage")
            .with_max_size_bytes(1024);
        assert_eq!(config.temp_dir, PathBuf::from("/var/tmp/stage"));
        assert_eq!(config.max_size_bytes, 1024);
    }
}
