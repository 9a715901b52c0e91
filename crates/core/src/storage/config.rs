//! Configuration for the object store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the filesystem object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory objects are stored under.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Buffer size for file copies in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_root() -> PathBuf {
    PathBuf::from("./objects")
}

fn default_buffer_size() -> usize {
    1024 * 1024 // 1 MB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            buffer_size: default_buffer_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.root, PathBuf::from("./objects"));
        assert_eq!(config.buffer_size, 1024 * 1024);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: StorageConfig = toml::from_str(r#"root = "/srv/artifacts""#).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/artifacts"));
        assert_eq!(config.buffer_size, 1024 * 1024);
    }
}
