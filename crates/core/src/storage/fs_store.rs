//! File system object store implementation.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use super::config::StorageConfig;
use super::error::StorageError;
use super::traits::ObjectStore;
use super::types::{ObjectMeta, StoredObject};

/// Object store backed by a directory tree.
///
/// Keys map to relative paths under the root. Writes go to a sibling
/// temporary file first and are renamed into place, so readers never see a
/// partial object.
pub struct FsObjectStore {
    config: StorageConfig,
}

impl FsObjectStore {
    /// Creates a new store with the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Creates a store rooted at `root` with default settings.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::new(StorageConfig {
            root: root.into(),
            ..StorageConfig::default()
        })
    }

    /// Resolve a key to its path, rejecting keys that escape the root.
    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let invalid = || StorageError::InvalidKey {
            key: key.to_string(),
        };

        if key.is_empty() || key.ends_with('/') {
            return Err(invalid());
        }

        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid());
        }

        Ok(self.config.root.join(relative))
    }

    /// Copies `source` to `destination`, returning the byte count and SHA-256.
    async fn copy_file(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<(u64, String), StorageError> {
        let source_file = File::open(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::SourceNotFound {
                    path: source.to_path_buf(),
                }
            } else {
                StorageError::Io(e)
            }
        })?;
        let dest_file = File::create(destination).await?;

        let mut reader = BufReader::with_capacity(self.config.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.config.buffer_size, dest_file);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.config.buffer_size];
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = reader.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            writer.write_all(&buffer[..bytes_read]).await?;
            total_bytes += bytes_read as u64;
        }

        writer.flush().await?;
        writer.get_ref().sync_all().await?;

        Ok((total_bytes, format!("{:x}", hasher.finalize())))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn put(
        &self,
        key: &str,
        source: &Path,
        meta: &ObjectMeta,
    ) -> Result<StoredObject, StorageError> {
        let destination = self.object_path(key)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = destination.with_file_name(format!(
            ".{}.{}.partial",
            file_name,
            uuid::Uuid::new_v4().simple()
        ));

        let (size_bytes, sha256) = match self.copy_file(source, &staging).await {
            Ok(copied) => copied,
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                return Err(e);
            }
        };

        if let Some(expected) = &meta.sha256 {
            if !expected.eq_ignore_ascii_case(&sha256) {
                let _ = fs::remove_file(&staging).await;
                return Err(StorageError::Unavailable(format!(
                    "checksum mismatch for {}: expected {}, wrote {}",
                    key, expected, sha256
                )));
            }
        }

        if let Err(e) = fs::rename(&staging, &destination).await {
            let _ = fs::remove_file(&staging).await;
            return Err(StorageError::Io(e));
        }

        debug!(key = %key, size_bytes, "Stored object");

        Ok(StoredObject {
            key: key.to_string(),
            size_bytes,
            location: destination.to_string_lossy().into_owned(),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn staged_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).await.unwrap();
        path
    }

    fn meta(size: u64) -> ObjectMeta {
        ObjectMeta {
            content_type: "image/png".to_string(),
            size_bytes: size,
            sha256: None,
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let temp = TempDir::new().unwrap();
        let store = FsObjectStore::with_root(temp.path().join("objects"));
        let source = staged_file(&temp, "src.png", b"png bytes").await;

        let stored = store
            .put("ai_generated/2024/01/02/image_b/x.png", &source, &meta(9))
            .await
            .unwrap();

        assert_eq!(stored.size_bytes, 9);
        assert!(store
            .exists("ai_generated/2024/01/02/image_b/x.png")
            .await
            .unwrap());
        let content = store
            .get("ai_generated/2024/01/02/image_b/x.png")
            .await
            .unwrap();
        assert_eq!(content, b"png bytes");
        // Source is left for the caller to clean up.
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_put_same_key_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = FsObjectStore::with_root(temp.path().join("objects"));
        let source = staged_file(&temp, "src.png", b"same").await;

        let first = store.put("a/b.png", &source, &meta(4)).await.unwrap();
        let second = store.put("a/b.png", &source, &meta(4)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.get("a/b.png").await.unwrap(), b"same");

        let mut entries = fs::read_dir(temp.path().join("objects/a")).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["b.png"]);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = FsObjectStore::with_root(temp.path());

        let result = store.get("nope/missing.png").await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let temp = TempDir::new().unwrap();
        let store = FsObjectStore::with_root(temp.path());
        let source = staged_file(&temp, "src.png", b"x").await;

        store.put("k.png", &source, &meta(1)).await.unwrap();
        store.delete("k.png").await.unwrap();
        store.delete("k.png").await.unwrap();
        assert!(!store.exists("k.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let temp = TempDir::new().unwrap();
        let store = FsObjectStore::with_root(temp.path());
        let source = staged_file(&temp, "src.png", b"x").await;

        for key in ["../escape.png", "/abs.png", "a/../../b.png", "", "dir/"] {
            let result = store.put(key, &source, &meta(1)).await;
            assert!(
                matches!(result, Err(StorageError::InvalidKey { .. })),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_missing_source() {
        let temp = TempDir::new().unwrap();
        let store = FsObjectStore::with_root(temp.path());

        let result = store
            .put("k.png", &temp.path().join("missing"), &meta(0))
            .await;
        assert!(matches!(result, Err(StorageError::SourceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_leaves_no_object() {
        let temp = TempDir::new().unwrap();
        let store = FsObjectStore::with_root(temp.path().join("objects"));
        let source = staged_file(&temp, "src.png", b"content").await;

        let mut bad = meta(7);
        bad.sha256 = Some("00".repeat(32));
        let result = store.put("k.png", &source, &bad).await;

        assert!(result.is_err());
        assert!(!store.exists("k.png").await.unwrap());
    }
}
