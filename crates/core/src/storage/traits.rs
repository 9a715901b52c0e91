//! Trait definitions for the storage module.

use async_trait::async_trait;
use std::path::Path;

use super::error::StorageError;
use super::types::{ObjectMeta, StoredObject};

/// A blob store holding finished artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the name of this backend.
    fn name(&self) -> &str;

    /// Store the file at `source` under `key`, replacing any existing object.
    async fn put(
        &self,
        key: &str,
        source: &Path,
        meta: &ObjectMeta,
    ) -> Result<StoredObject, StorageError>;

    /// Read an object's content.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}
