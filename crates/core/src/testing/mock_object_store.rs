//! In-memory object store for testing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage::{ObjectMeta, ObjectStore, StorageError, StoredObject};

/// Mock implementation of the ObjectStore trait.
///
/// Keeps objects in memory and records every successful put.
#[derive(Debug, Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, ObjectMeta)>>,
    puts: Mutex<Vec<String>>,
    fail_remaining: Mutex<u32>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` puts with a retryable error.
    pub fn fail_next(&self, n: u32) {
        *self.fail_remaining.lock().unwrap() = n;
    }

    /// Keys of successful puts, in order. Overwrites appear once per put.
    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(bytes, _)| bytes.clone())
    }

    pub fn meta(&self, key: &str) -> Option<ObjectMeta> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, meta)| meta.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn put(
        &self,
        key: &str,
        source: &Path,
        meta: &ObjectMeta,
    ) -> Result<StoredObject, StorageError> {
        {
            let mut remaining = self.fail_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::Unavailable("mock store unavailable".to_string()));
            }
        }

        let bytes = tokio::fs::read(source).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::SourceNotFound {
                path: source.to_path_buf(),
            },
            _ => StorageError::Io(e),
        })?;
        let size_bytes = bytes.len() as u64;

        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, meta.clone()));
        self.puts.lock().unwrap().push(key.to_string());

        Ok(StoredObject {
            key: key.to_string(),
            size_bytes,
            location: format!("mock://{}", key),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.object(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}
