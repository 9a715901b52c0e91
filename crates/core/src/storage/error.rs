//! Error types for the storage module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by object store backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object is stored under the key.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The key is empty, absolute, or escapes the store root.
    #[error("Invalid object key: {key}")]
    InvalidKey { key: String },

    /// The staged source file could not be read.
    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// The backend could not be reached or refused the write.
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unavailable(_))
    }
}
