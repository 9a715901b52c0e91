//! Error types for the artifact module.

use thiserror::Error;

use crate::storage::StorageError;
use crate::task::ErrorKind;

/// Errors that can occur while staging, validating or uploading an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The transfer failed part way or could not start.
    #[error("Download failed: {0}")]
    Download(String),

    /// The transfer timed out.
    #[error("Download timed out: {0}")]
    Timeout(String),

    /// The locator answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    /// The artifact exceeds the configured size limit.
    #[error("Artifact exceeds {max_bytes} bytes")]
    TooLarge { max_bytes: u64 },

    /// The artifact is empty, unrecognised or of the wrong media class.
    #[error("Artifact validation failed: {0}")]
    Validation(String),

    /// The locator scheme is not supported, or there is no locator.
    #[error("Unsupported locator: {0}")]
    UnsupportedLocator(String),

    /// The object store rejected the upload.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Local staging I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArtifactError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Download(_) | Self::Timeout(_) | Self::Io(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Storage(e) => e.is_retryable(),
            Self::TooLarge { .. } | Self::Validation(_) | Self::UnsupportedLocator(_) => false,
        }
    }

    /// Classification recorded on the task.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TooLarge { .. } | Self::Validation(_) => ErrorKind::ArtifactValidationError,
            Self::Storage(_) | Self::Io(_) => ErrorKind::StorageError,
            _ if self.is_retryable() => ErrorKind::TransientExternalError,
            _ => ErrorKind::PermanentExternalError,
        }
    }
}
