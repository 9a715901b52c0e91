//! Types for the storage module.

use serde::{Deserialize, Serialize};

/// Metadata supplied with an upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub content_type: String,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the content, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Result of a successful `put`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub size_bytes: u64,
    /// Backend-specific location of the object.
    pub location: String,
}
