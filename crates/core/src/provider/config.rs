//! Configuration for HTTP providers.

use serde::{Deserialize, Serialize};

use crate::artifact::MediaClass;

use super::types::StatusVocabulary;

/// One `[[providers]]` entry: a task type and the API that serves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Task type served, e.g. `video_a`.
    pub task_type: String,

    pub media_class: MediaClass,

    /// Base URL of the provider API.
    pub base_url: String,

    /// Path the create request is POSTed to.
    #[serde(default = "default_create_path")]
    pub create_path: String,

    /// Path polled for status; `{job_id}` is replaced with the encoded job id.
    #[serde(default = "default_status_path")]
    pub status_path: String,

    /// API key sent in `auth_header`.
    /// Can use ${ENV_VAR} syntax to read from environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_auth_header")]
    pub auth_header: String,

    /// Prefix placed before the key in the header value.
    #[serde(default = "default_auth_prefix")]
    pub auth_prefix: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub response: ResponseMapping,

    #[serde(default)]
    pub vocabulary: StatusVocabulary,
}

/// JSON pointers (RFC 6901) locating fields in provider responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMapping {
    /// Job id in the create response.
    #[serde(default = "default_job_id_pointer")]
    pub job_id: String,

    #[serde(default = "default_status_pointer")]
    pub status: Option<String>,

    /// Boolean completion flag, for operation-style APIs.
    #[serde(default)]
    pub done: Option<String>,

    #[serde(default = "default_locator_pointer")]
    pub locator: String,

    #[serde(default = "default_error_pointer")]
    pub error: Option<String>,

    #[serde(default = "default_progress_pointer")]
    pub progress: Option<String>,
}

fn default_create_path() -> String {
    "/jobs".to_string()
}

fn default_status_path() -> String {
    "/jobs/{job_id}".to_string()
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

fn default_auth_prefix() -> String {
    "Bearer ".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_job_id_pointer() -> String {
    "/id".to_string()
}

fn default_status_pointer() -> Option<String> {
    Some("/status".to_string())
}

fn default_locator_pointer() -> String {
    "/result_url".to_string()
}

fn default_error_pointer() -> Option<String> {
    Some("/error".to_string())
}

fn default_progress_pointer() -> Option<String> {
    Some("/progress".to_string())
}

impl Default for ResponseMapping {
    fn default() -> Self {
        Self {
            job_id: default_job_id_pointer(),
            status: default_status_pointer(),
            done: None,
            locator: default_locator_pointer(),
            error: default_error_pointer(),
            progress: default_progress_pointer(),
        }
    }
}

impl ProviderConfig {
    /// Minimal config with default paths and mapping.
    pub fn new(
        task_type: impl Into<String>,
        media_class: MediaClass,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            media_class,
            base_url: base_url.into(),
            create_path: default_create_path(),
            status_path: default_status_path(),
            api_key: None,
            auth_header: default_auth_header(),
            auth_prefix: default_auth_prefix(),
            timeout_secs: default_timeout_secs(),
            response: ResponseMapping::default(),
            vocabulary: StatusVocabulary::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let config: ProviderConfig = toml::from_str(
            r#"
            task_type = "video_a"
            media_class = "video"
            base_url = "https://api.example.com/v1"
            "#,
        )
        .unwrap();

        assert_eq!(config.create_path, "/jobs");
        assert_eq!(config.status_path, "/jobs/{job_id}");
        assert_eq!(config.response.job_id, "/id");
        assert_eq!(config.response.done, None);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_deserialize_operation_style() {
        let config: ProviderConfig = toml::from_str(
            r#"
            task_type = "video_c"
            media_class = "video"
            base_url = "https://ops.example.com"
            create_path = "/models/v3:predictLongRunning"
            status_path = "/operations/{job_id}"
            auth_header = "x-goog-api-key"
            auth_prefix = ""

            [response]
            job_id = "/name"
            done = "/done"
            locator = "/response/videos/0/uri"
            error = "/error/message"
            "#,
        )
        .unwrap();

        assert_eq!(config.response.done.as_deref(), Some("/done"));
        assert_eq!(config.response.status.as_deref(), Some("/status"));
        assert_eq!(config.auth_prefix, "");
    }
}
