//! Types for the provider module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    /// The response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A create call succeeded but its answer named no job. A job may exist
    /// upstream, so the call is never repeated.
    #[error("Unconfirmed create: {0}")]
    UnconfirmedCreate(String),

    /// The provider refused the request outright.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether the call may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout(_) | Self::Connection(_) | Self::InvalidResponse(_) => true,
            Self::UnconfirmedCreate(_) | Self::Rejected(_) | Self::NotConfigured(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connection(e.to_string())
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

/// Raw job status as reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderJobStatus {
    /// Status word, in the provider's own vocabulary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Completion flag, for operation-style APIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    /// Where the result was published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
}

impl ProviderJobStatus {
    pub fn running(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn done(locator: impl Into<String>) -> Self {
        Self {
            status: Some("completed".to_string()),
            locator: Some(locator.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some("failed".to_string()),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Normalized result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Running { progress_hint: Option<String> },
    Done { locator: String },
    TransientError { message: String },
    PermanentError { message: String },
}

impl PollOutcome {
    /// Label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            PollOutcome::Running { .. } => "running",
            PollOutcome::Done { .. } => "done",
            PollOutcome::TransientError { .. } => "transient_error",
            PollOutcome::PermanentError { .. } => "permanent_error",
        }
    }
}

/// Meaning of a provider status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Running,
    Done,
    Failed,
}

/// Status words a provider uses for each class. Matching ignores case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusVocabulary {
    #[serde(default = "default_done")]
    pub done: Vec<String>,
    #[serde(default = "default_failed")]
    pub failed: Vec<String>,
    #[serde(default = "default_running")]
    pub running: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_done() -> Vec<String> {
    words(&["completed", "succeeded", "success", "done", "finished"])
}

fn default_failed() -> Vec<String> {
    words(&["failed", "error", "cancelled", "canceled", "expired"])
}

fn default_running() -> Vec<String> {
    words(&[
        "queued",
        "pending",
        "processing",
        "running",
        "in_progress",
        "generating",
        "submitted",
    ])
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        Self {
            done: default_done(),
            failed: default_failed(),
            running: default_running(),
        }
    }
}

impl StatusVocabulary {
    /// Classify a status word. `None` when the word is not listed.
    pub fn classify(&self, status: &str) -> Option<StatusClass> {
        let status = status.trim();
        let listed = |list: &[String]| list.iter().any(|w| w.eq_ignore_ascii_case(status));

        if listed(&self.failed) {
            Some(StatusClass::Failed)
        } else if listed(&self.done) {
            Some(StatusClass::Done)
        } else if listed(&self.running) {
            Some(StatusClass::Running)
        } else {
            None
        }
    }
}
