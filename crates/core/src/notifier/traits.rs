//! Trait definitions for the notifier module.

use async_trait::async_trait;
use thiserror::Error;

use super::events::NotificationEvent;

/// Errors from a delivery attempt.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Target returned {status}")]
    Status { status: u16 },

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Http(e.to_string())
    }
}

/// Delivers notification events to a downstream consumer.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Make one delivery attempt.
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}
