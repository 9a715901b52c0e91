//! Webhook notifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::config::NotifierConfig;
use super::events::NotificationEvent;
use super::traits::{NotifyError, Notifier};

/// POSTs each event as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self, NotifyError> {
        let url = config
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| NotifyError::NotConfigured("notifier url is required".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        debug!(url = %self.url, event = event.event_type(), task_id = %event.task_id(), "Posting notification");

        let response = self.client.post(&self.url).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_url() {
        let result = WebhookNotifier::new(&NotifierConfig {
            enabled: true,
            ..NotifierConfig::default()
        });
        assert!(matches!(result, Err(NotifyError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_unreachable_target_errors() {
        let notifier = WebhookNotifier::new(&NotifierConfig {
            enabled: true,
            url: Some("http://127.0.0.1:1/hook".to_string()),
            timeout_secs: 2,
            ..NotifierConfig::default()
        })
        .unwrap();

        let event = NotificationEvent::TaskFailed {
            task_id: "video_a:1-abc".to_string(),
            task_type: "video_a".to_string(),
            last_error: None,
        };
        assert!(notifier.notify(&event).await.is_err());
    }
}
