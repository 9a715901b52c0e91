use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::config::NotifierConfig;
use super::events::NotificationEvent;
use super::handle::NotificationHandle;
use super::traits::Notifier;
use crate::metrics;

/// Background task delivering queued notifications.
pub struct NotificationDispatcher {
    rx: mpsc::Receiver<NotificationEvent>,
    notifier: Arc<dyn Notifier>,
    attempts: u32,
    retry_delay: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        rx: mpsc::Receiver<NotificationEvent>,
        notifier: Arc<dyn Notifier>,
        retry_count: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            rx,
            notifier,
            attempts: retry_count.max(1),
            retry_delay,
        }
    }

    /// Deliver events until every handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        tracing::info!(notifier = %self.notifier.name(), "Notification dispatcher started");

        while let Some(event) = self.rx.recv().await {
            self.deliver(&event).await;
        }

        tracing::info!("Notification dispatcher shutting down");
    }

    async fn deliver(&self, event: &NotificationEvent) {
        for attempt in 1..=self.attempts {
            match self.notifier.notify(event).await {
                Ok(()) => {
                    metrics::NOTIFICATIONS
                        .with_label_values(&[event.event_type(), "delivered"])
                        .inc();
                    return;
                }
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(
                        task_id = %event.task_id(),
                        attempt,
                        error = %e,
                        "Notification attempt failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        task_id = %event.task_id(),
                        attempts = self.attempts,
                        error = %e,
                        "Giving up on notification"
                    );
                }
            }
        }

        metrics::NOTIFICATIONS
            .with_label_values(&[event.event_type(), "failed"])
            .inc();
    }
}

/// Create a complete notification system
///
/// Returns:
/// - `NotificationHandle` - for queueing events (clone this to share across workers)
/// - `NotificationDispatcher` - spawn this with `tokio::spawn(dispatcher.run())`
pub fn create_notification_system(
    notifier: Arc<dyn Notifier>,
    config: &NotifierConfig,
) -> (NotificationHandle, NotificationDispatcher) {
    let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
    let handle = NotificationHandle::new(tx);
    let dispatcher = NotificationDispatcher::new(
        rx,
        notifier,
        config.retry_count,
        Duration::from_millis(config.retry_delay_ms),
    );
    (handle, dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNotifier;

    fn config() -> NotifierConfig {
        NotifierConfig {
            retry_count: 3,
            retry_delay_ms: 1,
            ..NotifierConfig::default()
        }
    }

    fn failed(task_id: &str) -> NotificationEvent {
        NotificationEvent::TaskFailed {
            task_id: task_id.to_string(),
            task_type: "video_a".to_string(),
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_events() {
        let notifier = Arc::new(MockNotifier::new());
        let (handle, dispatcher) = create_notification_system(notifier.clone(), &config());
        let task = tokio::spawn(dispatcher.run());

        handle.emit(failed("t-1"));
        handle.emit(failed("t-2"));
        drop(handle);
        task.await.unwrap();

        let delivered = notifier.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].task_id(), "t-1");
    }

    #[tokio::test]
    async fn test_dispatcher_retries_then_succeeds() {
        let notifier = Arc::new(MockNotifier::new());
        notifier.fail_next(2);
        let (handle, dispatcher) = create_notification_system(notifier.clone(), &config());
        let task = tokio::spawn(dispatcher.run());

        handle.emit(failed("t-1"));
        drop(handle);
        task.await.unwrap();

        assert_eq!(notifier.attempts(), 3);
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_gives_up_after_retry_count() {
        let notifier = Arc::new(MockNotifier::new());
        notifier.fail_next(10);
        let (handle, dispatcher) = create_notification_system(notifier.clone(), &config());
        let task = tokio::spawn(dispatcher.run());

        handle.emit(failed("t-1"));
        handle.emit(failed("t-2"));
        drop(handle);
        task.await.unwrap();

        assert_eq!(notifier.attempts(), 6);
        assert!(notifier.delivered().is_empty());
    }
}
