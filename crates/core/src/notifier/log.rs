use async_trait::async_trait;
use tracing::info;

use super::events::NotificationEvent;
use super::traits::{NotifyError, Notifier};

/// Notifier that only writes events to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        info!(
            event = event.event_type(),
            task_id = %event.task_id(),
            "Task notification"
        );
        Ok(())
    }
}
