use tokio::sync::mpsc;

use super::events::NotificationEvent;
use crate::metrics;

/// Handle for queueing notifications.
///
/// Cheaply cloneable. Never blocks and never fails the caller: when the
/// buffer is full or the dispatcher is gone the event is dropped and logged.
#[derive(Clone)]
pub struct NotificationHandle {
    tx: mpsc::Sender<NotificationEvent>,
}

impl NotificationHandle {
    pub fn new(tx: mpsc::Sender<NotificationEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event. Returns whether it was accepted.
    pub fn emit(&self, event: NotificationEvent) -> bool {
        let event_type = event.event_type();
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to queue notification: {}", e);
                metrics::NOTIFICATIONS
                    .with_label_values(&[event_type, "dropped"])
                    .inc();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(task_id: &str) -> NotificationEvent {
        NotificationEvent::TaskFailed {
            task_id: task_id.to_string(),
            task_type: "video_a".to_string(),
            last_error: None,
        }
    }

    #[test]
    fn test_emit() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = NotificationHandle::new(tx);

        assert!(handle.emit(failed("t-1")));
        let event = rx.try_recv().expect("Should receive event");
        assert_eq!(event.task_id(), "t-1");
    }

    #[test]
    fn test_emit_full_channel() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = NotificationHandle::new(tx);

        assert!(handle.emit(failed("t-1")));
        assert!(!handle.emit(failed("t-2")));
    }

    #[test]
    fn test_emit_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        let handle = NotificationHandle::new(tx);
        drop(rx);

        assert!(!handle.emit(failed("t-1")));
    }
}
