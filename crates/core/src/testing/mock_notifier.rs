//! Recording notifier for testing.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::notifier::{NotificationEvent, Notifier, NotifyError};

/// Mock implementation of the Notifier trait.
#[derive(Debug, Default)]
pub struct MockNotifier {
    delivered: Mutex<Vec<NotificationEvent>>,
    attempts: Mutex<u32>,
    fail_remaining: Mutex<u32>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` deliveries.
    pub fn fail_next(&self, n: u32) {
        *self.fail_remaining.lock().unwrap() = n;
    }

    /// Delivery attempts, including failed ones.
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }

    pub fn delivered(&self) -> Vec<NotificationEvent> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        *self.attempts.lock().unwrap() += 1;

        let mut remaining = self.fail_remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(NotifyError::Status { status: 503 });
        }
        drop(remaining);

        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }
}
