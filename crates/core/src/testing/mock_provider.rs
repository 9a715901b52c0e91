//! Mock generation provider for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::artifact::MediaClass;
use crate::provider::{GenerationProvider, ProviderError, ProviderJobStatus};

/// Mock implementation of the GenerationProvider trait.
///
/// Responses are scripted per call; once a script runs dry the mock falls
/// back to accepting every create and reporting every job as processing.
///
/// # Example
///
/// ```rust,ignore
/// let provider = MockProvider::video("video_a");
/// provider.push_poll(Ok(ProviderJobStatus::running("processing")));
/// provider.push_poll(Ok(ProviderJobStatus::done("file:///tmp/out.mp4")));
/// ```
#[derive(Debug)]
pub struct MockProvider {
    task_type: String,
    media_class: MediaClass,
    creates: Mutex<VecDeque<Result<String, ProviderError>>>,
    polls: Mutex<VecDeque<Result<ProviderJobStatus, ProviderError>>>,
    create_calls: Mutex<Vec<Value>>,
    poll_calls: Mutex<Vec<String>>,
    /// Sleep before answering, to exercise timeouts.
    delay: Mutex<Option<Duration>>,
    job_counter: AtomicU64,
}

impl MockProvider {
    pub fn new(task_type: impl Into<String>, media_class: MediaClass) -> Self {
        Self {
            task_type: task_type.into(),
            media_class,
            creates: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
            create_calls: Mutex::new(Vec::new()),
            poll_calls: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            job_counter: AtomicU64::new(0),
        }
    }

    pub fn video(task_type: impl Into<String>) -> Self {
        Self::new(task_type, MediaClass::Video)
    }

    pub fn image(task_type: impl Into<String>) -> Self {
        Self::new(task_type, MediaClass::Image)
    }

    /// Queue the result of the next unscripted create call.
    pub fn push_create(&self, result: Result<String, ProviderError>) {
        self.creates.lock().unwrap().push_back(result);
    }

    /// Queue the result of the next unscripted poll call.
    pub fn push_poll(&self, result: Result<ProviderJobStatus, ProviderError>) {
        self.polls.lock().unwrap().push_back(result);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Payloads passed to create, in call order.
    pub fn create_calls(&self) -> Vec<Value> {
        self.create_calls.lock().unwrap().clone()
    }

    /// Job ids passed to poll, in call order.
    pub fn poll_calls(&self) -> Vec<String> {
        self.poll_calls.lock().unwrap().clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn task_type(&self) -> &str {
        &self.task_type
    }

    fn media_class(&self) -> MediaClass {
        self.media_class
    }

    async fn create(&self, payload: &Value) -> Result<String, ProviderError> {
        self.create_calls.lock().unwrap().push(payload.clone());
        self.pause().await;

        let scripted = self.creates.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.job_counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{}-job-{}", self.task_type, n))
        })
    }

    async fn poll(&self, external_job_id: &str) -> Result<ProviderJobStatus, ProviderError> {
        self.poll_calls
            .lock()
            .unwrap()
            .push(external_job_id.to_string());
        self.pause().await;

        let scripted = self.polls.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(ProviderJobStatus::running("processing")))
    }
}
