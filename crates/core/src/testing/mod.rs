//! Testing utilities and mock implementations.
//!
//! Mocks for every external seam (providers, object store, notifier) plus a
//! harness that wires them to an in-memory task store, so the orchestrator
//! can be exercised end to end without a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use genbroker_core::testing::{fixtures::TestHarness, MockProvider};
//!
//! let h = TestHarness::new(OrchestratorConfig::default(), vec![MockProvider::video("video_a")]);
//! let orchestrator = fixtures::orchestrator_with(&h);
//! let task = orchestrator.submit("video_a", json!({"prompt": "a fox"}))?;
//! orchestrator.drive(&task.task_id).await;
//! ```

mod mock_notifier;
mod mock_object_store;
mod mock_provider;

pub use mock_notifier::MockNotifier;
pub use mock_object_store::MockObjectStore;
pub use mock_provider::MockProvider;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use super::{MockObjectStore, MockProvider};
    use crate::artifact::{ArtifactConfig, ArtifactPipeline, HttpFetcher};
    use crate::notifier::{NotificationEvent, NotificationHandle};
    use crate::orchestrator::{OrchestratorConfig, OrchestratorContext, TaskOrchestrator};
    use crate::provider::{ProviderJobStatus, ProviderRegistry};
    use crate::task::{SqliteTaskStore, TaskStore};

    /// Smallest byte sequence the validator accepts as MP4.
    pub const MP4_BYTES: &[u8] = b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00isomiso2mp41";

    /// Smallest byte sequence the validator accepts as PNG.
    pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01";

    /// Orchestrator config with instant retries and short budgets.
    pub fn fast_config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.lease_ttl_secs = 30;
        config.work_item_timeout_secs = 10;
        config.retry.initial_delay_secs = 0;
        config.retry.max_delay_secs = 0;
        config.poller.poll_retries = 0;
        config.poller.poll_backoff_initial_ms = 1;
        config.poller.poll_backoff_max_ms = 1;
        config
    }

    /// Write `bytes` under `dir` and return a `file://` locator for it.
    pub fn file_locator(dir: &Path, name: &str, bytes: &[u8]) -> String {
        let path = dir.join(name);
        std::fs::write(&path, bytes).expect("failed to write fixture file");
        format!("file://{}", path.display())
    }

    /// A completed provider status pointing at a local file.
    pub fn done_with_file(dir: &Path, name: &str, bytes: &[u8]) -> ProviderJobStatus {
        ProviderJobStatus::done(file_locator(dir, name, bytes))
    }

    /// Everything an orchestrator needs, backed by mocks and an in-memory
    /// task store.
    pub struct TestHarness {
        pub store: Arc<SqliteTaskStore>,
        pub providers: Vec<Arc<MockProvider>>,
        pub objects: Arc<MockObjectStore>,
        pub context: Arc<OrchestratorContext>,
        pub staging_dir: PathBuf,
        notifications: Mutex<mpsc::Receiver<NotificationEvent>>,
    }

    impl TestHarness {
        pub fn new(config: OrchestratorConfig, providers: Vec<MockProvider>) -> Self {
            let staging_dir = std::env::temp_dir()
                .join(format!("genbroker-test-{}", uuid::Uuid::new_v4().simple()));
            Self::with_staging_dir(config, providers, staging_dir)
        }

        pub fn with_staging_dir(
            config: OrchestratorConfig,
            providers: Vec<MockProvider>,
            staging_dir: PathBuf,
        ) -> Self {
            let store = Arc::new(SqliteTaskStore::in_memory().expect("in-memory store"));
            let objects = Arc::new(MockObjectStore::new());
            let providers: Vec<Arc<MockProvider>> = providers.into_iter().map(Arc::new).collect();

            let mut registry = ProviderRegistry::new();
            for provider in &providers {
                registry.register(provider.clone());
            }

            let artifact_config = ArtifactConfig::default().with_temp_dir(staging_dir.clone());
            let fetcher = Arc::new(HttpFetcher::new(&artifact_config).expect("http fetcher"));
            let pipeline = Arc::new(ArtifactPipeline::new(
                artifact_config,
                fetcher,
                objects.clone(),
            ));

            let (tx, rx) = mpsc::channel(64);
            let task_store: Arc<dyn TaskStore> = store.clone();
            let context = Arc::new(OrchestratorContext::new(
                task_store,
                registry,
                pipeline,
                NotificationHandle::new(tx),
                config,
            ));

            Self {
                store,
                providers,
                objects,
                context,
                staging_dir,
                notifications: Mutex::new(rx),
            }
        }

        /// Notifications emitted so far and not yet taken.
        pub fn take_notifications(&self) -> Vec<NotificationEvent> {
            let mut rx = self.notifications.lock().unwrap();
            let mut events = Vec::new();
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
            events
        }
    }

    /// A fresh orchestrator over the harness context.
    pub fn orchestrator_with(harness: &TestHarness) -> TaskOrchestrator {
        TaskOrchestrator::new(harness.context.clone())
    }
}
