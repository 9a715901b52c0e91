//! Shared dependencies for beats and workers.

use std::sync::Arc;

use crate::artifact::ArtifactPipeline;
use crate::notifier::NotificationHandle;
use crate::provider::{ProviderRegistry, StatusPoller};
use crate::task::TaskStore;

use super::config::OrchestratorConfig;

/// Everything a work item needs. Built once and shared behind an `Arc`.
pub struct OrchestratorContext {
    pub store: Arc<dyn TaskStore>,
    pub providers: ProviderRegistry,
    pub pipeline: Arc<ArtifactPipeline>,
    pub notifications: NotificationHandle,
    pub poller: StatusPoller,
    pub config: OrchestratorConfig,
}

impl OrchestratorContext {
    pub fn new(
        store: Arc<dyn TaskStore>,
        providers: ProviderRegistry,
        pipeline: Arc<ArtifactPipeline>,
        notifications: NotificationHandle,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            providers,
            pipeline,
            notifications,
            poller: StatusPoller::new(config.poller.clone()),
            config,
        }
    }
}
