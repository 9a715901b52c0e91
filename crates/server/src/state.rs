use std::sync::Arc;
use genbroker_core::{Config, ObjectStore, SanitizedConfig, TaskOrchestrator, TaskStore};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<TaskOrchestrator>,
    task_store: Arc<dyn TaskStore>,
    object_store: Arc<dyn ObjectStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Arc<TaskOrchestrator>,
        task_store: Arc<dyn TaskStore>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            task_store,
            object_store,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &Arc<TaskOrchestrator> {
        &self.orchestrator
    }

    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.task_store
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.object_store
    }
}
