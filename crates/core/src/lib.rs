pub mod artifact;
pub mod backoff;
pub mod config;
pub mod metrics;
pub mod notifier;
pub mod orchestrator;
pub mod provider;
pub mod storage;
pub mod task;
pub mod testing;

pub use artifact::{
    ArtifactConfig, ArtifactError, ArtifactFetcher, ArtifactMetadata, ArtifactPipeline,
    ContentSignature, HttpFetcher, MediaClass,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use notifier::{
    create_notification_system, LogNotifier, NotificationDispatcher, NotificationEvent,
    NotificationHandle, Notifier, NotifierConfig, NotifyError, WebhookNotifier,
};
pub use orchestrator::{
    BeatReport, OrchestratorConfig, OrchestratorContext, OrchestratorError, OrchestratorStatus,
    RetryConfig, TaskOrchestrator, TaskStatusView, WorkOutcome,
};
pub use provider::{
    GenerationProvider, HttpProvider, PollOutcome, ProviderConfig, ProviderError,
    ProviderJobStatus, ProviderRegistry, StatusPoller,
};
pub use storage::{FsObjectStore, ObjectMeta, ObjectStore, StorageConfig, StorageError};
pub use task::{
    CreateTaskRequest, ErrorDescriptor, ErrorKind, SqliteTaskStore, TaskError, TaskEvent,
    TaskFilter, TaskPhase, TaskRecord, TaskState, TaskStore,
};
