//! Trait definitions for the provider module.

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::artifact::MediaClass;

use super::types::{ProviderError, ProviderJobStatus, StatusVocabulary};

static DEFAULT_VOCABULARY: Lazy<StatusVocabulary> = Lazy::new(StatusVocabulary::default);

/// A third-party service that runs generation jobs.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Task type this provider serves.
    fn task_type(&self) -> &str;

    /// Kind of media the provider produces.
    fn media_class(&self) -> MediaClass;

    /// Status words the provider uses.
    fn vocabulary(&self) -> &StatusVocabulary {
        &DEFAULT_VOCABULARY
    }

    /// Submit a job. Returns the provider's job id.
    async fn create(&self, payload: &serde_json::Value) -> Result<String, ProviderError>;

    /// Fetch the current status of a job.
    async fn poll(&self, external_job_id: &str) -> Result<ProviderJobStatus, ProviderError>;
}
