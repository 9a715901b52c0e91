//! Staging, validation and upload of a task's artifact.

use std::sync::Arc;

use tracing::{debug, info};

use crate::metrics;
use crate::storage::{ObjectMeta, ObjectStore};
use crate::task::TaskRecord;

use super::config::ArtifactConfig;
use super::error::ArtifactError;
use super::fetch::{ArtifactFetcher, FetchedContent};
use super::metadata::{build_metadata, object_key};
use super::temp::ScopedTempFile;
use super::types::{ArtifactMetadata, ContentSignature, MediaClass};
use super::validate::validate_artifact;

/// A downloaded artifact waiting to be validated and uploaded.
///
/// The staged file is removed when this value drops.
#[derive(Debug)]
pub struct StagedArtifact {
    file: ScopedTempFile,
    pub content: FetchedContent,
}

impl StagedArtifact {
    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    pub fn size_bytes(&self) -> u64 {
        self.content.size_bytes
    }
}

/// Download → validate → describe → upload, for one task at a time.
pub struct ArtifactPipeline {
    config: ArtifactConfig,
    fetcher: Arc<dyn ArtifactFetcher>,
    store: Arc<dyn ObjectStore>,
}

impl ArtifactPipeline {
    pub fn new(
        config: ArtifactConfig,
        fetcher: Arc<dyn ArtifactFetcher>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            fetcher,
            store,
        }
    }

    pub fn config(&self) -> &ArtifactConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Download the task's result into the staging directory.
    pub async fn stage(&self, task: &TaskRecord) -> Result<StagedArtifact, ArtifactError> {
        let locator = task.result_locator.as_deref().ok_or_else(|| {
            ArtifactError::UnsupportedLocator(format!("task {} has no result locator", task.task_id))
        })?;

        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        let file = ScopedTempFile::new_in(&self.config.temp_dir, &task.task_type);

        let content = self
            .fetcher
            .fetch(locator, file.path(), self.config.max_size_bytes)
            .await?;

        debug!(
            task_id = %task.task_id,
            size_bytes = content.size_bytes,
            path = %file.path().display(),
            "Staged artifact"
        );

        Ok(StagedArtifact { file, content })
    }

    /// Check the staged file against the media class the task type produces.
    pub fn inspect(
        &self,
        staged: &StagedArtifact,
        media_class: MediaClass,
    ) -> Result<ContentSignature, ArtifactError> {
        validate_artifact(staged.content.size_bytes, &staged.content.head, media_class)
    }

    /// Metadata for a validated artifact.
    pub fn describe(
        &self,
        task: &TaskRecord,
        staged: &StagedArtifact,
        signature: ContentSignature,
    ) -> ArtifactMetadata {
        build_metadata(
            task,
            signature,
            staged.content.size_bytes,
            &staged.content.sha256,
            &staged.content.md5,
        )
    }

    /// Upload to the object store. Returns the object key.
    pub async fn upload(
        &self,
        task: &TaskRecord,
        staged: &StagedArtifact,
        metadata: &ArtifactMetadata,
    ) -> Result<String, ArtifactError> {
        let key = object_key(&self.config.category, task, &metadata.extension);
        let meta = ObjectMeta {
            content_type: metadata.content_type.clone(),
            size_bytes: metadata.size_bytes,
            sha256: Some(metadata.sha256.clone()),
        };

        let stored = self.store.put(&key, staged.path(), &meta).await?;
        metrics::ARTIFACT_BYTES
            .with_label_values(&[&task.task_type])
            .inc_by(stored.size_bytes);

        info!(
            task_id = %task.task_id,
            key = %key,
            backend = %self.store.name(),
            size_bytes = stored.size_bytes,
            "Uploaded artifact"
        );

        Ok(key)
    }
}
