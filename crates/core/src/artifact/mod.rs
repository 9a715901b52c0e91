//! Result artifact handling.
//!
//! Once a provider reports a finished job the artifact is staged locally,
//! checked against the expected media class, described, and written to the
//! object store under a key derived from the task alone:
//!
//! ```text
//! {category}/{year}/{month}/{day}/{task_type}/{task_id}.{ext}
//! ```
//!
//! Staged files are owned by a [`ScopedTempFile`] and removed when it drops,
//! whichever way the work item ends.

mod config;
mod error;
mod fetch;
mod metadata;
mod pipeline;
mod temp;
mod types;
mod validate;

pub use config::ArtifactConfig;
pub use error::ArtifactError;
pub use fetch::{ArtifactFetcher, FetchedContent, HttpFetcher};
pub use metadata::{build_metadata, object_key};
pub use pipeline::{ArtifactPipeline, StagedArtifact};
pub use temp::ScopedTempFile;
pub use types::{ArtifactMetadata, ContentSignature, MediaClass};
pub use validate::{sniff_content, validate_artifact, SNIFF_LEN};
