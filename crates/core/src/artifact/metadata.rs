//! Artifact metadata and object key derivation.

use chrono::Datelike;

use crate::task::TaskRecord;

use super::types::{ArtifactMetadata, ContentSignature};

/// Build the metadata stored on the task once the artifact is validated.
pub fn build_metadata(
    task: &TaskRecord,
    signature: ContentSignature,
    size_bytes: u64,
    sha256: &str,
    md5: &str,
) -> ArtifactMetadata {
    ArtifactMetadata {
        content_type: signature.content_type().to_string(),
        extension: signature.extension().to_string(),
        media_class: signature.media_class(),
        size_bytes,
        sha256: sha256.to_string(),
        md5: md5.to_string(),
        params: task.payload.clone(),
    }
}

/// Object key for a task's artifact.
///
/// Derived from `created_at` rather than the upload time so every retry
/// targets the same key.
pub fn object_key(category: &str, task: &TaskRecord, extension: &str) -> String {
    let created = task.created_at;
    format!(
        "{}/{:04}/{:02}/{:02}/{}/{}.{}",
        category.trim_matches('/'),
        created.year(),
        created.month(),
        created.day(),
        task.task_type,
        task.task_id,
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MediaClass;
    use chrono::{TimeZone, Utc};

    fn task() -> TaskRecord {
        TaskRecord::new(
            "video_a:1700000000-abc",
            "video_a",
            serde_json::json!({"prompt": "waves", "duration": 5}),
            Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap(),
        )
    }

    #[test]
    fn test_object_key_layout() {
        let key = object_key("ai_generated", &task(), "mp4");
        assert_eq!(
            key,
            "ai_generated/2023/11/14/video_a/video_a:1700000000-abc.mp4"
        );
    }

    #[test]
    fn test_object_key_ignores_update_time() {
        let mut t = task();
        let first = object_key("ai_generated/", &t, "mp4");
        t.updated_at = Utc::now();
        assert_eq!(object_key("ai_generated", &t, "mp4"), first);
    }

    #[test]
    fn test_build_metadata_echoes_payload() {
        let meta = build_metadata(&task(), ContentSignature::Mp4, 10, "aa", "bb");
        assert_eq!(meta.content_type, "video/mp4");
        assert_eq!(meta.extension, "mp4");
        assert_eq!(meta.media_class, MediaClass::Video);
        assert_eq!(meta.params["prompt"], "waves");
    }
}
