//! Types for the artifact module.

use serde::{Deserialize, Serialize};

/// Kind of media a task type produces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaClass {
    Video,
    Image,
}

impl std::fmt::Display for MediaClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaClass::Video => write!(f, "video"),
            MediaClass::Image => write!(f, "image"),
        }
    }
}

/// File format recognised from the leading bytes of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSignature {
    Mp4,
    QuickTime,
    WebM,
    Matroska,
    Png,
    Jpeg,
    Gif,
    WebP,
}

impl ContentSignature {
    pub fn content_type(&self) -> &'static str {
        match self {
            ContentSignature::Mp4 => "video/mp4",
            ContentSignature::QuickTime => "video/quicktime",
            ContentSignature::WebM => "video/webm",
            ContentSignature::Matroska => "video/x-matroska",
            ContentSignature::Png => "image/png",
            ContentSignature::Jpeg => "image/jpeg",
            ContentSignature::Gif => "image/gif",
            ContentSignature::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContentSignature::Mp4 => "mp4",
            ContentSignature::QuickTime => "mov",
            ContentSignature::WebM => "webm",
            ContentSignature::Matroska => "mkv",
            ContentSignature::Png => "png",
            ContentSignature::Jpeg => "jpg",
            ContentSignature::Gif => "gif",
            ContentSignature::WebP => "webp",
        }
    }

    pub fn media_class(&self) -> MediaClass {
        match self {
            ContentSignature::Mp4
            | ContentSignature::QuickTime
            | ContentSignature::WebM
            | ContentSignature::Matroska => MediaClass::Video,
            ContentSignature::Png
            | ContentSignature::Jpeg
            | ContentSignature::Gif
            | ContentSignature::WebP => MediaClass::Image,
        }
    }
}

/// Description of a stored artifact, kept on the task record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactMetadata {
    pub content_type: String,
    pub extension: String,
    pub media_class: MediaClass,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256.
    pub sha256: String,
    /// Hex-encoded MD5.
    pub md5: String,
    /// Generation parameters echoed from the request payload.
    #[serde(default)]
    pub params: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_classes() {
        assert_eq!(ContentSignature::WebM.media_class(), MediaClass::Video);
        assert_eq!(ContentSignature::WebP.media_class(), MediaClass::Image);
        assert_eq!(ContentSignature::QuickTime.extension(), "mov");
        assert_eq!(ContentSignature::Jpeg.content_type(), "image/jpeg");
    }

    #[test]
    fn test_media_class_serialization() {
        let json = serde_json::to_string(&MediaClass::Video).unwrap();
        assert_eq!(json, r#""video""#);
    }
}
