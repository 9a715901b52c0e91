//! Content sniffing and artifact validation.

use super::error::ArtifactError;
use super::types::{ContentSignature, MediaClass};

/// Number of leading bytes needed to recognise every supported format.
pub const SNIFF_LEN: usize = 64;

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Recognise a file format from its leading bytes.
pub fn sniff_content(head: &[u8]) -> Option<ContentSignature> {
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return match &head[8..12] {
            b"qt  " => Some(ContentSignature::QuickTime),
            // Still-image brands share the ISO container.
            b"avif" | b"avis" | b"heic" | b"heix" | b"mif1" | b"msf1" => None,
            _ => Some(ContentSignature::Mp4),
        };
    }

    if head.starts_with(&EBML_MAGIC) {
        let is_webm = head.windows(4).any(|w| w == b"webm");
        return Some(if is_webm {
            ContentSignature::WebM
        } else {
            ContentSignature::Matroska
        });
    }

    if head.starts_with(&PNG_MAGIC) {
        return Some(ContentSignature::Png);
    }

    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ContentSignature::Jpeg);
    }

    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some(ContentSignature::Gif);
    }

    if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        return Some(ContentSignature::WebP);
    }

    None
}

/// Check a staged artifact's size and leading bytes against the media class
/// its task type produces.
pub fn validate_artifact(
    size_bytes: u64,
    head: &[u8],
    expected: MediaClass,
) -> Result<ContentSignature, ArtifactError> {
    if size_bytes == 0 {
        return Err(ArtifactError::Validation("artifact is empty".to_string()));
    }

    let signature = sniff_content(head).ok_or_else(|| {
        ArtifactError::Validation("unrecognised content signature".to_string())
    })?;

    if signature.media_class() != expected {
        return Err(ArtifactError::Validation(format!(
            "expected {} content, got {}",
            expected,
            signature.content_type()
        )));
    }

    Ok(signature)
}
