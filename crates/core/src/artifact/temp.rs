//! Scoped staging files.

use std::path::{Path, PathBuf};

/// A staging file path that is deleted when the guard drops.
#[derive(Debug)]
pub struct ScopedTempFile {
    path: PathBuf,
}

impl ScopedTempFile {
    /// Reserve a unique path inside `dir`. The file itself is not created.
    pub fn new_in(dir: &Path, prefix: &str) -> Self {
        let name = format!("{}-{}.part", prefix, uuid::Uuid::new_v4().simple());
        Self {
            path: dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged file");
            }
        }
    }
}
