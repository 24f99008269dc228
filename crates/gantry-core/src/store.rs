//! On-disk artifact cache.
//!
//! Extracted artifacts live under `<root>/artifacts/<artifact id>`. A
//! directory's presence is the sole signal that a prior extraction
//! succeeded; failed attempts are discarded whole so the next request
//! starts clean. Populated directories are never mutated again, so
//! concurrent readers need no synchronization.

use std::io;
use std::path::PathBuf;

use crate::error::{Error, Result};

const ARTIFACTS_SUBDIR: &str = "artifacts";

/// Cache of materialized artifacts, addressed by artifact id.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at the configured download directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory that holds (or will hold) the artifact's files.
    ///
    /// The layout `artifacts/<artifact id>/...` is the contract the static
    /// file server depends on.
    #[must_use]
    pub fn artifact_dir(&self, artifact_id: u64) -> PathBuf {
        self.root
            .join(ARTIFACTS_SUBDIR)
            .join(artifact_id.to_string())
    }

    /// Whether a prior request fully materialized the artifact.
    pub async fn contains(&self, artifact_id: u64) -> bool {
        tokio::fs::metadata(self.artifact_dir(artifact_id))
            .await
            .is_ok()
    }

    /// Removes a partially-populated artifact directory, best effort.
    pub async fn discard(&self, artifact_id: u64) {
        let dir = self.artifact_dir(artifact_id);
        if let Err(error) = tokio::fs::remove_dir_all(&dir).await {
            if error.kind() != io::ErrorKind::NotFound {
                tracing::error!(
                    dir = %dir.display(),
                    %error,
                    "unable to delete artifact directory"
                );
            }
        }
    }

    /// Creates the cache root so the static file server has a tree to serve.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] when the directory cannot be created.
    pub async fn ensure_layout(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.serve_root())
            .await
            .map_err(|e| Error::internal_with_source("unable to create artifact cache root", e))
    }

    /// Root of the serve tree (`<root>/artifacts`).
    #[must_use]
    pub fn serve_root(&self) -> PathBuf {
        self.root.join(ARTIFACTS_SUBDIR)
    }
}
