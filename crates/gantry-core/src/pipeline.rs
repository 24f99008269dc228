//! Artifact materialization: download, validation, extraction.
//!
//! A materialization turns an artifact descriptor into a populated cache
//! directory. The archive is streamed to a scratch file that is always
//! removed, every entry path is validated before anything touches disk, and
//! a failed extraction discards the whole destination directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::github::{ActionsBackend, Artifact};
use crate::store::ArtifactStore;
use crate::target::Target;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Downloads and extracts artifact archives into the store.
pub struct ArtifactPipeline {
    store: ArtifactStore,
    http: reqwest::Client,
}

impl ArtifactPipeline {
    /// Creates a pipeline writing into the given store.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if the download client cannot be built.
    pub fn new(store: ArtifactStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| Error::internal_with_source("failed to construct download client", e))?;
        Ok(Self { store, http })
    }

    /// Downloads the artifact archive and extracts it into the artifact's
    /// cache directory, which must not exist yet.
    ///
    /// When `wanted_file` is non-empty and absent from the archive, the
    /// operation resolves as not-found before any extraction work. An empty
    /// `wanted_file` (archive-root request) skips that pre-check.
    ///
    /// # Errors
    /// [`Error::Upstream`] when no download URL is obtained,
    /// [`Error::SecurityViolation`] when an entry would escape the
    /// destination, [`Error::NotFound`] for a missing `wanted_file`, and
    /// [`Error::Internal`] for download/extraction I/O failures. On any
    /// failure the destination directory is removed.
    pub async fn materialize(
        &self,
        backend: &dyn ActionsBackend,
        target: &Target,
        artifact: &Artifact,
        wanted_file: &str,
    ) -> Result<PathBuf> {
        let url = backend
            .artifact_download_url(&target.owner, &target.repo, artifact.id)
            .await?;

        tracing::info!(
            artifact_id = artifact.id,
            name = %artifact.name,
            size = artifact.size_in_bytes,
            "downloading artifact"
        );
        // Removed on drop, whatever happens after this point.
        let archive = self.download_archive(&url, artifact.id).await?;

        let dest = self.store.artifact_dir(artifact.id);
        let archive_path = archive.path().to_path_buf();
        let extract_dir = dest.clone();
        let wanted = wanted_file.trim_start_matches('/').to_string();
        let outcome = tokio::task::spawn_blocking(move || {
            unpack_archive(&archive_path, &extract_dir, &wanted)
        })
        .await
        .map_err(|e| Error::internal_with_source("archive extraction task failed", e))?;

        if let Err(error) = outcome {
            self.store.discard(artifact.id).await;
            return Err(error);
        }

        tracing::info!(artifact_id = artifact.id, dir = %dest.display(), "artifact extracted");
        Ok(dest)
    }

    async fn download_archive(
        &self,
        url: &str,
        artifact_id: u64,
    ) -> Result<tempfile::NamedTempFile> {
        let temp = tempfile::Builder::new()
            .prefix(&format!("gh-artifact-{artifact_id}-"))
            .suffix(".zip")
            .tempfile()
            .map_err(|e| {
                Error::internal_with_source("unable to create temporary download file", e)
            })?;
        let reopened = temp
            .reopen()
            .map_err(|e| Error::internal_with_source("unable to open temporary download file", e))?;
        let mut file = tokio::fs::File::from_std(reopened);

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::internal_with_source("artifact download request failed", e))?;
        if !response.status().is_success() {
            return Err(Error::internal(format!(
                "artifact download failed ({})",
                response.status()
            )));
        }

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::internal_with_source("artifact download interrupted", e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::internal_with_source("unable to write downloaded archive", e))?;
        }
        file.flush()
            .await
            .map_err(|e| Error::internal_with_source("unable to flush downloaded archive", e))?;

        Ok(temp)
    }
}

fn unpack_archive(archive_path: &Path, dest: &Path, wanted_file: &str) -> Result<()> {
    let file = fs::File::open(archive_path)
        .map_err(|e| Error::internal_with_source("unable to open downloaded archive", e))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| Error::internal_with_source("downloaded artifact is not a valid archive", e))?;

    // Every entry path is validated before anything is written.
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| Error::internal_with_source("unable to read archive entry", e))?;
        if entry.enclosed_name().is_none() {
            return Err(Error::SecurityViolation {
                entry: entry.name().to_string(),
            });
        }
    }

    if !wanted_file.is_empty() && !archive_contains(&archive, wanted_file) {
        return Err(Error::not_found(format!(
            "archive has no file '{wanted_file}'"
        )));
    }

    fs::create_dir_all(dest)
        .map_err(|e| Error::internal_with_source("unable to create artifact directory", e))?;

    for index in 0..archive.len() {
        extract_entry(&mut archive, index, dest)?;
    }

    Ok(())
}

/// Whether the archive carries `wanted` as a file or as a directory prefix.
fn archive_contains(archive: &ZipArchive<fs::File>, wanted: &str) -> bool {
    archive.file_names().any(|name| {
        name == wanted
            || name
                .strip_prefix(wanted)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn extract_entry(archive: &mut ZipArchive<fs::File>, index: usize, dest: &Path) -> Result<()> {
    let mut entry = archive
        .by_index(index)
        .map_err(|e| Error::internal_with_source("unable to read archive entry", e))?;
    let Some(relative) = entry.enclosed_name() else {
        return Err(Error::SecurityViolation {
            entry: entry.name().to_string(),
        });
    };
    let path = dest.join(relative);

    if entry.is_dir() {
        fs::create_dir_all(&path)
            .map_err(|e| Error::internal_with_source("unable to create archive directory", e))?;
        set_entry_mode(&path, entry.unix_mode())?;
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::internal_with_source("unable to create parent directory", e))?;
    }

    let mut options = fs::OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    if let Some(mode) = entry.unix_mode() {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode & 0o777);
    }

    let mut output = options
        .open(&path)
        .map_err(|e| Error::internal_with_source("unable to create extracted file", e))?;
    io::copy(&mut entry, &mut output)
        .map_err(|e| Error::internal_with_source("unable to write extracted file", e))?;
    Ok(())
}

#[cfg(unix)]
fn set_entry_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))
            .map_err(|e| Error::internal_with_source("unable to set entry permissions", e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_entry_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}
