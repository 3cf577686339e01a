//! Download facility.
//!
//! The coordinator only ever asks one thing of it: write this data URI to
//! that relative path, without prompting, and say whether it worked.
//! [`FsDownloads`] is the filesystem implementation; collisions are resolved
//! the way browsers do (`name (1).html`, `name (2).html`, ...).

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::artifact::decode_data_uri;
use crate::error::DownloadError;

/// Upper bound on `(n)` suffixes tried before giving up.
pub const MAX_UNIQUIFY_ATTEMPTS: u32 = 10_000;

/// What to do when the target filename already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    /// Pick a fresh suffixed name; never overwrite.
    #[default]
    Uniquify,
    /// Replace the existing file.
    Overwrite,
}

/// One download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// `data:` URI holding the content.
    pub url: String,
    /// Target path relative to the download root, `/`-separated.
    pub filename: String,
    pub conflict_action: ConflictAction,
    /// Whether to prompt for a location. Always false for captures.
    pub save_as: bool,
}

impl DownloadRequest {
    /// Non-prompting, uniquifying request.
    #[must_use]
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            conflict_action: ConflictAction::Uniquify,
            save_as: false,
        }
    }
}

/// Identifier of a finished download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub u64);

/// Where a download ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDownload {
    pub id: DownloadId,
    pub path: PathBuf,
}

/// Host download subsystem.
pub trait DownloadFacility: Send + Sync + 'static {
    fn download(
        &self,
        request: DownloadRequest,
    ) -> impl Future<Output = Result<CompletedDownload, DownloadError>> + Send;
}

/// Writes downloads below a root directory.
#[derive(Debug)]
pub struct FsDownloads {
    root: PathBuf,
    next_id: AtomicU64,
}

impl FsDownloads {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `filename` under the root, refusing anything that escapes it.
    fn resolve(&self, filename: &str) -> Result<PathBuf, DownloadError> {
        let relative = Path::new(filename);
        let mut components = relative.components().peekable();
        if components.peek().is_none() {
            return Err(DownloadError::InvalidFilename(filename.to_string()));
        }
        if !components.all(|c| matches!(c, Component::Normal(_))) {
            return Err(DownloadError::InvalidFilename(filename.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn write_new(&self, target: &Path, body: &[u8]) -> Result<PathBuf, DownloadError> {
        for attempt in 0..=MAX_UNIQUIFY_ATTEMPTS {
            let candidate = uniquified(target, attempt);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => {
                    fill_claimed(file, &candidate, body).await?;
                    return Ok(candidate);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %candidate.display(), "Download target taken");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(DownloadError::Exhausted(target.display().to_string()))
    }
}

/// Write `body` into a freshly claimed file; on failure the partial file is
/// removed so the name is free again.
async fn fill_claimed<W>(mut writer: W, claimed: &Path, body: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(body).await?;
        writer.flush().await
    }
    .await;
    if let Err(err) = written {
        drop(writer);
        if let Err(cleanup) = fs::remove_file(claimed).await {
            warn!(path = %claimed.display(), error = %cleanup, "Could not remove partial download");
        }
        return Err(err);
    }
    Ok(())
}

impl DownloadFacility for FsDownloads {
    async fn download(&self, request: DownloadRequest) -> Result<CompletedDownload, DownloadError> {
        let target = self.resolve(&request.filename)?;
        let data = decode_data_uri(&request.url)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let path = match request.conflict_action {
            ConflictAction::Uniquify => self.write_new(&target, &data.body).await?,
            ConflictAction::Overwrite => {
                fs::write(&target, &data.body).await?;
                target
            }
        };

        let id = DownloadId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(id = id.0, path = %path.display(), bytes = data.body.len(), "Download complete");
        Ok(CompletedDownload { id, path })
    }
}

/// `dir/stem.ext` with attempt `n > 0` → `dir/stem (n).ext`.
fn uniquified(target: &Path, attempt: u32) -> PathBuf {
    if attempt == 0 {
        return target.to_path_buf();
    }
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem} ({attempt}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({attempt})"),
    };
    target.with_file_name(name)
}
