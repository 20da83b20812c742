//! Moves processed artifacts from local storage to the object store.
//!
//! A file is deleted locally only after the store accepted it, so a failed
//! run leaves exactly the files that still need publishing. Re-running
//! [`Publisher::publish_dir`] on the same directory picks up where the last
//! run stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rf_core::{Result, VideoId};

use crate::keys::{self, artifact_key, is_index, manifest_segments, split_name};
use crate::remote::ObjectStore;

/// Outcome of publishing one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Files the store accepted (and that were removed locally), in upload order.
    pub uploaded: Vec<String>,
    /// Files that are still on disk.
    pub failed: Vec<String>,
    /// Whether the directory itself was removed.
    pub dir_removed: bool,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of deleting a video's remote artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: usize,
    /// Keys the store did not have.
    pub missing: usize,
}

/// Upload order: segments by number, then other files by name, the index
/// last so it never references a segment that is not yet published.
fn publish_order(name: &str) -> (u8, u64, String) {
    if is_index(name) {
        return (2, 0, name.to_string());
    }
    match split_name(name) {
        (stem, Some("ts")) => {
            let number = stem
                .rsplit('_')
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(u64::MAX);
            (0, number, name.to_string())
        }
        _ => (1, 0, name.to_string()),
    }
}

/// Regular files directly inside `dir`, in publish order.
async fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push((name, entry.path()));
    }
    files.sort_by_cached_key(|(name, _)| publish_order(name));
    Ok(files)
}

/// Remove `dir` if nothing is left in it.
async fn remove_if_empty(dir: &Path) -> Result<bool> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    if entries.next_entry().await?.is_some() {
        return Ok(false);
    }
    tokio::fs::remove_dir(dir).await?;
    Ok(true)
}

/// Publishes directories and single files through an [`ObjectStore`].
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The underlying store, for direct reads.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload one file under its artifact key; delete it locally on success.
    async fn publish_file(&self, name: &str, path: &Path) -> Result<crate::StoredObject> {
        let body = tokio::fs::read(path).await?;
        let stored = self.store.upload(&artifact_key(name), name, body).await?;
        tokio::fs::remove_file(path).await?;
        Ok(stored)
    }

    /// Upload every file in `dir`, one at a time.
    ///
    /// A failed file is logged and kept; the remaining files are still
    /// attempted. The directory is removed when it ends up empty.
    pub async fn publish_dir(&self, dir: &Path) -> Result<PublishReport> {
        let mut report = PublishReport::default();

        for (name, path) in list_files(dir).await? {
            match self.publish_file(&name, &path).await {
                Ok(_) => {
                    tracing::debug!(dir = %dir.display(), file = %name, "Published file");
                    report.uploaded.push(name);
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), file = %name, error = %e, "Failed to publish file");
                    report.failed.push(name);
                }
            }
        }

        report.dir_removed = remove_if_empty(dir).await?;

        tracing::info!(
            dir = %dir.display(),
            uploaded = report.uploaded.len(),
            failed = report.failed.len(),
            "Directory published"
        );
        Ok(report)
    }

    /// Publish the thumbnail found in `dir` and return its public URL.
    ///
    /// Returns `None` when `dir` holds no file. The directory is removed once
    /// the upload succeeded.
    pub async fn publish_thumbnail(&self, dir: &Path) -> Result<Option<String>> {
        let files = list_files(dir).await?;
        let Some((name, path)) = files.first() else {
            remove_if_empty(dir).await?;
            return Ok(None);
        };

        let stored = self.publish_file(name, path).await?;
        remove_if_empty(dir).await?;

        let url = self.store.view_url(&stored);
        tracing::info!(file = %name, url = %url, "Thumbnail published");
        Ok(Some(url))
    }

    /// Publish every per-video directory below `root`.
    ///
    /// Used at startup to finish runs that were interrupted. Directories whose
    /// name is not a valid video id, or whose id `include` rejects, are left
    /// untouched.
    pub async fn republish_all<F>(&self, root: &Path, include: F) -> Result<Vec<(VideoId, PublishReport)>>
    where
        F: Fn(&VideoId) -> bool,
    {
        let mut results = Vec::new();
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(id) = VideoId::parse(&name) else {
                tracing::warn!(dir = %entry.path().display(), "Skipping directory with invalid video id");
                continue;
            };
            if !include(&id) {
                tracing::debug!(video_id = %id, "Leaving segment directory alone");
                continue;
            }
            match self.publish_dir(&entry.path()).await {
                Ok(report) => results.push((id, report)),
                Err(e) => tracing::warn!(video_id = %id, error = %e, "Resume publish failed"),
            }
        }
        Ok(results)
    }

    /// Delete the thumbnail, every segment listed in the index, and the index.
    ///
    /// Keys the store does not have are counted, not treated as errors. Any
    /// other store error stops the run.
    pub async fn delete_artifacts(&self, video_id: &VideoId) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        let mut tally = |existed: bool| {
            if existed {
                report.deleted += 1;
            } else {
                report.missing += 1;
            }
        };

        tally(self.store.delete(&keys::thumbnail_key(video_id)).await?);

        let index_key = keys::index_key(video_id);
        if let Some(manifest) = self.store.fetch(&index_key).await? {
            let text = String::from_utf8_lossy(&manifest);
            for segment in manifest_segments(&text) {
                tally(self.store.delete(&artifact_key(segment)).await?);
            }
        }

        tally(self.store.delete(&index_key).await?);

        tracing::info!(
            video_id = %video_id,
            deleted = report.deleted,
            missing = report.missing,
            "Remote artifacts deleted"
        );
        Ok(report)
    }
}
