// dumpsync/src/sync/logic.rs
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use super::remote::{RemoteResult, RemoteStore};
use crate::backup::artifact::BackupArtifact;
use crate::backup::catalog;
use crate::errors::{AppError, RemoteError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { remote_id: String },
    /// An object with the same name already sits in the destination folder.
    AlreadyPresent,
}

#[derive(Debug)]
pub struct FileFailure {
    pub bucket: String,
    pub file: String,
    pub error: AppError,
}

#[derive(Debug)]
pub struct BucketFailure {
    pub bucket: String,
    pub skipped_files: usize,
    pub error: AppError,
}

/// Outcome of a best-effort batch sync.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub uploaded: Vec<String>,
    pub already_present: Vec<String>,
    pub failed: Vec<FileFailure>,
    pub failed_buckets: Vec<BucketFailure>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.failed_buckets.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} uploaded, {} already present, {} failed, {} bucket(s) skipped",
            self.uploaded.len(),
            self.already_present.len(),
            self.failed.len(),
            self.failed_buckets.len()
        )?;
        for failure in &self.failed_buckets {
            writeln!(
                f,
                "  bucket {} ({} file(s) skipped): {}",
                failure.bucket, failure.skipped_files, failure.error
            )?;
        }
        for failure in &self.failed {
            writeln!(f, "  {}/{}: {}", failure.bucket, failure.file, failure.error)?;
        }
        Ok(())
    }
}

async fn with_deadline<T, F>(deadline: Duration, call: F) -> RemoteResult<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::TimedOut(deadline.as_secs())),
    }
}

/// Mirrors the local date buckets into `root_folder` on a [`RemoteStore`].
///
/// Every call is awaited in sequence. Resolved folders are cached for the
/// lifetime of this value, which is one sync run.
pub struct RemoteSync<'a> {
    store: &'a dyn RemoteStore,
    root_folder: String,
    call_timeout: Duration,
    // (parent id, name) -> folder id
    folders: HashMap<(Option<String>, String), String>,
}

impl<'a> RemoteSync<'a> {
    pub fn new(store: &'a dyn RemoteStore, root_folder: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            store,
            root_folder: root_folder.into(),
            call_timeout,
            folders: HashMap::new(),
        }
    }

    /// Finds the folder by name and parent, creating it when absent.
    pub async fn resolve_or_create_folder(&mut self, name: &str, parent_id: Option<&str>) -> Result<String> {
        let key = (parent_id.map(str::to_string), name.to_string());
        if let Some(folder_id) = self.folders.get(&key) {
            return Ok(folder_id.clone());
        }

        let resolution_error = |source| AppError::RemoteFolderResolutionFailed {
            name: name.to_string(),
            source,
        };
        let remote_id = match with_deadline(self.call_timeout, self.store.find_folder(name, parent_id))
            .await
            .map_err(resolution_error)?
        {
            Some(id) => {
                info!(folder = name, folder_id = %id, "Using existing remote folder");
                id
            }
            None => with_deadline(self.call_timeout, self.store.create_folder(name, parent_id))
                .await
                .map_err(resolution_error)?,
        };

        self.folders.insert(key, remote_id.clone());
        Ok(remote_id)
    }

    pub async fn resolve_root(&mut self) -> Result<String> {
        let root_folder = self.root_folder.clone();
        self.resolve_or_create_folder(&root_folder, None).await
    }

    pub async fn exists(&self, file_name: &str, parent_id: &str) -> Result<bool> {
        with_deadline(self.call_timeout, self.store.file_exists(file_name, parent_id))
            .await
            .map_err(|source| AppError::RemoteExistenceCheckFailed {
                file: file_name.to_string(),
                source,
            })
    }

    /// Uploads unless an object with the same name is already in `parent_id`.
    /// Only the name is compared, never the content.
    pub async fn upload_artifact(&self, artifact: &BackupArtifact, parent_id: &str) -> Result<UploadOutcome> {
        if self.exists(&artifact.name, parent_id).await? {
            info!(file = %artifact.name, folder_id = parent_id, "Already on remote, skipping upload");
            return Ok(UploadOutcome::AlreadyPresent);
        }

        let remote_id = with_deadline(
            self.call_timeout,
            self.store
                .upload_file(&artifact.name, parent_id, &artifact.path, artifact.size_bytes),
        )
        .await
        .map_err(|source| AppError::RemoteUploadFailed {
            file: artifact.name.clone(),
            source,
        })?;

        info!(
            file = %artifact.name,
            remote_id = %remote_id,
            bytes = artifact.size_bytes,
            store = self.store.name(),
            "✓ Uploaded backup"
        );
        Ok(UploadOutcome::Uploaded { remote_id })
    }

    /// Uploads one artifact into the remote folder of its own date bucket.
    pub async fn sync_one(&mut self, artifact: &BackupArtifact) -> Result<UploadOutcome> {
        let root_id = self.resolve_root().await?;
        let bucket_id = self.resolve_or_create_folder(&artifact.bucket, Some(&root_id)).await?;
        self.upload_artifact(artifact, &bucket_id).await
    }

    /// Best-effort sync of every artifact under `root`.
    ///
    /// A bucket whose folder cannot be resolved is skipped, and a file that
    /// fails its existence check or upload is recorded; the batch carries on
    /// either way. Only a failure to read the catalog or resolve the root
    /// folder aborts the run.
    pub async fn sync_all(&mut self, root: &Path) -> Result<SyncReport> {
        let mut buckets = catalog::list_buckets(root)?;
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        let root_id = self.resolve_root().await?;

        let mut report = SyncReport::default();
        for mut bucket in buckets {
            let bucket_id = match self.resolve_or_create_folder(&bucket.name, Some(&root_id)).await {
                Ok(id) => id,
                Err(error) => {
                    warn!(bucket = %bucket.name, error = %error, "Skipping bucket");
                    report.failed_buckets.push(BucketFailure {
                        bucket: bucket.name,
                        skipped_files: bucket.artifacts.len(),
                        error,
                    });
                    continue;
                }
            };

            bucket.artifacts.sort_by(|a, b| a.name.cmp(&b.name));
            for artifact in &bucket.artifacts {
                match self.upload_artifact(artifact, &bucket_id).await {
                    Ok(UploadOutcome::Uploaded { .. }) => report.uploaded.push(artifact.name.clone()),
                    Ok(UploadOutcome::AlreadyPresent) => report.already_present.push(artifact.name.clone()),
                    Err(error) => {
                        warn!(bucket = %bucket.name, file = %artifact.name, error = %error, "Skipping file");
                        report.failed.push(FileFailure {
                            bucket: bucket.name.clone(),
                            file: artifact.name.clone(),
                            error,
                        });
                    }
                }
            }
        }

        info!(
            uploaded = report.uploaded.len(),
            already_present = report.already_present.len(),
            failed = report.failed.len(),
            failed_buckets = report.failed_buckets.len(),
            "Sync finished"
        );
        Ok(report)
    }
}
