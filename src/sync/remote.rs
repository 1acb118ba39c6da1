// dumpsync/src/sync/remote.rs
use async_trait::async_trait;
use std::path::Path;

use crate::errors::RemoteError;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Minimal object-store surface the sync needs: folders, existence, upload.
///
/// Implemented by the Google Drive and S3-compatible backends. A missing
/// `parent_id` means the top level of the store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Id of the folder called `name` directly under `parent_id`, if any.
    async fn find_folder(&self, name: &str, parent_id: Option<&str>) -> RemoteResult<Option<String>>;

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> RemoteResult<String>;

    /// Whether an un-trashed object named `file_name` sits directly under `parent_id`.
    async fn file_exists(&self, file_name: &str, parent_id: &str) -> RemoteResult<bool>;

    /// Streams `path` into a new object and returns its remote id.
    async fn upload_file(
        &self,
        file_name: &str,
        parent_id: &str,
        path: &Path,
        size_bytes: u64,
    ) -> RemoteResult<String>;
}
