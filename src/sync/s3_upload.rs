// dumpsync/src/sync/s3_upload.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use std::path::Path;
use tracing::info;

use super::remote::{RemoteResult, RemoteStore};
use crate::config::SpacesConfig;
use crate::errors::RemoteError;

/// Folder ids on S3 are key prefixes ending in `/`.
pub fn folder_key(name: &str, parent_id: Option<&str>) -> String {
    let name = name.trim_matches('/');
    match parent_id {
        Some(parent) => format!("{}/{}/", parent.trim_end_matches('/'), name),
        None => format!("{}/", name),
    }
}

pub fn object_key(file_name: &str, parent_id: &str) -> String {
    format!("{}/{}", parent_id.trim_end_matches('/'), file_name)
}

fn sdk_error<E>(err: E) -> RemoteError
where
    E: std::error::Error,
{
    RemoteError::S3Sdk(DisplayErrorContext(err).to_string())
}

/// S3-compatible object storage (AWS, DigitalOcean Spaces, MinIO).
///
/// Folders are materialised as zero-byte marker objects so an empty date
/// bucket still shows up when browsing the bucket.
pub struct S3Store {
    client: s3::Client,
    bucket_name: String,
}

impl S3Store {
    pub async fn connect(spaces_config: &SpacesConfig) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&spaces_config.endpoint_url)
            .region(Region::new(spaces_config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &spaces_config.access_key_id,
                &spaces_config.secret_access_key,
                None, // session_token
                None, // expiry
                "Static", // provider_name
            ))
            .load()
            .await;

        Self {
            client: s3::Client::new(&sdk_config),
            bucket_name: spaces_config.bucket_name.clone(),
        }
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn find_folder(&self, name: &str, parent_id: Option<&str>) -> RemoteResult<Option<String>> {
        let prefix = folder_key(name, parent_id);
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket_name)
            .prefix(&prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(sdk_error)?;

        Ok((!output.contents().is_empty()).then_some(prefix))
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> RemoteResult<String> {
        let prefix = folder_key(name, parent_id);
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&prefix)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(sdk_error)?;
        info!(bucket = %self.bucket_name, folder_id = %prefix, "Created folder marker");
        Ok(prefix)
    }

    async fn file_exists(&self, file_name: &str, parent_id: &str) -> RemoteResult<bool> {
        let key = object_key(file_name, parent_id);
        match self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(sdk_error(err)),
        }
    }

    async fn upload_file(
        &self,
        file_name: &str,
        parent_id: &str,
        path: &Path,
        size_bytes: u64,
    ) -> RemoteResult<String> {
        let key = object_key(file_name, parent_id);
        let body = ByteStream::from_path(path).await.map_err(|e| {
            RemoteError::Io(std::io::Error::other(format!(
                "failed to create ByteStream from {}: {}",
                path.display(),
                e
            )))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_length(size_bytes as i64)
            .body(body)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(key)
    }
}
