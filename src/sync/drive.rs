// dumpsync/src/sync/drive.rs
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, LOCATION};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::remote::{RemoteResult, RemoteStore};
use crate::config::DriveConfig;
use crate::errors::RemoteError;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const UPLOAD_CONTENT_TYPE: &str = "application/sql";

/// Escapes a value for use inside a single-quoted Drive query literal.
pub fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

pub fn folder_query(name: &str, parent_id: Option<&str>) -> String {
    let mut query = format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escape_query_literal(name),
        FOLDER_MIME_TYPE
    );
    if let Some(parent_id) = parent_id {
        query.push_str(&format!(" and '{}' in parents", escape_query_literal(parent_id)));
    }
    query
}

pub fn file_query(file_name: &str, parent_id: &str) -> String {
    format!(
        "name = '{}' and '{}' in parents and trashed = false",
        escape_query_literal(file_name),
        escape_query_literal(parent_id)
    )
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<&'a str>,
}

/// Google Drive v3 REST backend.
pub struct DriveStore {
    http: reqwest::Client,
    api_base_url: String,
    upload_base_url: String,
    access_token: String,
}

impl DriveStore {
    pub fn new(config: &DriveConfig, http: reqwest::Client, access_token: String) -> Self {
        Self {
            http,
            api_base_url: config.api_base_url.clone(),
            upload_base_url: config.upload_base_url.clone(),
            access_token,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    async fn list(&self, query: &str) -> RemoteResult<Vec<DriveFile>> {
        let response = self
            .http
            .get(format!("{}/files", self.api_base_url))
            .header(AUTHORIZATION, self.bearer())
            .query(&[("q", query), ("fields", "files(id, name)"), ("spaces", "drive")])
            .send()
            .await?;
        let list: FileList = check_status(response).await?.json().await?;
        Ok(list.files)
    }
}

async fn check_status(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Api { status, body })
}

#[async_trait]
impl RemoteStore for DriveStore {
    fn name(&self) -> &'static str {
        "google-drive"
    }

    async fn find_folder(&self, name: &str, parent_id: Option<&str>) -> RemoteResult<Option<String>> {
        let files = self.list(&folder_query(name, parent_id)).await?;
        Ok(files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> RemoteResult<String> {
        let metadata = FileMetadata {
            name,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: parent_id.into_iter().collect(),
        };
        let response = self
            .http
            .post(format!("{}/files", self.api_base_url))
            .header(AUTHORIZATION, self.bearer())
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;
        let folder: DriveFile = check_status(response).await?.json().await?;
        info!(folder = name, folder_id = %folder.id, "Created remote folder");
        Ok(folder.id)
    }

    async fn file_exists(&self, file_name: &str, parent_id: &str) -> RemoteResult<bool> {
        Ok(!self.list(&file_query(file_name, parent_id)).await?.is_empty())
    }

    async fn upload_file(
        &self,
        file_name: &str,
        parent_id: &str,
        path: &Path,
        size_bytes: u64,
    ) -> RemoteResult<String> {
        let metadata = FileMetadata {
            name: file_name,
            mime_type: None,
            parents: vec![parent_id],
        };

        // Resumable session: metadata first, then the content in one streamed PUT.
        let response = self
            .http
            .post(format!("{}/files", self.upload_base_url))
            .header(AUTHORIZATION, self.bearer())
            .header("X-Upload-Content-Type", UPLOAD_CONTENT_TYPE)
            .header("X-Upload-Content-Length", size_bytes.to_string())
            .query(&[("uploadType", "resumable"), ("fields", "id")])
            .json(&metadata)
            .send()
            .await?;
        let response = check_status(response).await?;
        let session_url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Protocol("resumable upload response had no Location header".to_string()))?;
        debug!(file = file_name, "Opened resumable upload session");

        let file = tokio::fs::File::open(path).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .http
            .put(&session_url)
            .header(AUTHORIZATION, self.bearer())
            .header(CONTENT_LENGTH, size_bytes)
            .header(reqwest::header::CONTENT_TYPE, UPLOAD_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        let uploaded: DriveFile = check_status(response).await?.json().await?;
        Ok(uploaded.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_query_without_parent() {
        assert_eq!(
            folder_query("db-backups", None),
            "name = 'db-backups' and mimeType = 'application/vnd.google-apps.folder' and trashed = false"
        );
    }

    #[test]
    fn test_folder_query_with_parent() {
        assert_eq!(
            folder_query("2024-03-09", Some("root-id")),
            "name = '2024-03-09' and mimeType = 'application/vnd.google-apps.folder' and trashed = false and 'root-id' in parents"
        );
    }

    #[test]
    fn test_file_query_filters_trashed() {
        assert_eq!(
            file_query("shop_20240309_031542.sql", "day-id"),
            "name = 'shop_20240309_031542.sql' and 'day-id' in parents and trashed = false"
        );
    }

    #[test]
    fn test_query_literals_are_escaped() {
        assert_eq!(escape_query_literal("o'brien"), "o\\'brien");
        assert_eq!(escape_query_literal("back\\slash"), "back\\\\slash");
        assert_eq!(
            folder_query("it's", None),
            "name = 'it\\'s' and mimeType = 'application/vnd.google-apps.folder' and trashed = false"
        );
    }

    #[test]
    fn test_folder_metadata_shape() -> anyhow::Result<()> {
        let metadata = FileMetadata {
            name: "2024-03-09",
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: vec!["root-id"],
        };
        let value = serde_json::to_value(&metadata)?;
        assert_eq!(
            value,
            serde_json::json!({
                "name": "2024-03-09",
                "mimeType": FOLDER_MIME_TYPE,
                "parents": ["root-id"]
            })
        );

        let top_level = FileMetadata { name: "db-backups", mime_type: Some(FOLDER_MIME_TYPE), parents: vec![] };
        assert!(serde_json::to_value(&top_level)?.get("parents").is_none());
        Ok(())
    }
}
