//! Drive collaborator: recursive folder listing and file content access.
//!
//! The ingestion pipeline only depends on the [`DriveClient`] trait; the
//! Google Drive HTTP client below is the production implementation. Tests
//! substitute an in-memory client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{GrantRagError, Result};

/// Folder mime type used to recurse during listing.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// A file from the external drive. Read-only to this system.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Opaque stable identifier.
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Last-modified timestamp as reported by the drive (RFC3339 string).
    /// Compared by exact equality for change detection; never parsed.
    pub modified_time: String,
    pub size: Option<i64>,
    pub web_view_link: Option<String>,
}

/// Read access to the document source.
#[async_trait]
pub trait DriveClient: Send + Sync {
    /// List all non-trashed files under a folder, recursing into subfolders.
    async fn list_files_recursive(&self, folder_id: &str) -> Result<Vec<SourceDocument>>;

    /// Download raw file bytes.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Export a drive-native rich-text document as plain text.
    async fn export_plain_text(&self, file_id: &str) -> Result<String>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    #[serde(default)]
    modified_time: String,
    // The Drive API returns size as a string
    size: Option<String>,
    web_view_link: Option<String>,
}

/// Google Drive v3 HTTP client.
pub struct GoogleDriveClient {
    client: Client,
    token: String,
}

impl GoogleDriveClient {
    pub fn new(token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(GrantRagError::Http)?;
        Ok(Self { client, token })
    }

    async fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<FileList> {
        let mut request = self
            .client
            .get("https://www.googleapis.com/drive/v3/files")
            .bearer_auth(&self.token)
            .query(&[
                ("q", format!("'{}' in parents and trashed = false", folder_id)),
                (
                    "fields",
                    "nextPageToken, files(id, name, mimeType, modifiedTime, size, webViewLink)"
                        .to_string(),
                ),
                ("pageSize", "1000".to_string()),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(GrantRagError::Http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(GrantRagError::Drive(format!(
                "list failed for folder {}: {} {}",
                folder_id, status, body
            )));
        }

        response.json::<FileList>().await.map_err(GrantRagError::Http)
    }
}

#[async_trait]
impl DriveClient for GoogleDriveClient {
    async fn list_files_recursive(&self, folder_id: &str) -> Result<Vec<SourceDocument>> {
        let mut documents = Vec::new();
        let mut pending: VecDeque<String> = VecDeque::new();
        pending.push_back(folder_id.to_string());

        while let Some(current) = pending.pop_front() {
            let mut page_token: Option<String> = None;
            loop {
                let page = self.list_page(&current, page_token.as_deref()).await?;
                for file in page.files {
                    if file.mime_type == FOLDER_MIME {
                        pending.push_back(file.id);
                        continue;
                    }
                    documents.push(SourceDocument {
                        id: file.id,
                        name: file.name,
                        mime_type: file.mime_type,
                        modified_time: file.modified_time,
                        size: file.size.and_then(|s| s.parse().ok()),
                        web_view_link: file.web_view_link,
                    });
                }
                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
        }

        log::info!("Listed {} files under folder {}", documents.len(), folder_id);
        Ok(documents)
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(format!(
                "https://www.googleapis.com/drive/v3/files/{}?alt=media",
                file_id
            ))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(GrantRagError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GrantRagError::Drive(format!(
                "download failed for {}: {}",
                file_id, status
            )));
        }

        let bytes = response.bytes().await.map_err(GrantRagError::Http)?;
        Ok(bytes.to_vec())
    }

    async fn export_plain_text(&self, file_id: &str) -> Result<String> {
        let response = self
            .client
            .get(format!(
                "https://www.googleapis.com/drive/v3/files/{}/export",
                file_id
            ))
            .bearer_auth(&self.token)
            .query(&[("mimeType", "text/plain")])
            .send()
            .await
            .map_err(GrantRagError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GrantRagError::Drive(format!(
                "export failed for {}: {}",
                file_id, status
            )));
        }

        response.text().await.map_err(GrantRagError::Http)
    }
}
