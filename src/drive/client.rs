// pg_drive_backup/src/drive/client.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_RANGE, HeaderMap, LOCATION, RANGE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{FOLDER_MIME_TYPE, RemoteFolder, RemoteObject, RemoteStore, escape_query_literal};
use crate::auth::Credential;
use crate::errors::{AppError, Result};

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const ARCHIVE_MIME_TYPE: &str = "application/gzip";
const OBJECT_FIELDS: &str = "id, name, createdTime";
const PAGE_SIZE: &str = "1000";
/// Drive requires chunk sizes in multiples of 256 KiB.
const UPLOAD_CHUNK_SIZE: u64 = 32 * 256 * 1024;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteObject>,
    next_page_token: Option<String>,
}

/// Drive v3 REST client authorised by a single [`Credential`].
pub struct DriveClient {
    http: reqwest::Client,
    credential: Credential,
    files_url: String,
    upload_url: String,
    chunk_size: u64,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, credential: Credential) -> Self {
        Self::with_endpoints(http, credential, DRIVE_FILES_URL, DRIVE_UPLOAD_URL, UPLOAD_CHUNK_SIZE)
    }

    fn with_endpoints(
        http: reqwest::Client,
        credential: Credential,
        files_url: &str,
        upload_url: &str,
        chunk_size: u64,
    ) -> Self {
        DriveClient {
            http,
            credential,
            files_url: files_url.to_string(),
            upload_url: upload_url.to_string(),
            chunk_size,
        }
    }

    /// Runs a files.list query, following every result page.
    async fn list_files(&self, query: &str) -> Result<Vec<RemoteObject>> {
        let fields = format!("nextPageToken, files({})", OBJECT_FIELDS);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&self.files_url)
                .bearer_auth(self.credential.bearer())
                .query(&[
                    ("q", query),
                    ("spaces", "drive"),
                    ("fields", fields.as_str()),
                    ("pageSize", PAGE_SIZE),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await.map_err(request_failed("files.list"))?;
            let page: FileList = check_status(response, "files.list")
                .await?
                .json()
                .await
                .map_err(request_failed("files.list"))?;

            files.extend(page.files);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(files)
    }

    async fn start_upload_session(&self, name: &str, folder_id: &str, total: u64) -> Result<String> {
        let metadata = json!({ "name": name, "parents": [folder_id] });
        let response = self
            .http
            .post(&self.upload_url)
            .bearer_auth(self.credential.bearer())
            .query(&[("uploadType", "resumable"), ("fields", OBJECT_FIELDS)])
            .header("X-Upload-Content-Type", ARCHIVE_MIME_TYPE)
            .header("X-Upload-Content-Length", total.to_string())
            .json(&metadata)
            .send()
            .await
            .map_err(request_failed("upload session"))?;
        let response = check_status(response, "upload session").await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::RemoteApi("upload session response has no Location header".to_string()))
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>> {
        let query = format!(
            "name='{}' and mimeType='{}' and trashed=false",
            escape_query_literal(name),
            FOLDER_MIME_TYPE
        );
        let files = self.list_files(&query).await?;
        Ok(files
            .into_iter()
            .map(|f| RemoteFolder { id: f.id, name: f.name })
            .collect())
    }

    async fn create_folder(&self, name: &str) -> Result<RemoteFolder> {
        let response = self
            .http
            .post(&self.files_url)
            .bearer_auth(self.credential.bearer())
            .query(&[("fields", "id, name")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME_TYPE }))
            .send()
            .await
            .map_err(request_failed("folder create"))?;

        check_status(response, "folder create")
            .await?
            .json()
            .await
            .map_err(request_failed("folder create"))
    }

    async fn upload(&self, local_path: &Path, folder_id: &str) -> Result<RemoteObject> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::InvalidInput(format!("Invalid upload path: {}", local_path.display())))?
            .to_string();
        let total = tokio::fs::metadata(local_path).await?.len();
        tracing::info!("Uploading {} ({} bytes) to Google Drive", name, total);

        let session_uri = self.start_upload_session(&name, folder_id, total).await?;
        let mut file = File::open(local_path).await?;
        let mut offset: u64 = 0;

        loop {
            let chunk_len = total.saturating_sub(offset).min(self.chunk_size);
            let mut chunk = vec![0u8; chunk_len as usize];
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut chunk).await?;

            let response = self
                .http
                .put(&session_uri)
                .bearer_auth(self.credential.bearer())
                .header(CONTENT_RANGE, content_range(offset, chunk_len, total))
                .body(chunk)
                .send()
                .await
                .map_err(request_failed("upload chunk"))?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    let object: RemoteObject = response.json().await.map_err(request_failed("upload"))?;
                    tracing::info!("Upload successful, file ID: {}", object.id);
                    return Ok(object);
                }
                StatusCode::PERMANENT_REDIRECT => {
                    // 308 "Resume Incomplete": continue from what the server committed.
                    let committed = committed_bytes(response.headers());
                    if committed > total {
                        return Err(AppError::RemoteApi(format!(
                            "upload of {} acknowledged {} bytes of {}",
                            name, committed, total
                        )));
                    }
                    if committed <= offset {
                        return Err(AppError::RemoteApi(format!(
                            "upload of {} stalled at byte {}",
                            name, offset
                        )));
                    }
                    offset = committed;
                    tracing::debug!("Uploaded {}/{} bytes of {}", offset, total, name);
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(AppError::RemoteApi(format!(
                        "upload chunk returned {}: {}",
                        status,
                        body.trim()
                    )));
                }
            }
        }
    }

    async fn share(&self, object_id: &str, email: &str, role: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/{}/permissions", self.files_url, object_id))
            .bearer_auth(self.credential.bearer())
            .json(&json!({ "type": "user", "role": role, "emailAddress": email }))
            .send()
            .await
            .map_err(request_failed("permissions.create"))?;
        check_status(response, "permissions.create").await?;
        Ok(())
    }

    async fn list_created_before(
        &self,
        folder_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RemoteObject>> {
        let query = format!(
            "'{}' in parents and trashed=false and createdTime < '{}'",
            escape_query_literal(folder_id),
            cutoff.format("%Y-%m-%dT%H:%M:%S")
        );
        self.list_files(&query).await
    }

    async fn delete(&self, object_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/{}", self.files_url, object_id))
            .bearer_auth(self.credential.bearer())
            .send()
            .await
            .map_err(request_failed("files.delete"))?;
        check_status(response, "files.delete").await?;
        Ok(())
    }
}

fn request_failed(action: &'static str) -> impl Fn(reqwest::Error) -> AppError {
    move |e| AppError::RemoteApi(format!("{} request failed: {}", action, e))
}

async fn check_status(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::RemoteApi(format!("{} returned {}: {}", action, status, body.trim())))
}

fn content_range(offset: u64, chunk_len: u64, total: u64) -> String {
    if chunk_len == 0 {
        format!("bytes */{}", total)
    } else {
        format!("bytes {}-{}/{}", offset, offset + chunk_len - 1, total)
    }
}

/// Reads the `Range: bytes=0-N` header of a 308 reply; no header means
/// nothing has been committed yet.
fn committed_bytes(headers: &HeaderMap) -> u64 {
    headers
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit('-').next())
        .and_then(|end| end.trim().parse::<u64>().ok())
        .map(|end| end + 1)
        .unwrap_or(0)
}
