//! Storage provider for the finished artifact.
//!
//! The pipeline hands raw video bytes plus a folder/identifier to the
//! provider and gets back a publicly resolvable URL. Failures are
//! reported as an opaque upload error; the caller decides whether the
//! job-runner retries.

use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::util::sanitize_filename;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct UploadError(pub String);

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        Self(e.to_string())
    }
}

/// The seam the orchestrator depends on.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Upload a finished video; returns the public URL.
    async fn upload_video(
        &self,
        data: Bytes,
        job_id: &str,
        title: &str,
    ) -> Result<String, UploadError>;
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Multipart uploader against an HTTP storage endpoint.
pub struct HttpStorage {
    client: reqwest::Client,
    endpoint: String,
    folder: String,
}

impl HttpStorage {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            folder: "videos".to_string(),
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }
}

#[async_trait]
impl StorageProvider for HttpStorage {
    async fn upload_video(
        &self,
        data: Bytes,
        job_id: &str,
        title: &str,
    ) -> Result<String, UploadError> {
        info!(
            "uploading {} bytes for job {} to {}",
            data.len(),
            job_id,
            self.endpoint
        );

        let file_part = reqwest::multipart::Part::stream(data)
            .file_name(format!("{job_id}.mp4"))
            .mime_str("video/mp4")
            .map_err(|e| UploadError(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("folder", self.folder.clone())
            .text("public_id", sanitize_filename(title))
            .part("file", file_part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError(format!("upload rejected ({status}): {body}")));
        }

        let payload: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError(format!("unreadable upload response: {e}")))?;

        payload
            .secure_url
            .or(payload.url)
            .ok_or_else(|| UploadError("upload response carried no URL".to_string()))
    }
}
