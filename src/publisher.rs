//! # Artifact Publisher Module
//!
//! Uploads results too large to send through Telegram and returns a
//! retrieval link.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use tracing::info;

use crate::errors::{ensure_success, ServiceError};

/// Publishes a local file and returns a link to it
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish(&self, path: &Path) -> Result<String, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct FileIoResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Publisher backed by the file.io upload API
#[derive(Debug, Clone)]
pub struct FileIoPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl FileIoPublisher {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl ArtifactPublisher for FileIoPublisher {
    async fn publish(&self, path: &Path) -> Result<String, ServiceError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file")
            .to_string();
        // Stream from disk; published files are the ones too large to hold
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let part = Part::stream_with_length(Body::from(file), size).file_name(file_name.clone());

        let form = Form::new().part("file", part);
        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let response = ensure_success(response).await?;

        let body = response.text().await?;
        let link = link_from_body(&body)?;
        info!(file_name = %file_name, size_bytes = size, "Artifact published");
        Ok(link)
    }
}

/// Pull the download link out of a file.io response body
fn link_from_body(body: &str) -> Result<String, ServiceError> {
    let parsed: FileIoResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::InvalidResponse(format!("file.io returned non-JSON body: {e}")))?;

    if parsed.success == Some(false) {
        return Err(ServiceError::InvalidResponse(
            parsed
                .message
                .unwrap_or_else(|| "file.io rejected the upload".to_string()),
        ));
    }

    parsed
        .link
        .filter(|link| !link.trim().is_empty())
        .ok_or_else(|| ServiceError::InvalidResponse("file.io response has no link".to_string()))
}
