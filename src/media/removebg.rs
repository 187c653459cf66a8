//! remove.bg API client

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{summarize_body, ServiceError};

#[derive(Debug, Deserialize)]
struct ApiErrors {
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    title: String,
}

/// Background removal through the remove.bg HTTP API
#[derive(Debug, Clone)]
pub struct RemoveBgClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RemoveBgClient {
    pub fn new(client: reqwest::Client, endpoint: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        }
    }

    /// Send the image and return the cut-out as PNG with alpha
    pub async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::NotConfigured("REMOVE_BG_API_KEY".to_string()))?;

        debug!(input_bytes = image.len(), "Sending image to remove.bg");

        let part = Part::bytes(image.to_vec()).file_name("image");
        let form = Form::new()
            .text("size", "auto")
            .text("format", "png")
            .part("image_file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Api-Key", api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ServiceError::EmptyResult);
        }

        info!(output_bytes = bytes.len(), "remove.bg returned cut-out");
        Ok(bytes.to_vec())
    }
}

/// Extract the error titles from a remove.bg error body
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrors>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .into_iter()
            .map(|e| e.title)
            .collect::<Vec<_>>()
            .join("; "),
        _ => summarize_body(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_parses_titles() {
        let body = r#"{"errors":[{"title":"Insufficient credits","code":"insufficient_credits"},{"title":"Try later"}]}"#;
        assert_eq!(api_error_message(body), "Insufficient credits; Try later");
    }

    #[test]
    fn test_api_error_message_falls_back_to_body() {
        assert_eq!(api_error_message("Bad gateway\n<html>"), "Bad gateway");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let client = RemoveBgClient::new(
            reqwest::Client::new(),
            crate::config::REMOVE_BG_ENDPOINT,
            None,
        );
        let result = client.remove_background(b"bytes").await;
        assert!(matches!(result, Err(ServiceError::NotConfigured(_))));
    }
}
