//! # Service Error Types Module
//!
//! Errors raised by the external collaborators (media operations, the
//! artifact publisher, temporary contact providers). The state machine turns
//! every one of them into a user-visible failure message.

use std::time::Duration;

use thiserror::Error;

/// Failure of an external collaborator call
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A credential or endpoint the operation needs is missing
    #[error("Not configured: {0}")]
    NotConfigured(String),
    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Remote API answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// Remote API answered with a body we could not use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Image decoding or encoding failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// Input bytes are not an image format we accept
    #[error("Unsupported image format")]
    UnsupportedImage,
    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// External process failed
    #[error("Process error: {0}")]
    Process(String),
    /// The call did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    /// The operation finished but produced nothing
    #[error("Operation returned no result")]
    EmptyResult,
}

impl ServiceError {
    /// Whether a retry of the same request could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Http(_) | ServiceError::Timeout(_) => true,
            ServiceError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Turn a non-success HTTP status into [`ServiceError::Api`]
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Api {
        status: status.as_u16(),
        message: summarize_body(&body),
    })
}

/// First line of an error body, bounded so it fits in a chat message
pub(crate) fn summarize_body(body: &str) -> String {
    let first_line = body.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let mut summary: String = first_line.trim().chars().take(200).collect();
    if first_line.trim().chars().count() > 200 {
        summary.push('…');
    }
    summary
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Process(format!("worker task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formatting() {
        let err = ServiceError::Api {
            status: 402,
            message: "insufficient credits".to_string(),
        };
        assert_eq!(err.to_string(), "API error (402): insufficient credits");

        let err = ServiceError::Timeout(Duration::from_secs(90));
        assert_eq!(err.to_string(), "Timed out after 90s");

        let err = ServiceError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Timed out after 250ms");

        let err = ServiceError::NotConfigured("REMOVE_BG_API_KEY".to_string());
        assert_eq!(err.to_string(), "Not configured: REMOVE_BG_API_KEY");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ServiceError::Api {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!ServiceError::Api {
            status: 400,
            message: String::new()
        }
        .is_transient());
        assert!(!ServiceError::EmptyResult.is_transient());
    }

    #[test]
    fn test_summarize_body() {
        assert_eq!(summarize_body("\n  bad request  \nmore"), "bad request");
        assert_eq!(summarize_body(""), "");
        let long = "x".repeat(300);
        let summary = summarize_body(&long);
        assert_eq!(summary.chars().count(), 201);
        assert!(summary.ends_with('…'));
    }
}
