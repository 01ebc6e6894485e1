//! Error types for the MCP relay
//!
//! This module defines all error types used throughout the relay,
//! using `thiserror` for ergonomic error handling. HTTP handlers turn
//! [`RelayError`] values into responses through its `IntoResponse`
//! implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Hint attached to every authentication failure body.
pub const AUTH_HINT: &str = "Set Authorization header with your MCP_API_KEY";

/// Main error type for relay operations
///
/// Covers ingress validation, session delivery, authentication,
/// configuration loading, and tool execution.
#[derive(Error, Debug)]
pub enum RelayError {
    /// POST arrived without a message body
    #[error("Missing request body")]
    EmptyRequest,

    /// The session's stream went away before the message could be queued
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// The dispatcher could not produce a protocol response
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Write failure on a streaming connection; only ever logged
    #[error("Connection lost for session {0}")]
    ConnectionLost(String),

    /// Authentication gate rejected the request
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool execution errors
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// URL construction errors (bootstrap endpoint, public URL)
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    /// HTTP status used when this error terminates a request
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::EmptyRequest => StatusCode::BAD_REQUEST,
            RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            RelayError::Unauthorized(message) => serde_json::json!({
                "error": message,
                "hint": AUTH_HINT,
            }),
            RelayError::EmptyRequest => serde_json::json!({ "error": self.to_string() }),
            other => {
                tracing::error!(error = %other, "request failed");
                serde_json::json!({ "error": other.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for relay operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_request_display() {
        let error = RelayError::EmptyRequest;
        assert_eq!(error.to_string(), "Missing request body");
    }

    #[test]
    fn test_session_closed_display() {
        let error = RelayError::SessionClosed("abc".to_string());
        assert_eq!(error.to_string(), "Session closed: abc");
    }

    #[test]
    fn test_config_error_display() {
        let error = RelayError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_tool_error_display() {
        let error = RelayError::Tool("browser missing".to_string());
        assert_eq!(error.to_string(), "Tool execution error: browser missing");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RelayError::EmptyRequest.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::Unauthorized("Invalid API key".to_string()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RelayError::Dispatch("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_unauthorized_body_carries_hint() {
        let response = RelayError::Unauthorized("Invalid API key".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Invalid API key");
        assert_eq!(body["hint"], AUTH_HINT);
    }

    #[tokio::test]
    async fn test_empty_request_body() {
        let response = RelayError::EmptyRequest.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Missing request body");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: RelayError = json_error.into();
        assert!(matches!(error, RelayError::Serialization(_)));
    }

    #[test]
    fn test_url_error_conversion() {
        let url_error = url::Url::parse("not a url").unwrap_err();
        let error: RelayError = url_error.into();
        assert!(matches!(error, RelayError::InvalidUrl(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RelayError>();
    }
}
