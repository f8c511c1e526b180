//! Error types for the console client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the console client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Local file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Create an API error from status code and the response body
    ///
    /// Bodies of the form `{"error": "..."}` are reduced to their message.
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = serde_json::from_str::<serde_json::Value>(&message)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(message);

        Self::ApiError { status, message }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_extracts_json_message() {
        let err = ClientError::api_error(404, r#"{"error":"No running scrape with id 1"}"#);
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "API error (status 404): No running scrape with id 1"
        );
    }

    #[test]
    fn test_api_error_keeps_plain_body() {
        let err = ClientError::api_error(503, "Service Unavailable");
        assert!(err.is_server_error());
        assert_eq!(err.to_string(), "API error (status 503): Service Unavailable");
    }
}
