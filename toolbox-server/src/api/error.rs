//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::proxmox::ControlPlaneError;
use crate::service::artifacts::ArtifactError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// The control plane or remote host cannot be used right now
    Unavailable(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => {
                tracing::warn!("Backend unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ControlPlaneError> for ApiError {
    fn from(err: ControlPlaneError) -> Self {
        match err {
            ControlPlaneError::InvalidNode(_) => ApiError::BadRequest(err.to_string()),
            _ => ApiError::Unavailable(err.to_string()),
        }
    }
}

impl From<ArtifactError> for ApiError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound(id) => ApiError::NotFound(format!("Upload {} not found", id)),
            ArtifactError::InvalidUpload(_)
            | ArtifactError::Extract(_)
            | ArtifactError::NoDiskImages => ApiError::BadRequest(err.to_string()),
            ArtifactError::UnzipMissing | ArtifactError::Io(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_node_is_a_bad_request() {
        let response = ApiError::from(ControlPlaneError::InvalidNode("../x".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::from(ControlPlaneError::api_error(401, "no ticket")).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
