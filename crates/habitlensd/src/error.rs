use crate::engine::{EngineError, Photo};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use habitlens_core::DecodeError;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP clients. Every variant renders as a JSON object
/// with `success: false` and an `error` string.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or malformed request fields.
    #[error("{0}")]
    Validation(String),
    /// Body rejected by the JSON extractor; keeps its status (400, 413, 415).
    #[error("Invalid JSON body: {message}")]
    Body { status: StatusCode, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },
    #[error("{source} (field: {field})")]
    Decode {
        field: &'static str,
        #[source]
        source: DecodeError,
    },
    #[error("No face detected in {}", .photo.label())]
    NoFace { photo: Photo, reason: String },
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Decode { .. } | ApiError::NoFace { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Body { status, .. } => *status,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::NoFace { reason, .. } => json!({
                "success": false,
                "error": self.to_string(),
                "details": reason,
            }),
            ApiError::Decode { field, .. } => json!({
                "success": false,
                "error": self.to_string(),
                "field": field,
            }),
            _ => json!({
                "success": false,
                "error": self.to_string(),
            }),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        (status, Json(body)).into_response()
    }
}
