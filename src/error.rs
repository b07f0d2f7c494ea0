//! HTTP-facing error type shared by both services

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result type for request handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned to HTTP callers as `{"error": "..."}`
#[derive(Error, Debug)]
pub enum ApiError {
    /// Unknown model or missing record
    #[error("{0}")]
    NotFound(String),

    /// Missing, unsupported or undecodable upload
    #[error("{0}")]
    InvalidInput(String),

    /// An external collaborator failed or returned nothing
    #[error("{0}")]
    Collaborator(String),

    /// Anything else
    #[error("{0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// HTTP status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Collaborator(_) | ApiError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
