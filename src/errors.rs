use crate::services::OffloadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// A lightweight wrapper for errors that reach the HTTP boundary. The
/// message is what end users see; transport detail stays in the logs.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<OffloadError> for AppError {
    fn from(err: OffloadError) -> Self {
        error!(error = %err, "offload operation failed");
        match err {
            OffloadError::UploadFailure { .. } => {
                AppError::new(StatusCode::BAD_GATEWAY, "File Upload Failed. Please try again.")
            }
            OffloadError::AccessDenied { .. } => {
                AppError::new(StatusCode::FORBIDDEN, "Access denied: Could not delete file")
            }
            OffloadError::ObjectNotFound(_) | OffloadError::RecordNotFound(_) => {
                AppError::not_found("File not found")
            }
            OffloadError::Presign(_)
            | OffloadError::Transport(_)
            | OffloadError::Sqlx(_)
            | OffloadError::Io(_) => AppError::internal("Something went wrong. Please try again."),
        }
    }
}
