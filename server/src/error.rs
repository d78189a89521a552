//! Unified error handling for the server.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use farmasync_engine::DOCUMENT_NOT_FOUND;
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] JsonRejection),

    #[error("Not found: {0}")]
    DocumentNotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::InvalidJson(rejection) => (
                rejection.status(),
                "Invalid JSON body".to_string(),
                Some(rejection.body_text()),
            ),
            AppError::DocumentNotFound(msg) => (
                StatusCode::NOT_FOUND,
                DOCUMENT_NOT_FOUND.to_string(),
                Some(msg.clone()),
            ),
            AppError::Unauthorized(reason) => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized".to_string(),
                Some(reason.to_string()),
            ),
            AppError::Forbidden(msg) => {
                tracing::warn!("Forbidden: {}", msg);
                (StatusCode::FORBIDDEN, "Forbidden".to_string(), Some(msg.clone()))
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
