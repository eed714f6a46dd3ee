// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 400 Bad Request: malformed or empty input, caller must fix the request
    Validation(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (uniqueness violation outside an idempotent path)
    Conflict(String),

    // 404 Not Found: a referenced post or parent comment is missing
    ForeignKeyViolation(String),

    // 503 Service Unavailable: pool/statement timeout, connection loss
    Transient(String),

    // 500 Internal Server Error
    InternalServerError(String),
}

impl AppError {
    /// Whether the caller may retry the same request with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "validation error: {msg}"),
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::Conflict(msg) => write!(f, "conflict: {msg}"),
            AppError::ForeignKeyViolation(msg) => write!(f, "missing reference: {msg}"),
            AppError::Transient(msg) => write!(f, "transient storage error: {msg}"),
            AppError::InternalServerError(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Transient(msg) => {
                tracing::warn!("Transient storage failure: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage temporarily unavailable, retry later".to_string(),
                )
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ForeignKeyViolation(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into the matching `AppError` category.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Transient(err.to_string())
            }
            sqlx::Error::RowNotFound => AppError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23503") => AppError::ForeignKeyViolation(db.message().to_string()),
                Some("23505") => AppError::Conflict(db.message().to_string()),
                // numeric_value_out_of_range, e.g. a counter pushed past BIGINT
                Some("22003") => AppError::Validation(db.message().to_string()),
                // statement_timeout, serialization failure, deadlock
                Some("57014") | Some("40001") | Some("40P01") => {
                    AppError::Transient(db.message().to_string())
                }
                _ => AppError::InternalServerError(err.to_string()),
            },
            _ => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
