//! Error types for the supervisor API
//!
//! The five governance error kinds are surfaced distinctly so callers can
//! render specific guidance: a blocked project is not a permission problem,
//! and a stale view is not bad input.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid bearer token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed input: bad content document, uncompilable regex,
    /// missing required field (422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Actor role below the operation's required threshold (403)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Entity not in the required source state, e.g. activating a
    /// non-DRAFT version or finalizing a non-PENDING ingest (409)
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Governance precondition unmet: the actor may be authorized but the
    /// project is not in an operable state (412)
    #[error("Blocking precondition: {0}")]
    BlockingPrecondition(String),

    /// Referenced entity does not exist or is outside the actor's
    /// visibility (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// rdms-common infrastructure error (500)
    #[error("Internal error: {0}")]
    Common(#[from] rdms_common::Error),

    /// Generic error (500)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", msg)
            }
            ApiError::PermissionDenied(msg) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED", msg),
            ApiError::StateConflict(msg) => (StatusCode::CONFLICT, "STATE_CONFLICT", msg),
            ApiError::BlockingPrecondition(msg) => (
                StatusCode::PRECONDITION_FAILED,
                "BLOCKING_PRECONDITION",
                msg,
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Database(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
