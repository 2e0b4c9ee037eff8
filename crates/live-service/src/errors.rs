//! Live service error types.
//!
//! Every error maps to an HTTP status and a stable machine code via the
//! `IntoResponse` impl. Cache, signaling and upstream failures are logged
//! server-side; clients only see a generic message for them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Live service error type.
///
/// Maps to HTTP status codes:
/// - `InvalidParameter`: 400
/// - `Unauthorized`: 401
/// - `Forbidden`, `RelationNotFound`, `GroupStatusNotAvailable`, `RejectNotAllowed`: 403
/// - `CallNotFound`: 404
/// - `AlreadyInCall`, `MaxParticipantsExceeded`: 409
/// - `Upstream`, `Signaling`: 503
/// - `Cache`, `Config`, `Internal`: 500
#[derive(Debug, Error)]
pub enum LiveError {
    /// Malformed request.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Caller identity missing.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is not a participant or not permitted to act.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Room or presence pointer missing or expired.
    #[error("Call not found")]
    CallNotFound,

    /// Identity already has an active call, or already joined this one.
    #[error("Already in call: {0}")]
    AlreadyInCall(String),

    /// Room is at capacity.
    #[error("Max participants exceeded: {0}")]
    MaxParticipantsExceeded(String),

    /// Not mutual contacts, or not a group member.
    #[error("Relation not found: {0}")]
    RelationNotFound(String),

    /// Group is disbanded, locked or otherwise unusable.
    #[error("Group status not available: {0}")]
    GroupStatusNotAvailable(String),

    /// Reject attempted by the creator or after answering.
    #[error("Reject not allowed: {0}")]
    RejectNotAllowed(String),

    /// Cache operation failed or missed its deadline.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Signaling/media service call failed.
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Sibling service RPC failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LiveError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> StatusCode {
        match self {
            LiveError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            LiveError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LiveError::Forbidden(_)
            | LiveError::RelationNotFound(_)
            | LiveError::GroupStatusNotAvailable(_)
            | LiveError::RejectNotAllowed(_) => StatusCode::FORBIDDEN,
            LiveError::CallNotFound => StatusCode::NOT_FOUND,
            LiveError::AlreadyInCall(_) | LiveError::MaxParticipantsExceeded(_) => {
                StatusCode::CONFLICT
            }
            LiveError::Upstream(_) | LiveError::Signaling(_) => StatusCode::SERVICE_UNAVAILABLE,
            LiveError::Cache(_) | LiveError::Config(_) | LiveError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            LiveError::InvalidParameter(_) => "INVALID_PARAMETER",
            LiveError::Unauthorized(_) => "UNAUTHORIZED",
            LiveError::Forbidden(_) => "FORBIDDEN",
            LiveError::CallNotFound => "CALL_NOT_FOUND",
            LiveError::AlreadyInCall(_) => "ALREADY_IN_CALL",
            LiveError::MaxParticipantsExceeded(_) => "MAX_PARTICIPANTS_EXCEEDED",
            LiveError::RelationNotFound(_) => "RELATION_NOT_FOUND",
            LiveError::GroupStatusNotAvailable(_) => "GROUP_STATUS_NOT_AVAILABLE",
            LiveError::RejectNotAllowed(_) => "REJECT_NOT_ALLOWED",
            LiveError::Cache(_) | LiveError::Config(_) | LiveError::Internal(_) => {
                "INTERNAL_ERROR"
            }
            LiveError::Signaling(_) | LiveError::Upstream(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            LiveError::Cache(_) | LiveError::Config(_) | LiveError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            LiveError::Signaling(_) | LiveError::Upstream(_) => {
                "Service temporarily unavailable".to_string()
            }
            LiveError::CallNotFound => "Call not found".to_string(),
            LiveError::InvalidParameter(msg)
            | LiveError::Unauthorized(msg)
            | LiveError::Forbidden(msg)
            | LiveError::AlreadyInCall(msg)
            | LiveError::MaxParticipantsExceeded(msg)
            | LiveError::RelationNotFound(msg)
            | LiveError::GroupStatusNotAvailable(msg)
            | LiveError::RejectNotAllowed(msg) => msg.clone(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for LiveError {
    fn into_response(self) -> Response {
        match &self {
            LiveError::Cache(err) => {
                tracing::error!(target: "live.cache", error = %err, "Cache operation failed");
            }
            LiveError::Signaling(err) => {
                tracing::warn!(target: "live.signaling", error = %err, "Signaling service failed");
            }
            LiveError::Upstream(err) => {
                tracing::warn!(target: "live.upstream", error = %err, "Upstream service failed");
            }
            LiveError::Config(err) | LiveError::Internal(err) => {
                tracing::error!(target: "live.internal", error = %err, "Internal error");
            }
            _ => {}
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.client_message(),
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<redis::RedisError> for LiveError {
    fn from(err: redis::RedisError) -> Self {
        LiveError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for LiveError {
    fn from(err: serde_json::Error) -> Self {
        LiveError::Internal(format!("serialization failed: {err}"))
    }
}
