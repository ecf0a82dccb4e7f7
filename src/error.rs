use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type.
///
/// The first group of variants is the domain error taxonomy from the
/// routing core (unresolved/upstream/negotiation/protocol/failed-auth/capacity);
/// the second group is ambient plumbing (config, IO, serialization).
#[derive(Error, Debug)]
pub enum AppError {
    /// URL scheme unknown, or a redirect chain exceeded its depth limit.
    #[error("unresolved: {0}")]
    Unresolved(String),

    /// Upstream source refused, timed out, or disconnected. Retriable.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// No compatible codec between a producer and a consumer. Terminal for that pair.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// Wire-level protocol violation; the connection is torn down.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Credentials were presented and rejected. MUST NOT be retried silently.
    #[error("authentication failed: {0}")]
    FailedAuth(String),

    /// A resource limit was hit (too many subscribers, too many connections). Retriable.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body (unified success format), matching the admin API's
/// `{"success": bool, ...}` envelope.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Negotiation(_) | AppError::Unresolved(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::FailedAuth(_) => StatusCode::UNAUTHORIZED,
            AppError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the core is allowed to retry the operation that produced this error.
    ///
    /// Only `FailedAuth` must never be retried silently (§7); everything else
    /// is either explicitly retriable (`Upstream`, `Capacity`) or terminal for
    /// the specific pairing without blocking future attempts.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, AppError::FailedAuth(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            error_type = std::any::type_name_of_val(&self),
            error_message = %body.message,
            "request failed"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
