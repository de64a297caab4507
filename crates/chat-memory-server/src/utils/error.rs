use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures inside the conversation memory subsystem.
///
/// Everything except [`MemoryError::AgentFailure`] is recovered locally:
/// logged, then the turn continues in a degraded mode.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryError {
    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    #[error("Summarization failure: {0}")]
    SummarizationFailure(String),

    #[error("Agent failure: {0}")]
    AgentFailure(String),
}

impl MemoryError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, MemoryError::AgentFailure(_))
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Agent error: {0}")]
    AgentError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::AgentFailure(msg) => ApiError::AgentError(msg),
            MemoryError::StoreUnavailable(msg) => ApiError::StoreError(msg),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::StoreError(msg) => {
                tracing::error!("Store error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "StoreError", msg)
            }
            ApiError::AgentError(msg) => {
                tracing::error!("Agent error: {}", msg);
                (StatusCode::BAD_GATEWAY, "AgentError", msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
