//! Mapping of request failures onto HTTP responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::agent::AgentError;
use crate::ratelimit::Denial;

/// A failed chat API request.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or incomplete input (400)
    BadRequest(String),
    /// Unknown resource (404)
    NotFound(String),
    /// Admission refused (429)
    RateLimited { denial: Denial, retry_after_secs: u64 },
    /// Upstream or internal failure (500)
    Internal(String),
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        error!(error = %err, "Error processing chat request");
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            ApiError::RateLimited {
                denial,
                retry_after_secs,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({
                    "error": denial.to_string(),
                    "rateLimit": {
                        "limit": denial.limit(),
                        "remaining": denial.remaining(),
                    },
                })),
            )
                .into_response(),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response(),
        }
    }
}
