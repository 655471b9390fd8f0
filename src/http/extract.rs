//! Lenient JSON body extraction.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::ApiError;

/// JSON request body parsed regardless of `Content-Type`.
///
/// An empty body reads as `{}`. Parse failures become [`ApiError::BadRequest`]
/// so clients always get a JSON error body.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &bytes
        };

        serde_json::from_slice(body).map(JsonBody).map_err(|e| {
            debug!(error = %e, "Rejected malformed request body");
            ApiError::BadRequest(format!("Invalid JSON body: {}", e))
        })
    }
}
