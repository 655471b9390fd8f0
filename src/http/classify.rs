//! Request classification: client origin and session identity.

use axum::http::HeaderMap;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::ratelimit::{Timestamp, UNKNOWN_IDENTITY};

/// Derive the client origin from proxy headers.
///
/// Uses the first `X-Forwarded-For` hop, then `X-Real-IP`, then `Host`.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|hop| !hop.is_empty()) {
            return first.to_string();
        }
    }

    header_str(headers, "x-real-ip")
        .or_else(|| header_str(headers, "host"))
        .unwrap_or(UNKNOWN_IDENTITY)
        .to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Generate a session id of the form `session_<millis>_<9 alphanumerics>`.
pub fn generate_session_id(now: Timestamp) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("session_{}_{}", now, suffix)
}
