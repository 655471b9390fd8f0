//! HTTP surface of the gateway.
//!
//! Classifies each request by session and client origin, admits it through
//! the shared [`RateLimiter`](crate::ratelimit::RateLimiter) and forwards
//! admitted messages to the session's conversation.

mod classify;
mod error;
mod extract;
mod server;
mod service;

pub use classify::{client_ip, generate_session_id};
pub use error::ApiError;
pub use extract::JsonBody;
pub use server::HttpServer;
pub use service::{router, AppState, ChatRequest, ChatResponse, ClearRequest};
