//! Chat API route table and handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use super::classify::{client_ip, generate_session_id};
use super::error::ApiError;
use super::extract::JsonBody;
use crate::agent::SessionRegistry;
use crate::config::ChatConfig;
use crate::ratelimit::{now_millis, Decision, Quota, RateLimiter};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    limiter: Arc<RateLimiter>,
    sessions: Arc<SessionRegistry>,
    max_message_length: usize,
    retry_after_secs: u64,
    brand: Arc<str>,
}

impl AppState {
    pub fn new(
        limiter: Arc<RateLimiter>,
        sessions: Arc<SessionRegistry>,
        chat: &ChatConfig,
    ) -> Self {
        Self {
            limiter,
            sessions,
            max_message_length: chat.max_message_length,
            retry_after_secs: chat.retry_after_secs,
            brand: Arc::from(chat.brand.as_str()),
        }
    }
}

/// Body of a chat request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Body of a successful chat response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub answer: String,
    pub session_id: String,
    pub rate_limit: Quota,
}

/// Body of a session clear request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Build the router with every chat API route.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .route("/chat", post(chat))
        .route("/api/chat/clear", post(clear_session))
        .route("/chat/clear", post(clear_session))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": format!("{} API is running", state.brand),
    }))
}

#[instrument(skip_all, fields(client_ip = tracing::field::Empty, session = tracing::field::Empty))]
async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = request
        .message
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Message is required".to_string()))?;

    let length = message.chars().count();
    if length > state.max_message_length {
        warn!(length, "Rejected oversized message");
        return Err(ApiError::BadRequest(format!(
            "Message too long. Maximum {} characters allowed.",
            state.max_message_length
        )));
    }

    let now = now_millis();
    let session_id = request
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| generate_session_id(now));
    let client_ip = client_ip(&headers);

    let span = tracing::Span::current();
    span.record("client_ip", client_ip.as_str());
    span.record("session", session_id.as_str());

    let quota = match state.limiter.admit(&session_id, &client_ip, now) {
        Decision::Admitted(quota) => quota,
        Decision::Denied(denial) => {
            warn!(tier = ?denial.tier(), "Request denied by rate limiter");
            return Err(ApiError::RateLimited {
                denial,
                retry_after_secs: state.retry_after_secs,
            });
        }
    };

    let answer = state.sessions.ask(&session_id, &message).await?;

    Ok(Json(ChatResponse {
        answer,
        session_id,
        rate_limit: quota,
    }))
}

#[instrument(skip_all)]
async fn clear_session(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ClearRequest>,
) -> Result<Json<Value>, ApiError> {
    let session_id = request
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Session ID is required".to_string()))?;

    let had_conversation = state.sessions.remove(&session_id);
    let had_counter = state.limiter.clear_session(&session_id);

    if had_conversation || had_counter {
        info!(session = %session_id, "Session cleared");
        Ok(Json(json!({ "message": "Session cleared successfully" })))
    } else {
        Err(ApiError::NotFound("Session not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::{EchoModel, FailingModel};
    use crate::agent::ChatModel;
    use crate::ratelimit::Limits;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    fn limits(session: u64, ip_minute: u64, ip_hour: u64, global: u64) -> Limits {
        Limits {
            max_requests_per_session: session,
            max_requests_per_ip_per_minute: ip_minute,
            max_requests_per_ip_per_hour: ip_hour,
            global_max_requests_per_minute: global,
        }
    }

    fn test_state(limits: Limits, model: Arc<dyn ChatModel>) -> AppState {
        let chat = ChatConfig {
            max_message_length: 20,
            ..ChatConfig::default()
        };
        AppState::new(
            Arc::new(RateLimiter::new(limits)),
            Arc::new(SessionRegistry::new(model, "prompt")),
            &chat,
        )
    }

    fn post_json(uri: &str, ip: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn chat_request(session_id: &str) -> Request<Body> {
        post_json(
            "/api/chat",
            "1.2.3.4",
            json!({ "message": "hi", "sessionId": session_id }),
        )
    }

    fn post_raw(uri: &str, content_type: Option<&str>, body: &'static str) -> Request<Body> {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(test_state(Limits::default(), Arc::new(EchoModel::default())));

        for uri in ["/health", "/api/health"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["status"], "ok");
            assert_eq!(body["message"], "LunaGlow API is running");
        }
    }

    #[tokio::test]
    async fn test_body_without_content_type_is_accepted() {
        let app = router(test_state(Limits::default(), Arc::new(EchoModel::default())));

        let response = app
            .clone()
            .oneshot(post_raw("/api/chat", None, r#"{"message":"hi","sessionId":"s1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["answer"], "echo: hi");

        let response = app
            .clone()
            .oneshot(post_raw("/chat", Some("text/plain"), r#"{"message":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_raw("/api/chat/clear", None, r#"{"sessionId":"s1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_bodies_get_json_errors() {
        let app = router(test_state(Limits::default(), Arc::new(EchoModel::default())));

        let cases = [
            ("/api/chat", "{not json"),
            ("/api/chat", r#"{"message":42}"#),
            ("/chat/clear", r#"{"sessionId":7}"#),
        ];
        for (uri, body) in cases {
            let response = app
                .clone()
                .oneshot(post_raw(uri, Some("application/json"), body))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "application/json",
                "{body}"
            );
            let error = body_json(response).await;
            assert!(error["error"].as_str().unwrap().starts_with("Invalid JSON body"));
        }
    }

    #[tokio::test]
    async fn test_empty_body_reads_as_missing_fields() {
        let app = router(test_state(Limits::default(), Arc::new(EchoModel::default())));

        let response = app
            .clone()
            .oneshot(post_raw("/api/chat", None, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Message is required");

        let response = app
            .oneshot(post_raw("/chat/clear", None, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Session ID is required");
    }

    #[tokio::test]
    async fn test_chat_answers_and_reports_quota() {
        let app = router(test_state(limits(10, 5, 50, 100), Arc::new(EchoModel::default())));

        let response = app
            .oneshot(post_json(
                "/api/chat",
                "1.2.3.4",
                json!({ "message": "hello", "sessionId": "s1" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["answer"], "echo: hello");
        assert_eq!(body["sessionId"], "s1");
        assert_eq!(
            body["rateLimit"],
            json!({ "sessionRemaining": 9, "ipMinuteRemaining": 4, "ipHourRemaining": 49 })
        );
    }

    #[tokio::test]
    async fn test_chat_generates_session_id() {
        let app = router(test_state(Limits::default(), Arc::new(EchoModel::default())));

        let response = app
            .oneshot(post_json("/chat", "1.2.3.4", json!({ "message": "hi" })))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert!(body["sessionId"].as_str().unwrap().starts_with("session_"));
    }

    #[tokio::test]
    async fn test_chat_validates_message() {
        let app = router(test_state(Limits::default(), Arc::new(EchoModel::default())));

        let response = app
            .clone()
            .oneshot(post_json("/api/chat", "1.2.3.4", json!({ "sessionId": "s1" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Message is required");

        let response = app
            .oneshot(post_json(
                "/api/chat",
                "1.2.3.4",
                json!({ "message": "x".repeat(21) }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Message too long. Maximum 20 characters allowed."
        );
    }

    #[tokio::test]
    async fn test_message_length_counts_characters() {
        let app = router(test_state(Limits::default(), Arc::new(EchoModel::default())));

        // 20 characters, 40 UTF-16 code units, 80 bytes
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/chat",
                "1.2.3.4",
                json!({ "message": "\u{1F600}".repeat(20) }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_json(
                "/api/chat",
                "1.2.3.4",
                json!({ "message": "\u{1F600}".repeat(21) }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rejected_message_does_not_consume_quota() {
        let state = test_state(limits(1, 10, 10, 10), Arc::new(EchoModel::default()));
        let app = router(state.clone());

        app.oneshot(post_json("/api/chat", "1.2.3.4", json!({ "sessionId": "s1" })))
            .await
            .unwrap();

        assert_eq!(state.limiter.store().session_count("s1"), 0);
    }

    #[tokio::test]
    async fn test_chat_rate_limited_per_ip_minute() {
        let app = router(test_state(limits(100, 2, 100, 100), Arc::new(EchoModel::default())));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post_json("/api/chat", "1.2.3.4", json!({ "message": "hi" })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(post_json("/api/chat", "1.2.3.4", json!({ "message": "hi" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("per minute"));
        assert_eq!(body["rateLimit"], json!({ "limit": 2, "remaining": 0 }));
    }

    #[tokio::test]
    async fn test_global_limit_applies_across_clients() {
        let app = router(test_state(limits(100, 100, 100, 1), Arc::new(EchoModel::default())));

        let first = app
            .clone()
            .oneshot(post_json(
                "/chat",
                "1.1.1.1",
                json!({ "message": "hi", "sessionId": "a" }),
            ))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(post_json(
                "/chat",
                "2.2.2.2",
                json!({ "message": "hi", "sessionId": "b" }),
            ))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            body_json(second).await["error"],
            "Global rate limit exceeded. Please try again later."
        );
    }

    #[tokio::test]
    async fn test_model_failure_is_internal_error() {
        let app = router(test_state(Limits::default(), Arc::new(FailingModel)));

        let response = app
            .oneshot(post_json("/api/chat", "1.2.3.4", json!({ "message": "hi" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_clear_session_lifecycle() {
        let state = test_state(limits(1, 100, 100, 100), Arc::new(EchoModel::default()));
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(chat_request("s1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(chat_request("s1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app
            .clone()
            .oneshot(post_json("/api/chat/clear", "1.2.3.4", json!({ "sessionId": "s1" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Session cleared successfully");
        assert!(!state.sessions.contains("s1"));

        let response = app
            .clone()
            .oneshot(post_json("/chat/clear", "1.2.3.4", json!({ "sessionId": "s1" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Session not found");

        let response = app
            .oneshot(chat_request("s1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_clear_requires_session_id() {
        let app = router(test_state(Limits::default(), Arc::new(EchoModel::default())));

        let response = app
            .oneshot(post_json("/chat/clear", "1.2.3.4", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Session ID is required");
    }
}
