//! API key gate for the `/mcp` routes
//!
//! Clients present the key as `Authorization: Bearer <key>` or as the bare
//! header value. With no key configured every request passes.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use super::{AppState, MCP_PATH};
use crate::error::RelayError;

const BEARER_PREFIX: &str = "bearer ";

/// Token carried by an `Authorization` header value.
pub fn extract_token(header: &str) -> &str {
    let header = header.trim();
    match header.get(..BEARER_PREFIX.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(BEARER_PREFIX) => {
            header[BEARER_PREFIX.len()..].trim()
        }
        _ => header,
    }
}

fn keys_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.settings.api_key.as_deref() else {
        return next.run(request).await;
    };
    if !request.uri().path().starts_with(MCP_PATH) {
        return next.run(request).await;
    }

    let Some(header) = request.headers().get(AUTHORIZATION) else {
        tracing::warn!(path = %request.uri().path(), "rejected request without credentials");
        return RelayError::Unauthorized("Missing Authorization header".to_string())
            .into_response();
    };

    let provided = header.to_str().map(extract_token).unwrap_or_default();
    if keys_match(provided, expected) {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "rejected request with invalid API key");
        RelayError::Unauthorized("Invalid API key".to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AUTH_HINT;
    use crate::mcp::dispatcher::MockDispatcher;
    use crate::server::registry::SessionRegistry;
    use crate::server::{build_router, AppState, RelaySettings};
    use axum::body::Body;
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(api_key: Option<&str>) -> axum::Router {
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_dispatch()
            .returning(|_| Some(json!({"result": "pong"})));
        build_router(AppState::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(dispatcher),
            RelaySettings {
                api_key: api_key.map(String::from),
                ..Default::default()
            },
        ))
    }

    async fn post_ping(router: axum::Router, authorization: Option<&str>) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::post("/mcp");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = router
            .oneshot(builder.body(Body::from(r#"{"method":"ping"}"#)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token("Bearer abc"), "abc");
        assert_eq!(extract_token("bearer   abc "), "abc");
        assert_eq!(extract_token("BEARER abc"), "abc");
        assert_eq!(extract_token("  abc  "), "abc");
        assert_eq!(extract_token("Bearer"), "Bearer");
        assert_eq!(extract_token("é"), "é");
    }

    #[test]
    fn test_keys_match() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret", "Secret"));
        assert!(!keys_match("secret", "secret2"));
        assert!(!keys_match("", "secret"));
    }

    #[tokio::test]
    async fn test_no_key_configured_allows_all() {
        let (status, body) = post_ping(app(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": "pong"}));
    }

    #[tokio::test]
    async fn test_missing_header_is_401() {
        let (status, body) = post_ping(app(Some("secret")), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body,
            json!({"error": "Missing Authorization header", "hint": AUTH_HINT})
        );
    }

    #[tokio::test]
    async fn test_wrong_key_is_401() {
        let (status, body) = post_ping(app(Some("secret")), Some("Bearer wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid API key");
        assert_eq!(body["hint"], AUTH_HINT);
    }

    #[tokio::test]
    async fn test_bearer_and_bare_tokens_accepted() {
        for header in ["Bearer secret", "bearer secret", "secret"] {
            let (status, _) = post_ping(app(Some("secret")), Some(header)).await;
            assert_eq!(status, StatusCode::OK, "header {:?}", header);
        }
    }

    #[tokio::test]
    async fn test_health_is_not_gated() {
        let response = app(Some("secret"))
            .oneshot(
                axum::http::Request::get("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
