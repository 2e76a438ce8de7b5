//! Route handlers for the internal token API.
//!
//! Token endpoints require the `x-internal-secret` header to match
//! `INTERNAL_API_SECRET`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::TokenStoreError;
use crate::SharedState;

pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        // ── Tokens ───────────────────────────────────────────────────────
        .route("/tokens", get(tokens_get).put(tokens_store))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "drive-token-store",
        "version": env!("CARGO_PKG_VERSION"),
        "schema_ready": state.tokens.schema_ready(),
    }))
}

// =============================================================================
// Tokens
// =============================================================================

/// GET /v1/tokens — Current access/refresh tokens; either may be null.
async fn tokens_get(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, TokenStoreError> {
    require_internal(&state, &headers)?;

    let pair = state.tokens.get().await?;

    Ok(Json(json!({ "data": pair })))
}

#[derive(Deserialize)]
struct StoreTokensRequest {
    access_token: String,
    /// Seconds until the access token expires.
    access_token_expiry: i64,
    refresh_token: String,
}

/// PUT /v1/tokens — Persist a freshly issued token pair.
async fn tokens_store(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<StoreTokensRequest>, JsonRejection>,
) -> Result<StatusCode, TokenStoreError> {
    require_internal(&state, &headers)?;

    let Json(body) = body.map_err(|rejection| {
        TokenStoreError::InvalidArgument(format!(
            "malformed token payload: {}",
            rejection.body_text()
        ))
    })?;

    state
        .tokens
        .store(&body.access_token, body.access_token_expiry, &body.refresh_token)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

fn require_internal(state: &SharedState, headers: &HeaderMap) -> Result<(), TokenStoreError> {
    let provided = headers
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(TokenStoreError::Unauthorized)?;

    let expected = &state.config.internal_api_secret;
    if expected.is_empty() || !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(TokenStoreError::Unauthorized);
    }

    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTokenBackend, TokenRepository};
    use crate::{AppState, Config};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &str = "internal-test-secret";

    fn app() -> Router {
        let config = Config::from_vars(|name| match name {
            "INTERNAL_API_SECRET" => Some(SECRET.to_string()),
            "KV_PREFIX" => Some("od_".to_string()),
            _ => None,
        })
        .unwrap();
        let tokens = TokenRepository::new(Arc::new(MemoryTokenBackend::new()), &config.kv_prefix);
        crate::api::router(Arc::new(AppState { config, tokens }))
    }

    fn get_tokens(secret: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri("/v1/tokens");
        if let Some(secret) = secret {
            builder = builder.header(INTERNAL_SECRET_HEADER, secret);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn put_tokens(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri("/v1/tokens")
            .header(INTERNAL_SECRET_HEADER, SECRET)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn status_needs_no_secret() {
        let resp = app()
            .oneshot(Request::get("/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn tokens_require_the_internal_secret() {
        let app = app();

        let resp = app.clone().oneshot(get_tokens(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.oneshot(get_tokens(Some("wrong"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn empty_store_returns_nulls() {
        let resp = app().oneshot(get_tokens(Some(SECRET))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert!(body["data"]["access_token"].is_null());
        assert!(body["data"]["refresh_token"].is_null());
    }

    #[tokio::test]
    async fn put_then_get_returns_the_pair() {
        let app = app();

        let resp = app
            .clone()
            .oneshot(put_tokens(json!({
                "access_token": "EwB4A8l6",
                "access_token_expiry": 3600,
                "refresh_token": "M.R3_BAY",
            })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let body = json_body(app.oneshot(get_tokens(Some(SECRET))).await.unwrap()).await;
        assert_eq!(body["data"]["access_token"], "EwB4A8l6");
        assert_eq!(body["data"]["refresh_token"], "M.R3_BAY");
    }

    #[tokio::test]
    async fn negative_expiry_is_a_bad_request() {
        let resp = app()
            .oneshot(put_tokens(json!({
                "access_token": "a",
                "access_token_expiry": -5,
                "refresh_token": "r",
            })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"]["code"], "invalid_argument");
    }

    #[tokio::test]
    async fn missing_expiry_is_a_bad_request() {
        let resp = app()
            .oneshot(put_tokens(json!({
                "access_token": "a",
                "refresh_token": "r",
            })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["error"]["code"], "invalid_argument");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("access_token_expiry"));
    }

    #[tokio::test]
    async fn string_expiry_is_a_bad_request() {
        let resp = app()
            .oneshot(put_tokens(json!({
                "access_token": "a",
                "access_token_expiry": "3600",
                "refresh_token": "r",
            })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"]["code"], "invalid_argument");
    }

    #[tokio::test]
    async fn malformed_body_without_secret_is_unauthorized() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/tokens")
                    .header("content-type", "application/json")
                    .body(Body::from("{"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn preflight_allows_only_token_methods() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/v1/tokens")
                    .header("origin", "https://drive.example")
                    .header("access-control-request-method", "PUT")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let allowed = resp
            .headers()
            .get("access-control-allow-methods")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(allowed.contains("GET"));
        assert!(allowed.contains("PUT"));
        assert!(!allowed.contains("DELETE"));
    }

    #[test]
    fn constant_time_eq_compares_contents() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
