//! Axum routes for the TLS content server: asset lookup, node status, and a fixed version
//! reply. Route semantics (status codes and literal response bodies) follow the original
//! `contserver` handler exactly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use edged_core::ContentStore;
use serde::Deserialize;
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;

const VERSION: &str = "0.8.0";

#[derive(Clone)]
pub struct AppState {
    pub content: ContentStore,
    pub running: Arc<AtomicBool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentQuery {
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    asset: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/content", get(content_handler))
        .route("/status", get(status_handler))
        .route("/version", get(version_handler))
        .fallback(unsupported_path)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("access-control-allow-credentials"),
            HeaderValue::from_static("authorization"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("access-control-allow-headers"),
            HeaderValue::from_static("HEAD,GET,POST,PUT,DELETE,OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("access-control-allow-methods"),
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("access-control-allow-origin"),
            HeaderValue::from_static("*"),
        ))
        .with_state(state)
}

async fn content_handler(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> Result<Response, AppError> {
    let Some(asset) = query.asset.filter(|a| !a.is_empty()) else {
        return Err(AppError::bad_request(
            "Must specify asset in URL, like /content?website=REQUESTED_SITE&asset=FILE_HASH",
        ));
    };
    let website = query.website.unwrap_or_default();

    match state.content.get(&website, &asset).await {
        Some(bytes) if !bytes.is_empty() => Ok((StatusCode::OK, bytes).into_response()),
        _ => Err(AppError::not_found("404 - Asset not found")),
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "Running": state.running.load(Ordering::Acquire) }))
}

async fn version_handler() -> Json<serde_json::Value> {
    Json(json!({ "response": { "version": VERSION } }))
}

async fn unsupported_path() -> Response {
    AppError::new(StatusCode::NOT_FOUND, "Unsupported path").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_state_with(website: &str, asset: &str, body: &[u8]) -> AppState {
        let content = ContentStore::new();
        let mut assets = std::collections::HashMap::new();
        assets.insert(asset.to_uppercase(), bytes::Bytes::copy_from_slice(body));
        let mut store = std::collections::HashMap::new();
        store.insert(website.to_string(), assets);
        content.replace(store).await;

        AppState {
            content,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    #[tokio::test]
    async fn content_returns_asset_bytes_on_match() {
        let state = test_state_with("example.com", "DEADBEEF", b"hello world").await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/content?website=example.com&asset=DEADBEEF")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn content_missing_asset_param_is_bad_request() {
        let state = test_state_with("example.com", "DEADBEEF", b"hello world").await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/content?website=example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn content_unknown_asset_is_not_found() {
        let state = test_state_with("example.com", "DEADBEEF", b"hello world").await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/content?website=example.com&asset=NOTREAL")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_reports_running_flag() {
        let state = test_state_with("example.com", "DEADBEEF", b"hello world").await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn version_returns_fixed_payload() {
        let state = test_state_with("example.com", "DEADBEEF", b"hello world").await;
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_returns_404() {
        let state = test_state_with("example.com", "DEADBEEF", b"hello world").await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
