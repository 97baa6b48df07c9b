//! HTTP Request Handlers
//!
//! This module contains all HTTP request handlers organized by domain.

pub mod compile;
pub mod health;

use axum::{extract::DefaultBodyLimit, middleware, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::{
    constants::MAX_REQUEST_BODY_BYTES, middleware::logging_middleware, state::AppState,
};

/// Create all API routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .nest("/compile", compile::routes())
}

/// Build the application with all layers applied
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes())
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::harness::{fixtures, CleanupQueue};

    fn test_app(root: &std::path::Path) -> Router {
        app(AppState::new(fixtures::config(root), Arc::new(CleanupQueue::new())))
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn payload(code: &str) -> serde_json::Value {
        serde_json::json!({
            "code": code,
            "unitName": "kata",
            "testCode": fixtures::INVERT_TESTS,
            "testUnitName": "kata_test",
            "baselineSpeed": 1.0,
            "baselineSize": 100.0
        })
    }

    #[tokio::test]
    async fn test_health() {
        let root = tempfile::tempdir().unwrap();
        let response = test_app(root.path())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["pending_cleanups"], 0);
    }

    #[tokio::test]
    async fn test_invalid_unit_name_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let mut body = payload(fixtures::INVERT_SOURCE);
        body["unitName"] = "fn".into();

        let (status, json) = post_json(test_app(root.path()), "/compile", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert!(json.get("totalScore").is_none());
        assert_eq!(fixtures::entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_invalid_baseline_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let mut body = payload(fixtures::INVERT_SOURCE);
        body["baselineSize"] = 0.0.into();

        let (status, json) = post_json(test_app(root.path()), "/compile", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_compile_ok_and_compile_error() {
        let root = tempfile::tempdir().unwrap();
        let app = test_app(root.path());

        let (status, json) = post_json(app.clone(), "/compile", payload(fixtures::INVERT_SOURCE)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["size"].as_u64().is_some());
        assert!(json["speed"].as_f64().is_some());
        assert!(json["totalScore"].as_f64().is_some());

        let (status, json) = post_json(app, "/compile", payload("pub fn invert(")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["status"], "error");
        assert!(json["message"].as_str().unwrap().contains("error"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_reports_every_key() {
        let root = tempfile::tempdir().unwrap();
        let mut invalid = payload(fixtures::INVERT_SOURCE);
        invalid["testUnitName"] = "kata".into();

        let body = serde_json::json!({
            "alice": payload(fixtures::INVERT_SOURCE),
            "bob": payload("pub fn invert("),
            "carol": invalid,
        });

        let (status, json) = post_json(test_app(root.path()), "/compile/batch", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["results"]["alice"]["status"], "ok");
        assert_eq!(json["results"]["bob"]["status"], "error");
        assert_eq!(json["results"]["carol"]["status"], "error");
    }
}
