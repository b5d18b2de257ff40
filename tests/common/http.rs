//! Request builders and response helpers for driving the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use chatbridge::registry::Registry;
use chatbridge::server::auth::{API_KEY_HEADER, INSTANCE_TOKEN_HEADER};
use chatbridge::server::{routes, AppState};

pub const TEST_API_KEY: &str = "test-secret";

pub fn test_app(registry: Arc<Registry>) -> Router {
    routes::create_router(AppState {
        registry,
        api_key: TEST_API_KEY.to_string(),
    })
}

pub fn build_request(
    method: Method,
    uri: &str,
    api_key: Option<&str>,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    if let Some(token) = token {
        builder = builder.header(INSTANCE_TOKEN_HEADER, token);
    }

    match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    }
}

pub async fn call(app: &Router, request: Request<Body>) -> Response<axum::body::Body> {
    app.clone().oneshot(request).await.expect("send request")
}

pub async fn extract_json(response: Response<axum::body::Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse json body")
}
