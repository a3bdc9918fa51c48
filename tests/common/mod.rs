#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use lms_server::config::PaymentConfig;
use lms_server::infra::OfflineInvoiceGateway;
use lms_server::server::{create_server, AppState};
use lms_server::storage::SqliteStorage;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const CALLBACK_TOKEN: &str = "test-callback-token";

pub fn test_app() -> Router {
    let storage = Arc::new(SqliteStorage::open_in_memory().expect("in-memory database"));
    let gateway = Arc::new(OfflineInvoiceGateway::new("http://localhost:8080"));
    let payment = PaymentConfig {
        callback_token: CALLBACK_TOKEN.to_string(),
        ..PaymentConfig::default()
    };
    create_server(AppState::new(storage, gateway, payment))
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router call");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");
    send(app, request).await
}

/// Register an account and return its API token.
pub async fn register(app: &Router, name: &str, role: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/api/users",
        None,
        Some(json!({
            "name": name,
            "email": format!("{}@example.com", name.to_lowercase()),
            "role": role
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register {name}: {body}");
    body["api_token"].as_str().expect("api token").to_string()
}

/// Create a published course and return its id.
pub async fn published_course(app: &Router, token: &str, title: &str, price: i64) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/api/courses",
        Some(token),
        Some(json!({ "title": title, "price": price, "is_published": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create course: {body}");
    body["id"].as_str().expect("course id").to_string()
}
