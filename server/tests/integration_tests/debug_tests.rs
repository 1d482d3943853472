//! Integration tests for the debug HTTP router against a live server.

use super::common::{client, http_entry, http_message, start_server};
use accesslogger::{create_debug_router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;

/// Helper to make a GET request.
async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = tower::ServiceExt::oneshot(
        app,
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

    (status, json)
}

#[tokio::test]
async fn test_debug_health_follows_lifecycle() {
    let server = start_server().await;
    let app = create_debug_router(AppState::new(
        Arc::clone(&server.stats),
        server.probe.clone(),
    ));

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "serving");

    server.handle.stop().await;

    let (status, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_serving");

    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_debug_stats_reflect_processed_messages() {
    let mut server = start_server().await;
    let app = create_debug_router(AppState::new(
        Arc::clone(&server.stats),
        server.probe.clone(),
    ));
    let mut client = client(server.addr).await;

    client
        .stream_access_logs(tokio_stream::iter(vec![
            http_message(vec![http_entry("/a", Some("a"))]),
            http_message(vec![http_entry("/b", Some("b"))]),
        ]))
        .await
        .unwrap();
    server.next_record().await;
    server.next_record().await;

    let (status, body) = get(app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages_received"], 2);
    assert_eq!(body["http_entries"], 2);
    assert_eq!(body["streams_opened"], 1);

    server.shutdown().await.unwrap();
}
