//! Teleport service over HTTP.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::TestStorage;
use conductor_archive::Archive;
use conductor_pool::StorageLocation;
use conductor_teleport::service::{router, AppState};
use conductor_teleport::{HttpTeleporter, InvocationResponse, TeleportError, Teleporter};
use tower::ServiceExt;

fn app(storage: &TestStorage) -> axum::Router {
    router(Arc::new(AppState {
        buckets: storage.buckets.clone(),
    }))
}

async fn post(app: axum::Router, body: &impl serde::Serialize) -> (StatusCode, InvocationResponse) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/teleport")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_endpoint_responds() {
    let storage = TestStorage::new();
    let response = app(&storage)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn teleport_endpoint_writes_merged_archive() {
    let storage = TestStorage::new();
    let code = storage.pooled(&[("index.js", "handler")]).await;
    let deps = storage.pooled(&[("node_modules/ms/index.js", "ms")]).await;
    let request = storage.request(vec![code, deps], "api");

    let (status, envelope) = post(app(&storage), &request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(envelope.status_code, 200);
    let response = envelope.into_result().unwrap();
    assert_eq!(response.fragment_count, 2);
    assert_eq!(response.destination, request.destination);

    let merged = Archive::from_zip(&storage.read(&request.destination).await).unwrap();
    assert_eq!(merged.file_count(), 2);
}

#[tokio::test]
async fn missing_fragments_are_listed_in_the_envelope() {
    let storage = TestStorage::new();
    let present = storage.pooled(&[("index.js", "handler")]).await;
    let missing = StorageLocation::new(common::POOL_BUCKET, "ttl-7d/fragments/deadbeef");
    let request = storage.request(vec![present, missing.clone()], "api");

    let (status, envelope) = post(app(&storage), &request).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    match envelope.into_result().unwrap_err() {
        TeleportError::Transfer { failed } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].location, missing);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn conflicting_fragments_are_rejected() {
    let storage = TestStorage::new();
    let a = storage.pooled(&[("a/b/c/x", "1")]).await;
    let b = storage.pooled(&[("a/b/c/x", "2")]).await;

    let (status, envelope) = post(app(&storage), &storage.request(vec![a, b], "api")).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(matches!(
        envelope.into_result().unwrap_err(),
        TeleportError::Remote { status: 409, .. }
    ));
}

#[tokio::test]
async fn http_teleporter_round_trip() {
    let storage = TestStorage::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(&storage);
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    let teleporter =
        HttpTeleporter::new(format!("http://{addr}/"), None).unwrap();
    let code = storage.pooled(&[("index.js", "handler")]).await;
    let request = storage.request(vec![code], "worker");

    let response = teleporter.teleport(&request).await.unwrap();
    assert_eq!(response.fragment_count, 1);
    assert!(!storage.read(&request.destination).await.is_empty());

    server.abort();
}
