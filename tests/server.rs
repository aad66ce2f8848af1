//! HTTP server tests: a real listener on 127.0.0.1:0 driven with reqwest.

#![cfg(feature = "server")]

mod support;

use reqwest::multipart::{Form, Part};
use scan2json::server::build_router;
use scan2json::{ChainController, ModelError, TaskKind};
use serde_json::Value;
use std::sync::Arc;
use support::{fast_config, StubClient, PASSAGE_REPLY};
use tokio::net::TcpListener;

/// Start a server on an ephemeral port and return its base URL.
async fn spawn_server(client: StubClient) -> String {
    let chain = ChainController::new(Arc::new(client), fast_config());
    let app = build_router(Arc::new(chain));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn image_form(field: &str) -> Form {
    let part = Part::bytes(b"\x89PNG fake image".to_vec())
        .file_name("passage.png")
        .mime_str("image/png")
        .unwrap();
    Form::new().part(field.to_string(), part)
}

#[tokio::test]
async fn vocab_returns_groups() {
    let base = spawn_server(StubClient::vocabulary()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/vocab"))
        .multipart(image_form("image"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let words = &body["vocab"]["groups"][0]["words"];
    assert_eq!(words.as_array().unwrap().len(), 2);
    assert_eq!(words[0]["word"], "elaborate");
}

#[tokio::test]
async fn missing_image_is_bad_request() {
    let base = spawn_server(StubClient::vocabulary()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/vocab"))
        .multipart(image_form("photo"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "Please upload an image" }));
}

#[tokio::test]
async fn non_multipart_body_is_bad_request() {
    let base = spawn_server(StubClient::vocabulary()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/vocab"))
        .body("hello")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Please upload an image");
}

#[tokio::test]
async fn model_failure_is_bad_gateway() {
    let client = StubClient::new()
        .reply(TaskKind::StitchedPassageOcr, PASSAGE_REPLY)
        .fail(
            TaskKind::VocabularyAnalysis,
            ModelError::Auth {
                detail: "401 invalid api key".into(),
            },
        );
    let base = spawn_server(client).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/vocab"))
        .multipart(image_form("image"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Model returned an unusable response");
    assert!(body["detail"].as_str().unwrap().contains("vocabulary-analysis"));
}

#[tokio::test]
async fn garbage_model_output_is_bad_gateway() {
    let client = StubClient::vocabulary()
        .reply(TaskKind::VocabularyAnalysis, "I'm sorry, I can't group these words.");
    let base = spawn_server(client).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/vocab"))
        .multipart(image_form("image"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn health_reports_ok() {
    let base = spawn_server(StubClient::new()).await;

    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let base = spawn_server(StubClient::new()).await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/health"))
        .header("Origin", "https://example.org")
        .send()
        .await
        .unwrap();

    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
