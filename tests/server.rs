//! HTTP service tests: a real axum server on an ephemeral port, backed by a
//! canned transport instead of a live model.

#![cfg(feature = "server")]

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use scenescan::server::{router, AppState};
use scenescan::{schema, AnalysisConfig, ChatRequest, ChatTransport, ScanError};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

struct CannedTransport {
    reply: Result<String, u16>,
}

#[async_trait]
impl ChatTransport for CannedTransport {
    async fn chat(&self, _request: &ChatRequest) -> Result<String, ScanError> {
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(ScanError::Transport {
                status: Some(*status),
                detail: "upstream unavailable".into(),
            }),
        }
    }
}

async fn spawn_server(reply: Result<String, u16>) -> SocketAddr {
    let config = AnalysisConfig::builder()
        .max_retries(0)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let state = Arc::new(AppState {
        config,
        schema: schema::security_assessment(),
        transport: Arc::new(CannedTransport { reply }),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

fn test_png() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([50, 50, 50])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn image_form(bytes: Vec<u8>, content_type: &str, name: &str) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(name.to_string())
        .mime_str(content_type)
        .unwrap();
    reqwest::multipart::Form::new().part("file", part)
}

const PARK_REPLY: &str =
    r#"{"image_context":"a park","has_weapon":false,"has_people":true,"confidence":87}"#;

#[tokio::test]
async fn health_endpoint() {
    let addr = spawn_server(Ok(PARK_REPLY.into())).await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn analyze_image_returns_structured_record() {
    let addr = spawn_server(Ok(PARK_REPLY.into())).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/analyze-image/"))
        .multipart(image_form(test_png(), "image/png", "park.png"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["image_context"], "a park");
    assert_eq!(body["has_weapon"], false);
    assert_eq!(body["has_people"], true);
    assert_eq!(body["confidence"], 87);
    // Optional list fields are present and empty, never null.
    assert_eq!(body["potential_threats"], serde_json::json!([]));
}

#[tokio::test]
async fn non_image_upload_is_rejected_with_400() {
    let addr = spawn_server(Ok(PARK_REPLY.into())).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/analyze-image/"))
        .multipart(image_form(b"hello world".to_vec(), "text/plain", "notes.txt"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("text/plain"), "detail: {detail}");
}

#[tokio::test]
async fn upstream_failure_maps_to_500_with_detail() {
    let addr = spawn_server(Err(503)).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/analyze-image/"))
        .multipart(image_form(test_png(), "image/png", "park.png"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn undecodable_image_maps_to_500() {
    let addr = spawn_server(Ok(PARK_REPLY.into())).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/analyze-image/"))
        .multipart(image_form(b"not really a png".to_vec(), "image/png", "fake.png"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("decode"));
}

#[tokio::test]
async fn empty_multipart_is_400() {
    let addr = spawn_server(Ok(PARK_REPLY.into())).await;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/analyze-image/"))
        .multipart(reqwest::multipart::Form::new().text("note", "no file here"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}
