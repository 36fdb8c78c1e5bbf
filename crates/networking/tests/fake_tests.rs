//! Tests for serving registered fakes instead of the network.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use common::{CountingTransport, client};
use networking::http::{FakeResponse, JsonBody};
use networking::{CachingLevel, JsonResult, NetworkingError, StatusCodeCategory};
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_fake_get_returns_registered_body() {
    let dir = TempDir::new().unwrap();
    let transport = CountingTransport::json(json!({"from": "network"}));
    let networking = client(transport.clone(), &dir);

    networking.fake_get("/get", FakeResponse::json(json!({"url": "http://x/get"})));

    let result = networking.get("/get").await;
    assert!(result.is_success());
    assert_eq!(result.status_code(), 200);
    assert_eq!(result.body().dictionary()["url"], "http://x/get");
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_fake_each_method() {
    let dir = TempDir::new().unwrap();
    let transport = CountingTransport::json(json!({}));
    let networking = client(transport.clone(), &dir);

    networking.fake_post("/post", FakeResponse::json(json!({"method": "POST"})));
    networking.fake_put("/put", FakeResponse::json(json!({"method": "PUT"})));
    networking.fake_patch("/patch", FakeResponse::json(json!({"method": "PATCH"})));
    networking.fake_delete("/delete", FakeResponse::empty().status(204));

    let post = networking.post("/post", json!({"a": 1})).await;
    assert_eq!(post.body().dictionary()["method"], "POST");
    let put = networking.put("/put", json!({})).await;
    assert_eq!(put.body().dictionary()["method"], "PUT");
    let patch = networking.patch("/patch", json!({})).await;
    assert_eq!(patch.body().dictionary()["method"], "PATCH");

    let delete = networking.delete("/delete").await;
    assert!(delete.is_success());
    assert_eq!(delete.status_code(), 204);
    assert_eq!(delete.body(), &JsonBody::None);

    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_fake_null_body_is_empty_success() {
    let dir = TempDir::new().unwrap();
    let transport = CountingTransport::json(json!({}));
    let networking = client(transport.clone(), &dir);

    networking.fake_delete("/delete", FakeResponse::json(serde_json::Value::Null));

    let result = networking.delete("/delete").await;
    assert!(result.is_success());
    assert_eq!(result.status_code(), 200);
    assert_eq!(result.body(), &JsonBody::None);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_fake_error_status_is_classified() {
    let dir = TempDir::new().unwrap();
    let transport = CountingTransport::json(json!({}));
    let networking = client(transport.clone(), &dir);

    networking.fake_get(
        "/stories",
        FakeResponse::json(json!({"message": "Not here"})).status(404),
    );
    networking.fake_get("/broken", FakeResponse::empty().status(500));

    let result = networking.get("/stories").await;
    let error = result.error().expect("expected a failure");
    assert_eq!(error.code(), 404);
    assert_eq!(error.category(), StatusCodeCategory::ClientError);
    match error {
        NetworkingError::ClientError { message, .. } => assert_eq!(message, "Not here"),
        other => panic!("expected client error, got {other:?}"),
    }

    let result = networking.get("/broken").await;
    assert_eq!(result.error().unwrap().category(), StatusCodeCategory::ServerError);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_template_values_are_echoed() {
    let dir = TempDir::new().unwrap();
    let transport = CountingTransport::json(json!({}));
    let networking = client(transport.clone(), &dir);

    networking.fake_get(
        "/users/{userID}/companies/{companyID}",
        FakeResponse::json(json!({"user": "{userID}", "company": "{companyID}"})),
    );

    let result = networking.get("/users/10/companies/20").await;
    let body = result.body().dictionary();
    assert_eq!(body["user"], "10");
    assert_eq!(body["company"], "20");

    // Different segment count or root: falls through to the network.
    networking.get("/users/10/companies").await;
    networking.get("/accounts/10/companies/20").await;
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_fake_headers_and_delay() {
    let dir = TempDir::new().unwrap();
    let networking = client(CountingTransport::json(json!({})), &dir);

    let mut headers = http::HeaderMap::new();
    headers.insert("x-fake", http::HeaderValue::from_static("yes"));
    networking.fake_get(
        "/slow",
        FakeResponse::json(json!({"ok": true}))
            .headers(headers)
            .delay(Duration::from_millis(50)),
    );

    let started = Instant::now();
    let result = networking.get("/slow").await;
    assert!(started.elapsed() >= Duration::from_millis(50));
    match result {
        JsonResult::Success(response) => assert_eq!(response.header("x-fake"), Some("yes")),
        JsonResult::Failure { error, .. } => panic!("unexpected failure: {error}"),
    }
}

#[tokio::test]
async fn test_unauthorized_fake_fires_callback_and_fails() {
    let dir = TempDir::new().unwrap();
    let networking = client(CountingTransport::json(json!({})), &dir);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    networking.set_unauthorized_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    networking.fake_get("/me", FakeResponse::empty().status(401));
    networking.fake_post("/admin", FakeResponse::empty().status(403));

    let result = networking.get("/me").await;
    assert_eq!(result.error().unwrap().code(), 401);
    let result = networking.post("/admin", json!({})).await;
    assert_eq!(result.error().unwrap().code(), 403);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    networking.clear_unauthorized_callback();
    networking.get("/me").await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fake_from_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("entries.json"),
        br#"[{"title": "first"}, {"title": "second"}]"#,
    )
    .unwrap();
    let networking = client(CountingTransport::json(json!({})), &dir);

    networking.fake_get_from_file("/entries", "entries").unwrap();

    let result = networking.get("/entries").await;
    let entries = result.body().array();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["title"], "second");
}

#[tokio::test]
async fn test_fake_image_download_is_cached() {
    let dir = TempDir::new().unwrap();
    let transport = CountingTransport::json(json!({}));
    let networking = client(transport.clone(), &dir);

    networking.fake_image_download("/image/png", image::DynamicImage::new_rgb8(8, 8));

    let result = networking
        .download_image("/image/png", None, CachingLevel::MemoryAndFile)
        .await;
    assert_eq!(result.image().unwrap().width(), 8);

    let cached = networking.image_from_cache("/image/png", None).unwrap();
    assert_eq!(cached.height(), 8);
    assert!(networking.destination_path("/image/png", None).unwrap().exists());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_fake_data_download() {
    let dir = TempDir::new().unwrap();
    let networking = client(CountingTransport::json(json!({})), &dir);

    networking.fake_data_download("/file.bin", &b"payload"[..]);

    let result = networking
        .download_data("/file.bin", Some("file"), CachingLevel::Memory)
        .await;
    assert_eq!(result.data().unwrap().as_ref(), b"payload");
    assert_eq!(
        networking.data_from_cache("/file.bin", Some("file")).unwrap().as_ref(),
        b"payload"
    );
}

#[tokio::test]
async fn test_get_decoded_from_fake() {
    #[derive(Debug, serde::Deserialize)]
    struct Echo {
        url: String,
    }

    let dir = TempDir::new().unwrap();
    let networking = client(CountingTransport::json(json!({})), &dir);
    networking.fake_get("/get", FakeResponse::json(json!({"url": "http://x/get"})));
    networking.fake_get("/missing", FakeResponse::empty().status(404));

    let echo: Echo = networking.get_decoded("/get").await.unwrap();
    assert_eq!(echo.url, "http://x/get");

    let error = networking.get_decoded::<Echo>("/missing").await.unwrap_err();
    assert!(matches!(error, NetworkingError::ClientError { status_code: 404, .. }));
}
