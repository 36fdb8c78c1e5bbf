//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::HeaderMap;
use networking::http::{WireRequest, WireResponse};
use networking::{Networking, NetworkingError, Transport};
use parking_lot::Mutex;
use tempfile::TempDir;

/// An in-process transport that records every request and answers with a
/// fixed response.
#[derive(Debug)]
pub struct CountingTransport {
    requests: Mutex<Vec<WireRequest>>,
    status_code: i32,
    body: Bytes,
    delay: Option<Duration>,
    failure: Option<NetworkingError>,
}

impl CountingTransport {
    pub fn new(status_code: i32, body: impl Into<Bytes>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            status_code,
            body: body.into(),
            delay: None,
            failure: None,
        })
    }

    pub fn json(body: serde_json::Value) -> Arc<Self> {
        Self::new(200, body.to_string())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            status_code: 200,
            body: Bytes::from_static(b"{}"),
            delay: Some(delay),
            failure: None,
        })
    }

    pub fn failing(error: NetworkingError) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            status_code: 0,
            body: Bytes::new(),
            delay: None,
            failure: Some(error),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> WireRequest {
        self.requests
            .lock()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

impl Transport for CountingTransport {
    fn send(&self, request: WireRequest) -> BoxFuture<'static, networking::Result<WireResponse>> {
        self.requests.lock().push(request);

        let delay = self.delay;
        let result = match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(WireResponse {
                status_code: self.status_code,
                headers: HeaderMap::new(),
                body: self.body.clone(),
            }),
        };

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

/// A client rooted at `http://httpbin.org` whose cache lives in `dir`.
pub fn client(transport: Arc<CountingTransport>, dir: &TempDir) -> Networking {
    Networking::builder("http://httpbin.org")
        .cache_directory(dir.path())
        .fixtures_directory(dir.path())
        .transport(transport)
        .build()
        .expect("Failed to build client")
}

/// A small PNG image.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::new_rgb8(width, height);
    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    buffer.into_inner()
}

/// A small JPEG image.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::new_rgb8(width, height);
    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Jpeg)
        .expect("Failed to encode JPEG");
    buffer.into_inner()
}
