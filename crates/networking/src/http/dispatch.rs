//! The request dispatcher.
//!
//! For every request the dispatcher decides, in order, between a registered
//! fake, the two-tier cache and the transport, and folds the three paths
//! into one [`RawOutcome`].

use std::sync::Arc;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use image::DynamicImage;
use parking_lot::RwLock;
use tokio::sync::oneshot;
use url::Url;

use super::cache::TwoTierCache;
use super::client::NetworkingConfig;
use super::fake::{FakeMatch, FakeRegistry};
use super::request::{RequestDescriptor, ResponseType};
use super::result::{Payload, RawOutcome, Response, decode_image};
use super::transport::{InFlightTable, RequestId, Transport, WireRequest};
use super::url::{compose_url, destination_key};
use crate::error::{NetworkingError, Result, StatusCodeCategory};
use crate::logging::{self, RequestErrorReport, targets};

/// Callback invoked on 401 and 403 responses.
pub type UnauthorizedCallback = Arc<dyn Fn() + Send + Sync>;

/// Authorization and custom headers applied to every network request.
#[derive(Clone, Debug)]
pub(crate) struct AuthState {
    pub header_key: String,
    pub header_value: Option<String>,
    pub token: Option<String>,
    pub header_fields: HeaderMap,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            header_key: AUTHORIZATION.as_str().to_string(),
            header_value: None,
            token: None,
            header_fields: HeaderMap::new(),
        }
    }
}

/// Shared state behind a [`Networking`](super::Networking) client.
pub(crate) struct Dispatcher {
    pub base_url: String,
    pub config: NetworkingConfig,
    pub transport: Arc<dyn Transport>,
    pub fakes: FakeRegistry,
    pub cache: TwoTierCache,
    pub in_flight: InFlightTable,
    pub auth: RwLock<AuthState>,
    pub unauthorized: RwLock<Option<UnauthorizedCallback>>,
    pub boundary: String,
}

/// A request that has been registered as in flight.
pub(crate) struct Started {
    id: RequestId,
    url: Url,
    cancelled: oneshot::Receiver<()>,
}

impl Dispatcher {
    /// Compose the URL and register the request so it can be cancelled.
    pub(crate) fn begin(&self, id: RequestId, descriptor: &RequestDescriptor) -> Result<Started> {
        let url = compose_url(&self.base_url, &descriptor.path)?;
        let cancelled = self
            .in_flight
            .register(id, descriptor.task_type(), descriptor.method, &url);
        Ok(Started { id, url, cancelled })
    }

    /// Run a request to completion.
    pub(crate) async fn execute(&self, descriptor: &RequestDescriptor) -> RawOutcome {
        let id = self.in_flight.next_id();
        match self.begin(id, descriptor) {
            Ok(started) => self.run(started, descriptor).await,
            Err(error) => self.reject(descriptor, error),
        }
    }

    /// The outcome of a request that could not be started.
    pub(crate) fn reject(&self, descriptor: &RequestDescriptor, error: NetworkingError) -> RawOutcome {
        self.report(descriptor, None, &HeaderMap::new(), None, &error);
        RawOutcome::failure(None, error)
    }

    /// Drive a started request, racing it against cancellation.
    pub(crate) async fn run(&self, started: Started, descriptor: &RequestDescriptor) -> RawOutcome {
        let Started { id, url, cancelled } = started;

        let outcome = tokio::select! {
            outcome = self.resolve(descriptor, &url) => outcome,
            Ok(()) = cancelled => {
                let error = NetworkingError::cancelled();
                self.report(descriptor, Some(&url), &HeaderMap::new(), None, &error);
                RawOutcome::failure(Some(url.clone()), error)
            }
        };

        self.in_flight.remove(id);
        outcome
    }

    async fn resolve(&self, descriptor: &RequestDescriptor, url: &Url) -> RawOutcome {
        if let Some(fake) = self.fakes.find(descriptor.method, &descriptor.path) {
            return self.serve_fake(descriptor, url, fake).await;
        }

        if let Some(payload) = self.read_cache(descriptor) {
            tracing::debug!(target: targets::DISPATCH, %url, "served from cache");
            return RawOutcome {
                response: Response {
                    body: Some(payload),
                    status_code: 200,
                    headers: HeaderMap::new(),
                    url: Some(url.clone()),
                },
                error: None,
            };
        }

        self.send(descriptor, url).await
    }

    async fn serve_fake(
        &self,
        descriptor: &RequestDescriptor,
        url: &Url,
        fake: FakeMatch,
    ) -> RawOutcome {
        let FakeMatch {
            payload,
            status_code,
            headers,
            delay,
        } = fake;

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        tracing::debug!(
            target: targets::DISPATCH,
            method = %descriptor.method,
            %url,
            status_code,
            "served fake"
        );

        if is_unauthorized(status_code) {
            self.notify_unauthorized();
        }

        let error = if StatusCodeCategory::classify(status_code).is_success() {
            self.write_cache(descriptor, payload.clone());
            None
        } else {
            let body = match &payload {
                Some(Payload::Bytes(bytes)) => &bytes[..],
                _ => &[][..],
            };
            let error = NetworkingError::from_status(status_code, Some(body));
            self.report(
                descriptor,
                Some(url),
                &HeaderMap::new(),
                Some((status_code, body)),
                &error,
            );
            Some(error)
        };

        RawOutcome {
            response: Response {
                body: payload,
                status_code,
                headers,
                url: Some(url.clone()),
            },
            error,
        }
    }

    async fn send(&self, descriptor: &RequestDescriptor, url: &Url) -> RawOutcome {
        let headers = match self.request_headers(descriptor) {
            Ok(headers) => headers,
            Err(error) => {
                self.report(descriptor, Some(url), &HeaderMap::new(), None, &error);
                return RawOutcome::failure(Some(url.clone()), error);
            }
        };

        let mut wire_url = url.clone();
        let body = match descriptor.encode_body(&mut wire_url, &self.boundary) {
            Ok(body) => body,
            Err(error) => {
                self.report(descriptor, Some(url), &headers, None, &error);
                return RawOutcome::failure(Some(url.clone()), error);
            }
        };

        let request = WireRequest {
            method: descriptor.method,
            url: wire_url.clone(),
            headers: headers.clone(),
            body,
        };

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(error) => {
                self.report(descriptor, Some(&wire_url), &headers, None, &error);
                return RawOutcome::failure(Some(wire_url), error);
            }
        };

        let status_code = response.status_code;
        if is_unauthorized(status_code) {
            self.notify_unauthorized();
        }

        let payload = network_payload(descriptor.response_type, response.body.clone());
        let error = if StatusCodeCategory::classify(status_code).is_success() {
            match (&payload, descriptor.response_type) {
                (Payload::Image(image), _) => {
                    self.write_cache_image(descriptor, response.body.clone(), Arc::clone(image));
                }
                // Undecodable image bytes never reach the cache.
                (Payload::Bytes(_), ResponseType::Image) => {}
                (Payload::Bytes(_), _) => self.write_cache(descriptor, Some(payload.clone())),
            }
            None
        } else {
            let error = NetworkingError::from_status(status_code, Some(&response.body[..]));
            self.report(
                descriptor,
                Some(&wire_url),
                &headers,
                Some((status_code, &response.body[..])),
                &error,
            );
            Some(error)
        };

        RawOutcome {
            response: Response {
                body: Some(payload),
                status_code,
                headers: response.headers,
                url: Some(wire_url),
            },
            error,
        }
    }

    fn request_headers(&self, descriptor: &RequestDescriptor) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(content_type) = descriptor.encoding.content_type(&self.boundary) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(&content_type)?);
        }
        if let Some(accept) = descriptor.response_type.accept() {
            headers.insert(ACCEPT, HeaderValue::from_static(accept));
        }

        let auth = self.auth.read().clone();
        if let Some(value) = auth.header_value {
            let name = HeaderName::from_bytes(auth.header_key.as_bytes())?;
            headers.insert(name, HeaderValue::from_str(&value)?);
        } else if let Some(token) = auth.token {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        }

        for (name, value) in &auth.header_fields {
            headers.insert(name.clone(), value.clone());
        }

        Ok(headers)
    }

    fn cache_key(&self, descriptor: &RequestDescriptor) -> Option<String> {
        if !descriptor.is_cacheable() {
            return None;
        }
        match destination_key(&self.base_url, &descriptor.path, descriptor.cache_name.as_deref()) {
            Ok(key) => Some(key),
            Err(error) => {
                tracing::warn!(target: targets::CACHE, path = %descriptor.path, %error, "no cache key");
                None
            }
        }
    }

    fn read_cache(&self, descriptor: &RequestDescriptor) -> Option<Payload> {
        let key = self.cache_key(descriptor)?;
        self.cache
            .read(&key, descriptor.caching_level, descriptor.response_type)
    }

    /// Write through, or purge when the level is none or there is no body.
    fn write_cache(&self, descriptor: &RequestDescriptor, payload: Option<Payload>) {
        let Some(key) = self.cache_key(descriptor) else {
            return;
        };
        let payload = payload.unwrap_or(Payload::Bytes(Bytes::new()));
        if let Err(error) = self.cache.write(
            &key,
            payload,
            descriptor.caching_level,
            descriptor.response_type,
        ) {
            tracing::warn!(target: targets::CACHE, %key, %error, "cache write failed");
        }
    }

    /// Cache a downloaded image under its received bytes.
    fn write_cache_image(
        &self,
        descriptor: &RequestDescriptor,
        source: Bytes,
        image: Arc<DynamicImage>,
    ) {
        let Some(key) = self.cache_key(descriptor) else {
            return;
        };
        if let Err(error) = self
            .cache
            .write_image(&key, source, image, descriptor.caching_level)
        {
            tracing::warn!(target: targets::CACHE, %key, %error, "cache write failed");
        }
    }

    fn notify_unauthorized(&self) {
        let callback = self.unauthorized.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn report(
        &self,
        descriptor: &RequestDescriptor,
        url: Option<&Url>,
        request_headers: &HeaderMap,
        response: Option<(i32, &[u8])>,
        error: &NetworkingError,
    ) {
        if !self.config.error_logging_enabled {
            return;
        }
        let url = url.map(Url::as_str).unwrap_or(descriptor.path.as_str());
        logging::log_request_error(RequestErrorReport {
            method: descriptor.method,
            url,
            encoding: &descriptor.encoding,
            parameters: descriptor.parameters.as_ref(),
            request_headers,
            status_code: response.map(|(status_code, _)| status_code),
            body: response.map(|(_, body)| body),
            error,
        });
    }
}

/// Image responses are decoded once, so the cache and the result share them.
fn network_payload(response_type: ResponseType, body: Bytes) -> Payload {
    match response_type {
        ResponseType::Image => match decode_image(&body) {
            Some(image) => Payload::Image(image),
            None => Payload::Bytes(body),
        },
        _ => Payload::Bytes(body),
    }
}

fn is_unauthorized(status_code: i32) -> bool {
    status_code == 401 || status_code == 403
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("base_url", &self.base_url)
            .field("transport", &self.transport)
            .field("cache_root", &self.cache.root())
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}
