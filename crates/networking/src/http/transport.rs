//! The transport seam and the table of in-flight requests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::HeaderMap;
use parking_lot::Mutex;
use reqwest::redirect::Policy;
use tokio::sync::oneshot;
use url::Url;

use super::client::NetworkingConfig;
use super::request::{HttpMethod, SessionTaskType};
use crate::error::{NetworkingError, Result};
use crate::logging::targets;

/// A fully built request, ready for the wire.
#[derive(Clone, Debug)]
pub struct WireRequest {
    /// The HTTP method.
    pub method: HttpMethod,
    /// The absolute URL, including any form-encoded query.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<Bytes>,
}

/// What came back from the wire.
#[derive(Clone, Debug)]
pub struct WireResponse {
    /// HTTP status code.
    pub status_code: i32,
    /// Response headers.
    pub headers: HeaderMap,
    /// The complete response body.
    pub body: Bytes,
}

/// Sends a [`WireRequest`] and returns the complete response.
///
/// Implementations only move bytes; status classification, caching and
/// faking happen above this seam.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Perform the request.
    fn send(&self, request: WireRequest) -> BoxFuture<'static, Result<WireResponse>>;
}

/// The default transport, backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport from the client configuration.
    pub fn from_config(config: &NetworkingConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        // Timeout configuration
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        // Redirect policy
        if config.follow_redirects {
            builder = builder.redirect(Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(Policy::none());
        }

        if config.cookies_enabled {
            builder = builder.cookie_store(true);
        }

        if let Some(ref user_agent) = config.user_agent {
            builder = builder.user_agent(user_agent);
        }

        if let Some(ref proxy_url) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|err| NetworkingError::InvalidUrl(format!("proxy {proxy_url}: {err}")))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: WireRequest) -> BoxFuture<'static, Result<WireResponse>> {
        let WireRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let mut builder = self
            .client
            .request(method.to_reqwest(), url.clone())
            .headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        Box::pin(async move {
            tracing::trace!(target: targets::TRANSPORT, %method, %url, "sending");
            let response = builder.send().await?;
            let status_code = i32::from(response.status().as_u16());
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            tracing::trace!(target: targets::TRANSPORT, status_code, bytes = body.len(), "received");
            Ok(WireResponse {
                status_code,
                headers,
                body,
            })
        })
    }
}

/// Unique identifier for a dispatched request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// The raw numeric ID.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

struct InFlight {
    id: RequestId,
    task_type: SessionTaskType,
    method: HttpMethod,
    url: String,
    cancel: oneshot::Sender<()>,
}

/// Requests currently being dispatched, in start order.
#[derive(Default)]
pub(crate) struct InFlightTable {
    next_id: AtomicU64,
    entries: Mutex<Vec<InFlight>>,
}

impl InFlightTable {
    pub(crate) fn next_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Track a request; the receiver resolves when it is cancelled.
    pub(crate) fn register(
        &self,
        id: RequestId,
        task_type: SessionTaskType,
        method: HttpMethod,
        url: &Url,
    ) -> oneshot::Receiver<()> {
        let (cancel, cancelled) = oneshot::channel();
        self.entries.lock().push(InFlight {
            id,
            task_type,
            method,
            url: url.to_string(),
            cancel,
        });
        cancelled
    }

    pub(crate) fn remove(&self, id: RequestId) {
        self.entries.lock().retain(|entry| entry.id != id);
    }

    /// Cancel the oldest request matching the triple. Returns whether one
    /// was found.
    pub(crate) fn cancel_matching(
        &self,
        task_type: SessionTaskType,
        method: HttpMethod,
        url: &Url,
    ) -> bool {
        let url = url.as_str();
        let mut entries = self.entries.lock();
        let Some(index) = entries.iter().position(|entry| {
            entry.task_type == task_type && entry.method == method && entry.url == url
        }) else {
            return false;
        };
        let entry = entries.remove(index);
        // The receiver is gone when the response already arrived.
        let _ = entry.cancel.send(());
        true
    }

    pub(crate) fn cancel(&self, id: RequestId) -> bool {
        let mut entries = self.entries.lock();
        let Some(index) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        let _ = entries.remove(index).cancel.send(());
        true
    }

    pub(crate) fn cancel_all(&self) -> usize {
        let entries = std::mem::take(&mut *self.entries.lock());
        let count = entries.len();
        for entry in entries {
            let _ = entry.cancel.send(());
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl fmt::Debug for InFlightTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightTable")
            .field("in_flight", &self.len())
            .finish()
    }
}
