//! The public networking client.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::HeaderMap;
use image::DynamicImage;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use url::Url;

use super::cache::{CACHE_NAMESPACE, TwoTierCache, default_cache_root, remove_namespace};
use super::dispatch::{AuthState, Dispatcher};
use super::fake::{FakeRegistry, FakeResponse};
use super::form::{FormDataPart, generate_boundary};
use super::request::{
    CachingLevel, HttpMethod, ParameterEncoding, RequestDescriptor, ResponseType, SessionTaskType,
};
use super::result::{DataResult, ImageResult, JsonResult, Payload, RawOutcome};
use super::transport::{ReqwestTransport, RequestId, Transport};
use super::url::{compose_url, destination_key, destination_path, split_base_and_relative};
use crate::error::{NetworkingError, Result};
use crate::runtime;

/// Configuration for a [`Networking`] client.
#[derive(Clone, Debug)]
pub struct NetworkingConfig {
    /// Request timeout (None for no timeout).
    pub timeout: Option<Duration>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Whether to follow redirects.
    pub follow_redirects: bool,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
    /// Whether to store cookies between requests.
    pub cookies_enabled: bool,
    /// User agent string.
    pub user_agent: Option<String>,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Whether failed requests are logged.
    pub error_logging_enabled: bool,
    /// Parent directory of the cache namespace. Defaults to the platform
    /// cache directory.
    pub cache_directory: Option<PathBuf>,
    /// Directory holding JSON fixtures for file based fakes.
    pub fixtures_directory: Option<PathBuf>,
}

impl Default for NetworkingConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            follow_redirects: true,
            max_redirects: 10,
            cookies_enabled: true,
            user_agent: Some(format!("Networking/{} (Rust)", env!("CARGO_PKG_VERSION"))),
            proxy: None,
            error_logging_enabled: true,
            cache_directory: None,
            fixtures_directory: None,
        }
    }
}

impl NetworkingConfig {
    /// The cache namespace directory this configuration resolves to.
    pub fn cache_root(&self) -> PathBuf {
        match &self.cache_directory {
            Some(directory) => directory.join(CACHE_NAMESPACE),
            None => default_cache_root(),
        }
    }
}

/// Builder for [`Networking`].
pub struct NetworkingBuilder {
    base_url: String,
    config: NetworkingConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl NetworkingBuilder {
    /// Create a builder for a client rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            config: NetworkingConfig::default(),
            transport: None,
        }
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Disable the request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Disable following redirects.
    pub fn no_redirects(mut self) -> Self {
        self.config.follow_redirects = false;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Disable the cookie store.
    pub fn no_cookies(mut self) -> Self {
        self.config.cookies_enabled = false;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Route every request through a proxy.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy_url.into());
        self
    }

    /// Turn failed request logging on or off.
    pub fn error_logging(mut self, enabled: bool) -> Self {
        self.config.error_logging_enabled = enabled;
        self
    }

    /// Keep the cache namespace under `directory` instead of the platform
    /// cache directory.
    pub fn cache_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.cache_directory = Some(directory.into());
        self
    }

    /// Load JSON fixtures for file based fakes from `directory`.
    pub fn fixtures_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.fixtures_directory = Some(directory.into());
        self
    }

    /// Send requests through `transport` instead of the default one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Networking> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|err| NetworkingError::InvalidUrl(format!("{base_url}: {err}")))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::from_config(&self.config)?),
        };
        let cache = TwoTierCache::new(self.config.cache_root());

        Ok(Networking {
            inner: Arc::new(Dispatcher {
                base_url,
                config: self.config,
                transport,
                fakes: FakeRegistry::new(),
                cache,
                in_flight: Default::default(),
                auth: RwLock::new(AuthState::default()),
                unauthorized: RwLock::new(None),
                boundary: generate_boundary(),
            }),
        })
    }
}

/// A networking client rooted at a base URL.
///
/// Requests are served, in order of preference, from registered fakes, from
/// the two-tier cache, or from the network. The client is cheap to clone;
/// clones share fakes, cache, authorization and in-flight requests.
///
/// # Example
///
/// ```ignore
/// use networking::http::{FakeResponse, Networking};
///
/// let networking = Networking::new("http://httpbin.org")?;
/// networking.fake_get("/get", FakeResponse::json(serde_json::json!({"url": "http://x/get"})));
///
/// let result = networking.get("/get").await;
/// assert!(result.is_success());
/// ```
#[derive(Clone)]
pub struct Networking {
    inner: Arc<Dispatcher>,
}

impl Networking {
    /// Create a client with the default configuration.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        NetworkingBuilder::new(base_url).build()
    }

    /// Create a builder.
    pub fn builder(base_url: impl Into<String>) -> NetworkingBuilder {
        NetworkingBuilder::new(base_url)
    }

    /// The base URL, without a trailing `/`.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// The client configuration.
    pub fn config(&self) -> &NetworkingConfig {
        &self.inner.config
    }

    /// The multipart boundary used for every upload from this client.
    pub fn boundary(&self) -> &str {
        &self.inner.boundary
    }

    // Authorization

    /// Authenticate with HTTP Basic credentials.
    pub fn set_authorization_basic(&self, username: &str, password: &str) {
        let credentials = STANDARD.encode(format!("{username}:{password}"));
        self.set_authorization_header_value(format!("Basic {credentials}"));
    }

    /// Authenticate with a Bearer token.
    pub fn set_authorization_token(&self, token: impl Into<String>) {
        self.inner.auth.write().token = Some(token.into());
    }

    /// Send `value` in the `Authorization` header. Takes precedence over a
    /// Bearer token.
    pub fn set_authorization_header_value(&self, value: impl Into<String>) {
        self.set_authorization_header(http::header::AUTHORIZATION.as_str(), value);
    }

    /// Send `value` in the `key` header instead of `Authorization`.
    pub fn set_authorization_header(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut auth = self.inner.auth.write();
        auth.header_key = key.into();
        auth.header_value = Some(value.into());
    }

    /// Add `headers` to every network request.
    pub fn set_header_fields(&self, headers: HeaderMap) {
        self.inner.auth.write().header_fields = headers;
    }

    /// Clear authorization and custom header fields.
    pub fn reset(&self) {
        *self.inner.auth.write() = AuthState::default();
    }

    /// Call `callback` whenever a response has status 401 or 403. The request
    /// still resolves with its failure result.
    pub fn set_unauthorized_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.inner.unauthorized.write() = Some(Arc::new(callback));
    }

    /// Remove the unauthorized callback.
    pub fn clear_unauthorized_callback(&self) {
        *self.inner.unauthorized.write() = None;
    }

    // Requests

    /// Perform a JSON request.
    pub async fn request(&self, descriptor: RequestDescriptor) -> JsonResult {
        self.inner.execute(&descriptor).await.into()
    }

    /// GET `path`.
    pub async fn get(&self, path: &str) -> JsonResult {
        self.request(RequestDescriptor::new(HttpMethod::Get, path)).await
    }

    /// GET `path` with form encoded query parameters.
    pub async fn get_with_parameters(&self, path: &str, parameters: Value) -> JsonResult {
        self.request(
            RequestDescriptor::new(HttpMethod::Get, path)
                .parameters(parameters, ParameterEncoding::FormUrlEncoded),
        )
        .await
    }

    /// POST `parameters` as JSON.
    pub async fn post(&self, path: &str, parameters: Value) -> JsonResult {
        self.post_with_encoding(path, parameters, ParameterEncoding::Json)
            .await
    }

    /// POST `parameters` with the given encoding.
    pub async fn post_with_encoding(
        &self,
        path: &str,
        parameters: Value,
        encoding: ParameterEncoding,
    ) -> JsonResult {
        self.request(RequestDescriptor::new(HttpMethod::Post, path).parameters(parameters, encoding))
            .await
    }

    /// POST a multipart form made of `parameters` and `parts`.
    pub async fn post_multipart(
        &self,
        path: &str,
        parameters: Option<Value>,
        parts: Vec<FormDataPart>,
    ) -> JsonResult {
        let mut descriptor = RequestDescriptor::new(HttpMethod::Post, path).parts(parts);
        descriptor.parameters = parameters;
        self.request(descriptor).await
    }

    /// PUT `parameters` as JSON.
    pub async fn put(&self, path: &str, parameters: Value) -> JsonResult {
        self.put_with_encoding(path, parameters, ParameterEncoding::Json)
            .await
    }

    /// PUT `parameters` with the given encoding.
    pub async fn put_with_encoding(
        &self,
        path: &str,
        parameters: Value,
        encoding: ParameterEncoding,
    ) -> JsonResult {
        self.request(RequestDescriptor::new(HttpMethod::Put, path).parameters(parameters, encoding))
            .await
    }

    /// PATCH `parameters` as JSON.
    pub async fn patch(&self, path: &str, parameters: Value) -> JsonResult {
        self.patch_with_encoding(path, parameters, ParameterEncoding::Json)
            .await
    }

    /// PATCH `parameters` with the given encoding.
    pub async fn patch_with_encoding(
        &self,
        path: &str,
        parameters: Value,
        encoding: ParameterEncoding,
    ) -> JsonResult {
        self.request(
            RequestDescriptor::new(HttpMethod::Patch, path).parameters(parameters, encoding),
        )
        .await
    }

    /// DELETE `path`.
    pub async fn delete(&self, path: &str) -> JsonResult {
        self.request(RequestDescriptor::new(HttpMethod::Delete, path))
            .await
    }

    /// DELETE `path` with form encoded query parameters.
    pub async fn delete_with_parameters(&self, path: &str, parameters: Value) -> JsonResult {
        self.request(
            RequestDescriptor::new(HttpMethod::Delete, path)
                .parameters(parameters, ParameterEncoding::FormUrlEncoded),
        )
        .await
    }

    /// GET `path` and deserialize the body into `T`.
    pub async fn get_decoded<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(self.get(path).await)
    }

    /// POST `parameters` as JSON and deserialize the body into `T`.
    pub async fn post_decoded<T: DeserializeOwned>(
        &self,
        path: &str,
        parameters: Value,
    ) -> Result<T> {
        decode(self.post(path, parameters).await)
    }

    /// Download an image.
    pub async fn download_image(
        &self,
        path: &str,
        cache_name: Option<&str>,
        caching_level: CachingLevel,
    ) -> ImageResult {
        let descriptor = download_descriptor(path, ResponseType::Image, cache_name, caching_level);
        self.inner.execute(&descriptor).await.into()
    }

    /// Download raw bytes.
    pub async fn download_data(
        &self,
        path: &str,
        cache_name: Option<&str>,
        caching_level: CachingLevel,
    ) -> DataResult {
        let descriptor = download_descriptor(path, ResponseType::Data, cache_name, caching_level);
        self.inner.execute(&descriptor).await.into()
    }

    /// Start a JSON request in the background.
    ///
    /// Must be called from within a tokio runtime or with the global runtime
    /// available (see [`runtime`](crate::runtime)).
    pub fn spawn(&self, descriptor: RequestDescriptor) -> RequestHandle {
        self.spawn_with(descriptor, runtime::spawn)
    }

    fn spawn_with<S>(&self, descriptor: RequestDescriptor, spawn: S) -> RequestHandle
    where
        S: FnOnce(BoxFuture<'static, RawOutcome>) -> Result<JoinHandle<RawOutcome>>,
    {
        let id = self.inner.in_flight.next_id();
        let started = self.inner.begin(id, &descriptor);
        let inner = Arc::clone(&self.inner);
        let task = spawn(Box::pin(async move {
            match started {
                Ok(started) => inner.run(started, &descriptor).await,
                Err(error) => inner.reject(&descriptor, error),
            }
        }));
        if task.is_err() {
            // The request never runs, so nothing else would unregister it.
            self.inner.in_flight.remove(id);
        }

        RequestHandle {
            id,
            inner: Arc::clone(&self.inner),
            task,
        }
    }

    // Cache

    /// The decoded image cached for `path`, without touching the network.
    pub fn image_from_cache(
        &self,
        path: &str,
        cache_name: Option<&str>,
    ) -> Option<Arc<DynamicImage>> {
        self.cached(path, cache_name, ResponseType::Image)
            .and_then(Payload::into_image)
    }

    /// The bytes cached for `path`, without touching the network.
    pub fn data_from_cache(&self, path: &str, cache_name: Option<&str>) -> Option<Bytes> {
        self.cached(path, cache_name, ResponseType::Data)
            .and_then(Payload::into_bytes)
    }

    fn cached(
        &self,
        path: &str,
        cache_name: Option<&str>,
        response_type: ResponseType,
    ) -> Option<Payload> {
        let key = destination_key(&self.inner.base_url, path, cache_name).ok()?;
        self.inner
            .cache
            .read(&key, CachingLevel::MemoryAndFile, response_type)
    }

    /// The file that caches `path`.
    pub fn destination_path(&self, path: &str, cache_name: Option<&str>) -> Result<PathBuf> {
        destination_path(
            self.inner.cache.root(),
            &self.inner.base_url,
            path,
            cache_name,
        )
    }

    /// The absolute URL for `path`.
    pub fn compose_url(&self, path: &str) -> Result<Url> {
        compose_url(&self.inner.base_url, path)
    }

    /// Split a full URL into its base and relative path.
    pub fn split_base_and_relative(full_url: &str) -> Result<(String, String)> {
        split_base_and_relative(full_url)
    }

    /// The client's two-tier cache.
    pub fn cache(&self) -> &TwoTierCache {
        &self.inner.cache
    }

    /// Remove this client's cache namespace and clear its memory tier.
    pub fn purge_cache(&self) -> Result<()> {
        self.inner.cache.purge_all()
    }

    /// Remove the cache namespace under the platform cache directory.
    pub fn delete_cached_files() -> Result<()> {
        remove_namespace(&default_cache_root())
    }

    // Fakes

    /// Serve `response` for requests with `method` to `path`. `path` may be
    /// a template such as `/users/{id}`.
    pub fn fake(&self, method: HttpMethod, path: impl Into<String>, response: FakeResponse) {
        self.inner.fakes.register(method, path, response);
    }

    /// Fake a GET request.
    pub fn fake_get(&self, path: impl Into<String>, response: FakeResponse) {
        self.fake(HttpMethod::Get, path, response);
    }

    /// Fake a POST request.
    pub fn fake_post(&self, path: impl Into<String>, response: FakeResponse) {
        self.fake(HttpMethod::Post, path, response);
    }

    /// Fake a PUT request.
    pub fn fake_put(&self, path: impl Into<String>, response: FakeResponse) {
        self.fake(HttpMethod::Put, path, response);
    }

    /// Fake a PATCH request.
    pub fn fake_patch(&self, path: impl Into<String>, response: FakeResponse) {
        self.fake(HttpMethod::Patch, path, response);
    }

    /// Fake a DELETE request.
    pub fn fake_delete(&self, path: impl Into<String>, response: FakeResponse) {
        self.fake(HttpMethod::Delete, path, response);
    }

    /// Fake a request with a JSON fixture from the fixtures directory.
    /// `.json` is appended to `file_name` when it has no such extension.
    pub fn fake_from_file(
        &self,
        method: HttpMethod,
        path: impl Into<String>,
        file_name: &str,
    ) -> Result<()> {
        let directory = self.inner.config.fixtures_directory.as_deref().ok_or_else(|| {
            NetworkingError::UnexpectedError {
                status_code: None,
                message: "No fixtures directory configured".to_string(),
            }
        })?;
        let value = load_fixture(directory, file_name)?;
        self.fake(method, path, FakeResponse::json(value));
        Ok(())
    }

    /// Fake a GET request with a JSON fixture.
    pub fn fake_get_from_file(&self, path: impl Into<String>, file_name: &str) -> Result<()> {
        self.fake_from_file(HttpMethod::Get, path, file_name)
    }

    /// Fake a POST request with a JSON fixture.
    pub fn fake_post_from_file(&self, path: impl Into<String>, file_name: &str) -> Result<()> {
        self.fake_from_file(HttpMethod::Post, path, file_name)
    }

    /// Fake a PUT request with a JSON fixture.
    pub fn fake_put_from_file(&self, path: impl Into<String>, file_name: &str) -> Result<()> {
        self.fake_from_file(HttpMethod::Put, path, file_name)
    }

    /// Fake a PATCH request with a JSON fixture.
    pub fn fake_patch_from_file(&self, path: impl Into<String>, file_name: &str) -> Result<()> {
        self.fake_from_file(HttpMethod::Patch, path, file_name)
    }

    /// Fake a DELETE request with a JSON fixture.
    pub fn fake_delete_from_file(&self, path: impl Into<String>, file_name: &str) -> Result<()> {
        self.fake_from_file(HttpMethod::Delete, path, file_name)
    }

    /// Fake an image download.
    pub fn fake_image_download(&self, path: impl Into<String>, image: DynamicImage) {
        self.fake_get(path, FakeResponse::image(image));
    }

    /// Fake a data download.
    pub fn fake_data_download(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.fake_get(path, FakeResponse::data(data));
    }

    /// The client's fake registry.
    pub fn fakes(&self) -> &FakeRegistry {
        &self.inner.fakes
    }

    // Cancellation

    /// Cancel the oldest in-flight request matching the task type, method
    /// and URL of `path`. Returns whether one was cancelled.
    pub fn cancel_request(
        &self,
        task_type: SessionTaskType,
        method: HttpMethod,
        path: &str,
    ) -> bool {
        match self.compose_url(path) {
            Ok(url) => self.inner.in_flight.cancel_matching(task_type, method, &url),
            Err(_) => false,
        }
    }

    /// Cancel an in-flight GET request.
    pub fn cancel_get(&self, path: &str) -> bool {
        self.cancel_request(SessionTaskType::Data, HttpMethod::Get, path)
    }

    /// Cancel an in-flight POST request.
    pub fn cancel_post(&self, path: &str) -> bool {
        self.cancel_request(SessionTaskType::Data, HttpMethod::Post, path)
    }

    /// Cancel an in-flight PUT request.
    pub fn cancel_put(&self, path: &str) -> bool {
        self.cancel_request(SessionTaskType::Data, HttpMethod::Put, path)
    }

    /// Cancel an in-flight PATCH request.
    pub fn cancel_patch(&self, path: &str) -> bool {
        self.cancel_request(SessionTaskType::Data, HttpMethod::Patch, path)
    }

    /// Cancel an in-flight DELETE request.
    pub fn cancel_delete(&self, path: &str) -> bool {
        self.cancel_request(SessionTaskType::Data, HttpMethod::Delete, path)
    }

    /// Cancel an in-flight multipart upload.
    pub fn cancel_upload(&self, path: &str) -> bool {
        self.cancel_request(SessionTaskType::Upload, HttpMethod::Post, path)
    }

    /// Cancel an in-flight image download.
    pub fn cancel_image_download(&self, path: &str) -> bool {
        self.cancel_request(SessionTaskType::Download, HttpMethod::Get, path)
    }

    /// Cancel an in-flight data download.
    pub fn cancel_data_download(&self, path: &str) -> bool {
        self.cancel_request(SessionTaskType::Download, HttpMethod::Get, path)
    }

    /// Cancel a request by ID.
    pub fn cancel(&self, id: RequestId) -> bool {
        self.inner.in_flight.cancel(id)
    }

    /// Cancel every in-flight request. Returns how many were cancelled.
    pub fn cancel_all_requests(&self) -> usize {
        self.inner.in_flight.cancel_all()
    }
}

impl std::fmt::Debug for Networking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Networking")
            .field("inner", &self.inner)
            .finish()
    }
}

/// A handle to a request started with [`Networking::spawn`].
pub struct RequestHandle {
    id: RequestId,
    inner: Arc<Dispatcher>,
    task: Result<JoinHandle<RawOutcome>>,
}

impl RequestHandle {
    /// The request ID.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Cancel the request. Its result becomes a cancelled failure unless it
    /// already completed.
    pub fn cancel(&self) -> bool {
        self.inner.in_flight.cancel(self.id)
    }

    /// Whether the request has completed.
    pub fn is_finished(&self) -> bool {
        match &self.task {
            Ok(task) => task.is_finished(),
            Err(_) => true,
        }
    }

    /// Wait for the result.
    pub async fn result(self) -> JsonResult {
        let outcome = match self.task {
            Ok(task) => task.await.unwrap_or_else(|err| {
                RawOutcome::failure(
                    None,
                    NetworkingError::UnexpectedError {
                        status_code: None,
                        message: format!("Request task failed: {err}"),
                    },
                )
            }),
            Err(error) => RawOutcome::failure(None, error),
        };
        outcome.into()
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn download_descriptor(
    path: &str,
    response_type: ResponseType,
    cache_name: Option<&str>,
    caching_level: CachingLevel,
) -> RequestDescriptor {
    let mut descriptor =
        RequestDescriptor::download(path, response_type).caching_level(caching_level);
    descriptor.cache_name = cache_name.map(str::to_string);
    descriptor
}

fn decode<T: DeserializeOwned>(result: JsonResult) -> Result<T> {
    match result {
        JsonResult::Success(response) => response.body.decode(),
        JsonResult::Failure { error, .. } => Err(error),
    }
}

fn load_fixture(directory: &Path, file_name: &str) -> Result<Value> {
    let mut path = directory.join(file_name);
    if path.extension().is_none_or(|extension| extension != "json") {
        path = directory.join(format!("{file_name}.json"));
    }
    let contents = std::fs::read(&path)?;
    Ok(serde_json::from_slice(&contents)?)
}
