//! HTTP requests with fakes and a two-tier cache.
//!
//! [`Networking`] resolves every request in three steps: a registered fake
//! for the method and path, then the response cache (GET only), then the
//! network. All three produce the same typed results.
//!
//! # Example
//!
//! ```ignore
//! use networking::http::{CachingLevel, FakeResponse, Networking};
//!
//! let networking = Networking::new("https://api.example.com")?;
//!
//! // Fake a templated path; placeholders are echoed into the body.
//! networking.fake_get("/users/{id}", FakeResponse::json(serde_json::json!({"id": "{id}"})));
//! let result = networking.get("/users/42").await;
//! assert_eq!(result.body().dictionary()["id"], "42");
//!
//! // Download an image and keep it in memory and on disk.
//! let image = networking
//!     .download_image("/avatar.png", None, CachingLevel::MemoryAndFile)
//!     .await;
//! ```

mod cache;
mod client;
mod dispatch;
mod fake;
pub(crate) mod form;
mod request;
mod result;
mod transport;
mod url;

pub use cache::{CACHE_NAMESPACE, TwoTierCache, default_cache_root};
pub use client::{Networking, NetworkingBuilder, NetworkingConfig, RequestHandle};
pub use dispatch::UnauthorizedCallback;
pub use fake::{FakeBody, FakeRegistry, FakeResponse};
pub use form::{FormDataPart, FormPartType};
pub use request::{
    CachingLevel, HttpMethod, ParameterEncoding, RequestDescriptor, ResponseType, SessionTaskType,
};
pub use result::{DataResult, ImageResult, JsonBody, JsonResult, Payload, Response};
pub use transport::{ReqwestTransport, RequestId, Transport, WireRequest, WireResponse};
pub use self::url::{compose_url, destination_key, destination_path, split_base_and_relative};
