//! HTTP convenience client with request faking and a two-tier cache.
//!
//! This crate wraps an HTTP transport with the pieces apps keep rebuilding:
//!
//! - **JSON, image and data requests** with typed success/failure results
//! - **Fakes**: canned responses per method and path, including `{name}`
//!   templates whose values are echoed into the response body
//! - **Caching**: an in-memory map mirrored to files in a dedicated cache
//!   namespace directory
//! - **Error classification**: status codes mapped onto a closed category set
//!   and a small error taxonomy
//!
//! # Requests
//!
//! ```ignore
//! use networking::Networking;
//!
//! let networking = Networking::new("https://api.example.com")?;
//! networking.set_authorization_token("secret");
//!
//! let result = networking.post("/users", serde_json::json!({"name": "John"})).await;
//! match result {
//!     networking::JsonResult::Success(response) => println!("{:?}", response.body.dictionary()),
//!     networking::JsonResult::Failure { error, .. } => println!("{error}"),
//! }
//! ```
//!
//! # Synchronous callers
//!
//! ```ignore
//! use networking::runtime::{block_on_timeout, DEFAULT_WAIT};
//!
//! let result = block_on_timeout(networking.get("/get"), DEFAULT_WAIT)?;
//! ```
//!
//! # Logging
//!
//! Events are emitted through `tracing` under the targets in
//! [`logging::targets`].

mod error;
pub mod http;
pub mod logging;
pub mod runtime;

pub use error::{
    CANCELLED_CODE, CANNOT_CONNECT_CODE, MALFORMED_CODE, NetworkingError, Result,
    StatusCodeCategory, TIMED_OUT_CODE, UNKNOWN_CODE, reason_phrase,
};

// Re-export commonly used types at the crate root
pub use crate::http::{
    CachingLevel, DataResult, FakeResponse, FormDataPart, FormPartType, HttpMethod, ImageResult,
    JsonBody, JsonResult, Networking, NetworkingBuilder, NetworkingConfig, ParameterEncoding,
    RequestDescriptor, RequestHandle, RequestId, ResponseType, SessionTaskType, Transport,
};
