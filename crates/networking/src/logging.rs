//! Logging facilities for the networking client.
//!
//! The crate logs through the `tracing` crate and never installs a
//! subscriber itself. To see logs, install one in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("networking=debug")
//!     .init();
//! ```

use http::HeaderMap;

use crate::error::NetworkingError;
use crate::http::{HttpMethod, ParameterEncoding};

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Request dispatch target.
    pub const DISPATCH: &str = "networking::dispatch";
    /// Two-tier cache target.
    pub const CACHE: &str = "networking::cache";
    /// Fake registry target.
    pub const FAKE: &str = "networking::fake";
    /// Transport target.
    pub const TRANSPORT: &str = "networking::transport";
}

/// Maximum number of body bytes included in an error event.
const BODY_PREVIEW_LIMIT: usize = 1024;

/// What gets reported about a failed request.
pub(crate) struct RequestErrorReport<'a> {
    pub method: HttpMethod,
    pub url: &'a str,
    pub encoding: &'a ParameterEncoding,
    pub parameters: Option<&'a serde_json::Value>,
    pub request_headers: &'a HeaderMap,
    pub status_code: Option<i32>,
    pub body: Option<&'a [u8]>,
    pub error: &'a NetworkingError,
}

/// Emit a single event describing a failed request.
///
/// Cancellations are reported at `debug` level only.
pub(crate) fn log_request_error(report: RequestErrorReport<'_>) {
    if report.error.is_cancelled() {
        tracing::debug!(
            target: targets::DISPATCH,
            method = %report.method,
            url = report.url,
            "cancelled request"
        );
        return;
    }

    let parameters = report
        .parameters
        .map(|parameters| format_parameters(report.encoding, parameters));
    let body = report.body.map(body_preview);

    tracing::warn!(
        target: targets::DISPATCH,
        method = %report.method,
        url = report.url,
        status_code = ?report.status_code,
        headers = ?report.request_headers,
        parameters = ?parameters,
        body = ?body,
        error = %report.error,
        "request failed"
    );
}

fn format_parameters(encoding: &ParameterEncoding, parameters: &serde_json::Value) -> String {
    match encoding {
        ParameterEncoding::FormUrlEncoded => crate::http::form::url_encode(parameters),
        _ => serde_json::to_string_pretty(parameters)
            .unwrap_or_else(|err| format!("<unprintable parameters: {err}>")),
    }
}

fn body_preview(body: &[u8]) -> String {
    let end = body.len().min(BODY_PREVIEW_LIMIT);
    let mut preview = String::from_utf8_lossy(&body[..end]).into_owned();
    if body.len() > BODY_PREVIEW_LIMIT {
        preview.push_str("...");
    }
    preview
}
