//! Error types and status code classification.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Transport-level code used when a request is cancelled.
pub const CANCELLED_CODE: i32 = -999;
/// Transport-level code used when a request times out.
pub const TIMED_OUT_CODE: i32 = -1001;
/// Transport-level code used when the host cannot be reached.
pub const CANNOT_CONNECT_CODE: i32 = -1004;
/// Code used when a body is missing or cannot be decoded.
pub const MALFORMED_CODE: i32 = -1017;
/// Code used for transport failures with no better classification.
pub const UNKNOWN_CODE: i32 = -1;

/// Closed classification of HTTP status codes and transport codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCodeCategory {
    /// 100–199.
    Informational,
    /// 200–299.
    Successful,
    /// 300–399.
    Redirection,
    /// 400–499.
    ClientError,
    /// 500–599.
    ServerError,
    /// The request was cancelled before a response arrived.
    Cancelled,
    /// Everything else, including negative transport codes.
    Unknown,
}

impl StatusCodeCategory {
    /// Categorize a status code.
    pub fn classify(code: i32) -> Self {
        match code {
            CANCELLED_CODE => Self::Cancelled,
            100..=199 => Self::Informational,
            200..=299 => Self::Successful,
            300..=399 => Self::Redirection,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Whether a response in this category can produce a success result.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Informational | Self::Successful)
    }
}

impl fmt::Display for StatusCodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Informational => "informational",
            Self::Successful => "successful",
            Self::Redirection => "redirection",
            Self::ClientError => "client error",
            Self::ServerError => "server error",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// The standard reason phrase for a status code.
pub fn reason_phrase(code: i32) -> &'static str {
    u16::try_from(code)
        .ok()
        .and_then(|code| http::StatusCode::from_u16(code).ok())
        .and_then(|status| status.canonical_reason())
        .unwrap_or(match StatusCodeCategory::classify(code) {
            StatusCodeCategory::Informational => "Informational",
            StatusCodeCategory::Successful => "Success",
            StatusCodeCategory::Redirection => "Redirected",
            StatusCodeCategory::ClientError => "Client error",
            StatusCodeCategory::ServerError => "Server error",
            StatusCodeCategory::Cancelled => "Cancelled",
            StatusCodeCategory::Unknown => "Unknown",
        })
}

/// Errors surfaced by the networking client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkingError {
    /// The path could not be composed into a URL.
    #[error("We're sorry, but the URL for this request is invalid: {0}")]
    InvalidUrl(String),

    /// The transport returned no parseable HTTP response.
    #[error("We're sorry, but we received an invalid response from the server.")]
    InvalidResponse,

    /// A 4xx response.
    #[error("We're sorry, but a client error occurred. Code: {status_code}, {message}.")]
    ClientError {
        /// The HTTP status code.
        status_code: i32,
        /// Message from the error body, or the reason phrase.
        message: String,
    },

    /// A 5xx response.
    #[error("We're sorry, but a server error occurred. Code: {status_code} {message}.{}", format_details(.details))]
    ServerError {
        /// The HTTP status code.
        status_code: i32,
        /// Message from the error body, or the reason phrase.
        message: String,
        /// Structured error body, when the server sent one.
        details: Option<Map<String, Value>>,
    },

    /// Serialization, decode, cancellation and transport failures.
    #[error("We're sorry, but an unexpected error occurred. {}{message}", format_code(.status_code))]
    UnexpectedError {
        /// Status or transport code, when one applies.
        status_code: Option<i32>,
        /// Human readable description.
        message: String,
    },
}

fn format_details(details: &Option<Map<String, Value>>) -> String {
    match details {
        Some(details) if !details.is_empty() => {
            let joined = details
                .iter()
                .map(|(key, value)| format!("{key}: {value}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(" Additional info: {joined}")
        }
        _ => String::new(),
    }
}

fn format_code(code: &Option<i32>) -> String {
    code.map(|code| format!("Code: {code}. ")).unwrap_or_default()
}

impl NetworkingError {
    /// Build the error for a non-success HTTP status.
    ///
    /// The message comes from a structured error body when `body` holds one,
    /// otherwise from the standard reason phrase.
    pub fn from_status(status_code: i32, body: Option<&[u8]>) -> Self {
        let parsed = body
            .filter(|body| !body.is_empty())
            .and_then(|body| serde_json::from_slice::<ErrorBody>(body).ok())
            .filter(|parsed| !parsed.combined_message().is_empty());

        let message = parsed
            .as_ref()
            .map(ErrorBody::combined_message)
            .unwrap_or_else(|| reason_phrase(status_code).to_string());

        match StatusCodeCategory::classify(status_code) {
            StatusCodeCategory::ClientError => Self::ClientError {
                status_code,
                message,
            },
            StatusCodeCategory::ServerError => Self::ServerError {
                status_code,
                message,
                details: parsed.map(ErrorBody::into_details),
            },
            _ => Self::UnexpectedError {
                status_code: Some(status_code),
                message,
            },
        }
    }

    /// The error produced for a cancelled request.
    pub fn cancelled() -> Self {
        Self::UnexpectedError {
            status_code: Some(CANCELLED_CODE),
            message: "Request was cancelled".to_string(),
        }
    }

    /// The error produced for a missing or undecodable body.
    pub fn malformed(what: &str) -> Self {
        Self::UnexpectedError {
            status_code: Some(MALFORMED_CODE),
            message: format!("Malformed {what}"),
        }
    }

    /// The numeric code carried by this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidUrl(_) | Self::InvalidResponse => UNKNOWN_CODE,
            Self::ClientError { status_code, .. } | Self::ServerError { status_code, .. } => {
                *status_code
            }
            Self::UnexpectedError { status_code, .. } => status_code.unwrap_or(UNKNOWN_CODE),
        }
    }

    /// The category of [`code`](Self::code).
    pub fn category(&self) -> StatusCodeCategory {
        StatusCodeCategory::classify(self.code())
    }

    /// Whether this error represents a cancelled request.
    pub fn is_cancelled(&self) -> bool {
        self.code() == CANCELLED_CODE
    }
}

impl From<url::ParseError> for NetworkingError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for NetworkingError {
    fn from(err: serde_json::Error) -> Self {
        Self::UnexpectedError {
            status_code: None,
            message: format!("JSON error: {err}"),
        }
    }
}

impl From<std::io::Error> for NetworkingError {
    fn from(err: std::io::Error) -> Self {
        Self::UnexpectedError {
            status_code: None,
            message: format!("I/O error: {err}"),
        }
    }
}

impl From<reqwest::Error> for NetworkingError {
    fn from(err: reqwest::Error) -> Self {
        let status_code = if err.is_timeout() {
            TIMED_OUT_CODE
        } else if err.is_connect() {
            CANNOT_CONNECT_CODE
        } else {
            UNKNOWN_CODE
        };
        Self::UnexpectedError {
            status_code: Some(status_code),
            message: err.to_string(),
        }
    }
}

impl From<http::header::InvalidHeaderName> for NetworkingError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::UnexpectedError {
            status_code: None,
            message: format!("Invalid header: {err}"),
        }
    }
}

impl From<http::header::InvalidHeaderValue> for NetworkingError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::UnexpectedError {
            status_code: None,
            message: format!("Invalid header: {err}"),
        }
    }
}

/// A specialized Result type for networking operations.
pub type Result<T> = std::result::Result<T, NetworkingError>;

/// Structured error body sent by APIs, e.g.
/// `{"errors": {"start_time": ["Start time can't be blank"]}}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    errors: Option<Map<String, Value>>,
}

impl ErrorBody {
    fn combined_message(&self) -> String {
        let mut messages = Vec::new();
        if let Some(error) = &self.error {
            messages.push(error.clone());
        }
        if let Some(message) = &self.message {
            messages.push(message.clone());
        }
        if let Some(errors) = &self.errors {
            for value in errors.values() {
                match value {
                    Value::Array(items) => {
                        let joined = items
                            .iter()
                            .map(|item| match item {
                                Value::String(text) => text.clone(),
                                other => other.to_string(),
                            })
                            .collect::<Vec<_>>()
                            .join(", ");
                        messages.push(joined);
                    }
                    Value::String(text) => messages.push(text.clone()),
                    other => messages.push(other.to_string()),
                }
            }
        }
        messages.join("; ")
    }

    fn into_details(self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert(
            "error".to_string(),
            Value::String(self.error.unwrap_or_default()),
        );
        details.insert(
            "message".to_string(),
            Value::String(self.message.unwrap_or_default()),
        );
        details.insert(
            "errors".to_string(),
            Value::Object(self.errors.unwrap_or_default()),
        );
        details
    }
}
