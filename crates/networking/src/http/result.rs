//! Typed request outcomes.
//!
//! Every request resolves to exactly one of [`JsonResult`], [`DataResult`] or
//! [`ImageResult`]. Each is a success/failure pair over a [`Response`] whose
//! body type depends on the payload kind.

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use image::DynamicImage;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::error::{NetworkingError, Result};

/// A response payload as produced by a fake, the cache or the network.
#[derive(Clone, Debug)]
pub enum Payload {
    /// Raw bytes.
    Bytes(Bytes),
    /// A decoded image.
    Image(Arc<DynamicImage>),
}

impl Payload {
    /// The payload as an image, decoding bytes if needed.
    pub fn into_image(self) -> Option<Arc<DynamicImage>> {
        match self {
            Self::Image(image) => Some(image),
            Self::Bytes(bytes) => decode_image(&bytes),
        }
    }

    /// The payload as bytes; `None` for decoded images.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Image(_) => None,
        }
    }
}

pub(crate) fn decode_image(bytes: &[u8]) -> Option<Arc<DynamicImage>> {
    if bytes.is_empty() {
        return None;
    }
    image::load_from_memory(bytes).ok().map(Arc::new)
}

/// A parsed JSON body that keeps the bytes it was parsed from.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum JsonBody {
    /// No body.
    #[default]
    None,
    /// A JSON object.
    Dictionary {
        /// The parsed object.
        value: Map<String, Value>,
        /// The source bytes.
        data: Bytes,
    },
    /// A JSON array of objects.
    Array {
        /// The parsed objects.
        value: Vec<Map<String, Value>>,
        /// The source bytes.
        data: Bytes,
    },
}

impl JsonBody {
    /// Parse `data`. Empty input is [`JsonBody::None`]; anything other than
    /// an object or an array of objects is a malformed body.
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::None);
        }

        match serde_json::from_slice::<Value>(&data)? {
            Value::Object(value) => Ok(Self::Dictionary { value, data }),
            Value::Array(items) => {
                let value = items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) => Ok(map),
                        _ => Err(NetworkingError::malformed("JSON array element")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Array { value, data })
            }
            _ => Err(NetworkingError::malformed("JSON root")),
        }
    }

    /// The object body, or an empty map.
    pub fn dictionary(&self) -> Map<String, Value> {
        match self {
            Self::Dictionary { value, .. } => value.clone(),
            _ => Map::new(),
        }
    }

    /// The array body, or an empty list.
    pub fn array(&self) -> Vec<Map<String, Value>> {
        match self {
            Self::Array { value, .. } => value.clone(),
            _ => Vec::new(),
        }
    }

    /// The source bytes, empty for [`JsonBody::None`].
    pub fn data(&self) -> Bytes {
        match self {
            Self::None => Bytes::new(),
            Self::Dictionary { data, .. } | Self::Array { data, .. } => data.clone(),
        }
    }

    /// Deserialize the source bytes into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.data())?)
    }
}

/// Response metadata together with a body.
#[derive(Clone, Debug)]
pub struct Response<B> {
    /// The body.
    pub body: B,
    /// HTTP status code, or a transport code.
    pub status_code: i32,
    /// Response headers.
    pub headers: HeaderMap,
    /// The request URL, when one could be composed.
    pub url: Option<Url>,
}

impl<B> Response<B> {
    fn with_body<C>(self, body: C) -> Response<C> {
        Response {
            body,
            status_code: self.status_code,
            headers: self.headers,
            url: self.url,
        }
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// What a dispatch produced before it is typed by response kind.
#[derive(Debug)]
pub(crate) struct RawOutcome {
    pub response: Response<Option<Payload>>,
    pub error: Option<NetworkingError>,
}

impl RawOutcome {
    pub(crate) fn failure(url: Option<Url>, error: NetworkingError) -> Self {
        Self {
            response: Response {
                body: None,
                status_code: error.code(),
                headers: HeaderMap::new(),
                url,
            },
            error: Some(error),
        }
    }
}

macro_rules! result_accessors {
    ($name:ident) => {
        impl $name {
            /// Whether this is a success.
            pub fn is_success(&self) -> bool {
                matches!(self, Self::Success(_))
            }

            /// The status code of the response.
            pub fn status_code(&self) -> i32 {
                match self {
                    Self::Success(response) => response.status_code,
                    Self::Failure { response, .. } => response.status_code,
                }
            }

            /// The response headers.
            pub fn headers(&self) -> &HeaderMap {
                match self {
                    Self::Success(response) => &response.headers,
                    Self::Failure { response, .. } => &response.headers,
                }
            }

            /// The failure error, if any.
            pub fn error(&self) -> Option<&NetworkingError> {
                match self {
                    Self::Success(_) => None,
                    Self::Failure { error, .. } => Some(error),
                }
            }
        }
    };
}

/// Outcome of a JSON request.
#[derive(Clone, Debug)]
pub enum JsonResult {
    /// A 1xx/2xx response with a parseable body.
    Success(Response<JsonBody>),
    /// Anything else. The body holds whatever could be parsed.
    Failure {
        /// The response.
        response: Response<JsonBody>,
        /// Why the request failed.
        error: NetworkingError,
    },
}

impl JsonResult {
    /// Normalize a raw body and optional transport error. A transport error
    /// takes precedence over a parse error.
    pub fn from_parts(
        body: Option<Bytes>,
        response: Response<()>,
        error: Option<NetworkingError>,
    ) -> Self {
        let parsed = JsonBody::parse(body.unwrap_or_default());
        match (parsed, error) {
            (Ok(body), None) => Self::Success(response.with_body(body)),
            (Ok(body), Some(error)) => Self::Failure {
                response: response.with_body(body),
                error,
            },
            (Err(parse_error), error) => Self::Failure {
                response: response.with_body(JsonBody::None),
                error: error.unwrap_or(parse_error),
            },
        }
    }

    /// The JSON body, for both successes and failures.
    pub fn body(&self) -> &JsonBody {
        match self {
            Self::Success(response) => &response.body,
            Self::Failure { response, .. } => &response.body,
        }
    }
}

result_accessors!(JsonResult);

impl From<RawOutcome> for JsonResult {
    fn from(outcome: RawOutcome) -> Self {
        let RawOutcome { response, error } = outcome;
        match response.body.clone() {
            None => Self::from_parts(None, response.with_body(()), error),
            Some(Payload::Bytes(bytes)) => Self::from_parts(Some(bytes), response.with_body(()), error),
            Some(Payload::Image(_)) => Self::Failure {
                response: response.with_body(JsonBody::None),
                error: error.unwrap_or_else(|| NetworkingError::malformed("JSON body")),
            },
        }
    }
}

/// Outcome of a data download.
#[derive(Clone, Debug)]
pub enum DataResult {
    /// The downloaded bytes.
    Success(Response<Bytes>),
    /// A failed download.
    Failure {
        /// The response, with whatever body arrived.
        response: Response<Option<Bytes>>,
        /// Why the request failed.
        error: NetworkingError,
    },
}

impl DataResult {
    /// Normalize a raw body. A missing or empty body without an error is a
    /// malformed-body failure.
    pub fn from_parts(
        body: Option<Bytes>,
        response: Response<()>,
        error: Option<NetworkingError>,
    ) -> Self {
        let body = body.filter(|bytes| !bytes.is_empty());
        match (body, error) {
            (Some(bytes), None) => Self::Success(response.with_body(bytes)),
            (body, Some(error)) => Self::Failure {
                response: response.with_body(body),
                error,
            },
            (None, None) => Self::Failure {
                response: response.with_body(None),
                error: NetworkingError::malformed("data"),
            },
        }
    }

    /// The downloaded bytes, if any.
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            Self::Success(response) => Some(&response.body),
            Self::Failure { response, .. } => response.body.as_ref(),
        }
    }
}

result_accessors!(DataResult);

impl From<RawOutcome> for DataResult {
    fn from(outcome: RawOutcome) -> Self {
        let RawOutcome { response, error } = outcome;
        let body = response.body.clone().and_then(Payload::into_bytes);
        Self::from_parts(body, response.with_body(()), error)
    }
}

/// Outcome of an image download.
#[derive(Clone, Debug)]
pub enum ImageResult {
    /// The decoded image.
    Success(Response<Arc<DynamicImage>>),
    /// A failed download.
    Failure {
        /// The response, with the image if one decoded.
        response: Response<Option<Arc<DynamicImage>>>,
        /// Why the request failed.
        error: NetworkingError,
    },
}

impl ImageResult {
    /// Normalize a raw body. Bytes that do not decode as an image, without an
    /// error, are a malformed-body failure.
    pub fn from_parts(
        body: Option<Bytes>,
        response: Response<()>,
        error: Option<NetworkingError>,
    ) -> Self {
        let image = body.as_deref().and_then(decode_image);
        Self::from_image(image, response, error)
    }

    fn from_image(
        image: Option<Arc<DynamicImage>>,
        response: Response<()>,
        error: Option<NetworkingError>,
    ) -> Self {
        match (image, error) {
            (Some(image), None) => Self::Success(response.with_body(image)),
            (image, Some(error)) => Self::Failure {
                response: response.with_body(image),
                error,
            },
            (None, None) => Self::Failure {
                response: response.with_body(None),
                error: NetworkingError::malformed("image"),
            },
        }
    }

    /// The decoded image, if any.
    pub fn image(&self) -> Option<&Arc<DynamicImage>> {
        match self {
            Self::Success(response) => Some(&response.body),
            Self::Failure { response, .. } => response.body.as_ref(),
        }
    }
}

result_accessors!(ImageResult);

impl From<RawOutcome> for ImageResult {
    fn from(outcome: RawOutcome) -> Self {
        let RawOutcome { response, error } = outcome;
        let image = response.body.clone().and_then(Payload::into_image);
        Self::from_image(image, response.with_body(()), error)
    }
}
