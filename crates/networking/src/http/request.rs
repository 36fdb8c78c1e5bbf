//! Request descriptors and the enums that shape them.

use bytes::Bytes;
use serde_json::Value;
use url::Url;

use super::form::{self, FormDataPart};
use crate::error::Result;

/// HTTP request methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    /// HTTP GET method.
    Get,
    /// HTTP POST method.
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP PATCH method.
    Patch,
    /// HTTP DELETE method.
    Delete,
}

impl HttpMethod {
    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }

    /// Form parameters travel in the query string for these methods.
    fn encodes_form_in_query(self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Patch => write!(f, "PATCH"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// How request parameters are serialized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ParameterEncoding {
    /// No body and no content type.
    #[default]
    None,
    /// `application/json`.
    Json,
    /// `application/x-www-form-urlencoded`.
    FormUrlEncoded,
    /// `multipart/form-data` with the client's boundary.
    MultipartFormData,
    /// A caller supplied content type; the body is sent as given.
    Custom(String),
}

impl ParameterEncoding {
    /// The `Content-Type` header value, if any.
    pub fn content_type(&self, boundary: &str) -> Option<String> {
        match self {
            Self::None => None,
            Self::Json => Some("application/json".to_string()),
            Self::FormUrlEncoded => Some("application/x-www-form-urlencoded".to_string()),
            Self::MultipartFormData => Some(format!("multipart/form-data; boundary={boundary}")),
            Self::Custom(content_type) => Some(content_type.clone()),
        }
    }
}

/// The payload kind a request expects back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// A JSON document.
    #[default]
    Json,
    /// Raw bytes.
    Data,
    /// A decodable image.
    Image,
}

impl ResponseType {
    /// The `Accept` header value, if any.
    pub fn accept(self) -> Option<&'static str> {
        match self {
            Self::Json => Some("application/json"),
            Self::Data | Self::Image => None,
        }
    }
}

/// Where a response may be cached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CachingLevel {
    /// Never cached; any existing entry is purged.
    #[default]
    None,
    /// The in-memory tier only.
    Memory,
    /// The in-memory tier mirrored to disk.
    MemoryAndFile,
}

/// The kind of transport task carrying a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionTaskType {
    /// JSON requests.
    Data,
    /// Multipart uploads.
    Upload,
    /// Image and data downloads.
    Download,
}

/// Everything the dispatcher needs to perform one request.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    /// The HTTP method.
    pub method: HttpMethod,
    /// Path relative to the base URL, or an absolute URL.
    pub path: String,
    /// How `parameters` are serialized.
    pub encoding: ParameterEncoding,
    /// Request parameters.
    pub parameters: Option<Value>,
    /// Raw body for [`ParameterEncoding::Custom`].
    pub raw_body: Option<Bytes>,
    /// Multipart file parts.
    pub parts: Vec<FormDataPart>,
    /// The expected payload kind.
    pub response_type: ResponseType,
    /// Caching policy for the response.
    pub caching_level: CachingLevel,
    /// Explicit cache key instead of one derived from the URL.
    pub cache_name: Option<String>,
}

impl RequestDescriptor {
    /// A JSON request with no parameters.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        let encoding = match method {
            HttpMethod::Get | HttpMethod::Delete => ParameterEncoding::None,
            _ => ParameterEncoding::Json,
        };
        Self {
            method,
            path: path.into(),
            encoding,
            parameters: None,
            raw_body: None,
            parts: Vec::new(),
            response_type: ResponseType::Json,
            caching_level: CachingLevel::None,
            cache_name: None,
        }
    }

    /// A download of `response_type` (image or data) via GET.
    pub fn download(path: impl Into<String>, response_type: ResponseType) -> Self {
        Self {
            response_type,
            ..Self::new(HttpMethod::Get, path)
        }
    }

    /// Set the parameters and their encoding.
    pub fn parameters(mut self, parameters: Value, encoding: ParameterEncoding) -> Self {
        self.parameters = Some(parameters);
        self.encoding = encoding;
        self
    }

    /// Send `body` verbatim with the given content type.
    pub fn raw_body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.encoding = ParameterEncoding::Custom(content_type.into());
        self.raw_body = Some(body.into());
        self
    }

    /// Attach multipart parts; switches the encoding to multipart.
    pub fn parts(mut self, parts: Vec<FormDataPart>) -> Self {
        self.parts = parts;
        self.encoding = ParameterEncoding::MultipartFormData;
        self
    }

    /// Set the caching level.
    pub fn caching_level(mut self, level: CachingLevel) -> Self {
        self.caching_level = level;
        self
    }

    /// Set an explicit cache name.
    pub fn cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = Some(name.into());
        self
    }

    /// The transport task kind used to match cancellations.
    pub fn task_type(&self) -> SessionTaskType {
        match (self.response_type, &self.encoding) {
            (ResponseType::Data | ResponseType::Image, _) => SessionTaskType::Download,
            (ResponseType::Json, ParameterEncoding::MultipartFormData) => SessionTaskType::Upload,
            (ResponseType::Json, _) => SessionTaskType::Data,
        }
    }

    /// Whether the response participates in the two-tier cache.
    pub fn is_cacheable(&self) -> bool {
        self.method == HttpMethod::Get
    }

    /// Serialize the parameters, moving form parameters into the query of
    /// `url` for GET and DELETE.
    pub(crate) fn encode_body(&self, url: &mut Url, boundary: &str) -> Result<Option<Bytes>> {
        match &self.encoding {
            ParameterEncoding::None => Ok(None),
            ParameterEncoding::Json => match &self.parameters {
                Some(parameters) => Ok(Some(Bytes::from(serde_json::to_vec(parameters)?))),
                None => Ok(None),
            },
            ParameterEncoding::FormUrlEncoded => {
                let encoded = self
                    .parameters
                    .as_ref()
                    .map(form::url_encode)
                    .unwrap_or_default();
                if self.method.encodes_form_in_query() {
                    append_query(url, &encoded);
                    Ok(None)
                } else {
                    Ok(Some(Bytes::from(encoded)))
                }
            }
            ParameterEncoding::MultipartFormData => Ok(Some(form::multipart_body(
                boundary,
                self.parameters.as_ref(),
                &self.parts,
            ))),
            ParameterEncoding::Custom(_) => Ok(self.raw_body.clone()),
        }
    }
}

fn append_query(url: &mut Url, encoded: &str) {
    if encoded.is_empty() {
        return;
    }
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded.to_string(),
    };
    url.set_query(Some(&query));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_display() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert_eq!(HttpMethod::Delete.to_reqwest(), reqwest::Method::DELETE);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(ParameterEncoding::None.content_type("b"), None);
        assert_eq!(
            ParameterEncoding::Json.content_type("b").as_deref(),
            Some("application/json")
        );
        assert_eq!(
            ParameterEncoding::MultipartFormData.content_type("Boundary-x").as_deref(),
            Some("multipart/form-data; boundary=Boundary-x")
        );
        assert_eq!(
            ParameterEncoding::Custom("text/plain".into()).content_type("b").as_deref(),
            Some("text/plain")
        );
        assert_eq!(ResponseType::Json.accept(), Some("application/json"));
        assert_eq!(ResponseType::Image.accept(), None);
    }

    #[test]
    fn test_task_types() {
        assert_eq!(
            RequestDescriptor::new(HttpMethod::Get, "/get").task_type(),
            SessionTaskType::Data
        );
        assert_eq!(
            RequestDescriptor::download("/image.png", ResponseType::Image).task_type(),
            SessionTaskType::Download
        );
        assert_eq!(
            RequestDescriptor::new(HttpMethod::Post, "/upload")
                .parts(Vec::new())
                .task_type(),
            SessionTaskType::Upload
        );
    }

    #[test]
    fn test_form_parameters_go_into_query_for_get() {
        let descriptor = RequestDescriptor::new(HttpMethod::Get, "/get")
            .parameters(json!({"name": "Elvis"}), ParameterEncoding::FormUrlEncoded);

        let mut url = Url::parse("http://httpbin.org/get").unwrap();
        let body = descriptor.encode_body(&mut url, "b").unwrap();
        assert!(body.is_none());
        assert_eq!(url.as_str(), "http://httpbin.org/get?name=Elvis");

        let mut url = Url::parse("http://httpbin.org/get?a=1").unwrap();
        descriptor.encode_body(&mut url, "b").unwrap();
        assert_eq!(url.query(), Some("a=1&name=Elvis"));

        let mut url = Url::parse("http://httpbin.org/get?").unwrap();
        descriptor.encode_body(&mut url, "b").unwrap();
        assert_eq!(url.query(), Some("name=Elvis"));
    }

    #[test]
    fn test_form_parameters_go_into_body_for_post() {
        let descriptor = RequestDescriptor::new(HttpMethod::Post, "/post").parameters(
            json!({"name": "Elvis", "surname": "Nuñez"}),
            ParameterEncoding::FormUrlEncoded,
        );
        let mut url = Url::parse("http://httpbin.org/post").unwrap();
        let body = descriptor.encode_body(&mut url, "b").unwrap().unwrap();
        assert_eq!(&body[..], b"name=Elvis&surname=Nu%C3%B1ez");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_json_and_custom_bodies() {
        let mut url = Url::parse("http://httpbin.org/post").unwrap();

        let json_request = RequestDescriptor::new(HttpMethod::Post, "/post")
            .parameters(json!({"a": 1}), ParameterEncoding::Json);
        let body = json_request.encode_body(&mut url, "b").unwrap().unwrap();
        assert_eq!(&body[..], br#"{"a":1}"#);

        let no_parameters = RequestDescriptor::new(HttpMethod::Post, "/post");
        assert!(no_parameters.encode_body(&mut url, "b").unwrap().is_none());

        let custom = RequestDescriptor::new(HttpMethod::Post, "/post")
            .raw_body("text/plain", Bytes::from_static(b"hello"));
        let body = custom.encode_body(&mut url, "b").unwrap().unwrap();
        assert_eq!(&body[..], b"hello");
    }
}
