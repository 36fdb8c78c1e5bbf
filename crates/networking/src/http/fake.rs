//! Registered fake responses and path template matching.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use image::DynamicImage;
use parking_lot::RwLock;
use serde_json::Value;

use super::request::HttpMethod;
use super::result::Payload;
use crate::logging::targets;

/// The canned body of a fake response.
#[derive(Clone, Debug)]
pub enum FakeBody {
    /// No body.
    Empty,
    /// A JSON document. Template placeholders are substituted in its text.
    Json(Value),
    /// Raw bytes.
    Data(Bytes),
    /// A decoded image.
    Image(Arc<DynamicImage>),
}

/// A canned response served instead of a network call.
#[derive(Clone, Debug)]
pub struct FakeResponse {
    body: FakeBody,
    status_code: i32,
    headers: HeaderMap,
    delay: Option<Duration>,
}

impl FakeResponse {
    fn with_body(body: FakeBody) -> Self {
        Self {
            body,
            status_code: 200,
            headers: HeaderMap::new(),
            delay: None,
        }
    }

    /// A JSON response with status 200.
    pub fn json(value: Value) -> Self {
        Self::with_body(FakeBody::Json(value))
    }

    /// An empty response with status 200.
    pub fn empty() -> Self {
        Self::with_body(FakeBody::Empty)
    }

    /// A raw byte response with status 200.
    pub fn data(bytes: impl Into<Bytes>) -> Self {
        Self::with_body(FakeBody::Data(bytes.into()))
    }

    /// An image response with status 200.
    pub fn image(image: DynamicImage) -> Self {
        Self::with_body(FakeBody::Image(Arc::new(image)))
    }

    /// Set the status code.
    pub fn status(mut self, status_code: i32) -> Self {
        self.status_code = status_code;
        self
    }

    /// Replace the response headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Delay delivery by `delay`.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The configured status code.
    pub fn status_code(&self) -> i32 {
        self.status_code
    }
}

/// A fake resolved for a concrete path.
#[derive(Clone, Debug)]
pub(crate) struct FakeMatch {
    pub payload: Option<Payload>,
    pub status_code: i32,
    pub headers: HeaderMap,
    pub delay: Option<Duration>,
}

/// Fake responses keyed by method and by literal path or `{name}` template.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    entries: RwLock<HashMap<HttpMethod, BTreeMap<String, FakeResponse>>>,
}

impl FakeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `response` for `method` and `path`, replacing any previous
    /// registration for the same pair.
    pub fn register(&self, method: HttpMethod, path: impl Into<String>, response: FakeResponse) {
        let path = path.into();
        tracing::debug!(target: targets::FAKE, %method, path, "registered fake");
        self.entries
            .write()
            .entry(method)
            .or_default()
            .insert(path, response);
    }

    /// Remove every registration.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().values().all(BTreeMap::is_empty)
    }

    /// Resolve `path` against the registrations for `method`.
    ///
    /// A literal registration wins. Otherwise the best matching template is
    /// used and its placeholders are substituted in the JSON body text.
    /// Among several matching templates the one with the most literal
    /// segments wins, then the longest literal prefix, then the
    /// lexicographically smallest template.
    pub(crate) fn find(&self, method: HttpMethod, path: &str) -> Option<FakeMatch> {
        let entries = self.entries.read();
        let registered = entries.get(&method)?;

        if let Some(response) = registered.get(path) {
            tracing::debug!(target: targets::FAKE, %method, path, "serving fake");
            return Some(resolve(response, &BTreeMap::new()));
        }

        let mut best: Option<(TemplateRank, &String, BTreeMap<String, String>)> = None;
        for template in registered.keys() {
            let Some((rank, replacements)) = match_template(template, path) else {
                continue;
            };
            if best.as_ref().is_none_or(|(best_rank, _, _)| rank > *best_rank) {
                best = Some((rank, template, replacements));
            }
        }

        let (_, template, replacements) = best?;
        tracing::debug!(target: targets::FAKE, %method, path, template, "serving templated fake");
        registered
            .get(template)
            .map(|response| resolve(response, &replacements))
    }
}

/// Ordering key between templates matching the same path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct TemplateRank {
    literal_segments: usize,
    literal_prefix: usize,
}

fn trim_slashes(path: &str) -> &str {
    let path = path.strip_prefix('/').unwrap_or(path);
    path.strip_suffix('/').unwrap_or(path)
}

fn is_placeholder(segment: &str) -> bool {
    segment.contains('{')
}

fn match_template(template: &str, path: &str) -> Option<(TemplateRank, BTreeMap<String, String>)> {
    if !is_placeholder(template) {
        return None;
    }

    let template_segments: Vec<&str> = trim_slashes(template).split('/').collect();
    let path_segments: Vec<&str> = trim_slashes(path).split('/').collect();

    if template_segments.len() != path_segments.len()
        || template_segments.len() <= 1
        || template_segments[0] != path_segments[0]
    {
        return None;
    }

    let mut replacements = BTreeMap::new();
    for (template_segment, path_segment) in template_segments.iter().zip(&path_segments) {
        if is_placeholder(template_segment) {
            replacements.insert(template_segment.to_string(), path_segment.to_string());
        }
    }

    let reconstructed = substitute(template, &replacements);
    if reconstructed != path {
        return None;
    }

    let literal_segments = template_segments
        .iter()
        .filter(|segment| !is_placeholder(segment))
        .count();
    let literal_prefix = template_segments
        .iter()
        .take_while(|segment| !is_placeholder(segment))
        .count();

    Some((
        TemplateRank {
            literal_segments,
            literal_prefix,
        },
        replacements,
    ))
}

fn substitute(text: &str, replacements: &BTreeMap<String, String>) -> String {
    replacements
        .iter()
        .fold(text.to_string(), |text, (placeholder, value)| {
            text.replace(placeholder.as_str(), value)
        })
}

fn resolve(response: &FakeResponse, replacements: &BTreeMap<String, String>) -> FakeMatch {
    let payload = match &response.body {
        FakeBody::Empty | FakeBody::Json(Value::Null) => None,
        FakeBody::Json(value) => {
            let text = substitute(&value.to_string(), replacements);
            Some(Payload::Bytes(Bytes::from(text)))
        }
        FakeBody::Data(bytes) => Some(Payload::Bytes(bytes.clone())),
        FakeBody::Image(image) => Some(Payload::Image(Arc::clone(image))),
    };

    FakeMatch {
        payload,
        status_code: response.status_code,
        headers: response.headers.clone(),
        delay: response.delay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body_text(found: &FakeMatch) -> String {
        match found.payload.as_ref() {
            Some(Payload::Bytes(bytes)) => String::from_utf8(bytes.to_vec()).unwrap(),
            other => panic!("expected bytes, got {other:?}"),
        }
    }

    #[test]
    fn test_exact_match() {
        let registry = FakeRegistry::new();
        registry.register(
            HttpMethod::Get,
            "/get",
            FakeResponse::json(json!({"url": "http://x/get"})),
        );

        let found = registry.find(HttpMethod::Get, "/get").unwrap();
        assert_eq!(found.status_code, 200);
        assert_eq!(body_text(&found), r#"{"url":"http://x/get"}"#);
        assert!(registry.find(HttpMethod::Post, "/get").is_none());
        assert!(registry.find(HttpMethod::Get, "/other").is_none());
    }

    #[test]
    fn test_later_registration_replaces() {
        let registry = FakeRegistry::new();
        registry.register(HttpMethod::Get, "/get", FakeResponse::empty().status(500));
        registry.register(HttpMethod::Get, "/get", FakeResponse::empty().status(204));
        assert_eq!(registry.find(HttpMethod::Get, "/get").unwrap().status_code, 204);
    }

    #[test]
    fn test_template_substitution() {
        let registry = FakeRegistry::new();
        registry.register(
            HttpMethod::Get,
            "/a/{x}/b/{y}",
            FakeResponse::json(json!({"x": "{x}", "y": "{y}"})),
        );

        let found = registry.find(HttpMethod::Get, "/a/10/b/20").unwrap();
        assert_eq!(body_text(&found), r#"{"x":"10","y":"20"}"#);
    }

    #[test]
    fn test_template_requires_same_segment_count_and_root() {
        let registry = FakeRegistry::new();
        registry.register(HttpMethod::Get, "/users/{id}", FakeResponse::empty());

        assert!(registry.find(HttpMethod::Get, "/users/10").is_some());
        assert!(registry.find(HttpMethod::Get, "/users/10/posts").is_none());
        assert!(registry.find(HttpMethod::Get, "/accounts/10").is_none());
    }

    #[test]
    fn test_single_segment_template_never_matches() {
        let registry = FakeRegistry::new();
        registry.register(HttpMethod::Get, "/{anything}", FakeResponse::empty());
        assert!(registry.find(HttpMethod::Get, "/users").is_none());
    }

    #[test]
    fn test_reconstruction_must_match_lookup() {
        let registry = FakeRegistry::new();
        registry.register(HttpMethod::Get, "/users/{id}/posts", FakeResponse::empty());
        assert!(registry.find(HttpMethod::Get, "/users/1/comments").is_none());
        assert!(registry.find(HttpMethod::Get, "users/1/posts").is_none());
    }

    #[test]
    fn test_exact_wins_over_template() {
        let registry = FakeRegistry::new();
        registry.register(HttpMethod::Get, "/users/{id}", FakeResponse::empty().status(201));
        registry.register(HttpMethod::Get, "/users/me", FakeResponse::empty().status(202));
        assert_eq!(registry.find(HttpMethod::Get, "/users/me").unwrap().status_code, 202);
        assert_eq!(registry.find(HttpMethod::Get, "/users/7").unwrap().status_code, 201);
    }

    #[test]
    fn test_most_specific_template_wins() {
        let registry = FakeRegistry::new();
        registry.register(HttpMethod::Get, "/users/{id}/{kind}", FakeResponse::empty().status(201));
        registry.register(HttpMethod::Get, "/users/{id}/posts", FakeResponse::empty().status(202));
        registry.register(HttpMethod::Get, "/users/{a}/{b}", FakeResponse::empty().status(203));

        assert_eq!(
            registry.find(HttpMethod::Get, "/users/1/posts").unwrap().status_code,
            202
        );
        // Equal rank: the lexicographically smallest template is used.
        assert_eq!(
            registry.find(HttpMethod::Get, "/users/1/likes").unwrap().status_code,
            203
        );
    }

    #[test]
    fn test_null_json_has_no_payload() {
        let registry = FakeRegistry::new();
        registry.register(HttpMethod::Delete, "/delete", FakeResponse::json(Value::Null));

        let found = registry.find(HttpMethod::Delete, "/delete").unwrap();
        assert!(found.payload.is_none());
        assert_eq!(found.status_code, 200);
    }

    #[test]
    fn test_clear() {
        let registry = FakeRegistry::new();
        assert!(registry.is_empty());
        registry.register(HttpMethod::Delete, "/x", FakeResponse::empty());
        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
    }
}
