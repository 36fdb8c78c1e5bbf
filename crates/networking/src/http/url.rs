//! URL composition and cache destination keys.

use std::path::{Path, PathBuf};

use url::{Position, Url};

use crate::error::{NetworkingError, Result};

/// Compose the absolute URL for `path` under `base`.
///
/// A `path` that is already an absolute URL is returned unchanged. Otherwise
/// the path is appended to the base and the URL parser percent-encodes
/// anything that is not valid in a path or query, leaving `/` alone.
pub fn compose_url(base: &str, path: &str) -> Result<Url> {
    if let Some(url) = parse_absolute(path) {
        return Ok(url);
    }

    let base = base.trim_end_matches('/');
    let joined = if path.is_empty() || path.starts_with('/') || path.starts_with('?') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };

    Url::parse(&joined).map_err(|err| NetworkingError::InvalidUrl(format!("{joined}: {err}")))
}

/// Derive the cache key for a request.
///
/// With a `cache_name` the key is that name; otherwise it is the composed
/// URL without its query string or fragment. In both cases `/` becomes `-`
/// and non-ASCII characters are percent-encoded, so the key is a single
/// filename-safe path component.
pub fn destination_key(base: &str, path: &str, cache_name: Option<&str>) -> Result<String> {
    let raw = match cache_name {
        Some(name) => name.to_string(),
        None => {
            let mut url = compose_url(base, path)?;
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
    };

    let key = escape_non_ascii(&raw.replace('/', "-"));
    if key.is_empty() {
        return Err(NetworkingError::InvalidUrl(format!(
            "cannot derive a cache key from path {path:?}"
        )));
    }
    Ok(key)
}

/// The file that backs the cache entry for a request, under `root`.
pub fn destination_path(
    root: &Path,
    base: &str,
    path: &str,
    cache_name: Option<&str>,
) -> Result<PathBuf> {
    Ok(root.join(destination_key(base, path, cache_name)?))
}

/// Split a fully-qualified URL into its base (`scheme://host[:port]`) and
/// the relative remainder (path, query and fragment).
pub fn split_base_and_relative(full_url: &str) -> Result<(String, String)> {
    let url = parse_absolute(full_url)
        .ok_or_else(|| NetworkingError::InvalidUrl(format!("{full_url} is not an absolute URL")))?;

    let base = url[..Position::BeforePath].to_string();
    let relative = match full_url.strip_prefix(base.as_str()) {
        Some(relative) => relative.to_string(),
        None => url[Position::BeforePath..].to_string(),
    };

    Ok((base, relative))
}

fn parse_absolute(candidate: &str) -> Option<Url> {
    Url::parse(candidate).ok().filter(Url::has_host)
}

fn escape_non_ascii(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    let mut buffer = [0u8; 4];
    for ch in input.chars() {
        if ch.is_ascii() {
            escaped.push(ch);
        } else {
            for byte in ch.encode_utf8(&mut buffer).bytes() {
                escaped.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://httpbin.org";

    #[test]
    fn test_compose_relative_path() {
        let url = compose_url(BASE, "/get").unwrap();
        assert_eq!(url.as_str(), "http://httpbin.org/get");

        let url = compose_url("http://httpbin.org/", "users").unwrap();
        assert_eq!(url.as_str(), "http://httpbin.org/users");
    }

    #[test]
    fn test_compose_absolute_path_is_unchanged() {
        let url = compose_url(BASE, "https://example.com/image.png").unwrap();
        assert_eq!(url.as_str(), "https://example.com/image.png");
    }

    #[test]
    fn test_compose_encodes_segments() {
        let url = compose_url(BASE, "/images/ñandú azul.png").unwrap();
        assert_eq!(url.as_str(), "http://httpbin.org/images/%C3%B1and%C3%BA%20azul.png");
    }

    #[test]
    fn test_compose_invalid_base() {
        let result = compose_url("not a url", "/get");
        assert!(matches!(result, Err(NetworkingError::InvalidUrl(_))));
    }

    #[test]
    fn test_destination_key_from_url() {
        let key = destination_key(BASE, "/image/png?size=large", None).unwrap();
        assert_eq!(key, "http:--httpbin.org-image-png");
    }

    #[test]
    fn test_destination_key_from_cache_name() {
        let key = destination_key(BASE, "/image/png", Some("png/png")).unwrap();
        assert_eq!(key, "png-png");

        let key = destination_key(BASE, "/image/png", Some("café/1")).unwrap();
        assert_eq!(key, "caf%C3%A9-1");
    }

    #[test]
    fn test_destination_path_is_deterministic() {
        let root = Path::new("/tmp/cache");
        let first = destination_path(root, BASE, "/image/png", None).unwrap();
        let second = destination_path(root, BASE, "/image/png", None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, root.join("http:--httpbin.org-image-png"));
    }

    #[test]
    fn test_split_base_and_relative() {
        let (base, relative) =
            split_base_and_relative("https://rescuejuice.com/wp-content/uploads/2015/11/épica.jpg")
                .unwrap();
        assert_eq!(base, "https://rescuejuice.com");
        assert_eq!(relative, "/wp-content/uploads/2015/11/épica.jpg");

        let (base, relative) = split_base_and_relative("http://localhost:8080/a?b=c").unwrap();
        assert_eq!(base, "http://localhost:8080");
        assert_eq!(relative, "/a?b=c");
    }

    #[test]
    fn test_split_rejects_relative() {
        assert!(split_base_and_relative("/just/a/path").is_err());
    }
}
