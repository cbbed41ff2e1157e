//! Resource cache and caching proxy
//!
//! This module stores HTTP request/response pairs on disk in named buckets
//! and resolves application requests against them cache-first. Responses are
//! fingerprinted by method and URL. The proxy serves canned fallback pages
//! when the network answers 404 or cannot be reached at all.

mod fetch;
mod proxy;
mod storage;

pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use proxy::{CachingProxy, InstallReport, ProxyError, ProxySettings};
pub use storage::{CacheBucket, CacheError, CacheStorage};

use sha2::{Digest, Sha256};

/// An outbound request as seen by the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    /// Upper-case HTTP method
    pub method: String,
    /// Absolute URL
    pub url: String,
}

impl ResourceRequest {
    pub fn new(method: &str, url: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.into(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Only `GET` requests are looked up in or written to the cache
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET"
    }

    /// Stable identifier of the request: hex SHA-256 of method and URL
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A response snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Resource {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with the given name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as UTF-8, with invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Resolves a manifest entry (`./`, `css/styles.css`, or absolute) against an origin
pub fn resolve_url(origin: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let relative = path.trim_start_matches("./").trim_start_matches('/');
    format!("{}/{}", origin.trim_end_matches('/'), relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_depends_on_method_and_url() {
        let get = ResourceRequest::get("http://localhost:8000/index.html");
        let same = ResourceRequest::new("get", "http://localhost:8000/index.html");
        let post = ResourceRequest::new("POST", "http://localhost:8000/index.html");
        let other = ResourceRequest::get("http://localhost:8000/404.html");

        assert_eq!(get.fingerprint(), same.fingerprint());
        assert_ne!(get.fingerprint(), post.fingerprint());
        assert_ne!(get.fingerprint(), other.fingerprint());
        assert_eq!(get.fingerprint().len(), 64);
    }

    #[test]
    fn test_only_get_is_cacheable() {
        assert!(ResourceRequest::get("http://a/").is_cacheable());
        assert!(!ResourceRequest::new("POST", "http://a/").is_cacheable());
    }

    #[test]
    fn test_resolve_url() {
        let origin = "http://localhost:8000";
        assert_eq!(resolve_url(origin, "./"), "http://localhost:8000/");
        assert_eq!(resolve_url(origin, "index.html"), "http://localhost:8000/index.html");
        assert_eq!(
            resolve_url("http://localhost:8000/", "/css/styles.css"),
            "http://localhost:8000/css/styles.css"
        );
        assert_eq!(
            resolve_url(origin, "https://cdn.example.com/leaflet.js"),
            "https://cdn.example.com/leaflet.js"
        );
    }

    #[test]
    fn test_resource_header_lookup_is_case_insensitive() {
        let resource = Resource::new(200, "ok").with_header("Content-Type", "text/html");

        assert_eq!(resource.header("content-type"), Some("text/html"));
        assert!(resource.header("etag").is_none());
        assert!(resource.is_success());
        assert_eq!(resource.text(), "ok");
    }
}
