// src/transport/types.rs
//! Value types shared by sessions, loaders and transports

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Response, StatusCode, Uri, Version};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// An outbound request as issued by application code
pub type OutboundRequest = http::Request<Bytes>;

/// Response metadata, delivered before any body bytes
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,

    /// Final URL after any redirects the transport resolved
    pub url: Uri,
}

impl ResponseHead {
    pub fn new(status: StatusCode, url: Uri) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            url,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Assemble a complete response around a collected body
    pub fn into_response(self, body: Bytes) -> Response<Bytes> {
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Whether a receiver may store a response in its cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Allowed,
    AllowedInMemoryOnly,
    NotAllowed,
}

/// A delegate's answer to "response headers received"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseDisposition {
    /// Keep receiving the body
    #[default]
    Allow,

    /// Abort the task
    Cancel,
}

/// Failure of a single transfer.
///
/// Cloneable so it can be relayed verbatim to the original caller while the
/// log store records its description.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request has no resolvable URL: {0:?}")]
    UnsupportedUrl(String),

    #[error("Could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Request to {url} timed out")]
    TimedOut { url: String },

    #[error("Redirect from {url} failed: {message}")]
    Redirect { url: String, message: String },

    #[error("Transfer of {url} failed: {message}")]
    Transfer { url: String, message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Timing collected for one task, reported once before completion
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMetrics {
    pub fetch_start: DateTime<Utc>,

    /// Time until response headers arrived, if they did
    pub time_to_first_byte: Option<Duration>,

    pub total: Duration,
    pub bytes_received: u64,
    pub chunks_received: u64,
}

/// Flatten a header map into unique string keys, joining repeated values
/// with `", "` and decoding non-UTF-8 values lossily.
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ACCEPT, CONTENT_TYPE, SET_COOKIE};
    use http::HeaderValue;

    #[test]
    fn test_flatten_joins_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));

        let flat = flatten_headers(&headers);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["content-type"], "text/plain");
        assert_eq!(flat["set-cookie"], "a=1, b=2");
    }

    #[test]
    fn test_flatten_non_utf8_value() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_bytes(b"caf\xe9").unwrap());

        let flat = flatten_headers(&headers);
        assert!(flat["accept"].starts_with("caf"));
    }

    #[test]
    fn test_into_response() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let head = ResponseHead::new(StatusCode::CREATED, Uri::from_static("http://example.com/"))
            .with_headers(headers);

        let response = head.into_response(Bytes::from_static(b"{}"));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.body().as_ref(), b"{}");
    }
}
