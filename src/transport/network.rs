// src/transport/network.rs
//! Network transport consumed as a black box
//!
//! A [`Transport`] sends one request and streams its response. DNS, TLS,
//! connection pooling and redirect following all live behind this seam.

use crate::transport::types::{OutboundRequest, ResponseHead, TransportError};
use crate::utils::config::TransportConfig;
use crate::utils::errors::{Result, SnifferError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt, TryStreamExt};
use http::Uri;
use tracing::debug;

/// Streamed response body
pub type BodyStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

/// Response headers plus a body that has not been read yet
pub struct TransportResponse {
    pub head: ResponseHead,
    pub body: BodyStream,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// "Send request, stream response" capability
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: OutboundRequest,
    ) -> BoxFuture<'static, std::result::Result<TransportResponse, TransportError>>;
}

/// Transport backed by a pooled `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport honouring timeout, redirect and user-agent settings
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| {
                SnifferError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::from_client(reqwest::Client::new())
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: OutboundRequest,
    ) -> BoxFuture<'static, std::result::Result<TransportResponse, TransportError>> {
        let client = self.client.clone();

        async move {
            let url = request.uri().to_string();
            let (parts, body) = request.into_parts();

            debug!("Sending {} {}", parts.method, url);

            let response = client
                .request(parts.method, url.as_str())
                .headers(parts.headers)
                .body(body)
                .send()
                .await
                .map_err(|e| classify(&url, e))?;

            let final_url: Uri = response
                .url()
                .as_str()
                .parse()
                .map_err(|e| TransportError::Transfer {
                    url: url.clone(),
                    message: format!("Unparseable response URL: {}", e),
                })?;

            let head = ResponseHead {
                status: response.status(),
                version: response.version(),
                headers: response.headers().clone(),
                url: final_url,
            };

            let body = response
                .bytes_stream()
                .map_err(move |e| classify(&url, e))
                .boxed();

            Ok(TransportResponse { head, body })
        }
        .boxed()
    }
}

/// Map a `reqwest` failure onto the transport error taxonomy
fn classify(url: &str, error: reqwest::Error) -> TransportError {
    let url = url.to_string();
    if error.is_timeout() {
        TransportError::TimedOut { url }
    } else if error.is_connect() {
        TransportError::Connect {
            url,
            message: error_chain(&error),
        }
    } else if error.is_redirect() {
        TransportError::Redirect {
            url,
            message: error_chain(&error),
        }
    } else {
        TransportError::Transfer {
            url,
            message: error_chain(&error),
        }
    }
}

/// `reqwest` keeps the interesting part (e.g. "connection refused") in sources
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_from_config() {
        let config = TransportConfig::default();
        assert!(ReqwestTransport::new(&config).is_ok());
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let outer = std::io::Error::new(std::io::ErrorKind::Other, inner);
        assert_eq!(error_chain(&outer), "refused");

        let err = TransportError::Connect {
            url: "http://127.0.0.1:1/".to_string(),
            message: "refused".to_string(),
        };
        assert!(err.to_string().contains("refused"));
    }
}
