// tests/common/mod.rs
//! Shared fixtures for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};
use http::{HeaderValue, StatusCode};
use net_sniffer::interception::TransportRegistry;
use net_sniffer::transport::{
    LoadContext, LoaderClient, OutboundRequest, ProtocolHandler, ProtocolLoader, ResponseHead,
    Transport, TransportError, TransportResponse,
};
use net_sniffer::{HttpInterceptor, LogStore, Session};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn request(method: &str, url: &str) -> OutboundRequest {
    http::Request::builder()
        .method(method)
        .uri(url)
        .header("accept", "application/json")
        .body(Bytes::new())
        .unwrap()
}

/// In-memory upstream: answers by path, fails for listed hosts
pub struct MemoryTransport {
    pub chunks: Vec<Bytes>,
    pub status: StatusCode,
    pub fail_host: Option<String>,
    seen: Mutex<Vec<(String, bool)>>,
}

impl MemoryTransport {
    pub fn new(chunks: &[&'static str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect(),
            status: StatusCode::OK,
            fail_host: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, host: &str) -> Self {
        self.fail_host = Some(host.to_string());
        self
    }

    /// (url, forwarded) per request that reached the network
    pub fn seen(&self) -> Vec<(String, bool)> {
        self.seen.lock().clone()
    }
}

impl Transport for MemoryTransport {
    fn send(
        &self,
        request: OutboundRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let url = request.uri().clone();
        self.seen
            .lock()
            .push((url.to_string(), HttpInterceptor::is_forwarded(&request)));

        let failing = self.fail_host.as_deref() == url.host();
        let status = self.status;
        let chunks = self.chunks.clone();

        async move {
            if failing {
                return Err(TransportError::Connect {
                    url: url.to_string(),
                    message: "connection refused".to_string(),
                });
            }

            let mut head = ResponseHead::new(status, url);
            head.headers
                .insert("content-type", HeaderValue::from_static("text/plain"));
            Ok(TransportResponse {
                head,
                body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
            })
        }
        .boxed()
    }
}

/// Claimant that never claims and counts how often it is consulted
#[derive(Default)]
pub struct CountingClaimant {
    calls: AtomicUsize,
}

impl CountingClaimant {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProtocolHandler for CountingClaimant {
    fn name(&self) -> &'static str {
        "counting-claimant"
    }

    fn can_handle(&self, _request: &OutboundRequest) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn create(
        &self,
        _request: OutboundRequest,
        _client: Arc<dyn LoaderClient>,
        _context: LoadContext,
    ) -> Box<dyn ProtocolLoader> {
        unreachable!("never claims")
    }
}

/// Private registry with an interceptor writing to its own store
pub struct Sniffed {
    pub registry: Arc<TransportRegistry>,
    pub store: Arc<LogStore>,
    pub transport: Arc<MemoryTransport>,
}

impl Sniffed {
    pub fn new(transport: MemoryTransport) -> Self {
        let transport = Arc::new(transport);
        let store = Arc::new(LogStore::new());
        let registry = TransportRegistry::builder()
            .transport(transport.clone())
            .build();
        registry.try_install_once(Arc::new(HttpInterceptor::new(store.clone())));

        Self {
            registry,
            store,
            transport,
        }
    }

    pub fn session(&self) -> Session {
        Session::new(self.registry.default_configuration())
    }
}
