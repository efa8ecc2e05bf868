// src/transport/testing.rs
//! Test doubles shared by unit tests

use crate::interception::HttpInterceptor;
use crate::transport::network::{Transport, TransportResponse};
use crate::transport::protocol::{LoadContext, LoaderClient, ProtocolHandler, ProtocolLoader};
use crate::transport::session::{SessionDelegate, TaskInfo};
use crate::transport::types::{
    CachePolicy, OutboundRequest, ResponseDisposition, ResponseHead, TaskMetrics, TransportError,
};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};
use http::{HeaderValue, Method, StatusCode, Uri};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub(crate) fn get(url: &str) -> OutboundRequest {
    http::Request::builder()
        .uri(url)
        .header("x-request", "test")
        .body(Bytes::new())
        .unwrap()
}

#[derive(Debug, Clone)]
pub(crate) struct SentRequest {
    pub method: Method,
    pub url: Uri,
    pub forwarded: bool,
}

/// Answers every request with the same status and body chunks
pub(crate) struct ScriptedTransport {
    status: Mutex<StatusCode>,
    chunks: Vec<Bytes>,
    fail_hosts: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn ok(chunks: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(StatusCode::OK),
            chunks: chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect(),
            fail_hosts: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing_for(self: Arc<Self>, host: &str) -> Arc<Self> {
        self.fail_hosts.lock().push(host.to_string());
        self
    }

    pub(crate) fn with_status(self: Arc<Self>, status: StatusCode) -> Arc<Self> {
        *self.status.lock() = status;
        self
    }

    pub(crate) fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = Some(delay);
        self
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub(crate) fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: OutboundRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        self.sent.lock().push(SentRequest {
            method: request.method().clone(),
            url: request.uri().clone(),
            forwarded: HttpInterceptor::is_forwarded(&request),
        });

        let url = request.uri().clone();
        let host = url.host().unwrap_or_default().to_string();
        let failing = self.fail_hosts.lock().contains(&host);
        let status = *self.status.lock();
        let delay = *self.delay.lock();
        let chunks = self.chunks.clone();

        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if failing {
                return Err(TransportError::Connect {
                    url: url.to_string(),
                    message: "connection refused".to_string(),
                });
            }

            let mut head = ResponseHead::new(status, url);
            head.headers.insert("x-scripted", HeaderValue::from_static("yes"));
            let body = stream::iter(chunks.into_iter().map(Ok)).boxed();
            Ok(TransportResponse { head, body })
        }
        .boxed()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ClientEvent {
    Response(u16, CachePolicy),
    Data(Bytes),
    Failed(TransportError),
    Finished,
}

/// Original-caller double that records every callback
#[derive(Default)]
pub(crate) struct RecordingClient {
    events: Mutex<Vec<ClientEvent>>,
    done: Notify,
}

impl RecordingClient {
    pub(crate) fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().clone()
    }

    pub(crate) async fn wait(&self) {
        self.done.notified().await;
    }
}

impl LoaderClient for RecordingClient {
    fn did_receive_response(&self, response: &ResponseHead, policy: CachePolicy) {
        self.events
            .lock()
            .push(ClientEvent::Response(response.status.as_u16(), policy));
    }

    fn did_load_data(&self, data: Bytes) {
        self.events.lock().push(ClientEvent::Data(data));
    }

    fn did_fail(&self, error: TransportError) {
        self.events.lock().push(ClientEvent::Failed(error));
        self.done.notify_one();
    }

    fn did_finish_loading(&self) {
        self.events.lock().push(ClientEvent::Finished);
        self.done.notify_one();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DelegateEvent {
    Response(u16),
    Data(Bytes),
    Metrics { bytes: u64, chunks: u64 },
    Complete(Option<TransportError>),
}

/// Session delegate double that records every event
#[derive(Default)]
pub(crate) struct RecordingDelegate {
    events: Mutex<Vec<DelegateEvent>>,
    done: Notify,
}

impl RecordingDelegate {
    pub(crate) fn events(&self) -> Vec<DelegateEvent> {
        self.events.lock().clone()
    }

    pub(crate) async fn wait(&self) {
        self.done.notified().await;
    }
}

impl SessionDelegate for RecordingDelegate {
    fn did_receive_response(
        &self,
        _task: &TaskInfo,
        response: &ResponseHead,
    ) -> ResponseDisposition {
        self.events
            .lock()
            .push(DelegateEvent::Response(response.status.as_u16()));
        ResponseDisposition::Allow
    }

    fn did_receive_data(&self, _task: &TaskInfo, data: Bytes) {
        self.events.lock().push(DelegateEvent::Data(data));
    }

    fn did_finish_collecting(&self, _task: &TaskInfo, metrics: &TaskMetrics) {
        self.events.lock().push(DelegateEvent::Metrics {
            bytes: metrics.bytes_received,
            chunks: metrics.chunks_received,
        });
    }

    fn did_complete(&self, _task: &TaskInfo, error: Option<&TransportError>) {
        self.events.lock().push(DelegateEvent::Complete(error.cloned()));
        self.done.notify_one();
    }
}

/// Claimant that never claims, counting how often it is asked
#[derive(Default)]
pub(crate) struct CountingHandler {
    calls: AtomicUsize,
}

impl CountingHandler {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProtocolHandler for CountingHandler {
    fn name(&self) -> &'static str {
        "counting"
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
        unreachable!("counting handler never claims a request")
    }
}
