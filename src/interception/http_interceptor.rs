// src/interception/http_interceptor.rs
//! Intercepting protocol handler
//!
//! Claims every http(s) request that does not carry the forwarding marker,
//! records it in a [`LogStore`] and re-issues a marked copy through a
//! private session whose configuration excludes this handler. Events from
//! that session are relayed back to the original caller by a
//! [`ForwardingDelegate`].
//!
//! ```text
//! caller ──► HttpInterceptor ──► InterceptingLoader ──► forwarding Session ──► transport
//!   ▲                                  │ pending entry          │
//!   │                                  ▼                        ▼
//!   └──────── relay ◄──────── ForwardingDelegate ──► completed entry
//! ```

use crate::interception::session_delegate::ForwardingDelegate;
use crate::observability::names;
use crate::recording::log_store::{LogEntry, LogStore};
use crate::transport::protocol::{
    HandlerType, LoadContext, LoaderClient, ProtocolHandler, ProtocolLoader,
};
use crate::transport::session::{DataTask, Session};
use crate::transport::types::{flatten_headers, OutboundRequest, TaskMetrics, TransportError};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use ulid::Ulid;

static SHARED: Lazy<HandlerType> =
    Lazy::new(|| Arc::new(HttpInterceptor::new(Arc::clone(LogStore::shared()))));

/// Set on forwarded copies so the interceptor never claims its own traffic
#[derive(Debug, Clone, Copy)]
struct SnifferHandled;

/// Protocol handler that logs and forwards http(s) requests
pub struct HttpInterceptor {
    store: Arc<LogStore>,
}

impl HttpInterceptor {
    pub const NAME: &'static str = "net_sniffer.http_interceptor";

    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }

    /// Interceptor recording into [`LogStore::shared`]
    pub fn shared() -> HandlerType {
        Arc::clone(&SHARED)
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    /// Whether `request` is a copy issued by an interceptor
    pub fn is_forwarded(request: &OutboundRequest) -> bool {
        request.extensions().get::<SnifferHandled>().is_some()
    }
}

impl ProtocolHandler for HttpInterceptor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_handle(&self, request: &OutboundRequest) -> bool {
        let http = request
            .uri()
            .scheme_str()
            .map(|s| s.eq_ignore_ascii_case("http") || s.eq_ignore_ascii_case("https"))
            .unwrap_or(false);

        http && !Self::is_forwarded(request)
    }

    fn create(
        &self,
        request: OutboundRequest,
        client: Arc<dyn LoaderClient>,
        context: LoadContext,
    ) -> Box<dyn ProtocolLoader> {
        Box::new(InterceptingLoader::new(
            request,
            client,
            context,
            Arc::clone(&self.store),
        ))
    }
}

impl std::fmt::Debug for HttpInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpInterceptor")
            .field("entries", &self.store.len())
            .finish()
    }
}

struct PendingLoad {
    request: OutboundRequest,
    client: Arc<dyn LoaderClient>,
    context: LoadContext,
}

struct Forwarding {
    session: Session,
    task: DataTask,
}

/// Loader for one claimed request
pub struct InterceptingLoader {
    /// Taken by `start`, discarded by `stop`
    pending: Option<PendingLoad>,
    shared: Option<Arc<LoaderShared>>,
    forwarding: Option<Forwarding>,
    store: Arc<LogStore>,
}

impl InterceptingLoader {
    fn new(
        request: OutboundRequest,
        client: Arc<dyn LoaderClient>,
        context: LoadContext,
        store: Arc<LogStore>,
    ) -> Self {
        Self {
            pending: Some(PendingLoad {
                request,
                client,
                context,
            }),
            shared: None,
            forwarding: None,
            store,
        }
    }

    /// Body received so far
    pub fn received_body(&self) -> Option<Bytes> {
        self.shared.as_ref().map(|s| s.buffer.lock().clone().freeze())
    }

    /// Metrics of the forwarded task, once collected
    pub fn metrics(&self) -> Option<TaskMetrics> {
        self.shared.as_ref().and_then(|s| s.metrics.lock().clone())
    }
}

impl ProtocolLoader for InterceptingLoader {
    fn start(&mut self) {
        let Some(PendingLoad {
            request,
            client,
            context,
        }) = self.pending.take()
        else {
            debug!("Loader already started or stopped");
            return;
        };

        let started = Instant::now();
        let started_at = Utc::now();
        let method = request.method().to_string();

        let Some(url) = absolute_url(&request) else {
            warn!(
                method = %method,
                uri = %request.uri(),
                "Cannot forward request without an absolute URL"
            );
            client.did_fail(TransportError::UnsupportedUrl(request.uri().to_string()));
            return;
        };

        let mut forwarded = copy_request(&request);
        forwarded.extensions_mut().insert(SnifferHandled);

        let mut configuration = context
            .configuration
            .registry()
            .default_configuration()
            .with_transport(Arc::clone(context.configuration.transport()));
        configuration.remove_handler(HttpInterceptor::NAME);

        let pending_entry = LogEntry::pending(
            Ulid::new(),
            started_at,
            method.clone(),
            url.clone(),
            flatten_headers(request.headers()),
        );
        self.store.append(pending_entry.clone());

        let shared = Arc::new(LoaderShared {
            method,
            url,
            started,
            pending_entry,
            store: Arc::clone(&self.store),
            client: RwLock::new(Some(client)),
            buffer: Mutex::new(BytesMut::new()),
            metrics: Mutex::new(None),
        });

        let delegate = Arc::new(ForwardingDelegate::new(Arc::downgrade(&shared)));
        let session = Session::with_delegate(configuration, delegate);
        let task = session.data_task(forwarded);

        info!(
            direction = "outbound",
            request_id = %shared.pending_entry.request_id,
            method = %shared.method,
            url = %shared.url,
            "→ {} {}",
            shared.method,
            shared.url
        );
        metrics::counter!(names::REQUESTS_INTERCEPTED).increment(1);

        task.resume();
        self.shared = Some(shared);
        self.forwarding = Some(Forwarding { session, task });
    }

    fn stop(&mut self) {
        self.pending = None;

        if let Some(shared) = self.shared.take() {
            shared.detach();
        }
        if let Some(Forwarding { session, task }) = self.forwarding.take() {
            task.cancel();
            session.invalidate_and_cancel();
        }
    }
}

impl Drop for InterceptingLoader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State the loader shares with its forwarding delegate
pub(crate) struct LoaderShared {
    pub(crate) method: String,
    pub(crate) url: String,
    pub(crate) started: Instant,
    pub(crate) pending_entry: LogEntry,
    pub(crate) store: Arc<LogStore>,

    /// Cleared on stop; relays hold the read side
    client: RwLock<Option<Arc<dyn LoaderClient>>>,

    buffer: Mutex<BytesMut>,
    metrics: Mutex<Option<TaskMetrics>>,
}

impl LoaderShared {
    pub(crate) fn is_attached(&self) -> bool {
        self.client.read().is_some()
    }

    /// The client slot, `None` once stopped. `detach` waits while this is held.
    pub(crate) fn client(&self) -> RwLockReadGuard<'_, Option<Arc<dyn LoaderClient>>> {
        self.client.read()
    }

    /// Call the original client unless the loader was stopped
    pub(crate) fn relay(&self, f: impl FnOnce(&dyn LoaderClient)) -> bool {
        match self.client.read().as_deref() {
            Some(client) => {
                f(client);
                true
            }
            None => false,
        }
    }

    pub(crate) fn buffer_chunk(&self, data: &Bytes) {
        self.buffer.lock().extend_from_slice(data);
    }

    pub(crate) fn set_metrics(&self, metrics: TaskMetrics) {
        *self.metrics.lock() = Some(metrics);
    }

    fn detach(&self) {
        if self.client.write().take().is_some() {
            debug!(url = %self.url, "Loader detached");
        }
    }
}

/// The request URL, if it names a scheme and a host
fn absolute_url(request: &OutboundRequest) -> Option<String> {
    let uri = request.uri();
    match (uri.scheme(), uri.authority()) {
        (Some(_), Some(_)) => Some(uri.to_string()),
        _ => None,
    }
}

fn copy_request(request: &OutboundRequest) -> OutboundRequest {
    let mut copy = http::Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    *copy.extensions_mut() = request.extensions().clone();
    copy
}
