// src/transport/session.rs
//! Sessions and data tasks
//!
//! A [`Session`] is what application code issues requests through. Each
//! [`DataTask`] first offers its request to the configuration's claimant
//! handlers; unclaimed requests go straight to the configured transport.
//!
//! For one task the delegate always observes
//!
//! ```text
//! did_receive_response → did_receive_data* → did_finish_collecting → did_complete
//! ```
//!
//! with `did_complete` delivered exactly once, including on cancellation.

use crate::transport::configuration::SessionConfiguration;
use crate::transport::network::TransportResponse;
use crate::transport::protocol::{HandlerType, LoadContext, LoaderClient};
use crate::transport::types::{
    CachePolicy, OutboundRequest, ResponseDisposition, ResponseHead, TaskMetrics, TransportError,
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use http::{Method, Response, Uri};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Receives task events. Every method has a no-op default.
pub trait SessionDelegate: Send + Sync {
    fn did_receive_response(
        &self,
        _task: &TaskInfo,
        _response: &ResponseHead,
    ) -> ResponseDisposition {
        ResponseDisposition::Allow
    }

    fn did_receive_data(&self, _task: &TaskInfo, _data: Bytes) {}

    fn did_finish_collecting(&self, _task: &TaskInfo, _metrics: &TaskMetrics) {}

    fn did_complete(&self, _task: &TaskInfo, _error: Option<&TransportError>) {}
}

struct NoopDelegate;

impl SessionDelegate for NoopDelegate {}

/// Identity and progress of a task, as seen by delegates
#[derive(Debug)]
pub struct TaskInfo {
    id: u64,
    method: Method,
    url: Uri,
    response: RwLock<Option<ResponseHead>>,
}

impl TaskInfo {
    pub(crate) fn new(id: u64, method: Method, url: Uri) -> Self {
        Self {
            id,
            method,
            url,
            response: RwLock::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// URL of the original request
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// Latest response received for this task
    pub fn response(&self) -> Option<ResponseHead> {
        self.response.read().clone()
    }

    fn set_response(&self, response: ResponseHead) {
        *self.response.write() = Some(response);
    }
}

struct SessionInner {
    configuration: SessionConfiguration,
    delegate: Arc<dyn SessionDelegate>,
    tasks: DashMap<u64, CancellationToken>,
    next_task_id: AtomicU64,
    invalidated: AtomicBool,
}

/// Issues requests according to a [`SessionConfiguration`]
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(configuration: SessionConfiguration) -> Self {
        Self::with_delegate(configuration, Arc::new(NoopDelegate))
    }

    pub fn with_delegate(
        configuration: SessionConfiguration,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                configuration,
                delegate,
                tasks: DashMap::new(),
                next_task_id: AtomicU64::new(1),
                invalidated: AtomicBool::new(false),
            }),
        }
    }

    pub fn configuration(&self) -> &SessionConfiguration {
        &self.inner.configuration
    }

    /// Create a suspended task reporting to the session delegate
    pub fn data_task(&self, request: OutboundRequest) -> DataTask {
        self.make_task(request, Arc::clone(&self.inner.delegate))
    }

    /// Create a suspended task reporting to its own delegate
    pub fn data_task_with_delegate(
        &self,
        request: OutboundRequest,
        delegate: Arc<dyn SessionDelegate>,
    ) -> DataTask {
        self.make_task(request, delegate)
    }

    fn make_task(&self, request: OutboundRequest, delegate: Arc<dyn SessionDelegate>) -> DataTask {
        let id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed);
        let info = Arc::new(TaskInfo::new(id, request.method().clone(), request.uri().clone()));
        let token = CancellationToken::new();

        self.inner.tasks.insert(id, token.clone());
        if self.inner.invalidated.load(Ordering::Acquire) {
            token.cancel();
        }

        DataTask {
            info,
            session: Arc::clone(&self.inner),
            request: Mutex::new(Some(request)),
            delegate,
            token,
        }
    }

    /// Run a request to completion and collect the whole body
    pub async fn fetch(
        &self,
        request: OutboundRequest,
    ) -> std::result::Result<Response<Bytes>, TransportError> {
        let (tx, rx) = oneshot::channel();
        let task = self.data_task_with_delegate(request, Arc::new(FetchCollector::new(tx)));
        task.resume();

        rx.await.unwrap_or(Err(TransportError::Cancelled))
    }

    /// Cancel every outstanding task and refuse new ones
    pub fn invalidate_and_cancel(&self) {
        self.inner.invalidated.store(true, Ordering::Release);

        let tokens: Vec<CancellationToken> =
            self.inner.tasks.iter().map(|entry| entry.value().clone()).collect();
        for token in tokens {
            token.cancel();
        }
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(Ordering::Acquire)
    }

    /// Tasks created but not yet completed
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfiguration::default_config())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("configuration", &self.inner.configuration)
            .field("in_flight", &self.in_flight())
            .field("invalidated", &self.is_invalidated())
            .finish()
    }
}

impl tower::Service<OutboundRequest> for Session {
    type Response = Response<Bytes>;
    type Error = TransportError;
    type Future = BoxFuture<'static, std::result::Result<Response<Bytes>, TransportError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        if self.is_invalidated() {
            Poll::Ready(Err(TransportError::Cancelled))
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn call(&mut self, request: OutboundRequest) -> Self::Future {
        let session = self.clone();
        async move { session.fetch(request).await }.boxed()
    }
}

/// A single request issued through a [`Session`]
pub struct DataTask {
    info: Arc<TaskInfo>,
    session: Arc<SessionInner>,
    request: Mutex<Option<OutboundRequest>>,
    delegate: Arc<dyn SessionDelegate>,
    token: CancellationToken,
}

impl DataTask {
    pub fn id(&self) -> u64 {
        self.info.id
    }

    pub fn info(&self) -> &Arc<TaskInfo> {
        &self.info
    }

    /// Start the task on the current tokio runtime. Later calls do nothing.
    pub fn resume(&self) {
        let Some(request) = self.request.lock().take() else {
            return;
        };

        let driver = TaskDriver {
            info: Arc::clone(&self.info),
            session: Arc::clone(&self.session),
            delegate: Arc::clone(&self.delegate),
            token: self.token.clone(),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(driver.run(request));
            }
            Err(e) => {
                warn!(task = self.info.id, "No async runtime to drive task: {}", e);
                driver.finish(&Timing::start(), Some(TransportError::Unavailable(e.to_string())));
                self.session.tasks.remove(&self.info.id);
            }
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for DataTask {
    fn drop(&mut self) {
        // Never resumed: nothing else will deregister it
        if self.request.get_mut().is_some() {
            self.session.tasks.remove(&self.info.id);
        }
    }
}

struct TaskDriver {
    info: Arc<TaskInfo>,
    session: Arc<SessionInner>,
    delegate: Arc<dyn SessionDelegate>,
    token: CancellationToken,
}

impl TaskDriver {
    async fn run(self, request: OutboundRequest) {
        if self.token.is_cancelled() {
            self.finish(&Timing::start(), Some(TransportError::Cancelled));
        } else {
            let claimant = self
                .session
                .configuration
                .handlers()
                .into_iter()
                .find(|handler| handler.can_handle(&request));

            match claimant {
                Some(handler) => self.run_claimed(handler, request).await,
                None => self.run_network(request).await,
            }
        }

        self.session.tasks.remove(&self.info.id);
    }

    async fn run_network(&self, request: OutboundRequest) {
        let mut timing = Timing::start();
        let transport = Arc::clone(self.session.configuration.transport());

        let sent = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TransportError::Cancelled),
            sent = transport.send(request) => sent,
        };

        let TransportResponse { head, mut body } = match sent {
            Ok(response) => response,
            Err(e) => {
                self.finish(&timing, Some(e));
                return;
            }
        };

        timing.mark_first_byte();
        self.info.set_response(head.clone());
        if self.delegate.did_receive_response(&self.info, &head) == ResponseDisposition::Cancel {
            self.finish(&timing, Some(TransportError::Cancelled));
            return;
        }

        let error = loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break Some(TransportError::Cancelled),
                next = body.next() => match next {
                    Some(Ok(chunk)) => {
                        timing.record_chunk(chunk.len());
                        self.delegate.did_receive_data(&self.info, chunk);
                    }
                    Some(Err(e)) => break Some(e),
                    None => break None,
                },
            }
        };

        self.finish(&timing, error);
    }

    async fn run_claimed(&self, handler: HandlerType, request: OutboundRequest) {
        debug!(task = self.info.id, handler = handler.name(), "Request claimed");

        let (done_tx, done_rx) = oneshot::channel();
        let client = Arc::new(TaskClient {
            info: Arc::clone(&self.info),
            delegate: Arc::clone(&self.delegate),
            token: self.token.clone(),
            state: Mutex::new(ClientState {
                timing: Timing::start(),
                response_delivered: false,
                finished: false,
                done: Some(done_tx),
            }),
        });

        let context = LoadContext {
            configuration: self.session.configuration.clone(),
        };
        let mut loader =
            handler.create(request, Arc::clone(&client) as Arc<dyn LoaderClient>, context);
        loader.start();

        let cancelled = tokio::select! {
            _ = done_rx => false,
            _ = self.token.cancelled() => true,
        };

        let closed = if cancelled { client.close() } else { None };
        loader.stop();

        if let Some(metrics) = closed {
            self.delegate.did_finish_collecting(&self.info, &metrics);
            self.delegate.did_complete(&self.info, Some(&TransportError::Cancelled));
        }
    }

    fn finish(&self, timing: &Timing, error: Option<TransportError>) {
        if let Some(e) = &error {
            debug!(task = self.info.id, "Task failed: {}", e);
        }
        self.delegate.did_finish_collecting(&self.info, &timing.metrics());
        self.delegate.did_complete(&self.info, error.as_ref());
    }
}

/// Turns a claiming loader's callbacks into delegate events.
///
/// Delegate calls happen under the state lock, so `close` cannot interleave
/// with a relay in progress.
struct TaskClient {
    info: Arc<TaskInfo>,
    delegate: Arc<dyn SessionDelegate>,
    token: CancellationToken,
    state: Mutex<ClientState>,
}

struct ClientState {
    timing: Timing,
    response_delivered: bool,
    finished: bool,
    done: Option<oneshot::Sender<()>>,
}

impl TaskClient {
    fn complete(&self, error: Option<TransportError>) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;

        self.delegate.did_finish_collecting(&self.info, &state.timing.metrics());
        self.delegate.did_complete(&self.info, error.as_ref());

        if let Some(done) = state.done.take() {
            let _ = done.send(());
        }
    }

    /// Stop relaying. Returns the metrics when this call ended the task.
    fn close(&self) -> Option<TaskMetrics> {
        let mut state = self.state.lock();
        if state.finished {
            return None;
        }
        state.finished = true;
        Some(state.timing.metrics())
    }
}

impl LoaderClient for TaskClient {
    fn did_receive_response(&self, response: &ResponseHead, _policy: CachePolicy) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        state.timing.mark_first_byte();
        self.info.set_response(response.clone());

        // A loader may repeat the response at completion; the delegate sees it once
        if !state.response_delivered {
            state.response_delivered = true;
            let disposition = self.delegate.did_receive_response(&self.info, response);
            if disposition == ResponseDisposition::Cancel {
                self.token.cancel();
            }
        }
    }

    fn did_load_data(&self, data: Bytes) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        state.timing.record_chunk(data.len());
        self.delegate.did_receive_data(&self.info, data);
    }

    fn did_fail(&self, error: TransportError) {
        self.complete(Some(error));
    }

    fn did_finish_loading(&self) {
        self.complete(None);
    }
}

/// Collects a whole response for [`Session::fetch`]
struct FetchCollector {
    body: Mutex<BytesMut>,
    done: Mutex<Option<oneshot::Sender<std::result::Result<Response<Bytes>, TransportError>>>>,
}

impl FetchCollector {
    fn new(done: oneshot::Sender<std::result::Result<Response<Bytes>, TransportError>>) -> Self {
        Self {
            body: Mutex::new(BytesMut::new()),
            done: Mutex::new(Some(done)),
        }
    }
}

impl SessionDelegate for FetchCollector {
    fn did_receive_data(&self, _task: &TaskInfo, data: Bytes) {
        self.body.lock().extend_from_slice(&data);
    }

    fn did_complete(&self, task: &TaskInfo, error: Option<&TransportError>) {
        let result = match (error, task.response()) {
            (Some(e), _) => Err(e.clone()),
            (None, Some(head)) => Ok(head.into_response(self.body.lock().split().freeze())),
            (None, None) => Err(TransportError::Transfer {
                url: task.url().to_string(),
                message: "Completed without a response".to_string(),
            }),
        };

        if let Some(done) = self.done.lock().take() {
            let _ = done.send(result);
        }
    }
}

struct Timing {
    fetch_start: DateTime<Utc>,
    started: Instant,
    first_byte: Option<Duration>,
    bytes: u64,
    chunks: u64,
}

impl Timing {
    fn start() -> Self {
        Self {
            fetch_start: Utc::now(),
            started: Instant::now(),
            first_byte: None,
            bytes: 0,
            chunks: 0,
        }
    }

    fn mark_first_byte(&mut self) {
        if self.first_byte.is_none() {
            self.first_byte = Some(self.started.elapsed());
        }
    }

    fn record_chunk(&mut self, len: usize) {
        self.bytes += len as u64;
        self.chunks += 1;
    }

    fn metrics(&self) -> TaskMetrics {
        TaskMetrics {
            fetch_start: self.fetch_start,
            time_to_first_byte: self.first_byte,
            total: self.started.elapsed(),
            bytes_received: self.bytes,
            chunks_received: self.chunks,
        }
    }
}
