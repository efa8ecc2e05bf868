// src/transport/protocol.rs
//! Claimant handlers
//!
//! A session consults its configuration's handler list before touching the
//! network. The first [`ProtocolHandler`] whose `can_handle` accepts a request
//! claims it and creates a [`ProtocolLoader`], which reports progress to the
//! session through a [`LoaderClient`].

use crate::transport::configuration::SessionConfiguration;
use crate::transport::types::{CachePolicy, OutboundRequest, ResponseHead, TransportError};
use bytes::Bytes;
use std::sync::Arc;

/// A registered handler type
pub type HandlerType = Arc<dyn ProtocolHandler>;

/// Type-level side of a claimant: the filter plus a loader factory
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Identity used to deduplicate and remove handlers from a list
    fn name(&self) -> &'static str;

    fn can_handle(&self, request: &OutboundRequest) -> bool;

    fn create(
        &self,
        request: OutboundRequest,
        client: Arc<dyn LoaderClient>,
        context: LoadContext,
    ) -> Box<dyn ProtocolLoader>;
}

/// One claimed request.
///
/// Owned by the dispatching session for the lifetime of the request.
pub trait ProtocolLoader: Send {
    fn start(&mut self);

    /// Cancel the work. Safe before `start` and after completion; no client
    /// callback may follow once this returns.
    fn stop(&mut self);
}

/// Callbacks a loader emits towards the original caller
pub trait LoaderClient: Send + Sync {
    fn did_receive_response(&self, response: &ResponseHead, policy: CachePolicy);

    fn did_load_data(&self, data: Bytes);

    fn did_fail(&self, error: TransportError);

    fn did_finish_loading(&self);
}

/// What a loader knows about the session that dispatched its request
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub configuration: SessionConfiguration,
}
