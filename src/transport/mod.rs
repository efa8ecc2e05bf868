// src/transport/mod.rs
//! The application's networking stack
//!
//! Request flow for a [`Session`]:
//!
//! ```text
//! Session::data_task ─► SessionConfiguration::handlers()
//!                          │
//!                          ├─ claimed ──► ProtocolLoader ──► LoaderClient ─┐
//!                          │                                                ├─► SessionDelegate
//!                          └─ unclaimed ► Transport (network) ─────────────┘
//! ```
//!
//! - **Configuration**: handler list and transport, patched by the registry
//! - **Protocol**: claimant handler traits and the loader callback interface
//! - **Network**: black-box "send request, stream response" capability
//! - **Session**: task dispatch, cancellation and delegate delivery

pub mod configuration;
pub mod network;
pub mod protocol;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use configuration::{ConfigurationKind, SessionConfiguration};
pub use network::{BodyStream, ReqwestTransport, Transport, TransportResponse};
pub use protocol::{HandlerType, LoadContext, LoaderClient, ProtocolHandler, ProtocolLoader};
pub use session::{DataTask, Session, SessionDelegate, TaskInfo};
pub use types::{
    flatten_headers, CachePolicy, OutboundRequest, ResponseDisposition, ResponseHead, TaskMetrics,
    TransportError,
};
