// src/interception/mod.rs
//! Request interception layer
//!
//! - **Registry**: process-wide, install-once hook that puts the interceptor
//!   ahead of every default and ephemeral configuration's handlers
//! - **HTTP Interceptor**: claims http(s) requests, logs them and forwards a
//!   marked copy through a private session
//! - **Session Delegate**: relays the forwarded task's events back to the
//!   original caller and records completion
//!
//! # Architecture
//!
//! ```text
//! Application Session (unmodified)
//!     │
//!     ├─ http(s), unmarked ─► HttpInterceptor ─► forwarding Session ─► Transport
//!     │                                              │
//!     │                       ForwardingDelegate ◄───┘
//!     │
//!     └─ anything else ─────► next claimant or Transport
//! ```

pub mod http_interceptor;
pub mod registry;
pub mod session_delegate;

// Re-export commonly used types
pub use http_interceptor::{HttpInterceptor, InterceptingLoader};
pub use registry::{TransportRegistry, TransportRegistryBuilder};
pub use session_delegate::ForwardingDelegate;
