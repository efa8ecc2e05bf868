// src/lib.rs
//! Net Sniffer Library
//!
//! Transparent logging of outbound HTTP(S) traffic. After [`start`], every
//! request issued through a default or ephemeral [`Session`] is claimed by
//! the interceptor, recorded in the shared [`LogStore`] and forwarded
//! unchanged; the caller sees the same responses, bodies and errors it would
//! have seen without interception.
//!
//! # Architecture
//!
//! - **transport**: sessions, configurations, claimant handlers, the network
//! - **interception**: install hook, intercepting handler, forwarding delegate
//! - **recording**: append-only log store and exporters
//! - **observability**: tracing and metrics setup
//! - **utils**: errors and configuration
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use net_sniffer::{LogStore, Session};
//!
//! net_sniffer::start();
//!
//! let request = http::Request::get("https://example.com/").body(bytes::Bytes::new())?;
//! Session::default().fetch(request).await?;
//!
//! for entry in LogStore::shared().latest_by_request() {
//!     println!("{} {} {:?}", entry.method, entry.url, entry.status);
//! }
//! # Ok(())
//! # }
//! ```

// Public module exports
pub mod interception;
pub mod observability;
pub mod recording;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use interception::{HttpInterceptor, TransportRegistry};
pub use recording::{ExportFormat, Exporter, LogEntry, LogStore};
pub use transport::{
    ConfigurationKind, DataTask, ReqwestTransport, Session, SessionConfiguration, SessionDelegate,
    Transport, TransportError,
};
pub use utils::config::SnifferConfig;
pub use utils::errors::{Result, SnifferError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the interceptor into the process-wide registry.
///
/// Idempotent and safe to call from any thread; only the first call has an
/// effect. Returns whether this call performed the installation. Sessions
/// created from default or ephemeral configurations afterwards are logged
/// into [`LogStore::shared`].
pub fn start() -> bool {
    TransportRegistry::global().try_install_once(HttpInterceptor::shared())
}
