// src/recording/mod.rs
//! Request log recording and export
//!
//! - **Log Store**: concurrent, append-only record of intercepted requests
//! - **Exporter**: render a snapshot as JSON, HAR or YAML
//!
//! # Architecture
//!
//! ```text
//! InterceptingLoader::start ──► append(pending) ─┐
//!                                                 ├─► LogStore ──► snapshot() ──► Exporter
//! ForwardingDelegate::did_complete ► append(completed) ┘
//! ```
//!
//! The store takes its own lock and never shares one with installation state.

pub mod exporter;
pub mod log_store;

// Re-export commonly used types
pub use exporter::{ExportFormat, Exporter};
pub use log_store::{LogEntry, LogStore};
