// src/utils/mod.rs
//! Shared utilities: crate-wide errors and configuration loading.

pub mod config;
pub mod errors;

pub use config::{ExportConfig, LoggingConfig, SnifferConfig, StoreConfig, TransportConfig};
pub use errors::{Result, SnifferError};
