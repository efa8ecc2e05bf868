// src/utils/errors.rs
//! Crate-level error type

use crate::transport::TransportError;
use thiserror::Error;

/// Errors raised by the sniffer outside of a single request's lifecycle.
///
/// Per-request failures travel as [`TransportError`] and are relayed to the
/// original caller unchanged; this type covers setup, configuration and export.
#[derive(Debug, Error)]
pub enum SnifferError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Observability setup failed: {0}")]
    ObservabilityFailed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SnifferError>;
