// src/observability/mod.rs
//! Tracing and metrics setup
//!
//! Logging goes through `tracing`; `RUST_LOG` overrides the configured level.
//! Counters and the duration histogram are emitted through the `metrics`
//! facade and rendered by a Prometheus recorder when one is installed.

use crate::utils::config::LoggingConfig;
use crate::utils::errors::{Result, SnifferError};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// Metric names
pub mod names {
    pub const REQUESTS_INTERCEPTED: &str = "sniffer_requests_intercepted_total";
    pub const REQUESTS_COMPLETED: &str = "sniffer_requests_completed_total";
    pub const REQUESTS_FAILED: &str = "sniffer_requests_failed_total";

    /// Seconds from forwarding to completion
    pub const REQUEST_DURATION: &str = "sniffer_request_duration_seconds";
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            SnifferError::ConfigError(format!("Invalid log level {:?}: {}", config.level, e))
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| SnifferError::ObservabilityFailed(format!("Tracing init failed: {}", e)))
}

/// Install the global Prometheus recorder and describe the sniffer metrics
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| SnifferError::ObservabilityFailed(format!("Metrics init failed: {}", e)))?;

    metrics::describe_counter!(names::REQUESTS_INTERCEPTED, "Requests claimed by the interceptor");
    metrics::describe_counter!(names::REQUESTS_COMPLETED, "Forwarded requests that finished");
    metrics::describe_counter!(names::REQUESTS_FAILED, "Forwarded requests that failed");
    metrics::describe_histogram!(
        names::REQUEST_DURATION,
        metrics::Unit::Seconds,
        "Time from forwarding to completion"
    );

    Ok(handle)
}
