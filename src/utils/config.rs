// src/utils/config.rs
//! Sniffer configuration
//!
//! Values are layered by the `config` crate: built-in defaults, then an
//! optional `sniffer.{yaml,toml,json}` file (or an explicit path), then
//! `SNIFFER__*` environment variables, e.g. `SNIFFER__LOGGING__LEVEL=debug`.

use crate::recording::exporter::ExportFormat;
use crate::utils::errors::{Result, SnifferError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnifferConfig {
    pub logging: LoggingConfig,
    pub transport: TransportConfig,
    pub store: StoreConfig,
    pub export: ExportConfig,
}

/// Console logging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Settings for the network transport that performs forwarded requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Whole-request timeout (seconds)
    pub timeout_secs: u64,

    /// Redirects followed before the transfer fails
    pub max_redirects: usize,

    pub user_agent: String,
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_redirects: 10,
            user_agent: format!("net-sniffer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Log store sizing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Oldest entries are evicted beyond this many; unbounded when absent
    pub max_entries: Option<usize>,
}

/// Snapshot export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub format: ExportFormat,

    /// Write the export here instead of stdout
    pub path: Option<PathBuf>,
}

impl SnifferConfig {
    /// Load from `./sniffer.*` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from an explicit file (which must exist) and the environment
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("sniffer").required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("SNIFFER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                SnifferError::ConfigError(format!("Failed to read configuration: {}", e))
            })?;

        settings
            .try_deserialize()
            .map_err(|e| SnifferError::ConfigError(format!("Invalid configuration: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = SnifferConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.transport.timeout(), Duration::from_secs(30));
        assert_eq!(config.transport.max_redirects, 10);
        assert!(config.store.max_entries.is_none());
        assert_eq!(config.export.format, ExportFormat::Json);
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "logging:\n  level: debug\n\
             transport:\n  timeout_secs: 5\n\
             store:\n  max_entries: 100\n\
             export:\n  format: har"
        )
        .unwrap();

        let config = SnifferConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.transport.timeout_secs, 5);
        // Unspecified fields keep their defaults
        assert_eq!(config.transport.max_redirects, 10);
        assert_eq!(config.store.max_entries, Some(100));
        assert_eq!(config.export.format, ExportFormat::Har);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        let result = SnifferConfig::load_from(Some(&missing));
        assert!(matches!(result, Err(SnifferError::ConfigError(_))));
    }
}
