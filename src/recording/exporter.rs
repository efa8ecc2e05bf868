// src/recording/exporter.rs
//! Export log store snapshots
//!
//! Supports:
//! - JSON (every entry, pending and completed)
//! - HAR 1.2 (completed entries only, for browser devtools and proxies)
//! - YAML (every entry, for reading by eye)

use crate::recording::log_store::LogEntry;
use crate::utils::errors::{Result, SnifferError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,

    /// HTTP Archive
    Har,

    Yaml,
}

impl FromStr for ExportFormat {
    type Err = SnifferError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "har" => Ok(ExportFormat::Har),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            other => Err(SnifferError::ConfigError(format!(
                "Unknown export format: {}",
                other
            ))),
        }
    }
}

/// Exporter for log store snapshots
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    /// Export entries to string
    pub fn export(&self, entries: &[LogEntry]) -> Result<String> {
        debug!("Exporting {} entries to {:?} format", entries.len(), self.format);

        match self.format {
            ExportFormat::Json => self.export_json(entries),
            ExportFormat::Har => self.export_har(entries),
            ExportFormat::Yaml => self.export_yaml(entries),
        }
    }

    /// Export entries to a file, replacing it
    pub fn export_to_file(&self, entries: &[LogEntry], path: &Path) -> Result<()> {
        let rendered = self.export(entries)?;
        std::fs::write(path, rendered).map_err(|e| {
            SnifferError::ExportFailed(format!("Failed to write {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), entries = entries.len(), "Log exported");
        Ok(())
    }

    fn export_json(&self, entries: &[LogEntry]) -> Result<String> {
        serde_json::to_string_pretty(entries).map_err(|e| {
            SnifferError::ExportFailed(format!("JSON serialization error: {}", e))
        })
    }

    fn export_yaml(&self, entries: &[LogEntry]) -> Result<String> {
        serde_yaml::to_string(entries).map_err(|e| {
            SnifferError::ExportFailed(format!("YAML serialization error: {}", e))
        })
    }

    fn export_har(&self, entries: &[LogEntry]) -> Result<String> {
        let har = HarDocument {
            log: HarLog {
                version: "1.2".to_string(),
                creator: HarCreator {
                    name: "net-sniffer".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                entries: entries
                    .iter()
                    .filter(|e| e.is_completed())
                    .map(HarEntry::from)
                    .collect(),
            },
        };

        serde_json::to_string_pretty(&har).map_err(|e| {
            SnifferError::ExportFailed(format!("HAR serialization error: {}", e))
        })
    }
}

// HAR format structures
#[derive(Serialize)]
struct HarDocument {
    log: HarLog,
}

#[derive(Serialize)]
struct HarLog {
    version: String,
    creator: HarCreator,
    entries: Vec<HarEntry>,
}

#[derive(Serialize)]
struct HarCreator {
    name: String,
    version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarEntry {
    started_date_time: String,

    /// Milliseconds
    time: f64,

    request: HarRequest,
    response: HarResponse,

    #[serde(rename = "_error", skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarRequest {
    method: String,
    url: String,
    http_version: String,
    headers: Vec<HarHeader>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarResponse {
    /// 0 when no response was received
    status: u16,
    status_text: String,
    headers: Vec<HarHeader>,
}

#[derive(Serialize)]
struct HarHeader {
    name: String,
    value: String,
}

impl From<&LogEntry> for HarEntry {
    fn from(entry: &LogEntry) -> Self {
        let status = entry.status.unwrap_or(0);
        let status_text = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();

        HarEntry {
            started_date_time: entry.started_at.to_rfc3339(),
            time: entry.duration.unwrap_or(0.0) * 1000.0,
            request: HarRequest {
                method: entry.method.clone(),
                url: entry.url.clone(),
                http_version: "HTTP/1.1".to_string(),
                headers: har_headers(&entry.request_headers),
            },
            response: HarResponse {
                status,
                status_text,
                headers: har_headers(&entry.response_headers),
            },
            error: entry.error.clone(),
        }
    }
}

fn har_headers(headers: &BTreeMap<String, String>) -> Vec<HarHeader> {
    headers
        .iter()
        .map(|(name, value)| HarHeader {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}
