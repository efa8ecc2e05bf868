// src/recording/log_store.rs
//! Append-only store of intercepted request records
//!
//! Each forwarded request produces two entries sharing a `request_id`: a
//! pending one when forwarding starts and a completed one when it ends.
//! Entries are never merged or modified in place.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use ulid::Ulid;

static SHARED: OnceCell<Arc<LogStore>> = OnceCell::new();

/// One record of an intercepted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Shared by the pending and completed records of one request
    pub request_id: Ulid,

    pub started_at: DateTime<Utc>,

    /// Absent while pending
    pub ended_at: Option<DateTime<Utc>>,

    pub method: String,

    /// Absolute request URL
    pub url: String,

    /// Absent if no response was received
    pub status: Option<u16>,

    pub request_headers: BTreeMap<String, String>,

    pub response_headers: BTreeMap<String, String>,

    /// Elapsed seconds, set on completion
    pub duration: Option<f64>,

    /// Failure description for transfers that did not finish
    pub error: Option<String>,
}

impl LogEntry {
    pub fn pending(
        request_id: Ulid,
        started_at: DateTime<Utc>,
        method: impl Into<String>,
        url: impl Into<String>,
        request_headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            request_id,
            started_at,
            ended_at: None,
            method: method.into(),
            url: url.into(),
            status: None,
            request_headers,
            response_headers: BTreeMap::new(),
            duration: None,
            error: None,
        }
    }

    /// The completed counterpart of a pending entry
    pub fn completed(
        &self,
        ended_at: DateTime<Utc>,
        status: Option<u16>,
        response_headers: BTreeMap<String, String>,
        duration: f64,
        error: Option<String>,
    ) -> Self {
        Self {
            ended_at: Some(ended_at),
            status,
            response_headers,
            duration: Some(duration),
            error,
            ..self.clone()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn is_completed(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Thread-safe, append-only collection of [`LogEntry`] values
#[derive(Debug, Default)]
pub struct LogStore {
    entries: RwLock<VecDeque<LogEntry>>,

    /// Oldest entries are evicted beyond this; `None` keeps everything
    max_entries: Option<usize>,

    appended: AtomicU64,
}

impl LogStore {
    /// Unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that evicts its oldest entries past `max_entries`
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            ..Self::default()
        }
    }

    /// The process-wide store used by the default interceptor
    pub fn shared() -> &'static Arc<LogStore> {
        SHARED.get_or_init(|| Arc::new(LogStore::new()))
    }

    /// Size the process-wide store before its first use.
    ///
    /// Returns `false` if the shared store already exists.
    pub fn configure_shared(max_entries: Option<usize>) -> bool {
        let store = match max_entries {
            Some(max) => LogStore::with_max_entries(max),
            None => LogStore::new(),
        };
        SHARED.set(Arc::new(store)).is_ok()
    }

    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.write();
        entries.push_back(entry);

        if let Some(max) = self.max_entries {
            while entries.len() > max {
                entries.pop_front();
            }
        }
        drop(entries);

        let total = self.appended.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(total, "Log entry appended");
    }

    /// Current contents in append order
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entries appended over the store's lifetime, including evicted ones
    pub fn total_appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.is_completed())
            .cloned()
            .collect()
    }

    /// One entry per request: the most recent record, positioned where the
    /// request first appeared.
    pub fn latest_by_request(&self) -> Vec<LogEntry> {
        let entries = self.snapshot();
        let mut positions: HashMap<Ulid, usize> = HashMap::new();
        let mut latest: Vec<LogEntry> = Vec::new();

        for entry in entries {
            match positions.get(&entry.request_id) {
                Some(&index) => latest[index] = entry,
                None => {
                    positions.insert(entry.request_id, latest.len());
                    latest.push(entry);
                }
            }
        }

        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn pending(url: &str) -> LogEntry {
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), "*/*".to_string());
        LogEntry::pending(Ulid::new(), Utc::now(), "GET", url, headers)
    }

    #[test]
    fn test_store_creation() {
        let store = LogStore::new();
        assert!(store.is_empty());
        assert_eq!(store.total_appended(), 0);
    }

    #[test]
    fn test_append_preserves_order() {
        let store = LogStore::new();
        store.append(pending("http://a.example/"));
        store.append(pending("http://b.example/"));
        store.append(pending("http://c.example/"));

        let urls: Vec<_> = store.snapshot().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["http://a.example/", "http://b.example/", "http://c.example/"]);
    }

    #[test]
    fn test_completed_entry_is_appended_alongside_pending() {
        let store = LogStore::new();
        let entry = pending("http://a.example/");
        store.append(entry.clone());
        store.append(entry.completed(Utc::now(), Some(200), BTreeMap::new(), 0.25, None));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[0].is_pending());
        assert!(snapshot[1].is_completed());
        assert_eq!(snapshot[0].request_id, snapshot[1].request_id);
        assert_eq!(snapshot[1].request_headers, entry.request_headers);
        assert_eq!(store.completed().len(), 1);
    }

    #[test]
    fn test_latest_by_request() {
        let store = LogStore::new();
        let first = pending("http://a.example/");
        let second = pending("http://b.example/");
        store.append(first.clone());
        store.append(second.clone());
        store.append(first.completed(
            Utc::now(),
            None,
            BTreeMap::new(),
            1.0,
            Some("refused".into()),
        ));

        let latest = store.latest_by_request();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].request_id, first.request_id);
        assert!(latest[0].is_completed());
        assert_eq!(latest[0].error.as_deref(), Some("refused"));
        assert!(latest[1].is_pending());
    }

    #[test]
    fn test_max_entries_evicts_oldest() {
        let store = LogStore::with_max_entries(2);
        store.append(pending("http://a.example/"));
        store.append(pending("http://b.example/"));
        store.append(pending("http://c.example/"));

        let urls: Vec<_> = store.snapshot().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["http://b.example/", "http://c.example/"]);
        assert_eq!(store.total_appended(), 3);
    }

    #[test]
    fn test_concurrent_appends() {
        let store = Arc::new(LogStore::new());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for j in 0..100 {
                        store.append(pending(&format!("http://host{}.example/{}", i, j)));
                        let _ = store.snapshot();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 1000);
        assert_eq!(store.total_appended(), 1000);
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let entry = pending("http://a.example/");
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("startedAt").is_some());
        assert!(json.get("requestHeaders").is_some());
        assert!(json["endedAt"].is_null());
    }
}
