// src/interception/session_delegate.rs
//! Forwarding session delegate
//!
//! Receives the forwarding session's events, relays them to the original
//! caller and records the completed log entry. It only observes its loader:
//! once the loader is stopped or dropped every callback is a silent no-op.

use crate::interception::http_interceptor::LoaderShared;
use crate::observability::names;
use crate::transport::session::{SessionDelegate, TaskInfo};
use crate::transport::types::{
    flatten_headers, CachePolicy, ResponseDisposition, ResponseHead, TaskMetrics, TransportError,
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::{Arc, Weak};
use tracing::info;

pub struct ForwardingDelegate {
    owner: Weak<LoaderShared>,
}

impl ForwardingDelegate {
    pub(crate) fn new(owner: Weak<LoaderShared>) -> Self {
        Self { owner }
    }

    /// The loader, if it is still interested in events
    fn owner(&self) -> Option<Arc<LoaderShared>> {
        self.owner.upgrade().filter(|owner| owner.is_attached())
    }
}

impl SessionDelegate for ForwardingDelegate {
    fn did_receive_response(
        &self,
        _task: &TaskInfo,
        response: &ResponseHead,
    ) -> ResponseDisposition {
        if let Some(owner) = self.owner() {
            owner.relay(|client| client.did_receive_response(response, CachePolicy::NotAllowed));
        }
        ResponseDisposition::Allow
    }

    fn did_receive_data(&self, _task: &TaskInfo, data: Bytes) {
        let Some(owner) = self.owner() else {
            return;
        };
        owner.buffer_chunk(&data);
        owner.relay(|client| client.did_load_data(data));
    }

    fn did_finish_collecting(&self, _task: &TaskInfo, metrics: &TaskMetrics) {
        if let Some(owner) = self.owner() {
            owner.set_metrics(metrics.clone());
        }
    }

    fn did_complete(&self, task: &TaskInfo, error: Option<&TransportError>) {
        let Some(owner) = self.owner.upgrade() else {
            return;
        };

        let response = task.response();
        let status = response.as_ref().map(|r| r.status.as_u16());
        let duration = owner.started.elapsed().as_secs_f64();

        {
            // Held from the attachment check through the last relay, so a
            // concurrent stop either precedes the entry or follows the relays
            let slot = owner.client();
            let Some(client) = slot.as_deref() else {
                return;
            };

            // Record before relaying, so a caller that has seen completion also
            // sees the entry
            let completed = owner.pending_entry.completed(
                Utc::now(),
                status,
                response
                    .as_ref()
                    .map(|r| flatten_headers(&r.headers))
                    .unwrap_or_default(),
                duration,
                error.map(|e| e.to_string()),
            );
            owner.store.append(completed);

            // Terminal response may differ from the first one, e.g. after redirects
            if let Some(response) = &response {
                client.did_receive_response(response, CachePolicy::NotAllowed);
            }
            match error {
                Some(e) => client.did_fail(e.clone()),
                None => client.did_finish_loading(),
            }
        }

        match error {
            Some(_) => metrics::counter!(names::REQUESTS_FAILED).increment(1),
            None => metrics::counter!(names::REQUESTS_COMPLETED).increment(1),
        }
        metrics::histogram!(names::REQUEST_DURATION).record(duration);

        let status = status.map(i32::from).unwrap_or(-1);
        info!(
            direction = "inbound",
            method = %owner.method,
            url = %owner.url,
            status,
            duration,
            "← {} {} [{}] in {:.2}s",
            owner.method,
            owner.url,
            status,
            duration
        );
    }
}
