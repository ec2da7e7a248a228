// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated HTTP ingest client: batches points to `/api/ingest` with
//! retry/backoff, draining the local buffer head-of-batch on every send.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::buffer::Buffer;
use crate::error::AgentError;
use crate::point::Point;
use crate::retry::{classify_status, RetryPolicy, StatusClass};

#[derive(Serialize)]
struct IngestBody<'a> {
    points: &'a [Point],
}

#[derive(Serialize)]
struct SessionEvent<'a> {
    session_id: &'a str,
    source_id: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a std::collections::BTreeMap<String, String>>,
    timestamp: i64,
}

/// HTTP client for the telemetry backend's ingest and session endpoints.
pub struct IngestClient {
    base_url: String,
    api_key: String,
    source_id: String,
    client: Client,
    policy: RetryPolicy,
    buffer: Arc<dyn Buffer>,
    /// Points that failed to persist to `buffer` (durable I/O error). Held in
    /// memory and retried as part of the next batch until the buffer accepts
    /// them, per the buffer-failure-is-transport-equivalent rule.
    shadow: Mutex<Vec<Point>>,
    /// Active session id, if any. A reentrant-safe, non-nestable scope: see
    /// [`IngestClient::begin_session`].
    current_session: Mutex<Option<String>>,
}

impl IngestClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, source_id: impl Into<String>, buffer: Arc<dyn Buffer>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            source_id: source_id.into(),
            client,
            policy: RetryPolicy::default(),
            buffer,
            shadow: Mutex::new(Vec::new()),
            current_session: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// The session id currently in scope, if any.
    pub fn active_session(&self) -> Option<String> {
        self.current_session.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Begin a session scope. Reentrant-safe but not nestable: a nested call
    /// replaces the current id and the guard restores the *previous* id
    /// (not necessarily `None`) when dropped, on every exit path including
    /// unwind.
    pub fn begin_session(self: &Arc<Self>, session_id: impl Into<String>) -> SessionGuard {
        let session_id = session_id.into();
        let previous = {
            let mut guard = self.current_session.lock().unwrap_or_else(|e| e.into_inner());
            let previous = guard.clone();
            *guard = Some(session_id.clone());
            previous
        };
        let client = Arc::clone(self);
        let client_for_event = Arc::clone(self);
        let session_id_for_event = session_id.clone();
        tokio::spawn(async move {
            client_for_event.post_session_event(&session_id_for_event, "started").await;
        });
        SessionGuard { client, previous }
    }

    async fn post_session_event(&self, session_id: &str, status: &'static str) {
        let body = SessionEvent {
            session_id,
            source_id: &self.source_id,
            status,
            tags: None,
            timestamp: crate::point::current_millis(),
        };
        let req = self
            .client
            .post(self.url("/api/sessions"))
            .header("x-api-key", &self.api_key)
            .json(&body);
        if let Err(e) = req.send().await {
            warn!(err = %e, session_id, "session event post failed");
        }
    }

    /// Send a batch of points, prepending any buffered backlog (durable or
    /// in-memory shadow) ahead of the new points. On success the buffer and
    /// shadow are cleared. On retry exhaustion the new points (not the
    /// prepended backlog, already accounted for) are appended to the buffer;
    /// if that write itself fails, they're retained in the in-memory shadow
    /// instead, to be retried on the next call. The last delivery error is
    /// returned either way.
    pub async fn send(&self, points: Vec<Point>) -> Result<(), AgentError> {
        let mut batch = self.take_shadow();
        batch.extend(self.buffer.snapshot());
        let new_start = batch.len();
        batch.extend(points);

        let mut last_err: Option<AgentError> = None;
        for attempt in 0..=self.policy.max_retries {
            match self.post_once(&batch).await {
                Ok(()) => {
                    self.buffer.clear();
                    self.shadow.lock().unwrap_or_else(|e| e.into_inner()).clear();
                    return Ok(());
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    last_err = Some(e);
                    if !retryable || attempt == self.policy.max_retries {
                        break;
                    }
                    let delay = self.policy.delay_for_attempt(attempt);
                    debug!(attempt, ?delay, "ingest post failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let new_points: Vec<Point> = batch.into_iter().skip(new_start).collect();
        if !new_points.is_empty() {
            if let Err(e) = self.buffer.add(&new_points) {
                warn!(err = %e, count = new_points.len(), "buffer write failed, retaining points in memory");
                self.shadow.lock().unwrap_or_else(|e| e.into_inner()).extend(new_points);
            }
        }
        Err(last_err.unwrap_or_else(|| AgentError::Transport("ingest failed with no recorded error".into())))
    }

    fn take_shadow(&self) -> Vec<Point> {
        std::mem::take(&mut *self.shadow.lock().unwrap_or_else(|e| e.into_inner()))
    }

    async fn post_once(&self, points: &[Point]) -> Result<(), AgentError> {
        let body = IngestBody { points };
        let resp = self
            .client
            .post(self.url("/api/ingest"))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        match classify_status(status) {
            StatusClass::Success => Ok(()),
            StatusClass::Retryable => Err(AgentError::Transport(format!("ingest endpoint returned {status}"))),
            StatusClass::Permanent if status == 401 || status == 403 => {
                Err(AgentError::Authentication(format!("ingest endpoint returned {status}")))
            }
            StatusClass::Permanent => Err(AgentError::Validation(format!("ingest endpoint returned {status}"))),
        }
    }
}

/// RAII guard for an ingest session scope. Restores the previously-active
/// session id (possibly `None`) on drop, on every exit path including panics.
pub struct SessionGuard {
    client: Arc<IngestClient>,
    previous: Option<String>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let ended = {
            let mut guard = self.client.current_session.lock().unwrap_or_else(|e| e.into_inner());
            let ended = guard.clone();
            *guard = self.previous.take();
            ended
        };
        if let Some(session_id) = ended {
            let client = Arc::clone(&self.client);
            tokio::spawn(async move {
                client.post_session_event(&session_id, "ended").await;
            });
        }
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
