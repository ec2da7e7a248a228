// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform lifecycle and configuration for protocol adapters (MQTT, CAN).
//! Adapters are constructed directly by the stream that needs them (see
//! `stream::can`) from wire-supplied configuration; there is no shared
//! adapter registry.

pub mod can;
pub mod mqtt;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::AgentError;
use crate::value::Value;

pub use can::CanAdapter;
pub use mqtt::MqttAdapter;

/// Free-form name + parameter bag shared by every adapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub name: String,
    pub params: BTreeMap<String, Value>,
}

impl AdapterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), params: BTreeMap::new() }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        match self.params.get(key) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Adapter connection state, with transition logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl AdapterState {
    fn label(self) -> &'static str {
        match self {
            AdapterState::Disconnected => "disconnected",
            AdapterState::Connecting => "connecting",
            AdapterState::Connected => "connected",
            AdapterState::Reconnecting => "reconnecting",
            AdapterState::Error => "error",
        }
    }
}

/// A single unit of adapter output, distinct from a [`crate::point::Point`]
/// in that it has not yet been timestamped/forwarded by the stream manager.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: Value,
    pub tags: Option<BTreeMap<String, String>>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { name: name.into(), value: value.into(), tags: None }
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = Some(tags);
        self
    }
}

/// Read-only view of an adapter's lifecycle counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterStats {
    pub state: Option<AdapterState>,
    pub last_error: Option<String>,
    pub polls: u64,
    pub metrics_emitted: u64,
}

/// Shared state/stats tracking used by every adapter implementation.
pub struct AdapterStateTracker {
    name: String,
    inner: Mutex<AdapterStats>,
}

impl AdapterStateTracker {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into(), inner: Mutex::new(AdapterStats::default()) })
    }

    pub fn transition(&self, state: AdapterState) {
        let mut stats = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let prev = stats.state;
        stats.state = Some(state);
        drop(stats);
        match prev {
            Some(prev) if prev != state => {
                info!(adapter = %self.name, from = prev.label(), to = state.label(), "adapter state transition");
            }
            None => debug!(adapter = %self.name, to = state.label(), "adapter state transition"),
            _ => {}
        }
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut stats = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        stats.last_error = Some(message);
    }

    pub fn record_poll(&self, emitted: usize) {
        let mut stats = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        stats.polls += 1;
        stats.metrics_emitted += emitted as u64;
    }

    pub fn stats(&self) -> AdapterStats {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// The lifecycle every protocol adapter implements.
pub trait ProtocolAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn validate_config(&self) -> Result<(), AgentError>;

    fn connect(&self) -> Result<(), AgentError>;

    fn disconnect(&self);

    /// Poll for new metrics. Expected to block briefly (implementations
    /// should cap internal waits, e.g. 100 ms for CAN) and run on a
    /// worker thread, never on the main scheduling loop.
    fn poll(&self) -> Result<Vec<Metric>, AgentError>;

    /// Optional outbound send; adapters without a send path accept and
    /// discard (e.g. a read-only sensor bridge).
    fn send(&self, _metric: &Metric) -> Result<(), AgentError> {
        Ok(())
    }

    fn stats(&self) -> AdapterStats;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
