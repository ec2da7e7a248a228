// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

struct StubAdapter {
    name: String,
    tracker: Arc<AdapterStateTracker>,
}

impl StubAdapter {
    fn new(name: &str) -> Self {
        Self { name: name.to_owned(), tracker: AdapterStateTracker::new(name) }
    }
}

impl ProtocolAdapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate_config(&self) -> Result<(), AgentError> {
        Ok(())
    }

    fn connect(&self) -> Result<(), AgentError> {
        self.tracker.transition(AdapterState::Connected);
        Ok(())
    }

    fn disconnect(&self) {
        self.tracker.transition(AdapterState::Disconnected);
    }

    fn poll(&self) -> Result<Vec<Metric>, AgentError> {
        let metrics = vec![Metric::new("stub.count", 1i64)];
        self.tracker.record_poll(metrics.len());
        Ok(metrics)
    }

    fn stats(&self) -> AdapterStats {
        self.tracker.stats()
    }
}

#[test]
fn connect_and_poll_update_tracked_stats() {
    let adapter = StubAdapter::new("stub");
    adapter.connect().expect("connect never fails");
    let metrics = adapter.poll().expect("poll never fails");
    assert_eq!(metrics.len(), 1);

    let stats = adapter.stats();
    assert_eq!(stats.state, Some(AdapterState::Connected));
    assert_eq!(stats.polls, 1);
    assert_eq!(stats.metrics_emitted, 1);
}

#[test]
fn tracker_only_logs_on_actual_transitions() {
    let tracker = AdapterStateTracker::new("noisy");
    tracker.transition(AdapterState::Connecting);
    tracker.transition(AdapterState::Connecting);
    tracker.transition(AdapterState::Connected);
    assert_eq!(tracker.stats().state, Some(AdapterState::Connected));
}

#[test]
fn config_param_str_reads_string_values_only() {
    let config = AdapterConfig::new("mqtt").with_param("host", "localhost").with_param("port", 1883i64);
    assert_eq!(config.param_str("host"), Some("localhost"));
    assert_eq!(config.param_str("port"), None);
    assert_eq!(config.param_str("missing"), None);
}
