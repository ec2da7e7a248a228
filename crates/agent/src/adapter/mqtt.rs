// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MQTT protocol adapter. Subscribes to a topic filter and rewrites each
//! message into zero or more [`Metric`]s.
//!
//! Topic -> metric name: `/` becomes `.` (`sensors/rpm` -> `sensors.rpm`).
//! JSON object payloads are flattened one level, keyed `<topic>.<key>`.
//! JSON arrays pass through as a [`Value::List`]. Anything else is treated
//! as a scalar and coerced via [`Value::coerce_numeric_string`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{Client, Event, Incoming, MqttOptions, QoS};
use tracing::{debug, warn};

use super::{AdapterConfig, AdapterState, AdapterStateTracker, AdapterStats, Metric, ProtocolAdapter};
use crate::error::AgentError;
use crate::value::Value;

const DEFAULT_PORT: u16 = 1883;
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Rewrite an MQTT topic into a metric-name prefix.
pub fn topic_to_metric_prefix(topic: &str) -> String {
    topic.replace('/', ".")
}

/// Decode one MQTT payload into the metrics it expands to, rooted at
/// `prefix` (the rewritten topic).
pub fn payload_to_metrics(prefix: &str, payload: &[u8]) -> Vec<Metric> {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(_) => return vec![Metric::new(prefix, Value::String(format!("<{} bytes binary>", payload.len())))],
    };

    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| Metric::new(format!("{prefix}.{key}"), json_to_value(value)))
            .collect(),
        Ok(serde_json::Value::Array(items)) => {
            vec![Metric::new(prefix, Value::List(items.into_iter().map(json_to_value).collect()))]
        }
        Ok(other) => vec![Metric::new(prefix, json_to_value(other))],
        Err(_) => vec![Metric::new(prefix, Value::coerce_numeric_string(text.trim()))],
    }
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::String(String::new()),
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::coerce_numeric_string(&s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => {
            Value::Map(map.into_iter().map(|(k, v)| (k, json_to_value(v))).collect())
        }
    }
}

/// Protocol adapter bridging an MQTT broker topic filter to the agent's
/// telemetry stream.
pub struct MqttAdapter {
    name: String,
    host: String,
    port: u16,
    topic_filter: String,
    tracker: Arc<AdapterStateTracker>,
    inner: Mutex<Option<MqttConnection>>,
}

struct MqttConnection {
    client: Client,
    received: std::sync::mpsc::Receiver<Metric>,
}

impl MqttAdapter {
    pub fn from_config(config: &AdapterConfig) -> Result<Self, AgentError> {
        let host = config
            .param_str("host")
            .ok_or_else(|| AgentError::Validation("mqtt adapter requires a 'host' parameter".to_owned()))?
            .to_owned();
        let port = match config.params.get("port") {
            Some(value) => value.as_f64().map(|f| f as u16).unwrap_or(DEFAULT_PORT),
            None => DEFAULT_PORT,
        };
        let topic_filter = config.param_str("topic").unwrap_or("#").to_owned();
        Ok(Self {
            name: config.name.clone(),
            host,
            port,
            topic_filter,
            tracker: AdapterStateTracker::new(&config.name),
            inner: Mutex::new(None),
        })
    }
}

impl ProtocolAdapter for MqttAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate_config(&self) -> Result<(), AgentError> {
        if self.host.is_empty() {
            return Err(AgentError::Validation("mqtt adapter host must not be empty".to_owned()));
        }
        Ok(())
    }

    fn connect(&self) -> Result<(), AgentError> {
        self.tracker.transition(AdapterState::Connecting);
        let mut options = MqttOptions::new(&self.name, &self.host, self.port);
        options.set_keep_alive(DEFAULT_KEEP_ALIVE);

        let (client, mut connection) = Client::new(options, 64);
        client
            .subscribe(&self.topic_filter, QoS::AtMostOnce)
            .map_err(|e| {
                self.tracker.transition(AdapterState::Error);
                AgentError::Transport(format!("mqtt subscribe failed: {e}"))
            })?;

        let (tx, rx) = std::sync::mpsc::channel();
        let topic_filter = self.topic_filter.clone();
        std::thread::spawn(move || {
            for notification in connection.iter() {
                match notification {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        let prefix = topic_to_metric_prefix(&publish.topic);
                        for metric in payload_to_metrics(&prefix, &publish.payload) {
                            if tx.send(metric).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(err = %e, topic_filter = %topic_filter, "mqtt connection event error");
                        return;
                    }
                }
            }
        });

        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(MqttConnection { client, received: rx });
        self.tracker.transition(AdapterState::Connected);
        Ok(())
    }

    fn disconnect(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(conn) = inner.take() {
            if let Err(e) = conn.client.disconnect() {
                warn!(err = %e, adapter = %self.name, "mqtt disconnect failed");
            }
        }
        self.tracker.transition(AdapterState::Disconnected);
    }

    fn poll(&self) -> Result<Vec<Metric>, AgentError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(conn) = inner.as_ref() else {
            return Ok(Vec::new());
        };
        let mut metrics = Vec::new();
        while let Ok(metric) = conn.received.try_recv() {
            metrics.push(metric);
        }
        self.tracker.record_poll(metrics.len());
        Ok(metrics)
    }

    fn stats(&self) -> AdapterStats {
        self.tracker.stats()
    }
}

#[cfg(test)]
#[path = "mqtt_tests.rs"]
mod tests;
