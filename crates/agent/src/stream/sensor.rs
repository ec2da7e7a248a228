// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sensor stream loop: read-all -> filter -> Point -> telemetry frame ->
//! optional buffered ingest, on a fixed interval.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::driver::SensorHub;
use crate::error::AgentError;
use crate::frame::OutboundFrame;
use crate::ingest::IngestClient;
use crate::point::Point;

use super::SensorStreamConfig;

pub async fn run(
    hub: Arc<dyn SensorHub>,
    config: Arc<Mutex<SensorStreamConfig>>,
    source_id: String,
    outbound: mpsc::Sender<OutboundFrame>,
    ingest: Arc<IngestClient>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let (metrics, metric_prefix, store, interval_ms) = {
            let config = config.lock().unwrap_or_else(|e| e.into_inner());
            (config.metrics.clone(), config.metric_prefix.clone(), config.store, config.interval_ms)
        };

        match hub.read_all() {
            Ok(readings) => {
                let points: Vec<Point> = readings
                    .into_iter()
                    .filter(|reading| metrics.is_empty() || metrics.contains(&reading.metric))
                    .map(|reading| {
                        let name = match &metric_prefix {
                            Some(prefix) => format!("{prefix}{}", reading.metric),
                            None => reading.metric,
                        };
                        let mut point = Point::now(name, reading.value, &source_id);
                        if let Some(tags) = reading.tags {
                            point = point.with_tags(tags);
                        }
                        point
                    })
                    .collect();

                if !points.is_empty() {
                    if outbound.send(OutboundFrame::Telemetry { points: points.clone() }).await.is_err() {
                        return;
                    }
                    if store {
                        let ingest = Arc::clone(&ingest);
                        tokio::spawn(async move {
                            if let Err(e) = ingest.send(points).await {
                                warn!(err = %e, "sensor telemetry ingest failed");
                            }
                        });
                    }
                }
            }
            Err(AgentError::DriverFatal(message)) => {
                warn!(err = %message, "sensor hub failed fatally, terminating stream");
                return;
            }
            Err(e) => {
                warn!(err = %e, "sensor read failed, continuing");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
        }
    }
}

#[cfg(test)]
#[path = "sensor_tests.rs"]
mod tests;
