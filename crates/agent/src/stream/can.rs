// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CAN stream loop: connect once, poll on a worker thread every iteration
//! (never on the main scheduling loop), disconnect guaranteed on exit.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::adapter::can::{CanAdapter, SignalDecoder};
use crate::adapter::{AdapterConfig, ProtocolAdapter};
use crate::error::AgentError;
use crate::frame::OutboundFrame;
use crate::ingest::IngestClient;
use crate::point::Point;

struct CanGuard {
    adapter: Arc<CanAdapter>,
}

impl Drop for CanGuard {
    fn drop(&mut self) {
        self.adapter.disconnect();
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    stream_id: String,
    channel: String,
    bitrate: Option<u32>,
    decoder: Option<Arc<dyn SignalDecoder>>,
    source_id: String,
    store: bool,
    outbound: mpsc::Sender<OutboundFrame>,
    ingest: Arc<IngestClient>,
    cancel: CancellationToken,
) {
    let mut config = AdapterConfig::new(format!("can-{stream_id}")).with_param("channel", channel.clone());
    if let Some(bitrate) = bitrate {
        config = config.with_param("bitrate", bitrate as i64);
    }

    let adapter = match CanAdapter::from_config(&config, decoder) {
        Ok(adapter) => Arc::new(adapter),
        Err(e) => {
            warn!(stream_id = %stream_id, channel = %channel, err = %e, "CAN adapter configuration invalid, stream will not start");
            return;
        }
    };

    if let Err(e) = adapter.connect() {
        warn!(stream_id = %stream_id, channel = %channel, err = %e, "CAN connect failed, stream will not start");
        return;
    }
    let _guard = CanGuard { adapter: Arc::clone(&adapter) };

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let poll_adapter = Arc::clone(&adapter);
        let poll = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio::task::spawn_blocking(move || poll_adapter.poll()) => result,
        };

        let metrics = match poll {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(AgentError::DriverFatal(message))) => {
                warn!(stream_id = %stream_id, err = %message, "CAN bus failed fatally, terminating stream");
                return;
            }
            Ok(Err(e)) => {
                warn!(stream_id = %stream_id, err = %e, "CAN poll failed, continuing");
                continue;
            }
            Err(e) => {
                warn!(stream_id = %stream_id, err = %e, "CAN poll task panicked, terminating stream");
                return;
            }
        };

        if !metrics.is_empty() {
            let points: Vec<Point> = metrics
                .into_iter()
                .map(|metric| {
                    let mut point = Point::now(metric.name, metric.value, &source_id);
                    if let Some(tags) = metric.tags {
                        point = point.with_tags(tags);
                    }
                    point
                })
                .collect();

            if outbound.send(OutboundFrame::Telemetry { points: points.clone() }).await.is_err() {
                return;
            }
            if store {
                let ingest = Arc::clone(&ingest);
                tokio::spawn(async move {
                    if let Err(e) = ingest.send(points).await {
                        warn!(err = %e, "CAN telemetry ingest failed");
                    }
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "can_tests.rs"]
mod tests;
