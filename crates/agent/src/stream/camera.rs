// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Camera stream loop: setup once, capture/sleep per tick, cleanup
//! guaranteed on termination (including cancellation).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::driver::CameraHub;
use crate::error::AgentError;
use crate::frame::OutboundFrame;
use crate::ingest::IngestClient;
use crate::point::{current_millis, Point};

use super::CameraStreamConfig;

const DEFAULT_FRAME_RATE: f64 = 5.0;

/// Releases the capture device when dropped, regardless of how the owning
/// task exits (normal completion, cancellation, or panic unwind).
struct CameraGuard {
    hub: Arc<dyn CameraHub>,
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        self.hub.cleanup();
    }
}

pub async fn run(
    hub: Arc<dyn CameraHub>,
    config: Arc<Mutex<CameraStreamConfig>>,
    camera_id: String,
    source_id: String,
    outbound: mpsc::Sender<OutboundFrame>,
    ingest: Arc<IngestClient>,
    cancel: CancellationToken,
) {
    if let Err(e) = hub.setup() {
        warn!(camera_id = %camera_id, err = %e, "camera setup failed, stream will not start");
        return;
    }
    let _guard = CameraGuard { hub: Arc::clone(&hub) };

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let (frame_rate, store) = {
            let config = config.lock().unwrap_or_else(|e| e.into_inner());
            (config.frame_rate.unwrap_or(DEFAULT_FRAME_RATE), config.store)
        };

        match hub.capture() {
            Ok(Some(frame)) => {
                let timestamp = current_millis();
                let encoded = base64::engine::general_purpose::STANDARD.encode(&frame.bytes);
                let outbound_frame = OutboundFrame::VideoFrame {
                    camera_id: camera_id.clone(),
                    frame: encoded,
                    width: frame.width,
                    height: frame.height,
                    timestamp,
                };
                if outbound.send(outbound_frame).await.is_err() {
                    return;
                }
                if store {
                    let point = Point::new(format!("camera.{camera_id}.frame_bytes"), frame.bytes.len() as i64, timestamp, &source_id);
                    let ingest = Arc::clone(&ingest);
                    tokio::spawn(async move {
                        if let Err(e) = ingest.send(vec![point]).await {
                            warn!(err = %e, "camera telemetry ingest failed");
                        }
                    });
                }
            }
            Ok(None) => {}
            Err(AgentError::DriverFatal(message)) => {
                warn!(camera_id = %camera_id, err = %message, "camera capture failed fatally, terminating stream");
                return;
            }
            Err(e) => {
                warn!(camera_id = %camera_id, err = %e, "camera capture failed, continuing");
            }
        }

        let interval = Duration::from_secs_f64(1.0 / frame_rate.max(0.1));
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
