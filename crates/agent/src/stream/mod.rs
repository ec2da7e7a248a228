// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream manager: owns three stream-id-keyed registries (sensor, camera,
//! CAN) and the lifecycle of the one long-lived task behind each entry.

pub mod can;
pub mod camera;
pub mod sensor;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::can::SignalDecoder;
use crate::driver::{CameraHub, SensorHub};
use crate::error::AgentError;
use crate::frame::OutboundFrame;
use crate::ingest::IngestClient;
use crate::value::Value;

/// Mutable sensor-stream configuration, shared with the running loop so
/// `configure_sensor` takes effect on the next iteration without a restart.
#[derive(Debug, Clone)]
pub struct SensorStreamConfig {
    pub metrics: Vec<String>,
    pub interval_ms: u64,
    pub metric_prefix: Option<String>,
    pub store: bool,
}

/// Mutable camera-stream configuration, same reconfigure-in-place contract.
#[derive(Debug, Clone)]
pub struct CameraStreamConfig {
    pub resolution: Option<(u32, u32)>,
    pub quality: Option<u8>,
    pub frame_rate: Option<f64>,
    pub store: bool,
}

struct RunningStream<C> {
    cancel: CancellationToken,
    config: Arc<Mutex<C>>,
    task: tokio::task::JoinHandle<()>,
}

/// Builds a [`CameraHub`] for a given camera stream id. Injected by the
/// embedding application; cameras are external hardware, not something this
/// crate can enumerate on its own.
pub type CameraHubFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn CameraHub>, AgentError> + Send + Sync>;

/// Resolves an optional DBC path to a decoded-signal callback. `None` means
/// the deployment has no DBC decoding configured; CAN streams then emit raw
/// frame metrics only.
pub type CanDecoderFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn SignalDecoder>, AgentError> + Send + Sync>;

/// Owns every active stream task and the registries that track them.
pub struct StreamManager {
    sensor_hub: Arc<dyn SensorHub>,
    camera_hubs: CameraHubFactory,
    can_decoder: Option<CanDecoderFactory>,
    source_id: String,
    outbound: mpsc::Sender<OutboundFrame>,
    ingest: Arc<IngestClient>,

    sensors: Mutex<HashMap<String, RunningStream<SensorStreamConfig>>>,
    cameras: Mutex<HashMap<String, RunningStream<CameraStreamConfig>>>,
    can_streams: Mutex<HashMap<String, RunningStream<()>>>,
}

impl StreamManager {
    pub fn new(
        sensor_hub: Arc<dyn SensorHub>,
        camera_hubs: CameraHubFactory,
        can_decoder: Option<CanDecoderFactory>,
        source_id: impl Into<String>,
        outbound: mpsc::Sender<OutboundFrame>,
        ingest: Arc<IngestClient>,
    ) -> Self {
        Self {
            sensor_hub,
            camera_hubs,
            can_decoder,
            source_id: source_id.into(),
            outbound,
            ingest,
            sensors: Mutex::new(HashMap::new()),
            cameras: Mutex::new(HashMap::new()),
            can_streams: Mutex::new(HashMap::new()),
        }
    }

    pub async fn start_sensor_stream(&self, id: impl Into<String>, metrics: Vec<String>, interval_ms: u64, store: bool) {
        let id = id.into();
        self.stop_sensor_stream(&id).await;

        let config = Arc::new(Mutex::new(SensorStreamConfig { metrics, interval_ms, metric_prefix: None, store }));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(sensor::run(
            Arc::clone(&self.sensor_hub),
            Arc::clone(&config),
            self.source_id.clone(),
            self.outbound.clone(),
            Arc::clone(&self.ingest),
            cancel.clone(),
        ));

        self.sensors.lock().unwrap_or_else(|e| e.into_inner()).insert(id.clone(), RunningStream { cancel, config, task });
        info!(stream_id = %id, "sensor stream started");
    }

    pub async fn stop_sensor_stream(&self, id: &str) {
        stop_streams(&self.sensors, id).await;
    }

    pub fn configure_sensor(&self, id: &str, sample_rate_ms: Option<u64>, metric_prefix: Option<String>, options: &BTreeMap<String, Value>) {
        let sensors = self.sensors.lock().unwrap_or_else(|e| e.into_inner());
        let Some(stream) = sensors.get(id) else {
            warn!(stream_id = %id, "configure_sensor for unknown stream id, ignored");
            return;
        };
        {
            let mut config = stream.config.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(rate) = sample_rate_ms {
                config.interval_ms = rate;
            }
            if metric_prefix.is_some() {
                config.metric_prefix = metric_prefix;
            }
        }
        if let Err(e) = self.sensor_hub.configure(options) {
            warn!(stream_id = %id, err = %e, "sensor driver rejected residual configuration");
        }
    }

    pub async fn start_camera_stream(&self, id: impl Into<String>, resolution: Option<(u32, u32)>, quality: Option<u8>, frame_rate: Option<f64>, store: bool) -> Result<(), AgentError> {
        let id = id.into();
        self.stop_camera_stream(&id).await;

        let hub = (self.camera_hubs)(&id)?;
        let config = Arc::new(Mutex::new(CameraStreamConfig { resolution, quality, frame_rate, store }));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(camera::run(hub, Arc::clone(&config), id.clone(), self.source_id.clone(), self.outbound.clone(), Arc::clone(&self.ingest), cancel.clone()));

        self.cameras.lock().unwrap_or_else(|e| e.into_inner()).insert(id.clone(), RunningStream { cancel, config, task });
        info!(stream_id = %id, "camera stream started");
        Ok(())
    }

    pub async fn stop_camera_stream(&self, id: &str) {
        stop_streams(&self.cameras, id).await;
    }

    pub fn configure_camera(&self, id: &str, resolution: Option<(u32, u32)>, quality: Option<u8>, frame_rate: Option<f64>) {
        let cameras = self.cameras.lock().unwrap_or_else(|e| e.into_inner());
        let Some(stream) = cameras.get(id) else {
            warn!(stream_id = %id, "configure_camera for unknown stream id, ignored");
            return;
        };
        let mut config = stream.config.lock().unwrap_or_else(|e| e.into_inner());
        if resolution.is_some() {
            config.resolution = resolution;
        }
        if quality.is_some() {
            config.quality = quality;
        }
        if frame_rate.is_some() {
            config.frame_rate = frame_rate;
        }
    }

    pub async fn start_can_stream(&self, id: impl Into<String>, channel: String, dbc_path: Option<String>, bitrate: Option<u32>, store: bool) -> Result<(), AgentError> {
        let id = id.into();
        self.stop_can_stream(&id).await;

        if let Some(message) = can_down_message(&crate::adapter::can::scan_can(), &channel) {
            warn!(stream_id = %id, channel = %channel, "CAN interface is down, not starting stream");
            let _ = self.outbound.send(OutboundFrame::Status { message }).await;
            return Ok(());
        }

        let decoder = match &dbc_path {
            Some(path) => match &self.can_decoder {
                Some(factory) => Some(factory(path)?),
                None => {
                    warn!(stream_id = %id, dbc_path = %path, "no DBC decoder configured, emitting raw frames only");
                    None
                }
            },
            None => None,
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(can::run(
            id.clone(),
            channel,
            bitrate,
            decoder,
            self.source_id.clone(),
            store,
            self.outbound.clone(),
            Arc::clone(&self.ingest),
            cancel.clone(),
        ));

        self.can_streams.lock().unwrap_or_else(|e| e.into_inner()).insert(id.clone(), RunningStream { cancel, config: Arc::new(Mutex::new(())), task });
        info!(stream_id = %id, "CAN stream started");
        Ok(())
    }

    pub async fn stop_can_stream(&self, id: &str) {
        stop_streams(&self.can_streams, id).await;
    }

    pub fn sensor_stream_ids(&self) -> Vec<String> {
        self.sensors.lock().unwrap_or_else(|e| e.into_inner()).keys().cloned().collect()
    }

    pub fn camera_stream_ids(&self) -> Vec<String> {
        self.cameras.lock().unwrap_or_else(|e| e.into_inner()).keys().cloned().collect()
    }

    pub fn can_stream_ids(&self) -> Vec<String> {
        self.can_streams.lock().unwrap_or_else(|e| e.into_inner()).keys().cloned().collect()
    }

    /// Cancel and await every active stream of every kind. Used on shutdown.
    pub async fn stop_all(&self) {
        stop_streams(&self.sensors, "*").await;
        stop_streams(&self.cameras, "*").await;
        stop_streams(&self.can_streams, "*").await;
    }
}

/// `Some(message)` when `channel` is a detected-but-down CAN interface;
/// `None` when it's up or wasn't found (the latter falls through to the
/// adapter's own open attempt, which logs and fails on its own).
fn can_down_message(detected: &[crate::adapter::can::DetectedCan], channel: &str) -> Option<String> {
    detected.iter().find(|d| d.channel == channel).filter(|d| !d.is_up).map(|_| format!("CAN interface {channel} is down"))
}

/// Shared stop implementation: `"*"` drains every entry, a specific id drains
/// just that one. Unknown id is a no-op, not an error.
async fn stop_streams<C>(registry: &Mutex<HashMap<String, RunningStream<C>>>, id: &str) {
    let removed: Vec<RunningStream<C>> = {
        let mut map = registry.lock().unwrap_or_else(|e| e.into_inner());
        if id == "*" {
            map.drain().map(|(_, v)| v).collect()
        } else {
            map.remove(id).into_iter().collect()
        }
    };
    for stream in removed {
        stream.cancel.cancel();
        let _ = stream.task.await;
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
