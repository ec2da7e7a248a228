// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CAN bus protocol adapter: raw-frame emission plus an optional decoded-
//! signal callback contract. Decoding a DBC file is a driver-contract
//! concern handed in by the caller; this adapter never parses DBC itself.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use super::{AdapterConfig, AdapterState, AdapterStateTracker, AdapterStats, Metric, ProtocolAdapter};
use crate::error::AgentError;
use crate::value::Value;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const ARPHRD_CAN: &str = "280";

/// One CAN interface found on the host, up or down.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedCan {
    pub interface: String,
    pub channel: String,
    pub is_up: bool,
    pub bitrate: Option<u32>,
}

fn read_sysfs(path: impl AsRef<Path>) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_owned())
}

/// Scan `/sys/class/net` for SocketCAN interfaces (Linux ARPHRD_CAN == 280).
pub fn scan_can() -> Vec<DetectedCan> {
    scan_can_under(Path::new("/sys/class/net"))
}

fn scan_can_under(net_dir: &Path) -> Vec<DetectedCan> {
    let Ok(entries) = fs::read_dir(net_dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    let mut detected = Vec::new();
    for name in names {
        let iface_dir = net_dir.join(&name);
        let Some(iface_type) = read_sysfs(iface_dir.join("type")) else { continue };
        if iface_type != ARPHRD_CAN {
            continue;
        }
        let operstate = read_sysfs(iface_dir.join("operstate"));
        let is_up = matches!(operstate.as_deref(), Some("up") | Some("unknown"));
        let bitrate = if is_up {
            read_sysfs(iface_dir.join("can_bittiming/bitrate")).and_then(|s| s.parse().ok())
        } else {
            None
        };
        detected.push(DetectedCan { interface: "socketcan".to_owned(), channel: name, is_up, bitrate });
    }
    detected
}

/// A raw frame as read from the bus, before any metric naming is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub arbitration_id: u32,
    pub data: Vec<u8>,
    pub is_extended: bool,
    pub is_error_frame: bool,
    pub is_remote_frame: bool,
}

/// Abstraction over the bus transport so the adapter doesn't depend
/// directly on `socketcan`'s socket type in its control flow.
pub trait CanBus: Send + Sync {
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<RawFrame>, AgentError>;
    fn send(&self, frame: &RawFrame) -> Result<(), AgentError>;
}

struct SocketCanBus {
    socket: socketcan::CanSocket,
}

impl SocketCanBus {
    fn open(channel: &str) -> Result<Self, AgentError> {
        use socketcan::Socket;

        let socket =
            socketcan::CanSocket::open(channel).map_err(|e| AgentError::DriverFatal(format!("failed to open CAN channel {channel}: {e}")))?;
        Ok(Self { socket })
    }
}

impl CanBus for SocketCanBus {
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<RawFrame>, AgentError> {
        use socketcan::{CanFrame, Frame, Socket};

        if self.socket.set_read_timeout(timeout).is_err() {
            warn!("failed to set CAN socket read timeout");
        }
        match self.socket.read_frame() {
            Ok(CanFrame::Data(frame)) => Ok(Some(RawFrame {
                arbitration_id: frame.raw_id(),
                data: frame.data().to_vec(),
                is_extended: frame.is_extended(),
                is_error_frame: false,
                is_remote_frame: false,
            })),
            Ok(CanFrame::Remote(frame)) => Ok(Some(RawFrame {
                arbitration_id: frame.raw_id(),
                data: Vec::new(),
                is_extended: frame.is_extended(),
                is_error_frame: false,
                is_remote_frame: true,
            })),
            Ok(CanFrame::Error(frame)) => Ok(Some(RawFrame {
                arbitration_id: frame.raw_id(),
                data: Vec::new(),
                is_extended: false,
                is_error_frame: true,
                is_remote_frame: false,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(AgentError::DriverTransient(format!("CAN read error: {e}"))),
        }
    }

    fn send(&self, frame: &RawFrame) -> Result<(), AgentError> {
        use socketcan::{CanDataFrame, Socket};

        let out = CanDataFrame::new(frame.arbitration_id, &frame.data)
            .ok_or_else(|| AgentError::Validation("invalid CAN frame data length".to_owned()))?;
        self.socket.write_frame(&out).map_err(|e| AgentError::DriverTransient(format!("CAN send error: {e}")))
    }
}

/// One decoded signal extracted from a frame payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    pub name: String,
    pub value: Value,
    pub unit: Option<String>,
}

/// Turns raw frame bytes into named signals. Supplied by the caller; this
/// adapter never loads or parses a DBC file itself.
pub trait SignalDecoder: Send + Sync {
    fn message_name(&self, arbitration_id: u32) -> Option<String>;
    fn decode(&self, arbitration_id: u32, data: &[u8]) -> Vec<DecodedSignal>;
}

/// CAN bus protocol adapter.
pub struct CanAdapter {
    name: String,
    channel: String,
    raw_prefix: String,
    emit_raw: bool,
    emit_decoded: bool,
    decoder: Option<Arc<dyn SignalDecoder>>,
    bus: Mutex<Option<Arc<dyn CanBus>>>,
    tracker: Arc<AdapterStateTracker>,
}

impl CanAdapter {
    pub fn from_config(config: &AdapterConfig, decoder: Option<Arc<dyn SignalDecoder>>) -> Result<Self, AgentError> {
        let channel = config
            .param_str("channel")
            .ok_or_else(|| AgentError::Validation("CAN channel is required".to_owned()))?
            .to_owned();
        Ok(Self {
            name: config.name.clone(),
            channel,
            raw_prefix: config.param_str("raw_prefix").unwrap_or("can.raw").to_owned(),
            emit_raw: true,
            emit_decoded: decoder.is_some(),
            decoder,
            bus: Mutex::new(None),
            tracker: AdapterStateTracker::new(&config.name),
        })
    }

    fn create_raw_metric(&self, frame: &RawFrame) -> Metric {
        let metric_name = format!("{}.0x{:03X}", self.raw_prefix, frame.arbitration_id);
        let data_hex = frame.data.iter().map(|b| format!("{b:02X}")).collect::<String>();

        let mut tags = std::collections::BTreeMap::new();
        tags.insert("arbitration_id".to_owned(), frame.arbitration_id.to_string());
        tags.insert("dlc".to_owned(), frame.data.len().to_string());
        tags.insert("is_extended".to_owned(), frame.is_extended.to_string());
        if frame.is_error_frame {
            tags.insert("error_frame".to_owned(), "true".to_owned());
        }
        if frame.is_remote_frame {
            tags.insert("remote_frame".to_owned(), "true".to_owned());
        }

        Metric::new(metric_name, Value::String(data_hex)).with_tags(tags)
    }

    fn decode_signals(&self, frame: &RawFrame) -> Vec<Metric> {
        let Some(decoder) = &self.decoder else { return Vec::new() };
        let Some(message_name) = decoder.message_name(frame.arbitration_id) else { return Vec::new() };

        decoder
            .decode(frame.arbitration_id, &frame.data)
            .into_iter()
            .map(|signal| {
                let mut tags = std::collections::BTreeMap::new();
                tags.insert("can_id".to_owned(), format!("0x{:03X}", frame.arbitration_id));
                tags.insert("dbc_message".to_owned(), message_name.clone());
                if let Some(unit) = signal.unit {
                    tags.insert("unit".to_owned(), unit);
                }
                Metric::new(signal.name, signal.value).with_tags(tags)
            })
            .collect()
    }
}

impl ProtocolAdapter for CanAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate_config(&self) -> Result<(), AgentError> {
        if self.channel.is_empty() {
            return Err(AgentError::Validation("CAN channel is required".to_owned()));
        }
        Ok(())
    }

    fn connect(&self) -> Result<(), AgentError> {
        self.tracker.transition(AdapterState::Connecting);

        let detected = scan_can();
        let matching = detected.iter().find(|d| d.channel == self.channel);
        match matching {
            Some(iface) if !iface.is_up => {
                self.tracker.transition(AdapterState::Error);
                return Err(AgentError::DriverFatal(format!("CAN interface {} is down", self.channel)));
            }
            None => {
                warn!(channel = %self.channel, "CAN interface not found in detection scan, attempting to open anyway");
            }
            Some(_) => {}
        }

        let bus = SocketCanBus::open(&self.channel)?;
        *self.bus.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(bus));
        self.tracker.transition(AdapterState::Connected);
        info!(channel = %self.channel, "connected to CAN bus");
        Ok(())
    }

    fn disconnect(&self) {
        *self.bus.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.tracker.transition(AdapterState::Disconnected);
    }

    fn poll(&self) -> Result<Vec<Metric>, AgentError> {
        let bus = {
            let guard = self.bus.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        let Some(bus) = bus else { return Ok(Vec::new()) };

        let Some(frame) = bus.recv_timeout(POLL_TIMEOUT)? else {
            return Ok(Vec::new());
        };

        let mut metrics = Vec::new();
        if self.emit_raw {
            metrics.push(self.create_raw_metric(&frame));
        }
        if self.emit_decoded {
            metrics.extend(self.decode_signals(&frame));
        }
        self.tracker.record_poll(metrics.len());
        Ok(metrics)
    }

    fn send(&self, metric: &Metric) -> Result<(), AgentError> {
        let bus = {
            let guard = self.bus.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        let Some(bus) = bus else {
            return Err(AgentError::Protocol("not connected to CAN bus".to_owned()));
        };
        let arbitration_id: u32 = metric
            .tags
            .as_ref()
            .and_then(|tags| tags.get("arbitration_id"))
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| AgentError::Validation("CAN send requires an arbitration_id tag".to_owned()))?;
        let data = match &metric.value {
            Value::String(hex) => decode_hex(hex)?,
            _ => return Err(AgentError::Validation("CAN send expects hex-encoded string data".to_owned())),
        };
        bus.send(&RawFrame { arbitration_id, data, is_extended: arbitration_id > 0x7FF, is_error_frame: false, is_remote_frame: false })
    }

    fn stats(&self) -> AdapterStats {
        self.tracker.stats()
    }
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, AgentError> {
    if hex.len() % 2 != 0 {
        return Err(AgentError::Validation("hex-encoded CAN data must have even length".to_owned()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| AgentError::Validation(format!("invalid hex byte: {e}"))))
        .collect()
}

#[cfg(test)]
#[path = "can_tests.rs"]
mod tests;
