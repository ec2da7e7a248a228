// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-channel frame shapes: one JSON object per message, tagged by
//! `type`. Outbound and inbound are separate enums since the agent never
//! needs to parse its own outbound shapes.

use serde::{Deserialize, Serialize};

use crate::command::CommandSchema;
use crate::point::Point;
use crate::value::Value;

/// Declared sensor/camera/CAN/command capabilities, sent once in `device_auth`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Capabilities {
    pub sensors: Vec<String>,
    pub cameras: Vec<String>,
    pub can: Vec<String>,
    pub commands: Vec<CommandSchema>,
}

/// Either credential an agent may authenticate with.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Credential {
    ApiKey { api_key: String },
    DeviceToken { device_token: String },
}

/// Outcome reported for one shell command invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutputEvent {
    Ack,
    Start,
    Data { data: String },
    Exit { code: Option<i32> },
    Error { message: String },
    Timeout,
}

/// Outcome reported for one typed-command invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CommandResultEvent {
    Ack,
    Result { value: Value },
    Error { message: String },
}

/// Frames the agent sends on the control channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    DeviceAuth {
        source_id: String,
        platform: String,
        capabilities: Capabilities,
        #[serde(flatten)]
        credential: Credential,
    },
    Telemetry {
        points: Vec<Point>,
    },
    VideoFrame {
        camera_id: String,
        /// base64-encoded frame bytes.
        frame: String,
        width: u32,
        height: u32,
        timestamp: i64,
    },
    Output {
        id: String,
        #[serde(flatten)]
        event: OutputEvent,
    },
    CommandResult {
        id: String,
        #[serde(flatten)]
        event: CommandResultEvent,
    },
    /// A human-readable status note not tied to any single command, e.g.
    /// "CAN interface can0 is down" or a persistent-reconnect-failure notice.
    Status {
        message: String,
    },
    Pong,
}

/// Frames the agent receives on the control channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    StartStream {
        id: String,
        metrics: Vec<String>,
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
        #[serde(default)]
        store: bool,
    },
    StopStream {
        id: String,
    },
    StartCamera {
        id: String,
        #[serde(default)]
        resolution: Option<(u32, u32)>,
        #[serde(default)]
        quality: Option<u8>,
        #[serde(default)]
        frame_rate: Option<f64>,
        #[serde(default)]
        store: bool,
    },
    StopCamera {
        id: String,
    },
    StartCan {
        id: String,
        channel: String,
        #[serde(default)]
        dbc_path: Option<String>,
        #[serde(default)]
        bitrate: Option<u32>,
        #[serde(default)]
        store: bool,
    },
    StopCan {
        id: String,
    },
    Configure {
        id: String,
        #[serde(default)]
        sample_rate_ms: Option<u64>,
        #[serde(default)]
        metric_prefix: Option<String>,
        #[serde(default)]
        options: std::collections::BTreeMap<String, Value>,
    },
    ConfigureCamera {
        id: String,
        #[serde(default)]
        resolution: Option<(u32, u32)>,
        #[serde(default)]
        quality: Option<u8>,
        #[serde(default)]
        frame_rate: Option<f64>,
    },
    Execute {
        id: String,
        command: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Cancel {
        id: String,
    },
    TypedCommand {
        id: String,
        name: String,
        #[serde(default)]
        args: std::collections::BTreeMap<String, Value>,
    },
    Ping,
    Authenticated,
    Error {
        message: String,
    },
}

fn default_interval_ms() -> u64 {
    1000
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
