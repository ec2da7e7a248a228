// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver contracts: the abstract sensor and camera interfaces the stream
//! manager consumes. Concrete hardware backends (I2C register maps, NMEA
//! parsing, camera capture) are external collaborators; only their
//! interface is specified here.

use std::collections::BTreeMap;

use crate::value::Value;

/// A single reading from a sensor, before the stream manager timestamps
/// and converts it to a [`crate::point::Point`].
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub metric: String,
    pub value: Value,
    pub tags: Option<BTreeMap<String, String>>,
}

/// A bundle of hardware sensors presented as a single readable unit.
///
/// The sensor stream loop reads every sensor via this contract on each
/// iteration, then filters to the requested metric set.
pub trait SensorHub: Send + Sync {
    /// Read all sensors once. A transient read failure on an individual
    /// sensor should be folded into the returned set as best-effort
    /// (skip that sensor); only a hub-wide failure should propagate.
    fn read_all(&self) -> Result<Vec<SensorReading>, crate::error::AgentError>;

    /// Apply residual driver-specific configuration (anything the stream
    /// manager's own `configure_sensor` fields don't cover). A no-op
    /// default is provided for drivers with nothing to configure.
    fn configure(&self, _options: &BTreeMap<String, Value>) -> Result<(), crate::error::AgentError> {
        Ok(())
    }
}

/// A single captured frame from a camera driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A camera capture backend.
///
/// `setup` is called once before the first `capture`; `cleanup` is
/// guaranteed to run on stream termination, including cancellation or a
/// capture error.
pub trait CameraHub: Send + Sync {
    fn setup(&self) -> Result<(), crate::error::AgentError>;

    /// Capture one frame. An empty `Ok(None)` means "no frame this tick"
    /// (not an error); the stream loop simply skips emission.
    fn capture(&self) -> Result<Option<Frame>, crate::error::AgentError>;

    fn cleanup(&self);

    /// Apply resolution/quality/frame-rate configuration.
    fn configure(&self, _options: &BTreeMap<String, Value>) -> Result<(), crate::error::AgentError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
