// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

struct StubHub;

impl SensorHub for StubHub {
    fn read_all(&self) -> Result<Vec<SensorReading>, crate::error::AgentError> {
        Ok(vec![SensorReading { metric: "temp".into(), value: Value::Float(21.0), tags: None }])
    }
}

#[test]
fn default_configure_is_a_no_op_ok() {
    let hub = StubHub;
    assert!(hub.configure(&BTreeMap::new()).is_ok());
}

#[test]
fn read_all_returns_declared_readings() {
    let hub = StubHub;
    let readings = hub.read_all().expect("stub hub never fails");
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].metric, "temp");
}

struct StubCamera;

impl CameraHub for StubCamera {
    fn setup(&self) -> Result<(), crate::error::AgentError> {
        Ok(())
    }

    fn capture(&self) -> Result<Option<Frame>, crate::error::AgentError> {
        Ok(Some(Frame { bytes: vec![1, 2, 3], width: 4, height: 2 }))
    }

    fn cleanup(&self) {}
}

#[test]
fn camera_default_configure_is_a_no_op_ok() {
    let camera = StubCamera;
    assert!(camera.configure(&BTreeMap::new()).is_ok());
}

#[test]
fn camera_capture_returns_declared_frame() {
    let camera = StubCamera;
    let frame = camera.capture().expect("stub camera never fails").expect("frame present");
    assert_eq!(frame.width, 4);
    assert_eq!(frame.height, 2);
}
