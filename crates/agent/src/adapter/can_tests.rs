// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;

struct StubBus {
    frames: StdMutex<VecDeque<RawFrame>>,
}

impl CanBus for StubBus {
    fn recv_timeout(&self, _timeout: Duration) -> Result<Option<RawFrame>, AgentError> {
        Ok(self.frames.lock().unwrap_or_else(|e| e.into_inner()).pop_front())
    }

    fn send(&self, _frame: &RawFrame) -> Result<(), AgentError> {
        Ok(())
    }
}

struct StubDecoder;

impl SignalDecoder for StubDecoder {
    fn message_name(&self, arbitration_id: u32) -> Option<String> {
        (arbitration_id == 0x100).then(|| "EngineStatus".to_owned())
    }

    fn decode(&self, _arbitration_id: u32, data: &[u8]) -> Vec<DecodedSignal> {
        vec![DecodedSignal { name: "rpm".to_owned(), value: Value::Int(data.first().copied().unwrap_or(0) as i64), unit: Some("rpm".to_owned()) }]
    }
}

fn adapter(decoder: Option<Arc<dyn SignalDecoder>>, bus: Arc<dyn CanBus>) -> CanAdapter {
    CanAdapter {
        name: "can0".to_owned(),
        channel: "can0".to_owned(),
        raw_prefix: "can.raw".to_owned(),
        emit_raw: true,
        emit_decoded: decoder.is_some(),
        decoder,
        bus: Mutex::new(Some(bus)),
        tracker: AdapterStateTracker::new("can0"),
    }
}

#[test]
fn from_config_requires_channel() {
    let config = AdapterConfig::new("can0");
    assert!(CanAdapter::from_config(&config, None).is_err());
}

#[test]
fn raw_metric_has_hex_data_and_expected_tags() {
    let frame = RawFrame { arbitration_id: 0x100, data: vec![0xDE, 0xAD], is_extended: false, is_error_frame: false, is_remote_frame: false };
    let a = adapter(None, Arc::new(StubBus { frames: StdMutex::new(VecDeque::new()) }));
    let metric = a.create_raw_metric(&frame);
    assert_eq!(metric.name, "can.raw.0x100");
    assert_eq!(metric.value, Value::String("DEAD".to_owned()));
    let tags = metric.tags.expect("tags present");
    assert_eq!(tags.get("arbitration_id"), Some(&"256".to_owned()));
    assert_eq!(tags.get("dlc"), Some(&"2".to_owned()));
    assert_eq!(tags.get("is_extended"), Some(&"false".to_owned()));
    assert!(!tags.contains_key("error_frame"));
}

#[test]
fn error_and_remote_frames_get_boolean_tags() {
    let frame = RawFrame { arbitration_id: 0x200, data: vec![], is_extended: true, is_error_frame: true, is_remote_frame: true };
    let a = adapter(None, Arc::new(StubBus { frames: StdMutex::new(VecDeque::new()) }));
    let metric = a.create_raw_metric(&frame);
    let tags = metric.tags.expect("tags present");
    assert_eq!(tags.get("error_frame"), Some(&"true".to_owned()));
    assert_eq!(tags.get("remote_frame"), Some(&"true".to_owned()));
}

#[test]
fn poll_without_decoder_emits_only_raw_metric() {
    let frame = RawFrame { arbitration_id: 0x300, data: vec![1], is_extended: false, is_error_frame: false, is_remote_frame: false };
    let bus = Arc::new(StubBus { frames: StdMutex::new(VecDeque::from([frame]))});
    let a = adapter(None, bus);
    let metrics = a.poll().expect("poll succeeds");
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].name, "can.raw.0x300");
}

#[test]
fn poll_with_unmatched_decoder_message_emits_only_raw() {
    let frame = RawFrame { arbitration_id: 0x999, data: vec![5], is_extended: false, is_error_frame: false, is_remote_frame: false };
    let bus = Arc::new(StubBus { frames: StdMutex::new(VecDeque::from([frame]))});
    let a = adapter(Some(Arc::new(StubDecoder)), bus);
    let metrics = a.poll().expect("poll succeeds");
    assert_eq!(metrics.len(), 1);
}

#[test]
fn poll_with_matched_decoder_emits_raw_and_decoded() {
    let frame = RawFrame { arbitration_id: 0x100, data: vec![42], is_extended: false, is_error_frame: false, is_remote_frame: false };
    let bus = Arc::new(StubBus { frames: StdMutex::new(VecDeque::from([frame]))});
    let a = adapter(Some(Arc::new(StubDecoder)), bus);
    let metrics = a.poll().expect("poll succeeds");
    assert_eq!(metrics.len(), 2);
    let decoded = metrics.iter().find(|m| m.name == "rpm").expect("decoded signal present");
    assert_eq!(decoded.value, Value::Int(42));
    let tags = decoded.tags.as_ref().expect("tags present");
    assert_eq!(tags.get("dbc_message"), Some(&"EngineStatus".to_owned()));
    assert_eq!(tags.get("can_id"), Some(&"0x100".to_owned()));
    assert_eq!(tags.get("unit"), Some(&"rpm".to_owned()));
}

#[test]
fn poll_with_no_frame_available_returns_empty() {
    let a = adapter(None, Arc::new(StubBus { frames: StdMutex::new(VecDeque::new()) }));
    let metrics = a.poll().expect("poll succeeds");
    assert!(metrics.is_empty());
}

#[test]
fn decode_hex_round_trips_even_length_strings() {
    assert_eq!(decode_hex("DEAD").expect("valid hex"), vec![0xDE, 0xAD]);
    assert!(decode_hex("ABC").is_err());
    assert!(decode_hex("ZZ").is_err());
}

fn write_fake_iface(net_dir: &std::path::Path, name: &str, operstate: &str) {
    let iface_dir = net_dir.join(name);
    std::fs::create_dir_all(&iface_dir).expect("create iface dir");
    std::fs::write(iface_dir.join("type"), ARPHRD_CAN).expect("write type");
    std::fs::write(iface_dir.join("operstate"), operstate).expect("write operstate");
}

#[test]
fn scan_can_under_reports_down_interface_as_not_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_fake_iface(dir.path(), "can0", "down");

    let detected = scan_can_under(dir.path());
    assert_eq!(detected, vec![DetectedCan { interface: "socketcan".to_owned(), channel: "can0".to_owned(), is_up: false, bitrate: None }]);
}

#[test]
fn scan_can_under_reports_up_interface() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_fake_iface(dir.path(), "can0", "up");

    let detected = scan_can_under(dir.path());
    assert_eq!(detected.len(), 1);
    assert!(detected[0].is_up);
}

#[test]
fn scan_can_under_ignores_non_can_interfaces() {
    let dir = tempfile::tempdir().expect("tempdir");
    let iface_dir = dir.path().join("eth0");
    std::fs::create_dir_all(&iface_dir).expect("create iface dir");
    std::fs::write(iface_dir.join("type"), "1").expect("write type");
    std::fs::write(iface_dir.join("operstate"), "up").expect("write operstate");

    assert!(scan_can_under(dir.path()).is_empty());
}
