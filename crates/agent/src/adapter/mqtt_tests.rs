// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn slashes_become_dots() {
    assert_eq!(topic_to_metric_prefix("sensors/engine/rpm"), "sensors.engine.rpm");
    assert_eq!(topic_to_metric_prefix("single"), "single");
}

#[test]
fn numeric_scalar_payload_coerces_to_number() {
    let metrics = payload_to_metrics("sensors.rpm", b"1234");
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].name, "sensors.rpm");
    assert_eq!(metrics[0].value, Value::Int(1234));
}

#[test]
fn float_scalar_payload_coerces_to_float() {
    let metrics = payload_to_metrics("sensors.temp", b"21.5");
    assert_eq!(metrics[0].value, Value::Float(21.5));
}

#[test]
fn non_numeric_scalar_stays_a_string() {
    let metrics = payload_to_metrics("sensors.status", b"\"running\"");
    assert_eq!(metrics[0].value, Value::String("running".to_owned()));
}

#[test]
fn bare_non_numeric_text_stays_a_string() {
    let metrics = payload_to_metrics("sensors.status", b"running");
    assert_eq!(metrics[0].value, Value::String("running".to_owned()));
}

#[test]
fn json_object_flattens_one_level_keyed_by_topic() {
    let metrics = payload_to_metrics("sensors.engine", br#"{"rpm": 4200, "temp": 88.5}"#);
    assert_eq!(metrics.len(), 2);
    let names: Vec<&str> = metrics.iter().map(|m| m.name.as_str()).collect();
    assert!(names.contains(&"sensors.engine.rpm"));
    assert!(names.contains(&"sensors.engine.temp"));
}

#[test]
fn json_array_passes_through_as_a_list() {
    let metrics = payload_to_metrics("sensors.samples", b"[1, 2, 3]");
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].value, Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
}

#[test]
fn nested_json_objects_keep_inner_structure_as_a_map() {
    let metrics = payload_to_metrics("sensors.engine", br#"{"gps": {"lat": 1.0, "lon": 2.0}}"#);
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].name, "sensors.engine.gps");
    match &metrics[0].value {
        Value::Map(map) => {
            assert_eq!(map.get("lat"), Some(&Value::Float(1.0)));
        }
        other => panic!("expected a map, got {other:?}"),
    }
}

#[test]
fn binary_payload_falls_back_to_a_placeholder_string() {
    let metrics = payload_to_metrics("sensors.raw", &[0xff, 0xfe, 0x00, 0x01]);
    assert_eq!(metrics.len(), 1);
    match &metrics[0].value {
        Value::String(s) => assert!(s.contains("binary")),
        other => panic!("expected placeholder string, got {other:?}"),
    }
}

#[test]
fn from_config_requires_host() {
    let config = AdapterConfig::new("mqtt");
    assert!(MqttAdapter::from_config(&config).is_err());
}

#[test]
fn from_config_applies_default_port() {
    let config = AdapterConfig::new("mqtt").with_param("host", "broker.local");
    let adapter = MqttAdapter::from_config(&config).expect("valid config");
    assert_eq!(adapter.port, DEFAULT_PORT);
    assert_eq!(adapter.topic_filter, "#");
}
