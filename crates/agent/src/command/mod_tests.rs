// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::command::builder::ParamBuilder;

fn registry_with_set_speed() -> CommandRegistry {
    let registry = CommandRegistry::new();
    registry
        .register("set_speed")
        .param(ParamBuilder::float("rpm").range(0.0, 10000.0))
        .param(ParamBuilder::float("ramp_time").default(1.0_f64))
        .handler(|params| {
            let rpm = params.get("rpm").and_then(Value::as_f64).unwrap_or_default();
            let mut result = BTreeMap::new();
            result.insert("actual_rpm".to_owned(), Value::Float(rpm));
            Ok(Some(Value::Map(result)))
        });
    registry
}

#[test]
fn unknown_command_returns_single_error() {
    let registry = registry_with_set_speed();
    let events = registry.execute("nope", &BTreeMap::new());
    assert_eq!(events, vec![CommandEvent::Error("Unknown command: nope".into())]);
}

#[test]
fn out_of_range_param_short_circuits_before_ack() {
    let registry = registry_with_set_speed();
    let mut args = BTreeMap::new();
    args.insert("rpm".to_owned(), Value::Int(12_000));
    let events = registry.execute("set_speed", &args);
    assert_eq!(events, vec![CommandEvent::Error("'rpm' must be <= 10000".into())]);
}

#[test]
fn missing_required_param_short_circuits() {
    let registry = registry_with_set_speed();
    let events = registry.execute("set_speed", &BTreeMap::new());
    assert_eq!(events, vec![CommandEvent::Error("Missing required parameter: rpm".into())]);
}

#[test]
fn valid_call_acks_then_returns_result_map() {
    let registry = registry_with_set_speed();
    let mut args = BTreeMap::new();
    args.insert("rpm".to_owned(), Value::Float(500.0));
    let events = registry.execute("set_speed", &args);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], CommandEvent::Ack);
    match &events[1] {
        CommandEvent::Result(Value::Map(m)) => {
            assert_eq!(m.get("actual_rpm"), Some(&Value::Float(500.0)));
        }
        other => panic!("expected Result(Map), got {other:?}"),
    }
}

#[test]
fn default_is_applied_when_param_omitted() {
    let registry = CommandRegistry::new();
    registry
        .register("home")
        .param(ParamBuilder::float("speed").default(2.0_f64))
        .handler(|params| {
            assert_eq!(params.get("speed"), Some(&Value::Float(2.0)));
            Ok(None)
        });
    let events = registry.execute("home", &BTreeMap::new());
    assert_eq!(events[0], CommandEvent::Ack);
    match &events[1] {
        CommandEvent::Result(Value::Map(m)) => {
            assert_eq!(m.get("status"), Some(&Value::String("ok".into())));
        }
        other => panic!("expected Result(Map), got {other:?}"),
    }
}

#[test]
fn handler_error_becomes_error_event_after_ack() {
    let registry = CommandRegistry::new();
    registry.register("fail").handler(|_| Err("boom".to_owned()));
    let events = registry.execute("fail", &BTreeMap::new());
    assert_eq!(events, vec![CommandEvent::Ack, CommandEvent::Error("boom".into())]);
}

#[test]
fn schemas_reflect_registered_commands() {
    let registry = registry_with_set_speed();
    let schemas = registry.get_schemas();
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0].name, "set_speed");
    assert_eq!(schemas[0].params.len(), 2);
    assert_eq!(registry.names(), vec!["set_speed".to_owned()]);
    assert!(registry.contains("set_speed"));
    assert!(!registry.contains("missing"));
}

#[test]
fn re_registering_same_name_replaces_descriptor() {
    let registry = CommandRegistry::new();
    registry.register("ping").handler(|_| Ok(None));
    registry.register("ping").description("updated").handler(|_| Ok(None));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get_schemas()[0].description.as_deref(), Some("updated"));
}

#[test]
fn enum_param_rejects_value_outside_choices() {
    let registry = CommandRegistry::new();
    registry
        .register("set_direction")
        .param(ParamBuilder::enum_("direction", vec!["cw".into(), "ccw".into()]))
        .handler(|_| Ok(None));

    let mut args = BTreeMap::new();
    args.insert("direction".to_owned(), Value::String("sideways".into()));
    let events = registry.execute("set_direction", &args);
    assert!(matches!(&events[0], CommandEvent::Error(msg) if msg.contains("must be one of")));
}
