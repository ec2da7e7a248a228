// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The telemetry value domain: a tagged union over everything a [`Point`](crate::point::Point)
//! or an adapter [`Metric`](crate::adapter::Metric) can carry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A telemetry value. Untagged in JSON — it round-trips through the same
/// shapes `serde_json::Value` would produce for the in-spec domain (numbers,
/// bools, strings, nested string-keyed maps, homogeneous lists).
///
/// No separate unsigned-integer variant: JSON has one number type, so an
/// untagged `UInt(u64)` alongside `Int(i64)` would deserialize back as
/// `Int` for every non-negative value that fits `i64` (the overwhelming
/// majority), silently changing variant on a round-trip. Values outside
/// `i64`'s range fall back to `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Map(BTreeMap<String, Value>),
    List(Vec<Value>),
}

impl Value {
    /// Best-effort coercion of a string payload that looks numeric.
    ///
    /// Used by the MQTT adapter: `"42"` -> `Value::Int(42)`, `"1.5"` -> `Value::Float(1.5)`,
    /// anything else stays a `Value::String`.
    pub fn coerce_numeric_string(s: &str) -> Value {
        if let Ok(i) = s.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        Value::String(s.to_owned())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(v as f64),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
