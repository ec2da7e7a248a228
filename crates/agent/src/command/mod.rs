// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed command registry: static registration, per-parameter validation,
//! and the ack/result/error dispatch sequence.

pub mod builder;

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::Serialize;

use crate::value::Value;

pub use builder::{CommandRegistration, ParamBuilder};

/// The type of a single command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Int,
    String,
    Bool,
    Enum,
}

impl ParamKind {
    fn label(self) -> &'static str {
        match self {
            ParamKind::Float => "float",
            ParamKind::Int => "int",
            ParamKind::String => "string",
            ParamKind::Bool => "bool",
            ParamKind::Enum => "enum",
        }
    }
}

/// Describes one command parameter: type, constraints, and default.
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub unit: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub default: Option<Value>,
    pub required: bool,
    pub choices: Option<Vec<String>>,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            unit: String::new(),
            min: None,
            max: None,
            step: None,
            default: None,
            required: true,
            choices: None,
        }
    }

    /// Validate a supplied value against this descriptor's constraints.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self.kind {
            ParamKind::Float | ParamKind::Int => {
                if self.kind == ParamKind::Int && !matches!(value, Value::Int(_)) {
                    return Err(format!("'{}' must be an integer", self.name));
                }
                let n = value
                    .as_f64()
                    .ok_or_else(|| format!("'{}' must be a number", self.name))?;
                if let Some(min) = self.min {
                    if n < min {
                        return Err(format!("'{}' must be >= {min}", self.name));
                    }
                }
                if let Some(max) = self.max {
                    if n > max {
                        return Err(format!("'{}' must be <= {max}", self.name));
                    }
                }
            }
            ParamKind::String => {
                if !matches!(value, Value::String(_)) {
                    return Err(format!("'{}' must be a string", self.name));
                }
            }
            ParamKind::Bool => {
                if !matches!(value, Value::Bool(_)) {
                    return Err(format!("'{}' must be a boolean", self.name));
                }
            }
            ParamKind::Enum => {
                if let Value::String(s) = value {
                    if let Some(choices) = &self.choices {
                        if !choices.iter().any(|c| c == s) {
                            return Err(format!("'{}' must be one of {choices:?}", self.name));
                        }
                    }
                } else {
                    return Err(format!("'{}' must be a string", self.name));
                }
            }
        }
        Ok(())
    }

    pub fn to_schema(&self) -> ParamSchema {
        ParamSchema {
            name: self.name.clone(),
            kind: self.kind.label(),
            description: (!self.description.is_empty()).then(|| self.description.clone()),
            unit: (!self.unit.is_empty()).then(|| self.unit.clone()),
            min: self.min,
            max: self.max,
            step: self.step,
            default: self.default.clone(),
            required: self.required,
            choices: self.choices.clone(),
        }
    }
}

/// JSON-serializable schema for a single parameter, advertised during auth.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

/// JSON-serializable schema for a whole command, advertised during auth.
#[derive(Debug, Clone, Serialize)]
pub struct CommandSchema {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSchema>,
}

pub type CommandHandler = Box<dyn Fn(&BTreeMap<String, Value>) -> Result<Option<Value>, String> + Send + Sync>;

/// A registered typed command: name, handler, and ordered parameter list.
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamDescriptor>,
    pub handler: CommandHandler,
}

impl CommandDescriptor {
    pub fn to_schema(&self) -> CommandSchema {
        CommandSchema {
            name: self.name.clone(),
            description: (!self.description.is_empty()).then(|| self.description.clone()),
            params: self.params.iter().map(ParamDescriptor::to_schema).collect(),
        }
    }
}

/// The outcome of dispatching a typed command, in emission order.
///
/// `Ack` is only present once lookup and validation both succeeded; a
/// lookup or validation failure short-circuits straight to `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    Ack,
    Result(Value),
    Error(String),
}

/// Static registry of typed commands, populated at agent startup.
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<Vec<CommandDescriptor>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fluent registration: `registry.register("set_speed").param(...).handler(...)`.
    pub fn register(&self, name: impl Into<String>) -> CommandRegistration<'_> {
        CommandRegistration::new(self, name.into())
    }

    pub(crate) fn insert(&self, descriptor: CommandDescriptor) {
        let mut commands = self.commands.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = commands.iter_mut().find(|c| c.name == descriptor.name) {
            *existing = descriptor;
        } else {
            commands.push(descriptor);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.commands
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn get_schemas(&self) -> Vec<CommandSchema> {
        self.commands
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(CommandDescriptor::to_schema)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().unwrap_or_else(|e| e.into_inner()).iter().any(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.commands.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch a typed command call: lookup, validate every parameter in
    /// declared order (first failure short-circuits, no partial effects),
    /// then invoke the handler.
    pub fn execute(&self, name: &str, args: &BTreeMap<String, Value>) -> Vec<CommandEvent> {
        let commands = self.commands.read().unwrap_or_else(|e| e.into_inner());
        let Some(cmd) = commands.iter().find(|c| c.name == name) else {
            return vec![CommandEvent::Error(format!("Unknown command: {name}"))];
        };

        let mut kwargs = BTreeMap::new();
        for param in &cmd.params {
            match args.get(&param.name) {
                Some(value) => {
                    if let Err(err) = param.validate(value) {
                        return vec![CommandEvent::Error(err)];
                    }
                    kwargs.insert(param.name.clone(), value.clone());
                }
                None => {
                    if let Some(default) = &param.default {
                        kwargs.insert(param.name.clone(), default.clone());
                    } else if param.required {
                        return vec![CommandEvent::Error(format!("Missing required parameter: {}", param.name))];
                    }
                }
            }
        }

        let mut events = vec![CommandEvent::Ack];
        match (cmd.handler)(&kwargs) {
            Ok(result) => events.push(CommandEvent::Result(normalize_result(result))),
            Err(message) => events.push(CommandEvent::Error(message)),
        }
        events
    }
}

/// Normalize a handler's return value: `None` becomes `{"status":"ok"}`; a
/// `Map` is forwarded as-is; anything else is wrapped as `{"value": ...}`.
fn normalize_result(result: Option<Value>) -> Value {
    match result {
        None => {
            let mut m = BTreeMap::new();
            m.insert("status".to_owned(), Value::String("ok".into()));
            Value::Map(m)
        }
        Some(Value::Map(m)) => Value::Map(m),
        Some(other) => {
            let mut m = BTreeMap::new();
            m.insert("value".to_owned(), other);
            Value::Map(m)
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
