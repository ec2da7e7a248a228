// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fluent builder API for typed-command registration, e.g.:
//!
//! ```ignore
//! registry.register("set_speed")
//!     .param(ParamBuilder::float("rpm").range(0.0, 10000.0))
//!     .handler(|params| {
//!         let rpm = params["rpm"].as_f64().unwrap_or_default();
//!         Ok(None)
//!     });
//! ```

use std::collections::BTreeMap;

use crate::value::Value;

use super::{CommandDescriptor, CommandRegistry, ParamDescriptor, ParamKind};

/// Fluent builder for a single [`ParamDescriptor`].
pub struct ParamBuilder(ParamDescriptor);

impl ParamBuilder {
    pub fn float(name: impl Into<String>) -> Self {
        Self(ParamDescriptor::new(name, ParamKind::Float))
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self(ParamDescriptor::new(name, ParamKind::Int))
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self(ParamDescriptor::new(name, ParamKind::String))
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self(ParamDescriptor::new(name, ParamKind::Bool))
    }

    pub fn enum_(name: impl Into<String>, choices: Vec<String>) -> Self {
        let mut d = ParamDescriptor::new(name, ParamKind::Enum);
        d.choices = Some(choices);
        Self(d)
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.0.min = Some(min);
        self.0.max = Some(max);
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.0.step = Some(step);
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.0.default = Some(value.into());
        self.0.required = false;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.0.required = required;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.0.description = description.into();
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.0.unit = unit.into();
        self
    }

    pub fn build(self) -> ParamDescriptor {
        self.0
    }
}

/// Fluent builder for a single [`CommandDescriptor`]. Registration is
/// finalized, and the descriptor inserted into the owning registry, when
/// [`CommandRegistration::handler`] is called.
pub struct CommandRegistration<'a> {
    registry: &'a CommandRegistry,
    name: String,
    description: String,
    params: Vec<ParamDescriptor>,
}

impl<'a> CommandRegistration<'a> {
    pub(super) fn new(registry: &'a CommandRegistry, name: String) -> Self {
        Self { registry, name, description: String::new(), params: Vec::new() }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: ParamBuilder) -> Self {
        self.params.push(param.build());
        self
    }

    /// Finish registration with the handler, inserting the command into the
    /// registry. The handler receives the validated/defaulted argument map;
    /// `Ok(None)` becomes `{"status":"ok"}`, `Ok(Some(Value::Map(_)))` is
    /// forwarded as-is, any other `Ok(Some(_))` is wrapped as `{"value": ...}`.
    pub fn handler<F>(self, handler: F)
    where
        F: Fn(&BTreeMap<String, Value>) -> Result<Option<Value>, String> + Send + Sync + 'static,
    {
        self.registry.insert(CommandDescriptor {
            name: self.name,
            description: self.description,
            params: self.params,
            handler: Box::new(handler),
        });
    }
}
