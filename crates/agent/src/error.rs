// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds shared across the agent runtime.
//!
//! Hot-path components (buffer, ingest, command registry, shell executor)
//! return [`AgentError`] so callers can classify failures without downcasting
//! `anyhow::Error`. Orchestration code (`main`, the connector's outer loop)
//! still uses `anyhow` for glue.

use std::fmt;

/// One of the error kinds from the propagation-policy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Invalid or missing credentials. Fatal to a connect or send attempt.
    Authentication(String),
    /// Timeout, reset, or closed connection. Retryable.
    Transport(String),
    /// Malformed frame or schema violation. Logged, frame dropped.
    Protocol(String),
    /// Bad command parameter. Returned as a structured error on that command only.
    Validation(String),
    /// Shell command denied by allowlist/denylist policy.
    Policy(String),
    /// Hardware read failure; logged, the owning stream continues.
    DriverTransient(String),
    /// Device disappeared; the owning stream terminates.
    DriverFatal(String),
    /// Local buffer is full; oldest entries were evicted. Non-fatal.
    ResourceExhausted(String),
}

impl AgentError {
    /// Whether the operation that produced this error should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Transport(_) | AgentError::ResourceExhausted(_))
    }

    pub fn message(&self) -> &str {
        match self {
            AgentError::Authentication(m)
            | AgentError::Transport(m)
            | AgentError::Protocol(m)
            | AgentError::Validation(m)
            | AgentError::Policy(m)
            | AgentError::DriverTransient(m)
            | AgentError::DriverFatal(m)
            | AgentError::ResourceExhausted(m) => m,
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            AgentError::Authentication(_) => "authentication",
            AgentError::Transport(_) => "transport",
            AgentError::Protocol(_) => "protocol",
            AgentError::Validation(_) => "validation",
            AgentError::Policy(_) => "policy",
            AgentError::DriverTransient(_) => "driver_transient",
            AgentError::DriverFatal(_) => "driver_fatal",
            AgentError::ResourceExhausted(_) => "resource_exhausted",
        };
        write!(f, "{kind}: {}", self.message())
    }
}

impl std::error::Error for AgentError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
