// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandboxed shell command execution: allowlist/denylist policy, streamed
//! output, timeout enforcement, and cooperative cancellation.
//!
//! At most one shell command runs at a time per agent; callers serialize
//! `execute` calls (the connector's dispatch loop is itself single-threaded
//! w.r.t. inbound frames, so this is a property of the caller, not a lock
//! held here).

use std::process::Stdio;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::AgentError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const SIGTERM_GRACE: Duration = Duration::from_secs(5);

/// Commands blocked unconditionally, even with an allowlist configured.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "rm -rf *",
    "rm -rf /",
    "rm -rf /*",
    "dd *",
    "mkfs*",
    "shutdown*",
    "reboot*",
    "format*",
    "> /dev/*",
    ":(){ :|:& };:",
];

/// Events emitted on the control channel while a command runs, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    Ack,
    Start,
    Data(String),
    Timeout,
    Exit(Option<i32>),
    Error(String),
}

/// Allowlist/denylist policy gating shell execution.
///
/// Security model is default-deny: with no allowlist configured, every
/// execution is refused. The denylist is checked first regardless (defense
/// in depth), then the allowlist.
pub struct ShellPolicy {
    denylist: GlobSet,
    allowlist: Option<GlobSet>,
}

impl ShellPolicy {
    /// Build a policy from raw glob patterns. `denylist: None` uses
    /// [`DEFAULT_DENYLIST`].
    pub fn new(allowlist: Option<&[String]>, denylist: Option<&[String]>) -> anyhow::Result<Self> {
        let denylist = build_globset(denylist.unwrap_or(&DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect::<Vec<_>>()))?;
        let allowlist = allowlist.map(build_globset).transpose()?;
        Ok(Self { denylist, allowlist })
    }

    /// Check whether `command` is permitted. Returns `Err` with a
    /// human-readable rejection reason otherwise.
    pub fn check(&self, command: &str) -> Result<(), String> {
        if self.denylist.is_match(command) {
            return Err(format!("Command rejected: blocked by denylist: {command}"));
        }
        match &self.allowlist {
            None => Err("Command rejected: Shell execution disabled (no allowlist configured)".to_owned()),
            Some(allowlist) => {
                if allowlist.is_match(command) {
                    Ok(())
                } else {
                    Err(format!("Command rejected: not in allowlist: {command}"))
                }
            }
        }
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Executes one shell command at a time, spawned without a shell from a
/// POSIX-tokenized argv, in its own process group for group-wide signaling.
pub struct ShellExecutor {
    policy: ShellPolicy,
    default_timeout: Duration,
}

impl ShellExecutor {
    pub fn new(policy: ShellPolicy) -> Self {
        Self { policy, default_timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Run `command`, streaming [`ShellEvent`]s on `events` until exit,
    /// timeout, or cancellation via `cancel`.
    ///
    /// Returns immediately (before `Ack`) if the policy rejects the
    /// command; no process is spawned in that case.
    pub async fn execute(&self, command: &str, timeout: Option<Duration>, events: mpsc::Sender<ShellEvent>, cancel: CancellationToken) {
        if let Err(reason) = self.policy.check(command) {
            let _ = events.send(ShellEvent::Error(reason)).await;
            return;
        }

        let _ = events.send(ShellEvent::Ack).await;

        let argv = match shlex::split(command) {
            Some(argv) if !argv.is_empty() => argv,
            _ => {
                let _ = events.send(ShellEvent::Error("empty or unparsable command".to_owned())).await;
                return;
            }
        };

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = events.send(ShellEvent::Error(e.to_string())).await;
                return;
            }
        };

        let _ = events.send(ShellEvent::Start).await;

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_forwarder(stdout, events.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_forwarder(stderr, events.clone());
        }
        let timeout = timeout.unwrap_or(self.default_timeout);

        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => { let _ = events.send(ShellEvent::Exit(status.code())).await; }
                    Err(e) => { let _ = events.send(ShellEvent::Error(e.to_string())).await; }
                }
            }
            _ = tokio::time::sleep(timeout) => {
                if let Some(pid) = pid {
                    kill_group(pid, Signal::SIGKILL);
                }
                let _ = child.kill().await;
                let _ = events.send(ShellEvent::Timeout).await;
            }
            _ = cancel.cancelled() => {
                if let Some(pid) = pid {
                    kill_group(pid, Signal::SIGTERM);
                    tokio::select! {
                        _ = tokio::time::sleep(SIGTERM_GRACE) => {
                            kill_group(pid, Signal::SIGKILL);
                        }
                        status = child.wait() => {
                            let _ = status;
                        }
                    }
                }
                let _ = child.kill().await;
                let _ = events.send(ShellEvent::Error("cancelled".to_owned())).await;
            }
        }
    }
}

/// Stream lines from a child's stdout/stderr pipe as [`ShellEvent::Data`]
/// until EOF or read error. Runs on its own task so stdout and stderr
/// interleave as they arrive, merged in delivery order.
fn spawn_line_forwarder(pipe: impl tokio::io::AsyncRead + Unpin + Send + 'static, events: mpsc::Sender<ShellEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if events.send(ShellEvent::Data(line)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(err = %e, "shell output read failed");
                    break;
                }
            }
        }
    });
}

fn kill_group(pid: u32, signal: Signal) {
    let Ok(pid) = i32::try_from(pid) else { return };
    if let Err(e) = signal::kill(Pid::from_raw(-pid), signal) {
        warn!(err = %e, "failed to signal process group");
    }
}

/// Classify a policy rejection as a non-retryable, non-fatal [`AgentError`].
pub fn policy_error(reason: String) -> AgentError {
    AgentError::Policy(reason)
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
