// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! With no allowlist configured, `execute` is rejected before any process
//! is spawned, and the rejection surfaces as a single `output` error event.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use plexus_agent::shell::{ShellEvent, ShellExecutor, ShellPolicy};

#[tokio::test]
async fn execute_with_no_allowlist_is_rejected_without_spawning() {
    let policy = ShellPolicy::new(None, None).expect("policy builds");
    let executor = ShellExecutor::new(policy);

    let (tx, mut rx) = mpsc::channel(16);
    executor.execute("ls", None, tx, CancellationToken::new()).await;

    let event = rx.recv().await.expect("one event sent");
    assert_eq!(event, ShellEvent::Error("Command rejected: Shell execution disabled (no allowlist configured)".to_owned()));

    assert!(rx.recv().await.is_none(), "no further events: no Ack, no Start, no process was spawned");
}
