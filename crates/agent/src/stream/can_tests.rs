// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::MemoryBuffer;

fn test_ingest() -> Arc<IngestClient> {
    Arc::new(IngestClient::new("http://127.0.0.1:1", "key", "source-1", Arc::new(MemoryBuffer::new(100))))
}

#[tokio::test]
async fn returns_promptly_when_the_channel_cannot_be_opened() {
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run("s1".into(), "plexus-test-nonexistent0".into(), None, None, "source-1".into(), false, tx, test_ingest(), cancel),
    )
    .await;

    assert!(result.is_ok(), "run should return once connect fails on a nonexistent channel");
    assert!(rx.try_recv().is_err(), "no telemetry should be sent when the bus never connected");
}
