// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A typed command with an out-of-range parameter is rejected by validation
//! before the handler ever runs, and the rejection is reported as a
//! `command_result` error frame over the control channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value as Json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use plexus_agent::buffer::MemoryBuffer;
use plexus_agent::command::{CommandRegistry, ParamBuilder};
use plexus_agent::connector::{Connector, DeviceIdentity};
use plexus_agent::driver::SensorHub;
use plexus_agent::error::AgentError;
use plexus_agent::frame::{Capabilities, Credential};
use plexus_agent::ingest::IngestClient;
use plexus_agent::shell::{ShellExecutor, ShellPolicy};
use plexus_agent::stream::{CameraHubFactory, StreamManager};

struct NoSensors;
impl SensorHub for NoSensors {
    fn read_all(&self) -> Result<Vec<plexus_agent::driver::SensorReading>, AgentError> {
        Ok(vec![])
    }
}

/// Accepts one connection, sends `authenticated`, forwards the
/// `typed_command` request, then collects every frame the agent sends back
/// until it has seen a `command_result`.
async fn spawn_dispatch_server() -> (String, tokio::task::JoinHandle<Vec<Json>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        let Ok((stream, _)) = listener.accept().await else { return received };
        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else { return received };
        let (mut tx, mut rx) = ws.split();

        let _ = tx.send(WsMessage::Text(r#"{"type":"authenticated"}"#.into())).await;
        let _ = tx
            .send(WsMessage::Text(
                r#"{"type":"typed_command","id":"c1","name":"set_speed","args":{"rpm":12000}}"#.into(),
            ))
            .await;

        while let Some(Ok(WsMessage::Text(text))) = rx.next().await {
            if let Ok(value) = serde_json::from_str::<Json>(&text) {
                let is_error_result = value["type"] == "command_result" && value["event"] == "error";
                received.push(value);
                if is_error_result {
                    break;
                }
            }
        }
        received
    });
    (format!("ws://{addr}"), handle)
}

#[tokio::test]
async fn out_of_range_rpm_is_rejected_without_invoking_the_handler() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let commands = Arc::new(CommandRegistry::new());
    {
        let invocations = Arc::clone(&invocations);
        commands
            .register("set_speed")
            .param(ParamBuilder::float("rpm").range(0.0, 10000.0))
            .handler(move |_params| {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            });
    }

    let ingest = Arc::new(IngestClient::new("http://127.0.0.1:1", "key", "source-1", Arc::new(MemoryBuffer::new(10))));
    let (tx, rx) = mpsc::channel(64);
    let camera_hubs: CameraHubFactory = Arc::new(|_id: &str| Err(AgentError::Validation("no cameras in test".into())));
    let streams = Arc::new(StreamManager::new(Arc::new(NoSensors), camera_hubs, None, "source-1", tx.clone(), ingest));

    let shell = Arc::new(ShellExecutor::new(ShellPolicy::new(None, None).expect("policy")));

    let (ws_url, server) = spawn_dispatch_server().await;
    let identity = DeviceIdentity {
        source_id: "source-1".into(),
        platform: "linux-x86_64".into(),
        credential: Credential::ApiKey { api_key: "test-key".into() },
        capabilities: Capabilities::default(),
    };
    let connector = Arc::new(Connector::new(identity, "http://unused.invalid", Some(ws_url), streams, commands, shell, tx, rx));
    let shutdown = CancellationToken::new();

    let connector_bg = Arc::clone(&connector);
    let shutdown_bg = shutdown.clone();
    let run_handle = tokio::spawn(async move { connector_bg.run(shutdown_bg).await });

    let frames = tokio::time::timeout(Duration::from_secs(5), server).await.expect("server completes").expect("server task joins");

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), run_handle).await;

    let result = frames.iter().find(|f| f["type"] == "command_result").expect("a command_result frame was sent");
    assert_eq!(result["id"], "c1");
    assert_eq!(result["event"], "error");
    assert_eq!(result["message"], "'rpm' must be <= 10000");

    assert_eq!(invocations.load(Ordering::SeqCst), 0, "handler must not run when validation fails");
}
