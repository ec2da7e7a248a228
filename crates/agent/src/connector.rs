// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connector: owns the control-channel socket and the dispatch loop that
//! routes inbound frames to the stream manager, command registry, and shell
//! executor. Reconnects with backoff on any socket error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::CommandRegistry;
use crate::frame::{Capabilities, Credential, InboundFrame, OutboundFrame};
use crate::shell::{ShellEvent, ShellExecutor};
use crate::stream::StreamManager;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PING_TIMEOUT: Duration = Duration::from_secs(10);
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);
const ACTIVE_RESET_THRESHOLD: Duration = Duration::from_secs(30);

/// Connector lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Idle,
    Connecting,
    Authenticating,
    Active,
    Reconnecting,
    Stopped,
}

impl ConnectorState {
    fn label(self) -> &'static str {
        match self {
            ConnectorState::Idle => "idle",
            ConnectorState::Connecting => "connecting",
            ConnectorState::Authenticating => "authenticating",
            ConnectorState::Active => "active",
            ConnectorState::Reconnecting => "reconnecting",
            ConnectorState::Stopped => "stopped",
        }
    }
}

/// Backoff counter for the reconnect loop. Exponential ×2, capped, ±25%
/// jitter, reset to the base delay after a connection that was Active for
/// longer than [`ACTIVE_RESET_THRESHOLD`].
struct Backoff {
    attempt: u32,
}

impl Backoff {
    fn new() -> Self {
        Self { attempt: 0 }
    }

    fn next_delay(&mut self) -> Duration {
        let unjittered = BACKOFF_BASE.as_secs_f64() * 2f64.powi(self.attempt as i32);
        let capped = unjittered.min(BACKOFF_MAX.as_secs_f64());
        let factor = rand::rng().random_range(0.75..1.25);
        self.attempt += 1;
        Duration::from_secs_f64((capped * factor).max(0.0))
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Static, never-changing facts the connector advertises once on every
/// `device_auth` (capabilities, not currently-active streams).
pub struct DeviceIdentity {
    pub source_id: String,
    pub platform: String,
    pub credential: Credential,
    pub capabilities: Capabilities,
}

/// Resolves the control-channel URL: env override, `/api/config` discovery,
/// or a local-development fallback.
pub async fn discover_ws_url(http_endpoint: &str, env_override: Option<&str>, ws_url_override: Option<&str>) -> anyhow::Result<String> {
    if let Some(url) = ws_url_override.or(env_override) {
        return Ok(url.to_owned());
    }

    let config_url = format!("{}/api/config", http_endpoint.trim_end_matches('/'));
    let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
    match client.get(&config_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            #[derive(serde::Deserialize)]
            struct ConfigResponse {
                ws_url: String,
            }
            match resp.json::<ConfigResponse>().await {
                Ok(cfg) => return Ok(cfg.ws_url),
                Err(e) => warn!(err = %e, "malformed /api/config response, falling back"),
            }
        }
        Ok(resp) => warn!(status = resp.status().as_u16(), "/api/config returned non-success, falling back"),
        Err(e) => warn!(err = %e, "/api/config request failed, falling back"),
    }

    Ok(local_dev_fallback(http_endpoint))
}

fn local_dev_fallback(http_endpoint: &str) -> String {
    let base = http_endpoint.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}/ws")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}/ws")
    } else {
        format!("ws://{base}/ws")
    }
}

/// Owns the control socket and drives the connect/authenticate/dispatch/
/// reconnect state machine until told to stop.
///
/// The outbound channel is created once by the caller (the same sender is
/// handed to the [`StreamManager`]) and its receiver lives here across
/// reconnects: a fresh socket on each reconnect attempt, but one stable
/// queue feeding it.
pub struct Connector {
    identity: DeviceIdentity,
    http_endpoint: String,
    ws_url_override: Option<String>,
    streams: Arc<StreamManager>,
    commands: Arc<CommandRegistry>,
    shell: Arc<ShellExecutor>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    outbound_rx: Mutex<mpsc::Receiver<OutboundFrame>>,
    state: Mutex<ConnectorState>,
    shell_cancel: Mutex<Option<CancellationToken>>,
    active_since: Mutex<Option<Instant>>,
}

impl Connector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: DeviceIdentity,
        http_endpoint: impl Into<String>,
        ws_url_override: Option<String>,
        streams: Arc<StreamManager>,
        commands: Arc<CommandRegistry>,
        shell: Arc<ShellExecutor>,
        outbound_tx: mpsc::Sender<OutboundFrame>,
        outbound_rx: mpsc::Receiver<OutboundFrame>,
    ) -> Self {
        Self {
            identity,
            http_endpoint: http_endpoint.into(),
            ws_url_override,
            streams,
            commands,
            shell,
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
            state: Mutex::new(ConnectorState::Idle),
            shell_cancel: Mutex::new(None),
            active_since: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> ConnectorState {
        *self.state.lock().await
    }

    async fn transition(&self, next: ConnectorState) {
        let mut state = self.state.lock().await;
        if *state != next {
            info!(from = state.label(), to = next.label(), "connector state transition");
            *state = next;
        }
    }

    /// Run until `shutdown` is cancelled. Reconnects indefinitely on
    /// transport errors; returns only on shutdown or unrecoverable auth
    /// failure.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut backoff = Backoff::new();

        loop {
            if shutdown.is_cancelled() {
                self.transition(ConnectorState::Stopped).await;
                return Ok(());
            }

            self.transition(ConnectorState::Connecting).await;

            match self.run_one_connection(&shutdown).await {
                Ok(ShutdownReason::Requested) => {
                    self.transition(ConnectorState::Stopped).await;
                    return Ok(());
                }
                Ok(ShutdownReason::AuthFailed(message)) => {
                    self.transition(ConnectorState::Stopped).await;
                    anyhow::bail!("authentication failed: {message}");
                }
                Ok(ShutdownReason::SocketClosed) | Err(_) => {
                    let was_active_long = self
                        .active_since
                        .lock()
                        .await
                        .take()
                        .is_some_and(|since| since.elapsed() > ACTIVE_RESET_THRESHOLD);
                    if was_active_long {
                        backoff.reset();
                    }
                    self.transition(ConnectorState::Reconnecting).await;
                    let delay = backoff.next_delay();
                    debug!(?delay, "reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.cancelled() => {
                            self.transition(ConnectorState::Stopped).await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn run_one_connection(&self, shutdown: &CancellationToken) -> anyhow::Result<ShutdownReason> {
        let ws_url = discover_ws_url(&self.http_endpoint, None, self.ws_url_override.as_deref()).await?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&ws_url).await?;
        let (ws_tx, mut ws_rx) = ws_stream.split();
        let ws_tx = Arc::new(Mutex::new(ws_tx));

        self.transition(ConnectorState::Authenticating).await;
        let auth_frame = OutboundFrame::DeviceAuth {
            source_id: self.identity.source_id.clone(),
            platform: self.identity.platform.clone(),
            capabilities: self.identity.capabilities.clone(),
            credential: self.identity.credential.clone(),
        };
        send_frame(&ws_tx, &auth_frame).await?;

        loop {
            match ws_rx.next().await {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<InboundFrame>(&text) {
                    Ok(InboundFrame::Authenticated) => break,
                    Ok(InboundFrame::Error { message }) => return Ok(ShutdownReason::AuthFailed(message)),
                    _ => continue,
                },
                Some(Ok(WsMessage::Close(_))) | None => return Ok(ShutdownReason::SocketClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(err = %e, "control socket read error during authentication");
                    return Ok(ShutdownReason::SocketClosed);
                }
            }
        }

        self.transition(ConnectorState::Active).await;
        *self.active_since.lock().await = Some(Instant::now());

        let mut outbound_rx = self.outbound_rx.lock().await;
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.shutdown_internal().await;
                    let _ = ws_tx.lock().await.send(WsMessage::Close(None)).await;
                    return Ok(ShutdownReason::Requested);
                }

                frame = outbound_rx.recv() => {
                    if let Some(frame) = frame {
                        if send_frame(&ws_tx, &frame).await.is_err() {
                            return Ok(ShutdownReason::SocketClosed);
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    let ping = ws_tx.lock().await.send(WsMessage::Ping(Vec::new().into()));
                    if tokio::time::timeout(PING_TIMEOUT, ping).await.is_err() {
                        return Ok(ShutdownReason::SocketClosed);
                    }
                }

                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            self.dispatch(&text, &self.outbound_tx).await;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            return Ok(ShutdownReason::SocketClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(err = %e, "control socket read error");
                            return Ok(ShutdownReason::SocketClosed);
                        }
                    }
                }
            }
        }
    }

    /// Parse and route one inbound frame. Unknown/malformed frames are
    /// logged and dropped, never terminate the connection.
    async fn dispatch(&self, text: &str, outbound: &mpsc::Sender<OutboundFrame>) {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                debug!(err = %e, "ignoring unrecognized or malformed inbound frame");
                return;
            }
        };

        match frame {
            InboundFrame::StartStream { id, metrics, interval_ms, store } => {
                self.streams.start_sensor_stream(id, metrics, interval_ms, store).await;
            }
            InboundFrame::StopStream { id } => {
                self.streams.stop_sensor_stream(&id).await;
            }
            InboundFrame::StartCamera { id, resolution, quality, frame_rate, store } => {
                if let Err(e) = self.streams.start_camera_stream(id.clone(), resolution, quality, frame_rate, store).await {
                    warn!(stream_id = %id, err = %e, "failed to start camera stream");
                }
            }
            InboundFrame::StopCamera { id } => {
                self.streams.stop_camera_stream(&id).await;
            }
            InboundFrame::StartCan { id, channel, dbc_path, bitrate, store } => {
                if let Err(e) = self.streams.start_can_stream(id.clone(), channel, dbc_path, bitrate, store).await {
                    warn!(stream_id = %id, err = %e, "failed to start CAN stream");
                }
            }
            InboundFrame::StopCan { id } => {
                self.streams.stop_can_stream(&id).await;
            }
            InboundFrame::Configure { id, sample_rate_ms, metric_prefix, options } => {
                self.streams.configure_sensor(&id, sample_rate_ms, metric_prefix, &options);
            }
            InboundFrame::ConfigureCamera { id, resolution, quality, frame_rate } => {
                self.streams.configure_camera(&id, resolution, quality, frame_rate);
            }
            InboundFrame::Execute { id, command, timeout_ms } => {
                self.run_shell(id, command, timeout_ms, outbound.clone()).await;
            }
            InboundFrame::Cancel { .. } => {
                if let Some(cancel) = self.shell_cancel.lock().await.as_ref() {
                    cancel.cancel();
                }
            }
            InboundFrame::TypedCommand { id, name, args } => {
                self.run_typed_command(id, name, args, outbound.clone()).await;
            }
            InboundFrame::Ping => {
                let _ = outbound.send(OutboundFrame::Pong).await;
            }
        }
    }

    async fn run_shell(&self, id: String, command: String, timeout_ms: Option<u64>, outbound: mpsc::Sender<OutboundFrame>) {
        let cancel = CancellationToken::new();
        *self.shell_cancel.lock().await = Some(cancel.clone());

        let shell = Arc::clone(&self.shell);
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let timeout = timeout_ms.map(Duration::from_millis);

        tokio::spawn(async move {
            shell.execute(&command, timeout, events_tx, cancel).await;
        });

        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let outbound_event = match event {
                    ShellEvent::Ack => crate::frame::OutputEvent::Ack,
                    ShellEvent::Start => crate::frame::OutputEvent::Start,
                    ShellEvent::Data(data) => crate::frame::OutputEvent::Data { data },
                    ShellEvent::Timeout => crate::frame::OutputEvent::Timeout,
                    ShellEvent::Exit(code) => crate::frame::OutputEvent::Exit { code },
                    ShellEvent::Error(message) => crate::frame::OutputEvent::Error { message },
                };
                if outbound.send(OutboundFrame::Output { id: id.clone(), event: outbound_event }).await.is_err() {
                    break;
                }
            }
        });
    }

    async fn run_typed_command(&self, id: String, name: String, args: std::collections::BTreeMap<String, crate::value::Value>, outbound: mpsc::Sender<OutboundFrame>) {
        let commands = Arc::clone(&self.commands);
        tokio::task::spawn_blocking(move || commands.execute(&name, &args))
            .await
            .unwrap_or_else(|e| vec![crate::command::CommandEvent::Error(format!("command task panicked: {e}"))])
            .into_iter()
            .for_each(|event| {
                let outbound = outbound.clone();
                let id = id.clone();
                let event = match event {
                    crate::command::CommandEvent::Ack => crate::frame::CommandResultEvent::Ack,
                    crate::command::CommandEvent::Result(value) => crate::frame::CommandResultEvent::Result { value },
                    crate::command::CommandEvent::Error(message) => crate::frame::CommandResultEvent::Error { message },
                };
                tokio::spawn(async move {
                    let _ = outbound.send(OutboundFrame::CommandResult { id, event }).await;
                });
            });
    }

    /// Shutdown ordering per the concurrency model: stop accepting new work
    /// (caller does this by exiting the dispatch loop), cancel every stream
    /// and await cleanup, cancel the shell.
    async fn shutdown_internal(&self) {
        self.streams.stop_all().await;
        if let Some(cancel) = self.shell_cancel.lock().await.take() {
            cancel.cancel();
        }
    }
}

enum ShutdownReason {
    Requested,
    SocketClosed,
    AuthFailed(String),
}

async fn send_frame<S>(tx: &Arc<Mutex<S>>, frame: &OutboundFrame) -> anyhow::Result<()>
where
    S: SinkExt<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let text = serde_json::to_string(frame)?;
    tx.lock().await.send(WsMessage::Text(text.into())).await?;
    Ok(())
}

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;
