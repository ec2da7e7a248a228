// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use plexus_agent::buffer::{Buffer, MemoryBuffer, SqliteBuffer};
use plexus_agent::command::CommandRegistry;
use plexus_agent::config::{init_tracing, run_init, Config, Subcommand};
use plexus_agent::connector::{Connector, DeviceIdentity};
use plexus_agent::driver::{CameraHub, SensorHub, SensorReading};
use plexus_agent::error::AgentError;
use plexus_agent::frame::{Capabilities, Credential};
use plexus_agent::ingest::IngestClient;
use plexus_agent::shell::{ShellExecutor, ShellPolicy};
use plexus_agent::stream::{CameraHubFactory, StreamManager};

/// No sensor driver is linked into this binary; hardware register-level
/// drivers are an external collaborator (spec §1). Streams started against
/// this hub simply emit nothing.
struct NoSensors;

impl SensorHub for NoSensors {
    fn read_all(&self) -> Result<Vec<SensorReading>, AgentError> {
        Ok(Vec::new())
    }
}

fn no_camera_driver(id: &str) -> Result<Arc<dyn CameraHub>, AgentError> {
    Err(AgentError::DriverFatal(format!("no camera driver configured for '{id}'")))
}

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);
    let _ = rustls::crypto::ring::default_provider().install_default();

    match &config.command {
        Some(Subcommand::Init) | Some(Subcommand::Pair) => {
            if let Err(e) = run_init(&config) {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        None => match run(config).await {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        },
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let resolved = config.resolve()?;

    let buffer: Arc<dyn Buffer> = if resolved.durable_buffer {
        Arc::new(SqliteBuffer::open_default(10_000)?)
    } else {
        Arc::new(MemoryBuffer::new(10_000))
    };

    let ingest = Arc::new(IngestClient::new(resolved.endpoint.clone(), resolved.api_key.clone(), resolved.source_id.clone(), buffer));

    let commands = Arc::new(CommandRegistry::new());

    let shell_policy = ShellPolicy::new(resolved.command_allowlist.as_deref(), resolved.command_denylist.as_deref())?;
    let shell = Arc::new(ShellExecutor::new(shell_policy));

    let (outbound_tx, outbound_rx) = mpsc::channel(256);

    let camera_hubs: CameraHubFactory = Arc::new(no_camera_driver);
    let streams = Arc::new(StreamManager::new(Arc::new(NoSensors), camera_hubs, None, resolved.source_id.clone(), outbound_tx.clone(), Arc::clone(&ingest)));

    let identity = DeviceIdentity {
        source_id: resolved.source_id.clone(),
        platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        credential: Credential::ApiKey { api_key: resolved.api_key.clone() },
        capabilities: Capabilities { sensors: Vec::new(), cameras: Vec::new(), can: Vec::new(), commands: commands.get_schemas() },
    };

    let connector = Arc::new(Connector::new(
        identity,
        resolved.endpoint.clone(),
        resolved.ws_url.clone(),
        Arc::clone(&streams),
        Arc::clone(&commands),
        Arc::clone(&shell),
        outbound_tx,
        outbound_rx,
    ));

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    info!(source_id = %resolved.source_id, endpoint = %resolved.endpoint, "starting plexus-agent");
    connector.run(shutdown).await
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGTERM"),
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGINT"),
        }
        shutdown.cancel();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGTERM again, forcing exit"),
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGINT again, forcing exit"),
        }
        std::process::exit(130);
    });
}
