//! # camrelay
//!
//! Relay binary: serves the WebSocket bridge, or runs the placeholder
//! pipeline worker behind it.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use camrelay_pipeline::{PlaceholderAnalyzer, Worker, WorkerConfig};
use camrelay_server::ServerConfig;
use camrelay_settings::RelaySettings;
use camrelay_telemetry::{init_telemetry, TelemetryConfig};
use camrelay_transport::{EndpointConfig, ZmqContext};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// WebSocket to ZeroMQ camera frame relay.
#[derive(Parser, Debug)]
#[command(name = "camrelay", version, about = "WebSocket to ZeroMQ camera frame relay")]
struct Cli {
    /// Settings file (defaults to `~/.camrelay/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept WebSocket clients and relay their frames.
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 for auto-assign (overrides settings).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the placeholder analysis worker.
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli
        .config
        .clone()
        .unwrap_or_else(camrelay_settings::settings_path);
    let settings = camrelay_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    let telemetry = init_telemetry(TelemetryConfig {
        log_level: settings.logging.level.clone(),
        json: settings.logging.json,
        ..TelemetryConfig::default()
    });
    tracing::debug!(path = %path.display(), "settings loaded");

    match cli.command {
        Command::Serve { host, port } => serve(settings, host, port, telemetry.metrics()).await,
        Command::Worker => worker(settings, telemetry.metrics()).await,
    }
}

async fn serve(
    settings: RelaySettings,
    host: Option<String>,
    port: Option<u16>,
    metrics: Arc<camrelay_telemetry::MetricsRecorder>,
) -> Result<()> {
    let mut config = ServerConfig::from(&settings);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    let grace = config.shutdown_grace;

    let context = Arc::new(ZmqContext::new(EndpointConfig::from(&settings.pipeline)));
    let endpoints = context.config();
    tracing::info!(
        pipeline = %endpoints.pipeline_endpoint,
        inbound = ?endpoints.inbound,
        connect_timeout_ms = endpoints.connect_timeout.as_millis() as u64,
        "relaying to pipeline"
    );

    let server = camrelay_server::start(config, context, metrics)
        .await
        .context("Failed to start server")?;
    tracing::info!("camrelay listening on http://{}", server.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown(grace).await {
        tracing::warn!(grace_ms = grace.as_millis() as u64, "sessions still open after grace period");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn worker(settings: RelaySettings, metrics: Arc<camrelay_telemetry::MetricsRecorder>) -> Result<()> {
    let analyzer = PlaceholderAnalyzer::from(&settings.worker);
    let worker = Worker::bind(WorkerConfig::from(&settings.worker), analyzer, metrics)
        .await
        .context("Failed to bind worker")?;

    let cancel = CancellationToken::new();
    let mut run = tokio::spawn(worker.run(cancel.clone()));

    let exited = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            false
        }
        result = &mut run => {
            let stats = result.context("worker task panicked")??;
            tracing::warn!(?stats, "worker exited");
            true
        }
    };
    if !exited {
        tracing::info!("Shutting down...");
        cancel.cancel();
        let stats = run.await.context("worker task panicked")??;
        tracing::info!(?stats, "Shutdown complete");
    }
    Ok(())
}
