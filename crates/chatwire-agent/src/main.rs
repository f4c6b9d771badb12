//! # chatwire-agent
//!
//! chatwire server binary: loads settings, wires the agent runtime into the
//! relay server and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatwire_core::logging::init_subscriber;
use chatwire_core::{EventSink, StatusChannel};
use chatwire_runtime::{AgentRuntime, EchoRuntime};
use chatwire_server::config::ServerConfig;
use chatwire_server::metrics::install_recorder;
use chatwire_server::server::ChatServer;
use chatwire_settings::{ChatwireSettings, load_settings_from_path, settings_path};
use clap::Parser;
use tracing::info;

/// How long background tasks get to stop after Ctrl-C.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket chat relay for an agent runtime.
#[derive(Parser, Debug)]
#[command(name = "chatwire", about = "WebSocket chat relay for an agent runtime")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.chatwire/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory with `index.html` and static assets (overrides settings).
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings.clone().unwrap_or_else(settings_path)
    }

    fn apply(&self, settings: &mut ChatwireSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.static_dir {
            settings.server.static_dir.clone_from(dir);
        }
    }
}

fn load(cli: &Cli) -> Result<ChatwireSettings> {
    let path = cli.settings_path();
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings after CLI overrides")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;
    init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics = install_recorder();
    let status = StatusChannel::new(settings.status.history_limit);
    let events = EventSink::default();
    let runtime: Arc<dyn AgentRuntime> = Arc::new(EchoRuntime::new(status.clone(), events.clone()));

    let server = ChatServer::new(ServerConfig::from(&settings), runtime, status).with_metrics(metrics);
    server.start_background(&events);
    let addr = server.listen().await.context("Failed to bind server")?;
    info!(
        app_name = %settings.server.app_name,
        static_dir = %settings.server.static_dir.display(),
        "chatwire listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    let clean = server.shutdown().graceful_shutdown(SHUTDOWN_TIMEOUT).await;
    info!(clean, "Shutdown complete");
    Ok(())
}
