//! # Uplink Agent Runtime
//!
//! Production wiring for the agent binary.
//!
//! ## Startup Sequence
//!
//! 1. Parse CLI flags
//! 2. Initialize telemetry
//! 3. Load configuration (file, then environment) and validate it
//! 4. Wire WebSocket, HTTP, zip, filesystem and credentials adapters
//! 5. Run the connection manager until Ctrl+C or reconnect exhaustion

pub mod host;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use uplink_agent::adapters::{
    load_config, HomeCredentialStore, HttpArchiveFetcher, TokioFs, WsLinkConnector, ZipExtractor,
};
use uplink_agent::{Agent, AgentConfig, AgentDependencies, RunExit};
use uplink_telemetry::log_event;

pub use host::StandaloneHost;

/// Command-line flags.
#[derive(Debug, Parser)]
#[command(name = "uplink-agent", version, about = "Keeps an application connected to its control plane")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Load and validate configuration.
pub fn resolve_config(cli: &Cli) -> Result<AgentConfig> {
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Build the agent over the production adapters.
pub fn build_agent(config: AgentConfig) -> Result<Agent> {
    let connector = WsLinkConnector::new(config.socket_url(), config.call_timeout());
    let fetcher = HttpArchiveFetcher::new(config.download_url())
        .context("Failed to build download client")?;
    let credentials = HomeCredentialStore::new(&config.credentials_file);
    let host = StandaloneHost::new(&config);

    let deps = AgentDependencies {
        connector: Arc::new(connector),
        fetcher: Arc::new(fetcher),
        extractor: Arc::new(ZipExtractor::new()),
        fs: Arc::new(TokioFs::new()),
        host: Arc::new(host),
        credentials: Arc::new(credentials),
    };
    Ok(Agent::new(config, deps))
}

/// Run until Ctrl+C or until the connection manager gives up.
pub async fn run(agent: Agent) -> Result<RunExit> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let connection = Arc::clone(&agent.connection);
    let mut running = tokio::spawn(async move { connection.run(shutdown_rx).await });

    log_event!(
        info,
        "runtime",
        "Agent started",
        app_id = %agent.config.app_id,
        environment = %agent.config.environment,
        url = %agent.config.socket_url()
    );

    let exit = tokio::select! {
        joined = &mut running => joined.context("Connection task failed")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            log_event!(info, "runtime", "Shutdown requested");
            // Receiver may already be gone if the task just finished
            let _ = shutdown_tx.send(true);
            running.await.context("Connection task failed")?
        }
    };

    log_event!(info, "runtime", "Agent stopped", exit = ?exit);
    Ok(exit)
}
