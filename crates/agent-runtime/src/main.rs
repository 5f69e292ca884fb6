//! # Uplink Agent
//!
//! Entry point: `uplink-agent --config agent.toml`.

use agent_runtime::{build_agent, resolve_config, run, Cli};
use anyhow::{Context, Result};
use clap::Parser;
use uplink_agent::RunExit;
use uplink_telemetry::{init_telemetry, log_event, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if let Some(level) = &cli.log_level {
        telemetry = telemetry.with_log_level(level);
    }
    let _telemetry = init_telemetry(&telemetry).context("Failed to initialize telemetry")?;

    let config = resolve_config(&cli)?;
    let agent = build_agent(config)?;

    match run(agent).await? {
        RunExit::ReconnectExhausted => {
            log_event!(warn, "runtime", "Control plane unreachable, exiting");
            std::process::exit(2);
        }
        RunExit::Disabled | RunExit::Shutdown => Ok(()),
    }
}
