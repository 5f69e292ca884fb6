//! Host integration for running the agent next to an application that is
//! not linked in-process: shell commands for rebuild/install, JSON files for
//! the model and API registries.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;
use uplink_agent::domain::HostOptions;
use uplink_agent::{AgentConfig, AgentError, HostRuntime, HostSnapshot};
use uplink_telemetry::log_event;

/// [`HostRuntime`] driven by configuration.
pub struct StandaloneHost {
    app_root: PathBuf,
    options: HostOptions,
    public_config: Value,
}

impl StandaloneHost {
    /// Host for `config`. Secrets are never part of the snapshot.
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            app_root: config.app_root.clone(),
            options: config.host.clone(),
            public_config: json!({
                "appId": config.app_id,
                "name": config.name,
                "environment": config.environment,
            }),
        }
    }

    async fn read_registry(&self, file: Option<&Path>) -> Result<Value, AgentError> {
        let Some(file) = file else {
            return Ok(json!({}));
        };
        let path = self.app_root.join(file);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| AgentError::filesystem(&path, e))?;
        serde_json::from_slice(&raw).map_err(|e| AgentError::Host(format!("{}: {}", path.display(), e)))
    }

    /// Spawn `command` through the shell and log its exit in the background.
    fn spawn_command(&self, label: &'static str, command: &str) -> Result<(), AgentError> {
        let mut child = shell(command)
            .current_dir(&self.app_root)
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| AgentError::Host(format!("{} failed to start: {}", label, e)))?;

        let command = command.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    log_event!(info, "runtime", "Host command finished", task = label);
                }
                Ok(status) => {
                    log_event!(warn, "runtime", "Host command failed", task = label, command = %command, status = %status);
                }
                Err(e) => {
                    log_event!(warn, "runtime", "Host command lost", task = label, error = %e);
                }
            }
        });
        Ok(())
    }
}

#[async_trait]
impl HostRuntime for StandaloneHost {
    async fn snapshot(&self) -> Result<HostSnapshot, AgentError> {
        Ok(HostSnapshot {
            config: self.public_config.clone(),
            models: self.read_registry(self.options.models_file.as_deref()).await?,
            api: self.read_registry(self.options.api_file.as_deref()).await?,
        })
    }

    async fn rebuild(&self) -> Result<(), AgentError> {
        match &self.options.rebuild_command {
            Some(command) => self.spawn_command("rebuild", command),
            None => Err(AgentError::Host("No rebuild command configured".to_string())),
        }
    }

    async fn config_changed(&self) -> Result<(), AgentError> {
        match &self.options.install_command {
            Some(command) => self.spawn_command("install", command),
            None => {
                info!("[uplink] No install command configured, nothing to do");
                Ok(())
            }
        }
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
