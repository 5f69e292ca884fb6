//! # Action Handlers
//!
//! The fixed set of operations the control plane can invoke. Each takes the
//! envelope payload and yields one [`CommandResult`].

use crate::domain::{naming, ActionKind, AgentError, CommandResult, TrustedSession};
use crate::ports::{HostRuntime, LocalFs};
use crate::service::path_locks::PathLocks;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// `toRemove` entry.
#[derive(Clone, Debug, Deserialize)]
pub struct RemoveTarget {
    /// Path to remove.
    pub path: String,
}

/// `toRename` entry.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameTarget {
    /// Existing path.
    pub old_path: String,
    /// New path.
    pub new_path: String,
}

/// Handler table implementation.
#[derive(Clone)]
pub struct ActionHandlers {
    app_root: PathBuf,
    host: Arc<dyn HostRuntime>,
    fs: Arc<dyn LocalFs>,
    locks: PathLocks,
}

impl ActionHandlers {
    /// Create handlers bound to a host and filesystem.
    pub fn new(
        app_root: PathBuf,
        host: Arc<dyn HostRuntime>,
        fs: Arc<dyn LocalFs>,
        locks: PathLocks,
    ) -> Self {
        Self {
            app_root,
            host,
            fs,
            locks,
        }
    }

    /// Run `kind` with `payload`.
    pub async fn invoke(
        &self,
        kind: ActionKind,
        payload: &Map<String, Value>,
        session: &TrustedSession,
    ) -> CommandResult {
        match kind {
            ActionKind::HandleConfig => self.handle_config().await,
            ActionKind::PullServer => self.pull_server(session).await,
            ActionKind::Rebuild => self.rebuild().await,
            ActionKind::RemoveFileOrFolder => self.remove_file_or_folder(payload).await,
            ActionKind::RenameFileOrFolder => self.rename_file_or_folder(payload).await,
        }
    }

    /// Configuration changed on the control plane.
    pub async fn handle_config(&self) -> CommandResult {
        warn!("[uplink] We need to flush server.");
        warn!("[uplink] Install dependencies if we have to.");
        self.host.config_changed().await?;
        Ok(Value::Bool(true))
    }

    /// Snapshot of the host state.
    pub async fn pull_server(&self, session: &TrustedSession) -> CommandResult {
        let snapshot = self.host.snapshot().await?;
        Ok(json!({
            "token": session.token(),
            "config": snapshot.config,
            "models": snapshot.models,
            "api": snapshot.api,
            "templates": {},
        }))
    }

    /// Trigger a rebuild; does not wait for it to finish.
    pub async fn rebuild(&self) -> CommandResult {
        self.host.rebuild().await?;
        info!("[uplink] Rebuild triggered");
        Ok(Value::Bool(true))
    }

    /// Remove each `toRemove[].path`. A missing path fails the batch.
    pub async fn remove_file_or_folder(&self, payload: &Map<String, Value>) -> CommandResult {
        let targets: Vec<RemoveTarget> = parse_batch(payload, "toRemove")?;

        run_batch(targets.into_iter().map(|target| {
            let this = self.clone();
            async move { this.remove_one(target).await }
        }))
        .await?;

        Ok(Value::Bool(true))
    }

    /// Copy each `toRename[].oldPath` to `newPath`, then remove the old path.
    ///
    /// No rollback: if the copy succeeds and the removal fails, both paths
    /// exist and the batch reports the failure.
    pub async fn rename_file_or_folder(&self, payload: &Map<String, Value>) -> CommandResult {
        let targets: Vec<RenameTarget> = parse_batch(payload, "toRename")?;

        run_batch(targets.into_iter().map(|target| {
            let this = self.clone();
            async move { this.rename_one(target).await }
        }))
        .await?;

        Ok(Value::Bool(true))
    }

    async fn remove_one(&self, target: RemoveTarget) -> Result<(), AgentError> {
        let path = naming::resolve_path(&self.app_root, &target.path);
        let _guard = self.locks.lock(&path).await;

        if !self.fs.exists(&path).await {
            return Err(AgentError::UnknownPath(target.path));
        }
        self.fs.remove_all(&path).await?;
        info!(path = %path.display(), "[uplink] Removed");
        Ok(())
    }

    async fn rename_one(&self, target: RenameTarget) -> Result<(), AgentError> {
        let old_path = naming::resolve_path(&self.app_root, &target.old_path);
        let new_path = naming::resolve_path(&self.app_root, &target.new_path);
        let _guards = self.locks.lock_pair(&old_path, &new_path).await;

        if !self.fs.exists(&old_path).await {
            return Err(AgentError::UnknownPath(target.old_path));
        }
        self.fs.copy_recursive(&old_path, &new_path).await?;
        if let Err(e) = self.fs.remove_all(&old_path).await {
            warn!(
                old_path = %old_path.display(),
                new_path = %new_path.display(),
                error = %e,
                "[uplink] Rename copied but old path could not be removed"
            );
            return Err(e);
        }
        info!(
            old_path = %old_path.display(),
            new_path = %new_path.display(),
            "[uplink] Renamed"
        );
        Ok(())
    }
}

/// Extract a batch array from the payload.
fn parse_batch<T: DeserializeOwned>(
    payload: &Map<String, Value>,
    attribute: &'static str,
) -> Result<Vec<T>, AgentError> {
    let entries = payload
        .get(attribute)
        .and_then(Value::as_array)
        .ok_or(AgentError::InvalidBatchAttribute(attribute))?;

    entries
        .iter()
        .map(|entry| {
            serde_json::from_value(entry.clone()).map_err(|e| AgentError::InvalidBatchEntry {
                attribute,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Run every operation concurrently; first failure wins, the rest finish
/// in the background.
async fn run_batch<I, F>(operations: I) -> Result<(), AgentError>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<(), AgentError>> + Send + 'static,
{
    let mut batch = JoinSet::new();
    for operation in operations {
        batch.spawn(operation);
    }

    while let Some(joined) = batch.join_next().await {
        let outcome = joined
            .map_err(|e| AgentError::Internal(e.to_string()))
            .and_then(|result| result);
        if let Err(e) = outcome {
            batch.detach_all();
            return Err(e);
        }
    }
    Ok(())
}
