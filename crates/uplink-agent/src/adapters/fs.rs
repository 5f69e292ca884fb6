//! Local filesystem over `tokio::fs`.

use crate::domain::AgentError;
use crate::ports::LocalFs;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// [`LocalFs`] backed by the real filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioFs;

impl TokioFs {
    /// New adapter.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LocalFs for TokioFs {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn remove_all(&self, path: &Path) -> Result<(), AgentError> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AgentError::filesystem(path, e)),
        };

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };

        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AgentError::filesystem(path, e)),
        }
    }

    async fn copy_recursive(&self, from: &Path, to: &Path) -> Result<(), AgentError> {
        let from = from.to_path_buf();
        let to = to.to_path_buf();
        tokio::task::spawn_blocking(move || copy_blocking(&from, &to))
            .await
            .map_err(|e| AgentError::Internal(e.to_string()))?
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), AgentError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| AgentError::filesystem(path, e))
    }
}

fn copy_blocking(from: &Path, to: &Path) -> Result<(), AgentError> {
    let metadata = std::fs::metadata(from).map_err(|e| AgentError::filesystem(from, e))?;
    if metadata.is_file() {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AgentError::filesystem(parent, e))?;
        }
        std::fs::copy(from, to).map_err(|e| AgentError::filesystem(from, e))?;
        return Ok(());
    }

    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        std::fs::create_dir_all(&dst).map_err(|e| AgentError::filesystem(&dst, e))?;
        let entries = std::fs::read_dir(&src).map_err(|e| AgentError::filesystem(&src, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| AgentError::filesystem(&src, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| AgentError::filesystem(entry.path(), e))?;
            let target = dst.join(entry.file_name());
            if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else {
                std::fs::copy(entry.path(), &target)
                    .map_err(|e| AgentError::filesystem(entry.path(), e))?;
            }
        }
    }
    Ok(())
}
