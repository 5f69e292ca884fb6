//! Credentials file in the user's home directory (`~/.uplinkrc` by default).
//!
//! JSON object with a `token` key. A missing file is not an error.

use crate::domain::AgentError;
use crate::ports::CredentialStore;
use async_trait::async_trait;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::PathBuf;

#[derive(Deserialize)]
struct CredentialsFile {
    token: Option<String>,
}

/// [`CredentialStore`] reading a JSON file.
#[derive(Clone, Debug)]
pub struct HomeCredentialStore {
    path: PathBuf,
}

impl HomeCredentialStore {
    /// `file_name` under the home directory; falls back to the working
    /// directory when no home is known.
    pub fn new(file_name: &str) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::at(home.join(file_name))
    }

    /// Explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File being read.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for HomeCredentialStore {
    async fn load_token(&self) -> Result<Option<String>, AgentError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AgentError::filesystem(&self.path, e)),
        };

        let file: CredentialsFile = serde_json::from_slice(&raw)
            .map_err(|e| AgentError::filesystem(&self.path, e))?;
        Ok(file.token.filter(|token| !token.is_empty()))
    }
}
