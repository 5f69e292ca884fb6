//! HTTP archive download: `POST {url}/socket/download` with a JSON body,
//! response streamed to disk.

use crate::domain::{AgentError, DownloadRequest};
use crate::ports::ArchiveFetcher;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// [`ArchiveFetcher`] over reqwest.
#[derive(Clone)]
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpArchiveFetcher {
    /// Fetcher posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| AgentError::DownloadFailed(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Download endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(&self, request: &DownloadRequest, target: &Path) -> Result<u64, AgentError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AgentError::DownloadFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::DownloadFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| AgentError::filesystem(target, e))?;

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| AgentError::DownloadFailed(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| AgentError::filesystem(target, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| AgentError::filesystem(target, e))?;

        Ok(written)
    }
}
