//! # File Sync Pipeline
//!
//! Materializes the archives referenced by a command:
//!
//! 1. derive the scratch path from (file token, session token)
//! 2. download into it
//! 3. remove the destination
//! 4. extract into the destination (or its parent)
//! 5. delete the scratch file
//!
//! All files of one command run concurrently. The pipeline resolves once
//! every transfer succeeded, or on the first failure; transfers still in
//! flight at that point run to completion in the background.

use crate::domain::{naming, AgentError, DownloadRequest, FileReference, TrustedSession};
use crate::ports::{ArchiveExtractor, ArchiveFetcher, LocalFs};
use crate::service::path_locks::PathLocks;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uplink_telemetry::{metric_inc, metric_observe, FILE_TRANSFERS, FILE_TRANSFER_DURATION};

/// Downloads, replaces and extracts archives. Cheap to clone.
#[derive(Clone)]
pub struct FileSyncPipeline {
    app_root: PathBuf,
    fetcher: Arc<dyn ArchiveFetcher>,
    extractor: Arc<dyn ArchiveExtractor>,
    fs: Arc<dyn LocalFs>,
    locks: PathLocks,
}

impl FileSyncPipeline {
    /// Create a pipeline rooted at `app_root`.
    pub fn new(
        app_root: PathBuf,
        fetcher: Arc<dyn ArchiveFetcher>,
        extractor: Arc<dyn ArchiveExtractor>,
        fs: Arc<dyn LocalFs>,
        locks: PathLocks,
    ) -> Self {
        Self {
            app_root,
            fetcher,
            extractor,
            fs,
            locks,
        }
    }

    /// Sync every file; all-or-nothing from the caller's point of view.
    ///
    /// Returns the number of files synced.
    pub async fn sync_all(
        &self,
        files: &[FileReference],
        session: &TrustedSession,
    ) -> Result<usize, AgentError> {
        let token = session.token().unwrap_or_default().to_string();
        let mut transfers = JoinSet::new();

        for file in files.iter().cloned() {
            let pipeline = self.clone();
            let token = token.clone();
            transfers.spawn(async move { pipeline.sync_one(&file, &token).await });
        }

        let mut synced = 0;
        while let Some(joined) = transfers.join_next().await {
            let outcome = joined
                .map_err(|e| AgentError::Internal(e.to_string()))
                .and_then(|result| result);
            if let Err(e) = outcome {
                // Siblings keep running; dropping the set would abort them
                transfers.detach_all();
                return Err(e);
            }
            synced += 1;
        }

        Ok(synced)
    }

    /// Sync a single file reference.
    pub async fn sync_one(&self, file: &FileReference, session_token: &str) -> Result<(), AgentError> {
        let started = Instant::now();
        let scratch = self.scratch_path(&file.file_token, session_token).await?;
        let destination = naming::resolve_path(&self.app_root, &file.destination);

        let result = self.transfer(file, session_token, &scratch, &destination).await;

        // Scratch file never outlives the transfer
        let cleanup = self.fs.remove_all(&scratch).await;

        let result = match (result, cleanup) {
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                warn!(
                    scratch = %scratch.display(),
                    error = %cleanup_err,
                    "[uplink] Failed to remove scratch archive"
                );
                Err(e)
            }
            (result, Ok(())) => result,
        };

        match &result {
            Ok(()) => {
                metric_inc!(FILE_TRANSFERS, &["ok"]);
                metric_observe!(FILE_TRANSFER_DURATION, started.elapsed().as_secs_f64());
                debug!(
                    destination = %destination.display(),
                    src = %file.source,
                    "[uplink] Archive synced"
                );
            }
            Err(e) => {
                metric_inc!(FILE_TRANSFERS, &["failed"]);
                warn!(
                    destination = %destination.display(),
                    src = %file.source,
                    error = %e,
                    "[uplink] Archive sync failed"
                );
            }
        }

        result
    }

    async fn transfer(
        &self,
        file: &FileReference,
        session_token: &str,
        scratch: &Path,
        destination: &Path,
    ) -> Result<(), AgentError> {
        self.fs
            .create_dir_all(&naming::scratch_dir(&self.app_root))
            .await?;

        let request = DownloadRequest {
            token: session_token.to_string(),
            file_id: file.file_token.clone(),
            src: file.source.as_str().to_string(),
        };
        let bytes = self.fetcher.fetch(&request, scratch).await?;
        debug!(bytes, scratch = %scratch.display(), "[uplink] Archive downloaded");

        let extract_into = naming::extraction_root(destination, &file.source);

        let _guard = self.locks.lock(destination).await;
        self.fs.remove_all(destination).await?;
        self.fs.create_dir_all(&extract_into).await?;
        let entries = self.extractor.extract(scratch, &extract_into).await?;
        debug!(entries, into = %extract_into.display(), "[uplink] Archive extracted");

        Ok(())
    }

    async fn scratch_path(&self, file_token: &str, session_token: &str) -> Result<PathBuf, AgentError> {
        let app_root = self.app_root.clone();
        let file_token = file_token.to_string();
        let session_token = session_token.to_string();

        tokio::task::spawn_blocking(move || {
            naming::temp_artifact_path(&app_root, &file_token, &session_token)
        })
        .await
        .map_err(|e| AgentError::Internal(e.to_string()))
    }
}
