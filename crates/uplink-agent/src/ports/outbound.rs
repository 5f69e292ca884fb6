//! # Outbound Ports
//!
//! Traits for external dependencies: the control-plane link, archive
//! download and extraction, the local filesystem, the host application and
//! the credentials file.

use crate::domain::{AgentError, DownloadRequest, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

// =============================================================================
// Control-plane link
// =============================================================================

/// Opens links to the control plane - outbound port.
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// Open a new link. Each successful call is one session.
    async fn connect(&self) -> Result<LinkSession, TransportError>;
}

/// An open link plus its inbound event stream.
///
/// The stream ending means the link disconnected.
pub struct LinkSession {
    /// Outbound half.
    pub link: Arc<dyn ControlPlaneLink>,
    /// Inbound events.
    pub events: mpsc::Receiver<LinkEvent>,
}

/// Outbound half of an open link - outbound port.
#[async_trait]
pub trait ControlPlaneLink: Send + Sync {
    /// Fire-and-forget event.
    async fn emit(&self, event: &str, data: Value) -> Result<(), TransportError>;

    /// Event that expects an acknowledgement; resolves to the ack arguments.
    async fn call(&self, event: &str, data: Value) -> Result<Vec<Value>, TransportError>;

    /// Close the link. Idempotent.
    async fn close(&self);
}

/// Something that happened on a link.
#[derive(Debug)]
pub enum LinkEvent {
    /// Named event from the control plane.
    Message(InboundMessage),
    /// Transport-level error; the link may still be up.
    Error(String),
}

/// Named inbound event.
#[derive(Debug)]
pub struct InboundMessage {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: Value,
    /// Present when the sender expects an acknowledgement.
    pub ack: Option<Ack>,
}

/// One-shot acknowledgement for an inbound event.
#[derive(Debug)]
pub struct Ack(oneshot::Sender<Vec<Value>>);

impl Ack {
    /// Create an ack and the receiver the transport waits on.
    pub fn channel() -> (Self, oneshot::Receiver<Vec<Value>>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Send the acknowledgement. Returns false if the link is gone.
    pub fn send(self, args: Vec<Value>) -> bool {
        self.0.send(args).is_ok()
    }
}

// =============================================================================
// File sync
// =============================================================================

/// Downloads archives - outbound port.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Stream the archive described by `request` into `target`.
    /// Returns bytes written.
    async fn fetch(&self, request: &DownloadRequest, target: &Path) -> Result<u64, AgentError>;
}

/// Extracts archives - outbound port.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `destination`. Returns entries written.
    async fn extract(&self, archive: &Path, destination: &Path) -> Result<usize, AgentError>;
}

/// Local filesystem - outbound port.
#[async_trait]
pub trait LocalFs: Send + Sync {
    /// Whether `path` exists.
    async fn exists(&self, path: &Path) -> bool;

    /// Remove a file or directory tree. Missing paths are not an error.
    async fn remove_all(&self, path: &Path) -> Result<(), AgentError>;

    /// Copy a file or directory tree.
    async fn copy_recursive(&self, from: &Path, to: &Path) -> Result<(), AgentError>;

    /// Create a directory and its parents.
    async fn create_dir_all(&self, path: &Path) -> Result<(), AgentError>;
}

// =============================================================================
// Host + credentials
// =============================================================================

/// Read-only view of the host application.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HostSnapshot {
    /// Host configuration.
    pub config: Value,
    /// Model registry.
    pub models: Value,
    /// API registry.
    pub api: Value,
}

/// Host application capabilities - outbound port.
#[async_trait]
pub trait HostRuntime: Send + Sync {
    /// Configuration, models and API registry.
    async fn snapshot(&self) -> Result<HostSnapshot, AgentError>;

    /// Start a rebuild. Returns once triggered, not once finished.
    async fn rebuild(&self) -> Result<(), AgentError>;

    /// Configuration changed; flush and install dependencies as needed.
    async fn config_changed(&self) -> Result<(), AgentError>;
}

/// Per-user credentials - outbound port.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stored token. `Ok(None)` when no credentials exist.
    async fn load_token(&self) -> Result<Option<String>, AgentError>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock fetcher serving archives from memory, keyed by file id.
#[derive(Clone, Default)]
pub struct MockArchiveFetcher {
    /// Archive bytes per file id.
    pub archives: HashMap<String, Vec<u8>>,
    /// Requests seen, in arrival order.
    pub requests: Arc<Mutex<Vec<DownloadRequest>>>,
}

impl MockArchiveFetcher {
    /// Serve `bytes` for `file_id`.
    pub fn with_archive(mut self, file_id: &str, bytes: Vec<u8>) -> Self {
        self.archives.insert(file_id.to_string(), bytes);
        self
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ArchiveFetcher for MockArchiveFetcher {
    async fn fetch(&self, request: &DownloadRequest, target: &Path) -> Result<u64, AgentError> {
        self.requests.lock().push(request.clone());

        let bytes = self
            .archives
            .get(&request.file_id)
            .ok_or_else(|| AgentError::DownloadFailed("HTTP 404 Not Found".to_string()))?;

        tokio::fs::write(target, bytes)
            .await
            .map_err(|e| AgentError::filesystem(target, e))?;
        Ok(bytes.len() as u64)
    }
}

/// Mock host counting calls.
#[derive(Clone, Default)]
pub struct MockHost {
    /// Returned by `snapshot`.
    pub snapshot: HostSnapshot,
    /// `rebuild` calls.
    pub rebuilds: Arc<AtomicUsize>,
    /// `config_changed` calls.
    pub config_changes: Arc<AtomicUsize>,
    /// Should fail?
    pub should_fail: bool,
}

impl MockHost {
    /// Number of rebuilds triggered.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }

    /// Number of configuration-change notices.
    pub fn config_change_count(&self) -> usize {
        self.config_changes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostRuntime for MockHost {
    async fn snapshot(&self) -> Result<HostSnapshot, AgentError> {
        if self.should_fail {
            return Err(AgentError::Host("Mock failure".to_string()));
        }
        Ok(self.snapshot.clone())
    }

    async fn rebuild(&self) -> Result<(), AgentError> {
        if self.should_fail {
            return Err(AgentError::Host("Mock failure".to_string()));
        }
        self.rebuilds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn config_changed(&self) -> Result<(), AgentError> {
        if self.should_fail {
            return Err(AgentError::Host("Mock failure".to_string()));
        }
        self.config_changes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock credential store.
#[derive(Clone, Default)]
pub struct MockCredentialStore {
    /// Token to return.
    pub token: Option<String>,
    /// Should fail?
    pub should_fail: bool,
}

impl MockCredentialStore {
    /// Store holding `token`.
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            should_fail: false,
        }
    }
}

#[async_trait]
impl CredentialStore for MockCredentialStore {
    async fn load_token(&self) -> Result<Option<String>, AgentError> {
        if self.should_fail {
            return Err(AgentError::Filesystem {
                path: "~/.uplinkrc".to_string(),
                reason: "Mock failure".to_string(),
            });
        }
        Ok(self.token.clone())
    }
}

/// In-memory filesystem: a set of paths, with injectable failures.
///
/// A path "exists" if it or any descendant is in the set.
#[derive(Clone, Default)]
pub struct MockFs {
    /// Known paths.
    pub entries: Arc<Mutex<BTreeSet<PathBuf>>>,
    /// `remove_all` fails for these paths.
    pub fail_remove: HashSet<PathBuf>,
    /// `copy_recursive` fails for these sources.
    pub fail_copy: HashSet<PathBuf>,
}

impl MockFs {
    /// Filesystem containing `paths`.
    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let fs = Self::default();
        fs.entries.lock().extend(paths.into_iter().map(Into::into));
        fs
    }

    /// Snapshot of known paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.lock().iter().cloned().collect()
    }

    fn contains(&self, path: &Path) -> bool {
        self.entries.lock().iter().any(|p| p.starts_with(path))
    }
}

#[async_trait]
impl LocalFs for MockFs {
    async fn exists(&self, path: &Path) -> bool {
        self.contains(path)
    }

    async fn remove_all(&self, path: &Path) -> Result<(), AgentError> {
        if self.fail_remove.contains(path) {
            return Err(AgentError::filesystem(path, "Mock failure"));
        }
        self.entries.lock().retain(|p| !p.starts_with(path));
        Ok(())
    }

    async fn copy_recursive(&self, from: &Path, to: &Path) -> Result<(), AgentError> {
        if self.fail_copy.contains(from) {
            return Err(AgentError::filesystem(from, "Mock failure"));
        }
        let mut entries = self.entries.lock();
        let copied: Vec<PathBuf> = entries
            .iter()
            .filter_map(|p| p.strip_prefix(from).ok().map(|rest| to.join(rest)))
            .collect();
        if copied.is_empty() {
            return Err(AgentError::filesystem(from, "No such file or directory"));
        }
        entries.extend(copied);
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), AgentError> {
        self.entries.lock().insert(path.to_path_buf());
        Ok(())
    }
}
