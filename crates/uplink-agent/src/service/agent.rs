//! # Agent Wiring
//!
//! Builds the service graph from configuration and adapters. One shared
//! [`Session`] and one shared [`PathLocks`] registry per agent.

use crate::domain::{AgentConfig, Session};
use crate::ports::{
    ArchiveExtractor, ArchiveFetcher, CommandApi, CredentialStore, HostRuntime, LinkConnector,
    LocalFs,
};
use crate::service::actions::ActionHandlers;
use crate::service::connection::ConnectionManager;
use crate::service::dispatcher::CommandDispatcher;
use crate::service::file_sync::FileSyncPipeline;
use crate::service::handshake::HandshakeProtocol;
use crate::service::path_locks::PathLocks;
use parking_lot::RwLock;
use std::sync::Arc;

/// Adapters the agent runs on.
pub struct AgentDependencies {
    /// Control-plane transport.
    pub connector: Arc<dyn LinkConnector>,
    /// Archive download.
    pub fetcher: Arc<dyn ArchiveFetcher>,
    /// Archive extraction.
    pub extractor: Arc<dyn ArchiveExtractor>,
    /// Local filesystem.
    pub fs: Arc<dyn LocalFs>,
    /// Host application.
    pub host: Arc<dyn HostRuntime>,
    /// Credentials file.
    pub credentials: Arc<dyn CredentialStore>,
}

/// Fully wired agent.
pub struct Agent {
    /// Shared configuration.
    pub config: Arc<AgentConfig>,
    /// Shared session state.
    pub session: Arc<RwLock<Session>>,
    /// Command entry point.
    pub dispatcher: Arc<CommandDispatcher>,
    /// Link lifecycle.
    pub connection: Arc<ConnectionManager>,
}

impl Agent {
    /// Wire services over `deps`.
    pub fn new(config: AgentConfig, deps: AgentDependencies) -> Self {
        let config = Arc::new(config);
        let session = Arc::new(RwLock::new(Session::new()));
        let locks = PathLocks::new();

        let file_sync = FileSyncPipeline::new(
            config.app_root.clone(),
            deps.fetcher,
            deps.extractor,
            Arc::clone(&deps.fs),
            locks.clone(),
        );
        let actions = ActionHandlers::new(config.app_root.clone(), deps.host, deps.fs, locks);
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&config),
            Arc::clone(&session),
            file_sync,
            actions,
        ));

        let handshake =
            HandshakeProtocol::new(Arc::clone(&config), Arc::clone(&session), deps.credentials);
        let commands: Arc<dyn CommandApi> = dispatcher.clone();
        let connection = Arc::new(ConnectionManager::new(
            Arc::clone(&config),
            deps.connector,
            Arc::clone(&session),
            handshake,
            commands,
        ));

        Self {
            config,
            session,
            dispatcher,
            connection,
        }
    }
}
