//! # Service Layer
//!
//! Handshake, connection lifecycle, command dispatch, file sync and the
//! remote-invocable actions.

pub mod actions;
pub mod agent;
pub mod connection;
pub mod dispatcher;
pub mod file_sync;
pub mod handshake;
pub mod path_locks;

pub use actions::ActionHandlers;
pub use agent::{Agent, AgentDependencies};
pub use connection::{ConnectionManager, LifecycleEvent, RunExit};
pub use dispatcher::CommandDispatcher;
pub use file_sync::FileSyncPipeline;
pub use handshake::HandshakeProtocol;
pub use path_locks::PathLocks;
