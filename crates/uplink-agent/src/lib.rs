//! # Uplink Agent
//!
//! Keeps a host application connected to its control plane: maintains the
//! link, proves identity, accepts sealed commands, syncs archives and runs a
//! fixed set of remote actions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        UPLINK AGENT                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ConnectionManager ── connect / backoff / event routing      │
//! │         │                                                    │
//! │         ├── HandshakeProtocol   getPublicKey → check →       │
//! │         │                       authorized → testEncryption  │
//! │         │                                                    │
//! │         └── CommandDispatcher   open → validate → sync →     │
//! │                  │              invoke → seal                │
//! │                  ├── FileSyncPipeline  (download, extract)   │
//! │                  └── ActionHandlers    (config, pull,        │
//! │                                         rebuild, rm, mv)     │
//! └──────────────────────────────────────────────────────────────┘
//!            │ ports                        │ ports
//!     WebSocket / memory link        HTTP, zip, fs, host
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use uplink_agent::{Agent, AgentDependencies};
//!
//! let agent = Agent::new(config, deps);
//! let exit = agent.connection.run(shutdown_rx).await;
//! ```
//!
//! # Session Trust
//!
//! Commands are accepted only while the session is `Trusted`, only when
//! sealed to the agent's per-session key, and only when `from` matches the
//! session token.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{
    ActionKind, AgentConfig, AgentError, CommandReply, ConfigError, Envelope, HandshakeError,
    ReconnectPolicy, Session, SessionState, TransportError,
};
pub use ports::{CommandApi, HostRuntime, HostSnapshot, LinkConnector};
pub use service::{
    Agent, AgentDependencies, CommandDispatcher, ConnectionManager, LifecycleEvent, RunExit,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
