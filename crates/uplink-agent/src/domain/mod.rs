//! # Domain Module
//!
//! Core domain types for the agent: session state, envelopes, actions,
//! configuration and the rules applied to inbound commands.

pub mod action;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod handshake;
pub mod invariants;
pub mod naming;
pub mod session;

pub use action::*;
pub use config::*;
pub use envelope::*;
pub use errors::*;
pub use handshake::*;
pub use invariants::*;
pub use session::*;
