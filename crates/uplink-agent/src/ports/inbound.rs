//! # Inbound Ports
//!
//! What the agent offers to its transport: command handling.

use crate::domain::CommandReply;
use async_trait::async_trait;
use serde_json::Value;

/// Command handling - inbound port.
///
/// Takes the raw `todo` payload and always produces a reply; failures are
/// part of the reply, never an `Err`.
#[async_trait]
pub trait CommandApi: Send + Sync {
    /// Handle one inbound command.
    async fn handle_command(&self, raw: Value) -> CommandReply;
}
