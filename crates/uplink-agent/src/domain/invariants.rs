//! # Domain Invariants
//!
//! Checks applied to every decrypted command, in order, on the raw JSON
//! object. They run before the typed [`Envelope`](super::Envelope) is built
//! so an oddly shaped `files` or `action` cannot mask them.

use super::errors::AgentError;
use serde_json::{Map, Value};

/// Invariant: routing attributes present.
///
/// `from` and `to` keys must both exist, whatever else the envelope carries.
/// A `null` value still counts as present.
pub fn invariant_routing_present(fields: &Map<String, Value>) -> Result<(), AgentError> {
    if !fields.contains_key("from") || !fields.contains_key("to") {
        return Err(AgentError::MissingAttributes);
    }
    Ok(())
}

/// Invariant: sender is the session owner.
///
/// `from` must be a string equal to the session token. Without a session
/// token no sender can match.
pub fn invariant_sender_matches(
    fields: &Map<String, Value>,
    session_token: Option<&str>,
) -> Result<(), AgentError> {
    match (fields.get("from").and_then(Value::as_str), session_token) {
        (Some(from), Some(token)) if from == token => Ok(()),
        _ => Err(AgentError::BadUserToken),
    }
}
