//! # Command Dispatcher
//!
//! Validation order, first failure wins:
//!
//! | Step | Check | Reply |
//! |------|-------|-------|
//! | 0 | session trusted, envelope opens to a JSON object | plain error |
//! | 1 | `from` and `to` keys present | "Some required attributes are missing" (plain) |
//! | 2 | `from` == session token | "Bad user token" (plain) |
//! | 3 | `files` / `action` well formed, every referenced file synced | sealed `{err, data: null}` |
//! | 4 | action known (absent = `true`) | sealed "Unknow action" |
//! | 5 | handler outcome | sealed `{err, data}` |

use crate::domain::{
    invariant_routing_present, invariant_sender_matches, ActionKind, AgentConfig, AgentError,
    CommandReply, CommandResult, EncryptedEnvelope, Envelope, InboundCommand, ReplyBody, Session,
    TrustedSession,
};
use crate::ports::CommandApi;
use crate::service::actions::ActionHandlers;
use crate::service::file_sync::FileSyncPipeline;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};
use uplink_crypto::SealedBox;
use uplink_telemetry::{metric_inc, COMMANDS};
use uuid::Uuid;

/// Resolves and runs inbound commands.
pub struct CommandDispatcher {
    config: Arc<AgentConfig>,
    session: Arc<RwLock<Session>>,
    file_sync: FileSyncPipeline,
    actions: ActionHandlers,
}

impl CommandDispatcher {
    /// Create a dispatcher reading the shared session.
    pub fn new(
        config: Arc<AgentConfig>,
        session: Arc<RwLock<Session>>,
        file_sync: FileSyncPipeline,
        actions: ActionHandlers,
    ) -> Self {
        Self {
            config,
            session,
            file_sync,
            actions,
        }
    }

    /// Handle one raw `todo` payload.
    pub async fn dispatch(&self, raw: Value) -> CommandReply {
        let command_id = Uuid::new_v4();
        let span = tracing::info_span!("command", %command_id);
        self.dispatch_inner(raw).instrument(span).await
    }

    async fn dispatch_inner(&self, raw: Value) -> CommandReply {
        // Snapshot once; a reconnect mid-command does not change our keys
        let Some(session) = self.session.read().trusted() else {
            return reject(AgentError::SessionNotTrusted, "untrusted");
        };

        let fields = match open_fields(&session, raw) {
            Ok(fields) => fields,
            Err(e) => return reject(e, "undecryptable"),
        };

        if let Err(e) = invariant_routing_present(&fields) {
            return reject(e, "invalid");
        }
        if let Err(e) = invariant_sender_matches(&fields, session.token()) {
            return reject(e, "unauthorized");
        }

        // Authenticated from here on: every outcome is sealed
        let (result, action_label) = match parse_envelope(fields) {
            Ok(envelope) => {
                debug!(
                    action = envelope.action.as_deref().unwrap_or("none"),
                    files = envelope.file_refs().len(),
                    "[uplink] Command accepted"
                );
                (self.execute(&session, &envelope).await, label(&envelope))
            }
            Err(e) => (Err(e), "unknown"),
        };

        match &result {
            Ok(_) => {
                metric_inc!(COMMANDS, &[action_label, "ok"]);
                info!(action = action_label, "[uplink] Command completed");
            }
            Err(e) => {
                metric_inc!(COMMANDS, &[action_label, "failed"]);
                warn!(action = action_label, error = %e, "[uplink] Command failed");
            }
        }

        match self.seal_reply(&session, &result) {
            Ok(envelope) => CommandReply::Sealed(envelope),
            Err(e) => reject(e, "unsealable"),
        }
    }

    /// Steps 3–5 for an authenticated envelope.
    pub async fn execute(&self, session: &TrustedSession, envelope: &Envelope) -> CommandResult {
        let files = envelope.file_refs();
        if !files.is_empty() {
            self.file_sync.sync_all(files, session).await?;
        }

        match envelope.action.as_deref() {
            None => Ok(Value::Bool(true)),
            Some(name) => match ActionKind::from_name(name) {
                Some(kind) => self.actions.invoke(kind, &envelope.payload, session).await,
                None => Err(AgentError::UnknownAction),
            },
        }
    }

    fn seal_reply(
        &self,
        session: &TrustedSession,
        result: &CommandResult,
    ) -> Result<EncryptedEnvelope, AgentError> {
        let encrypted = SealedBox::seal_json(session.peer_key(), &ReplyBody::from(result))?;
        Ok(EncryptedEnvelope {
            app_id: self.config.app_id.clone(),
            token: session.token().map(String::from),
            env: None,
            encrypted,
        })
    }
}

#[async_trait]
impl CommandApi for CommandDispatcher {
    async fn handle_command(&self, raw: Value) -> CommandReply {
        self.dispatch(raw).await
    }
}

/// Open a sealed `todo` payload with our private key into its raw fields.
fn open_fields(session: &TrustedSession, raw: Value) -> Result<Map<String, Value>, AgentError> {
    let command: InboundCommand =
        serde_json::from_value(raw).map_err(|_| AgentError::UndecryptableEnvelope)?;
    let plaintext = command
        .encrypted
        .open(session.keypair())
        .map_err(|_| AgentError::UndecryptableEnvelope)?;
    match serde_json::from_slice(&plaintext) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(AgentError::MalformedEnvelope("expected a JSON object".to_string())),
        Err(e) => Err(AgentError::MalformedEnvelope(e.to_string())),
    }
}

/// Build the typed envelope once routing and sender checks passed.
///
/// A non-string `action` names no handler.
fn parse_envelope(fields: Map<String, Value>) -> Result<Envelope, AgentError> {
    if matches!(fields.get("action"), Some(action) if !action.is_string() && !action.is_null()) {
        return Err(AgentError::UnknownAction);
    }
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| AgentError::MalformedEnvelope(e.to_string()))
}

fn reject(error: AgentError, outcome: &str) -> CommandReply {
    metric_inc!(COMMANDS, &["-", outcome]);
    warn!(error = %error, "[uplink] Command rejected");
    CommandReply::Rejected(error)
}

/// Metric label: known action names only, so labels stay bounded.
fn label(envelope: &Envelope) -> &'static str {
    match envelope.action.as_deref() {
        None => "none",
        Some(name) => ActionKind::from_name(name)
            .map(ActionKind::name)
            .unwrap_or("unknown"),
    }
}
