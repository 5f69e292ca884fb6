//! # Envelopes
//!
//! Wire shapes for commands and replies. Key names follow the control
//! plane's camelCase JSON.

use super::errors::AgentError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uplink_crypto::SealedBox;

/// Outcome of one handler invocation.
pub type CommandResult = Result<Value, AgentError>;

/// Decrypted inbound command.
///
/// Every key other than `action`, `from`, `to` and `files` is payload and is
/// handed to the action handler untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Handler name; absent means "acknowledge only".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Sender token; must equal the session token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Recipient token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Archives to materialize before the handler runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileReference>>,
    /// Handler arguments (`toRemove`, `toRename`, ...).
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Envelope {
    /// File references, or an empty slice.
    pub fn file_refs(&self) -> &[FileReference] {
        self.files.as_deref().unwrap_or_default()
    }
}

/// Pointer to a remote archive and where it lands locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// Remote file id.
    #[serde(rename = "token")]
    pub file_token: String,
    /// Source category; decides where the archive is extracted.
    #[serde(rename = "src")]
    pub source: SourceCategory,
    /// Local path to replace.
    #[serde(rename = "dest")]
    pub destination: String,
}

/// Archive source category.
///
/// `modules` archives contain the destination's contents; every other
/// category contains the destination directory itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceCategory {
    /// `modules`
    Modules,
    /// Anything else, kept verbatim for the download request.
    Other(String),
}

impl SourceCategory {
    /// Wire name.
    pub fn as_str(&self) -> &str {
        match self {
            SourceCategory::Modules => "modules",
            SourceCategory::Other(name) => name,
        }
    }
}

impl From<String> for SourceCategory {
    fn from(value: String) -> Self {
        if value == "modules" {
            SourceCategory::Modules
        } else {
            SourceCategory::Other(value)
        }
    }
}

impl From<SourceCategory> for String {
    fn from(value: SourceCategory) -> Self {
        match value {
            SourceCategory::Modules => "modules".to_string(),
            SourceCategory::Other(name) => name,
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of the `POST {url}/socket/download` request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    /// Session token.
    pub token: String,
    /// Remote file id.
    pub file_id: String,
    /// Source category.
    pub src: String,
}

/// Sealed reply body: exactly one of `err` / `data` is non-null.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplyBody {
    /// Error text.
    pub err: Option<String>,
    /// Handler result.
    pub data: Option<Value>,
}

impl From<&CommandResult> for ReplyBody {
    fn from(result: &CommandResult) -> Self {
        match result {
            Ok(value) => ReplyBody {
                err: None,
                data: Some(value.clone()),
            },
            Err(e) => ReplyBody {
                err: Some(e.to_string()),
                data: None,
            },
        }
    }
}

/// Encrypted payload plus routing metadata.
///
/// Only ever built from a [`SealedBox`]; there is no plaintext variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    /// Application identifier.
    pub app_id: String,
    /// Session token (replies, development confirmation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment name (non-development confirmation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    /// Ciphertext.
    pub encrypted: SealedBox,
}

/// Inbound `todo` payload: a sealed [`Envelope`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundCommand {
    /// Ciphertext, sealed to the agent's public key.
    pub encrypted: SealedBox,
}

/// What goes back through the `todo` acknowledgement.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandReply {
    /// Rejected before a trusted, decrypted, authenticated envelope existed.
    /// Sent as a plain error string.
    Rejected(AgentError),
    /// Handler (or file sync) outcome sealed to the peer.
    Sealed(EncryptedEnvelope),
}

impl CommandReply {
    /// Acknowledgement arguments: `[err, null]` or `[envelope]`.
    pub fn into_ack(self) -> Vec<Value> {
        match self {
            CommandReply::Rejected(e) => vec![Value::String(e.to_string()), Value::Null],
            CommandReply::Sealed(envelope) => match serde_json::to_value(envelope) {
                Ok(value) => vec![value],
                Err(e) => vec![
                    Value::String(AgentError::Internal(e.to_string()).to_string()),
                    Value::Null,
                ],
            },
        }
    }

    /// Whether this is a plain rejection.
    pub fn is_rejected(&self) -> bool {
        matches!(self, CommandReply::Rejected(_))
    }
}
