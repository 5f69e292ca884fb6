//! # Domain Errors
//!
//! Error types for the agent. `AgentError` is command-scoped: its `Display`
//! text is exactly what the control plane receives in a reply, so wording
//! here is part of the wire contract.

use super::session::SessionState;
use thiserror::Error;
use uplink_crypto::CryptoError;

/// Command-scoped errors, reported back through the `todo` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// Command arrived before the handshake completed.
    #[error("Session is not trusted")]
    SessionNotTrusted,

    /// Inbound command was not sealed to this agent's key.
    #[error("Unable to decrypt command envelope")]
    UndecryptableEnvelope,

    /// Decrypted envelope is not a JSON object of the expected shape.
    #[error("Malformed command envelope: {0}")]
    MalformedEnvelope(String),

    /// `from` or `to` missing.
    #[error("Some required attributes are missing")]
    MissingAttributes,

    /// `from` does not match the session token.
    #[error("Bad user token")]
    BadUserToken,

    /// `action` names no known handler.
    #[error("Unknow action")]
    UnknownAction,

    /// Path targeted by a remove/rename batch does not exist.
    #[error("Unknow path '{0}'")]
    UnknownPath(String),

    /// Batch attribute absent or not an array.
    #[error("Attribute `{0}` is missing or is not an array")]
    InvalidBatchAttribute(&'static str),

    /// Batch entry missing a required field.
    #[error("Invalid `{attribute}` entry: {reason}")]
    InvalidBatchEntry {
        /// Batch attribute name
        attribute: &'static str,
        /// Parse failure
        reason: String,
    },

    /// Archive could not be downloaded.
    #[error("Download ZIP or unzip not worked fine: {0}")]
    DownloadFailed(String),

    /// Archive could not be extracted.
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    /// Local filesystem failure.
    #[error("Filesystem error on '{path}': {reason}")]
    Filesystem {
        /// Affected path
        path: String,
        /// OS error text
        reason: String,
    },

    /// Host capability failed.
    #[error("Host error: {0}")]
    Host(String),

    /// Reply could not be sealed, or similar.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Background task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Build a filesystem error from an `io::Error`.
    pub fn filesystem(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        Self::Filesystem {
            path: path.as_ref().display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<CryptoError> for AgentError {
    fn from(e: CryptoError) -> Self {
        Self::Crypto(e.to_string())
    }
}

/// Transport-level failures. Never fatal: they feed the reconnect policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Could not open the link.
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Link closed while an operation was pending.
    #[error("Link closed")]
    Closed,

    /// No acknowledgement within the call timeout.
    #[error("Call `{event}` timed out after {secs}s")]
    Timeout {
        /// Event name
        event: String,
        /// Timeout in seconds
        secs: u64,
    },

    /// Frame could not be written.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Frame could not be parsed.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

/// Handshake failures. The session stays untrusted; nothing is retried
/// until the next full reconnect.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Keypair generation failed. Fatal for this session.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Peer did not return a public key.
    #[error("Peer public key missing")]
    PeerKeyMissing,

    /// Peer public key could not be imported.
    #[error("Peer public key rejected: {0}")]
    PeerKeyRejected(String),

    /// Challenge did not decrypt with our private key.
    #[error("Challenge could not be decrypted: {0}")]
    ChallengeUndecryptable(String),

    /// Challenge decrypted but status was not `ok`.
    #[error("Challenge status was `{0}`")]
    ChallengeRejected(String),

    /// Operation attempted from the wrong state.
    #[error("Invalid handshake state: expected {expected}, found {found}")]
    InvalidState {
        /// Required state
        expected: SessionState,
        /// Actual state
        found: SessionState,
    },

    /// Encryption of an outbound handshake message failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Link failure mid-handshake.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Required setting is empty.
    #[error("Missing required setting `{0}`")]
    Missing(&'static str),

    /// URL is not http(s).
    #[error("Invalid URL `{0}`: expected http:// or https://")]
    InvalidUrl(String),

    /// RSA modulus below the production floor.
    #[error("Key size {0} is below 2048 bits")]
    WeakKey(usize),

    /// Reconnect policy is inconsistent.
    #[error("Invalid reconnect policy: {0}")]
    InvalidReconnect(String),

    /// Config file could not be read.
    #[error("Failed to read config {path}: {reason}")]
    Read {
        /// File path
        path: String,
        /// OS error text
        reason: String,
    },

    /// Config file is not valid TOML for `AgentConfig`.
    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_messages() {
        assert_eq!(
            AgentError::MissingAttributes.to_string(),
            "Some required attributes are missing"
        );
        assert_eq!(AgentError::BadUserToken.to_string(), "Bad user token");
        assert_eq!(AgentError::UnknownAction.to_string(), "Unknow action");
        assert_eq!(
            AgentError::UnknownPath("/srv/app/api/x".into()).to_string(),
            "Unknow path '/srv/app/api/x'"
        );
        assert_eq!(
            AgentError::InvalidBatchAttribute("toRemove").to_string(),
            "Attribute `toRemove` is missing or is not an array"
        );
    }

    #[test]
    fn test_handshake_state_error() {
        let err = HandshakeError::InvalidState {
            expected: SessionState::KeyExchanged,
            found: SessionState::Connecting,
        };
        assert!(err.to_string().contains("KeyExchanged"));
        assert!(err.to_string().contains("Connecting"));
    }

    #[test]
    fn test_crypto_error_conversion() {
        let err: AgentError = CryptoError::DecryptionFailed("aead".into()).into();
        assert!(matches!(err, AgentError::Crypto(_)));
    }

    #[test]
    fn test_transport_timeout_display() {
        let err = TransportError::Timeout {
            event: "getPublicKey".into(),
            secs: 30,
        };
        assert_eq!(err.to_string(), "Call `getPublicKey` timed out after 30s");
    }
}
