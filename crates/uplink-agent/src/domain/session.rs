//! # Session
//!
//! Per-connection trust state. Created when a transport connection opens,
//! reset on disconnect; there is no resumption across connections.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──peer key──▶ KeyExchanged ──challenge ok──▶ Trusted
//!       ▲                                                                              │
//!       └──────────────────────────── disconnect / transport error ◀──────────────────┘
//! ```

use super::errors::HandshakeError;
use std::fmt;
use std::sync::Arc;
use uplink_crypto::{KeyPair, PublicKey};

/// Handshake progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No live connection.
    #[default]
    Disconnected,
    /// Connected, own keypair generated, waiting for the peer key.
    Connecting,
    /// Peer key imported, trust proof sent.
    KeyExchanged,
    /// Challenge answered; commands accepted.
    Trusted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::KeyExchanged => write!(f, "KeyExchanged"),
            SessionState::Trusted => write!(f, "Trusted"),
        }
    }
}

/// Live session owned by the connection manager.
#[derive(Default)]
pub struct Session {
    state: SessionState,
    keypair: Option<Arc<KeyPair>>,
    peer_key: Option<PublicKey>,
    token: Option<String>,
}

impl Session {
    /// Fresh, disconnected session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Own keypair, once generated.
    pub fn keypair(&self) -> Option<Arc<KeyPair>> {
        self.keypair.clone()
    }

    /// Imported peer key, once exchanged.
    pub fn peer_key(&self) -> Option<&PublicKey> {
        self.peer_key.as_ref()
    }

    /// Credential token for this session, if the credentials file had one.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Enter `Connecting` with a freshly generated keypair.
    ///
    /// Valid from any state; a new connection always starts over.
    pub fn begin(&mut self, keypair: Arc<KeyPair>, token: Option<String>) {
        self.state = SessionState::Connecting;
        self.keypair = Some(keypair);
        self.peer_key = None;
        self.token = token;
    }

    /// Record the peer's public key: `Connecting → KeyExchanged`.
    pub fn exchange_keys(&mut self, peer_key: PublicKey) -> Result<(), HandshakeError> {
        self.expect_state(SessionState::Connecting)?;
        self.peer_key = Some(peer_key);
        self.state = SessionState::KeyExchanged;
        Ok(())
    }

    /// Mark the session trusted: `KeyExchanged → Trusted`.
    pub fn trust(&mut self) -> Result<(), HandshakeError> {
        self.expect_state(SessionState::KeyExchanged)?;
        self.state = SessionState::Trusted;
        Ok(())
    }

    /// Drop all key material and return to `Disconnected`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Immutable view for command handling. `None` unless `Trusted`.
    pub fn trusted(&self) -> Option<TrustedSession> {
        if self.state != SessionState::Trusted {
            return None;
        }
        Some(TrustedSession {
            keypair: self.keypair.clone()?,
            peer_key: self.peer_key.clone()?,
            token: self.token.clone(),
        })
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), HandshakeError> {
        if self.state != expected {
            return Err(HandshakeError::InvalidState {
                expected,
                found: self.state,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("has_keypair", &self.keypair.is_some())
            .field("has_peer_key", &self.peer_key.is_some())
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

/// Snapshot of a trusted session, handed to the dispatcher per command.
#[derive(Clone)]
pub struct TrustedSession {
    keypair: Arc<KeyPair>,
    peer_key: PublicKey,
    token: Option<String>,
}

impl TrustedSession {
    /// Own keypair (opens inbound commands).
    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// Peer key (seals replies).
    pub fn peer_key(&self) -> &PublicKey {
        &self.peer_key
    }

    /// Session token, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl fmt::Debug for TrustedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedSession")
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}
