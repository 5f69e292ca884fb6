//! # Handshake Protocol
//!
//! Establishes trust on a fresh link:
//!
//! 1. generate our keypair
//! 2. `getPublicKey` → import the control plane's key
//! 3. `check` ← trust proof sealed to the control plane
//! 4. `authorized` → challenge sealed to us; `status == "ok"` means trusted
//! 5. `testEncryption` ← known-plaintext confirmation, acknowledged
//!
//! Failures leave the session untrusted. Nothing is retried until the next
//! reconnect.

use crate::domain::{
    AgentConfig, Challenge, Confirmation, EncryptedEnvelope, HandshakeError, Session, TrustProof,
};
use crate::ports::{ControlPlaneLink, CredentialStore};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uplink_crypto::{KeyPair, PublicKey, SealedBox};
use uplink_telemetry::{metric_inc, HANDSHAKES};

/// Event names used during the handshake.
pub mod events {
    /// Ask the control plane for its public key (acknowledged).
    pub const GET_PUBLIC_KEY: &str = "getPublicKey";
    /// Send the sealed trust proof.
    pub const CHECK: &str = "check";
    /// Inbound challenge.
    pub const AUTHORIZED: &str = "authorized";
    /// Confirmation round trip (acknowledged).
    pub const TEST_ENCRYPTION: &str = "testEncryption";
}

/// Drives the handshake for one session at a time.
#[derive(Clone)]
pub struct HandshakeProtocol {
    config: Arc<AgentConfig>,
    session: Arc<RwLock<Session>>,
    credentials: Arc<dyn CredentialStore>,
}

impl HandshakeProtocol {
    /// Create a protocol bound to the shared session.
    pub fn new(
        config: Arc<AgentConfig>,
        session: Arc<RwLock<Session>>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            config,
            session,
            credentials,
        }
    }

    /// Steps 1–3: keys, credentials, peer key, trust proof.
    ///
    /// Key generation failure is returned as an error. A missing or
    /// unusable peer key aborts quietly with `Ok(false)`.
    pub async fn begin(&self, link: &dyn ControlPlaneLink) -> Result<bool, HandshakeError> {
        metric_inc!(HANDSHAKES, &["started"]);

        let keypair = match self.generate_keypair().await {
            Ok(keypair) => keypair,
            Err(e) => {
                metric_inc!(HANDSHAKES, &["failed"]);
                return Err(e);
            }
        };
        let token = self.load_token().await;
        self.session.write().begin(Arc::clone(&keypair), token.clone());

        let peer_key = match self.request_peer_key(link).await {
            Ok(peer_key) => peer_key,
            Err(e) => {
                metric_inc!(HANDSHAKES, &["rejected"]);
                debug!(error = %e, "[uplink] Handshake aborted, session stays untrusted");
                return Ok(false);
            }
        };

        let proof = self.build_trust_proof(&keypair, token)?;
        let sealed = SealedBox::seal_json(&peer_key, &proof)?;

        self.session.write().exchange_keys(peer_key)?;
        link.emit(events::CHECK, to_value(&sealed)?).await?;
        debug!("[uplink] Trust proof sent");
        Ok(true)
    }

    /// Steps 4–5: answer the `authorized` challenge.
    ///
    /// Returns `Ok(true)` once the session is trusted.
    pub async fn on_challenge(
        &self,
        link: &dyn ControlPlaneLink,
        data: &Value,
    ) -> Result<bool, HandshakeError> {
        let (keypair, peer_key, token) = {
            let session = self.session.read();
            match (session.keypair(), session.peer_key()) {
                (Some(keypair), Some(peer_key)) => {
                    (keypair, peer_key.clone(), session.token().map(String::from))
                }
                _ => {
                    return Err(HandshakeError::InvalidState {
                        expected: crate::domain::SessionState::KeyExchanged,
                        found: session.state(),
                    })
                }
            }
        };

        let challenge = open_challenge(&keypair, data).inspect_err(|_| {
            metric_inc!(HANDSHAKES, &["failed"]);
        })?;
        if !challenge.is_ok() {
            metric_inc!(HANDSHAKES, &["rejected"]);
            return Err(HandshakeError::ChallengeRejected(challenge.status));
        }

        self.session.write().trust()?;
        metric_inc!(HANDSHAKES, &["trusted"]);

        let confirmation = self.build_confirmation(&peer_key, token)?;
        let ack = link
            .call(events::TEST_ENCRYPTION, to_value(&confirmation)?)
            .await?;
        if let Some(err) = ack.first().filter(|v| !v.is_null()) {
            warn!(error = %err, "[uplink] Control plane reported a confirmation error");
        }
        info!("[uplink] Connected with the control plane.");
        Ok(true)
    }

    /// Trust proof for the current configuration.
    ///
    /// The token is only included in development.
    pub fn build_trust_proof(
        &self,
        keypair: &KeyPair,
        token: Option<String>,
    ) -> Result<TrustProof, HandshakeError> {
        Ok(TrustProof {
            app_id: self.config.app_id.clone(),
            app_name: self.config.name.clone(),
            public_key: keypair.public_key_pem()?,
            secret_key: self.config.secret_key.clone(),
            token: token.filter(|_| self.config.is_development()),
            env: self.config.environment.clone(),
        })
    }

    /// Confirmation envelope: `token` in development, `env` otherwise.
    pub fn build_confirmation(
        &self,
        peer_key: &PublicKey,
        token: Option<String>,
    ) -> Result<EncryptedEnvelope, HandshakeError> {
        let encrypted =
            SealedBox::seal_json(peer_key, &Confirmation::new(self.config.secret_key.clone()))?;
        let (token, env) = if self.config.is_development() {
            (token, None)
        } else {
            (None, Some(self.config.environment.clone()))
        };
        Ok(EncryptedEnvelope {
            app_id: self.config.app_id.clone(),
            token,
            env,
            encrypted,
        })
    }

    async fn generate_keypair(&self) -> Result<Arc<KeyPair>, HandshakeError> {
        let bits = self.config.key_bits;
        tokio::task::spawn_blocking(move || KeyPair::generate_with_bits(bits))
            .await
            .map_err(|e| HandshakeError::KeyGeneration(e.to_string()))?
            .map(Arc::new)
            .map_err(|e| HandshakeError::KeyGeneration(e.to_string()))
    }

    async fn load_token(&self) -> Option<String> {
        match self.credentials.load_token().await {
            Ok(Some(token)) => Some(token),
            Ok(None) => {
                warn!("[uplink] Continuing without credentials.");
                None
            }
            Err(e) => {
                warn!(error = %e, "[uplink] Continuing without credentials.");
                None
            }
        }
    }

    async fn request_peer_key(&self, link: &dyn ControlPlaneLink) -> Result<PublicKey, HandshakeError> {
        let ack = link.call(events::GET_PUBLIC_KEY, Value::Null).await?;
        let pem = ack
            .iter()
            .find_map(Value::as_str)
            .filter(|pem| !pem.trim().is_empty())
            .ok_or(HandshakeError::PeerKeyMissing)?;
        PublicKey::from_pem(pem).map_err(|e| HandshakeError::PeerKeyRejected(e.to_string()))
    }
}

/// Decrypt an `authorized` payload with our private key.
pub fn open_challenge(keypair: &KeyPair, data: &Value) -> Result<Challenge, HandshakeError> {
    let sealed: SealedBox = serde_json::from_value(data.clone())
        .map_err(|e| HandshakeError::ChallengeUndecryptable(e.to_string()))?;
    sealed
        .open_json(keypair)
        .map_err(|e| HandshakeError::ChallengeUndecryptable(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, HandshakeError> {
    serde_json::to_value(value)
        .map_err(|e| HandshakeError::Crypto(uplink_crypto::CryptoError::InvalidEncoding(e.to_string())))
}
