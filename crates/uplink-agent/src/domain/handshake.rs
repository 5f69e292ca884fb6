//! # Handshake Messages
//!
//! Payloads exchanged while establishing trust. All of them travel sealed.

use serde::{Deserialize, Serialize};

/// Status value that marks a successful challenge and the confirmation body.
pub const STATUS_OK: &str = "ok";

/// Identity sent with `check`, sealed to the control plane's key.
///
/// Carries the agent's public key only; the private half never leaves the process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustProof {
    /// Application identifier.
    pub app_id: String,
    /// Application name.
    pub app_name: String,
    /// Agent public key, SPKI PEM.
    pub public_key: String,
    /// Shared secret from configuration.
    pub secret_key: String,
    /// Credential token; development environments only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment name.
    pub env: String,
}

/// Challenge received with `authorized`, sealed to the agent's key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// `ok` when the control plane accepted the trust proof.
    #[serde(default)]
    pub status: String,
}

impl Challenge {
    /// Whether the control plane accepted us.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Known-plaintext confirmation sent with `testEncryption`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    /// Shared secret from configuration.
    pub secret_key: String,
    /// Always `ok`.
    pub data: String,
}

impl Confirmation {
    /// Confirmation for `secret_key`.
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            data: STATUS_OK.to_string(),
        }
    }
}
