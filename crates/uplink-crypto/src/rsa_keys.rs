//! # RSA Key Exchange
//!
//! Each session generates a fresh keypair. Only the public half is exported
//! (SPKI PEM); the peer's key is accepted as SPKI or PKCS#1 PEM.
//!
//! All encryption uses OAEP with SHA-256.

use crate::CryptoError;
use rand::rngs::OsRng;
use rsa::{
    pkcs1::DecodeRsaPublicKey,
    pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding},
    traits::PublicKeyParts,
    Oaep, RsaPrivateKey, RsaPublicKey,
};
use sha2::Sha256;

/// Modulus size used for session keys.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// OAEP-SHA256 overhead: 2 * hash length + 2.
const OAEP_OVERHEAD: usize = 2 * 32 + 2;

/// A private/public RSA keypair.
///
/// The private half zeroizes on drop and has no export path.
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a keypair with [`DEFAULT_KEY_BITS`].
    ///
    /// CPU-heavy; callers on an async runtime should use `spawn_blocking`.
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with_bits(DEFAULT_KEY_BITS)
    }

    /// Generate a keypair with an explicit modulus size.
    pub fn generate_with_bits(bits: usize) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Public half as a [`PublicKey`].
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.public.clone(),
        }
    }

    /// Export the public key as SPKI PEM.
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        self.public_key().to_pem()
    }

    /// Decrypt an OAEP-SHA256 ciphertext addressed to this keypair.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// An imported RSA public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key: RsaPublicKey,
}

impl PublicKey {
    /// Parse a PEM public key (SPKI `PUBLIC KEY` or PKCS#1 `RSA PUBLIC KEY`).
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let pem = pem.trim();
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Export as SPKI PEM.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Largest plaintext a single OAEP block can carry.
    pub fn max_plaintext_len(&self) -> usize {
        self.key.size().saturating_sub(OAEP_OVERHEAD)
    }

    /// Encrypt a short plaintext with OAEP-SHA256.
    ///
    /// Payloads larger than [`Self::max_plaintext_len`] go through
    /// [`crate::SealedBox`] instead.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.len() > self.max_plaintext_len() {
            return Err(CryptoError::InvalidInput(format!(
                "plaintext of {} bytes exceeds OAEP limit of {}",
                plaintext.len(),
                self.max_plaintext_len()
            )));
        }
        self.key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }
}
