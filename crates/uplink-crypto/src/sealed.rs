//! # Sealed Boxes
//!
//! Hybrid encryption to an RSA public key. A fresh XChaCha20-Poly1305 content
//! key encrypts the body; the content key itself is wrapped with RSA-OAEP.
//! All three parts travel base64-encoded:
//!
//! ```json
//! { "key": "<b64 rsa-oaep(content key)>", "nonce": "<b64 24 bytes>", "body": "<b64 ciphertext>" }
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::rsa_keys::{KeyPair, PublicKey};
use crate::symmetric::{self, Nonce, SecretKey};
use crate::CryptoError;

/// Ciphertext readable only by the holder of the recipient's private key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    /// RSA-OAEP wrapped content key
    pub key: String,
    /// XChaCha20 nonce
    pub nonce: String,
    /// AEAD ciphertext
    pub body: String,
}

impl SealedBox {
    /// Seal raw bytes to `recipient`.
    pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Self, CryptoError> {
        let content_key = SecretKey::generate();
        let wrapped = recipient.encrypt(content_key.as_bytes())?;
        let (body, nonce) = symmetric::encrypt(&content_key, plaintext)?;

        Ok(Self {
            key: STANDARD.encode(wrapped),
            nonce: STANDARD.encode(nonce.as_bytes()),
            body: STANDARD.encode(body),
        })
    }

    /// Serialize `value` as JSON and seal it.
    pub fn seal_json<T: Serialize + ?Sized>(
        recipient: &PublicKey,
        value: &T,
    ) -> Result<Self, CryptoError> {
        let plaintext =
            serde_json::to_vec(value).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        Self::seal(recipient, &plaintext)
    }

    /// Open with the recipient keypair.
    pub fn open(&self, keypair: &KeyPair) -> Result<Vec<u8>, CryptoError> {
        let wrapped = decode(&self.key)?;
        let content_key = SecretKey::from_slice(&keypair.decrypt(&wrapped)?)?;
        let nonce = Nonce::from_slice(&decode(&self.nonce)?)?;
        let body = decode(&self.body)?;

        symmetric::decrypt(&content_key, &body, &nonce)
    }

    /// Open and deserialize a JSON payload.
    pub fn open_json<T: DeserializeOwned>(&self, keypair: &KeyPair) -> Result<T, CryptoError> {
        let plaintext = self.open(keypair)?;
        serde_json::from_slice(&plaintext).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))
    }
}

fn decode(field: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(field)
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsa_keys::tests::test_keypair;

    #[test]
    fn test_large_payload_round_trip() {
        let pair = test_keypair();
        // Well past a single OAEP block
        let payload = vec![0xABu8; 64 * 1024];

        let sealed = SealedBox::seal(&pair.public_key(), &payload).unwrap();
        assert_eq!(sealed.open(pair).unwrap(), payload);
    }

    #[test]
    fn test_json_payload() {
        let pair = test_keypair();
        let sealed =
            SealedBox::seal_json(&pair.public_key(), &serde_json::json!({"status": "ok"})).unwrap();

        let value: serde_json::Value = sealed.open_json(pair).unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[test]
    fn test_wrong_recipient_cannot_open() {
        let other = KeyPair::generate_with_bits(1024).unwrap();
        let sealed = SealedBox::seal(&other.public_key(), b"secret").unwrap();

        assert!(sealed.open(test_keypair()).is_err());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let pair = test_keypair();
        let mut sealed = SealedBox::seal(&pair.public_key(), b"secret").unwrap();
        sealed.body = STANDARD.encode(b"forged body bytes that are long enough");

        assert!(matches!(
            sealed.open(pair),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let pair = test_keypair();
        let mut sealed = SealedBox::seal(&pair.public_key(), b"secret").unwrap();
        sealed.nonce = "%%%".into();

        assert!(matches!(
            sealed.open(pair),
            Err(CryptoError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_wire_shape() {
        let pair = test_keypair();
        let sealed = SealedBox::seal(&pair.public_key(), b"x").unwrap();
        let json = serde_json::to_value(&sealed).unwrap();

        assert!(json.get("key").is_some());
        assert!(json.get("nonce").is_some());
        assert!(json.get("body").is_some());
    }
}
