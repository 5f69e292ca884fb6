//! # Uplink Crypto - Channel Cryptography
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `rsa_keys` | RSA-2048, OAEP-SHA256 | Agent / control-plane key exchange |
//! | `symmetric` | XChaCha20-Poly1305 | Payload encryption |
//! | `sealed` | RSA-OAEP + XChaCha20-Poly1305 | Messages of arbitrary size to a public key |
//! | `kdf` | PBKDF2-HMAC-SHA256 | Deterministic scratch file names |
//!
//! ## Security Properties
//!
//! - Only public keys ever leave the process; private keys zeroize on drop.
//! - Every sealed box uses a fresh content key and a fresh 192-bit nonce.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod kdf;
pub mod rsa_keys;
pub mod sealed;
pub mod symmetric;

// Re-exports
pub use errors::CryptoError;
pub use kdf::{derive_name, KDF_ITERATIONS, KDF_OUTPUT_LEN};
pub use rsa_keys::{KeyPair, PublicKey, DEFAULT_KEY_BITS};
pub use sealed::SealedBox;
pub use symmetric::{decrypt, encrypt, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
