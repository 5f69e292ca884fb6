//! # Name Derivation
//!
//! Scratch file names for archive transfers are derived from the file token
//! and the session token, so the control plane never chooses a local path and
//! two sessions never collide on the same artifact.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

/// PBKDF2 iteration count.
pub const KDF_ITERATIONS: u32 = 4096;

/// Derived output length in bytes (hex doubles it).
pub const KDF_OUTPUT_LEN: usize = 32;

/// Derive the hex-encoded scratch name for `file_token` under `session_token`.
///
/// PBKDF2-HMAC-SHA256 with the file token as password and the session token
/// as salt. Deterministic: equal inputs always yield the same 64-char name.
pub fn derive_name(file_token: &str, session_token: &str) -> String {
    let mut out = [0u8; KDF_OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(
        file_token.as_bytes(),
        session_token.as_bytes(),
        KDF_ITERATIONS,
        &mut out,
    );
    hex::encode(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // RFC 7914 section 11, PBKDF2-HMAC-SHA256 c=4096 truncated to 32 bytes
        assert_eq!(
            derive_name("password", "salt"),
            "c5e478d59288c841aa530db6845c4c8d962893a001ce4e11a4963873aa98134a"
        );
        assert_eq!(
            derive_name("file-token-1", "session-token-1"),
            "343d3a17319ab513afa1bdb602169f6e83d7a339938a10fe1d952611b231e49d"
        );
    }

    #[test]
    fn test_session_token_changes_name() {
        assert_ne!(
            derive_name("file-token-1", "session-a"),
            derive_name("file-token-1", "session-b")
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_derivation_is_deterministic(file in "[a-zA-Z0-9]{1,24}", session in "[a-zA-Z0-9]{0,24}") {
            let first = derive_name(&file, &session);
            prop_assert_eq!(first.len(), KDF_OUTPUT_LEN * 2);
            prop_assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
            prop_assert_eq!(first, derive_name(&file, &session));
        }
    }
}
