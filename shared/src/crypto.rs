//! # Crypto Primitives
//!
//! Small, sharp primitives the credential and token subsystems build on:
//! secure random generation, SHA3-256 digests, and constant-time
//! comparison.
//!
//! ## Why These Three?
//!
//! | Primitive | Used For | Why |
//! |-----------|----------|-----|
//! | [`random_secret`] | API-key secrets, opaque tokens | Full-entropy secrets from the OS CSPRNG |
//! | [`sha3_256_hex`] | API-key secret hashes, token identifiers | Fast, not length-extendable; the secret already carries 256 bits of entropy so a slow KDF buys nothing |
//! | [`constant_time_eq`] | Every secret comparison | Comparison time must not depend on where inputs diverge |
//!
//! Password hashing deliberately does **not** live here - passwords are
//! low-entropy and need the slow, memory-hard treatment in
//! [`auth::password`](crate::auth::password). A plaintext password must
//! never meet [`sha3_256_hex`] or any other fast hash.
//!
//! ## Timing-Attack Model
//!
//! Without constant-time comparison an attacker can measure response
//! times to guess a secret byte by byte:
//!
//! ```text
//! Attempt: "a..." → 0.1ms (wrong first byte, fails fast)
//! Attempt: "s..." → 0.2ms (correct first byte, continues comparison)
//! ```
//!
//! [`constant_time_eq`] uses `subtle` so comparison time depends only on
//! the compared length, never on content.

use crate::errors::ApiError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;

// =============================================================================
// Random Generation
// =============================================================================

/// Generates `n` bytes from the OS CSPRNG, encoded URL-safe base64
/// without padding.
///
/// The encoding makes the secret safe to embed in composite API-key
/// strings and URLs without escaping.
///
/// ## Errors
///
/// Fails only when the entropy source itself fails; the enclosing
/// request fails with it (never silently degrade randomness).
///
/// ## Example
///
/// ```rust,ignore
/// let secret = crypto::random_secret(32)?; // 256 bits, ~43 chars
/// ```
pub fn random_secret(n: usize) -> Result<String, ApiError> {
    let mut bytes = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ApiError::InternalError {
            message: format!("entropy source failure: {}", e),
        })?;
    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}

// =============================================================================
// Digests
// =============================================================================

/// SHA3-256 digest of `data`, hex-encoded (64 lowercase characters).
///
/// Chosen for secret hashing because SHA3 is not susceptible to
/// length-extension and is deliberately fast: the hashed inputs are
/// full-entropy secrets, not passwords.
pub fn sha3_256_hex(data: &[u8]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// =============================================================================
// Constant-Time Comparison
// =============================================================================

/// Byte-wise comparison whose time depends only on the compared length.
///
/// Use for **every** secret comparison: API-key hashes, token
/// identifiers, reset tokens. Returns `false` immediately for
/// different-length inputs (the length itself is not secret here - both
/// sides are fixed-width digests in every call site).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_secret_length_and_alphabet() {
        let secret = random_secret(32).unwrap();

        // 32 bytes -> ceil(32 * 4 / 3) = 43 chars without padding
        assert_eq!(secret.len(), 43);
        assert!(!secret.contains('='));
        assert!(secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_random_secret_unique() {
        let a = random_secret(32).unwrap();
        let b = random_secret(32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sha3_256_known_vectors() {
        // NIST test vectors for SHA3-256
        assert_eq!(
            sha3_256_hex(b""),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
        assert_eq!(
            sha3_256_hex(b"abc"),
            "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
        );
    }

    #[test]
    fn test_sha3_256_is_deterministic_and_fixed_width() {
        let a = sha3_256_hex(b"some secret material");
        let b = sha3_256_hex(b"some secret material");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"identical", b"identical"));
        assert!(!constant_time_eq(b"identical", b"different"));
        assert!(!constant_time_eq(b"short", b"longer-input"));
        assert!(constant_time_eq(b"", b""));
    }
}
