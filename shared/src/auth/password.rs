//! # Password Hashing with Argon2id
//!
//! Secure password storage using the Argon2id algorithm.
//!
//! ## Why Argon2id?
//!
//! Argon2 won the [Password Hashing Competition](https://www.password-hashing.net/)
//! in 2015 and is recommended by [OWASP](https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html).
//! Argon2id combines GPU resistance (Argon2d) with side-channel
//! resistance (Argon2i).
//!
//! Passwords are the one secret in this platform with *low* entropy, so
//! they get the slow, memory-hard treatment. Full-entropy secrets
//! (API-key secrets, token identifiers) use the fast SHA3-256 digest in
//! [`crypto`](crate::crypto) instead - and never the other way around.
//!
//! ## Security Parameters
//!
//! Cost parameters come from [`SecurityConfig`] so deployments can raise
//! them; the defaults are the OWASP-recommended settings:
//!
//! | Parameter | Default | Purpose |
//! |-----------|---------|---------|
//! | Memory | 64 MiB | Makes attacks expensive (GPU memory) |
//! | Iterations | 3 | Time cost (slows brute force) |
//! | Parallelism | 4 | CPU lanes (matches typical cores) |
//!
//! These settings produce roughly 100ms per hash on a modern core. The
//! PHC string embeds the parameters, so existing hashes keep verifying
//! after a parameter change.
//!
//! ## PHC String Format
//!
//! ```text
//! $argon2id$v=19$m=65536,t=3,p=4$<salt>$<hash>
//! ```
//!
//! ## Failure Discipline
//!
//! [`PasswordHasher::verify`] returns `Ok(false)` for *both* a wrong
//! password and an unparseable stored hash. Callers on the credential
//! path must not be able to distinguish the two; the malformed-hash case
//! is logged for operators instead.

use crate::config::{BasicCredentialConfig, SecurityConfig};
use crate::errors::ApiError;
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use tracing::warn;

// =============================================================================
// Password Hasher
// =============================================================================

/// Secure password hashing service using Argon2id.
///
/// ## Thread Safety
///
/// This type is `Clone` and `Send + Sync`, safe for concurrent use.
/// Each hash operation generates a new random salt.
#[derive(Clone)]
pub struct PasswordHasher {
    /// Pre-configured Argon2 instance
    argon2: Argon2<'static>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(&SecurityConfig::default())
    }
}

impl PasswordHasher {
    /// Creates a hasher with the given cost parameters.
    ///
    /// Falls back to the library defaults if the configured parameters
    /// are rejected (e.g. zero memory), so construction never fails;
    /// the fallback is logged.
    pub fn new(config: &SecurityConfig) -> Self {
        let params = Params::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.argon2_parallelism,
            None, // Default output length (32 bytes)
        )
        .unwrap_or_else(|e| {
            warn!(error = %e, "Invalid Argon2 parameters, using library defaults");
            Params::default()
        });

        // Argon2id variant, version 0x13 (19)
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        Self { argon2 }
    }

    /// Hashes a password for secure storage.
    ///
    /// ## Process
    ///
    /// 1. Generate a cryptographically random salt
    /// 2. Apply Argon2id with the configured parameters
    /// 3. Return the result in PHC string format
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::InternalError` if hashing fails (rare).
    pub fn hash(&self, password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::InternalError {
                message: format!("password hashing failed: {}", e),
            })
    }

    /// Verifies a password against a stored hash.
    ///
    /// ## Returns
    ///
    /// - `Ok(true)` - password matches
    /// - `Ok(false)` - password doesn't match, **or** the stored hash is
    ///   malformed (logged, never distinguished to the caller)
    ///
    /// ## Security Note
    ///
    /// The underlying comparison is constant-time; an attacker cannot
    /// determine how "close" a guess was.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, ApiError> {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Indistinguishable from a wrong password at the boundary
                warn!(error = %e, "Stored password hash failed to parse");
                return Ok(false);
            }
        };

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(ApiError::InternalError {
                message: format!("password verification failed: {}", e),
            }),
        }
    }
}

// Implement Debug manually to avoid exposing internal state
impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

// =============================================================================
// Password Policy
// =============================================================================

/// Validates password strength against the effective credential
/// configuration before hashing.
///
/// Unlike a fixed rule set, the requirements come from the resolved
/// [`BasicCredentialConfig`], so each tenant/app scope can tune them:
///
/// | Requirement | Source |
/// |-------------|--------|
/// | Minimum length | `basic.min_password_length` |
/// | Upper + lower + digit | `basic.require_strong_pwd` |
pub struct PasswordPolicy;

impl PasswordPolicy {
    /// Validates that a password meets the configured requirements.
    ///
    /// ## Returns
    ///
    /// - `Ok(())` - password meets all requirements
    /// - `Err(Vec<String>)` - list of failed requirements
    pub fn validate(password: &str, config: &BasicCredentialConfig) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if password.chars().count() < config.min_password_length {
            errors.push(format!(
                "password must be at least {} characters long",
                config.min_password_length
            ));
        }

        if config.require_strong_pwd {
            if !password.chars().any(|c| c.is_uppercase()) {
                errors.push("password must contain at least one uppercase letter".to_string());
            }
            if !password.chars().any(|c| c.is_lowercase()) {
                errors.push("password must contain at least one lowercase letter".to_string());
            }
            if !password.chars().any(|c| c.is_ascii_digit()) {
                errors.push("password must contain at least one digit".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validates a username against the configured length bounds.
    ///
    /// Used when provisioning accounts (bootstrap, first external-identity
    /// login); login lookups take the username as-is.
    pub fn validate_username(
        username: &str,
        config: &BasicCredentialConfig,
    ) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let len = username.chars().count();

        if len < config.min_username_length {
            errors.push(format!(
                "username must be at least {} characters long",
                config.min_username_length
            ));
        }
        if len > config.max_username_length {
            errors.push(format!(
                "username must be at most {} characters long",
                config.max_username_length
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        // Minimal cost keeps the test suite quick; production uses defaults.
        PasswordHasher::new(&SecurityConfig {
            argon2_memory_kib: 8,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        })
    }

    #[test]
    fn test_hash_and_verify_correct_password() {
        let hasher = fast_hasher();
        let password = "P@ssw0rd!";

        let hash = hasher.hash(password).unwrap();

        assert_ne!(hash, password);
        assert!(hasher.verify(password, &hash).unwrap());
    }

    #[test]
    fn test_verify_wrong_password() {
        let hasher = fast_hasher();
        let hash = hasher.hash("P@ssw0rd!").unwrap();

        assert!(!hasher.verify("WrongP@ss1", &hash).unwrap());
    }

    #[test]
    fn test_verify_malformed_hash_is_just_false() {
        let hasher = fast_hasher();

        // Bad stored material must look exactly like a wrong password
        assert!(!hasher.verify("P@ssw0rd!", "not-a-phc-string").unwrap());
        assert!(!hasher.verify("P@ssw0rd!", "").unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hasher = fast_hasher();
        let password = "P@ssw0rd!";

        let hash1 = hasher.hash(password).unwrap();
        let hash2 = hasher.hash(password).unwrap();

        // Each hash is unique due to random salt
        assert_ne!(hash1, hash2);
        assert!(hasher.verify(password, &hash1).unwrap());
        assert!(hasher.verify(password, &hash2).unwrap());
    }

    #[test]
    fn test_hash_is_phc_format() {
        let hasher = fast_hasher();
        let hash = hasher.hash("P@ssw0rd!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_policy_accepts_strong_password() {
        let config = BasicCredentialConfig::default();
        assert!(PasswordPolicy::validate("P@ssw0rd!", &config).is_ok());
        assert!(PasswordPolicy::validate("Str0ngPass", &config).is_ok());
    }

    #[test]
    fn test_policy_rejects_short_password() {
        let config = BasicCredentialConfig::default();
        let errors = PasswordPolicy::validate("Ab1", &config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("at least 8 characters")));
    }

    #[test]
    fn test_policy_requires_character_classes() {
        let config = BasicCredentialConfig::default();

        assert!(PasswordPolicy::validate("alllowercase1", &config).is_err());
        assert!(PasswordPolicy::validate("ALLUPPERCASE1", &config).is_err());
        assert!(PasswordPolicy::validate("NoDigitsHere", &config).is_err());
    }

    #[test]
    fn test_policy_relaxed_when_strong_disabled() {
        let config = BasicCredentialConfig {
            require_strong_pwd: false,
            ..Default::default()
        };
        assert!(PasswordPolicy::validate("alllowercase", &config).is_ok());
    }

    #[test]
    fn test_username_length_bounds() {
        let config = BasicCredentialConfig::default();

        assert!(PasswordPolicy::validate_username("alice", &config).is_ok());
        assert!(PasswordPolicy::validate_username("ab", &config).is_err());
        assert!(PasswordPolicy::validate_username(&"x".repeat(33), &config).is_err());
    }
}
