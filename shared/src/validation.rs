//! # Request Validation Helpers
//!
//! Utilities for validating incoming request data using the `validator` crate.
//!
//! ## How Validation Works
//!
//! We use the [`validator`](https://docs.rs/validator/) crate which provides
//! derive macros for declarative validation:
//!
//! ```rust,ignore
//! use validator::Validate;
//!
//! #[derive(Validate)]
//! struct CreateAppKeyRequest {
//!     #[validate(custom(function = "validators::not_blank"))]
//!     name: String,
//!
//!     #[validate(length(max = 32))]
//!     scopes: Vec<String>,
//! }
//! ```
//!
//! ## Validation Flow
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────┐
//! │ JSON Request │────►│ Deserialize   │────►│   Validate   │
//! │              │     │ (serde)       │     │  (validator) │
//! └──────────────┘     └───────────────┘     └──────┬───────┘
//!                                                   │
//!         ┌─────────────────────────────────────────┴───────┐
//!         │                                                 │
//!         ▼                                                 ▼
//! ┌───────────────┐                               ┌─────────────────┐
//! │   Success     │                               │ ValidationError │
//! │ (continue)    │                               │  (400 + details)│
//! └───────────────┘                               └─────────────────┘
//! ```
//!
//! Validation failures return 400 with field-level details - these
//! messages are allowed to be specific because the input came from the
//! caller. Credential *verification* failures never go through this
//! path; they use the uniform generic envelope.
//!
//! Password strength is deliberately **not** validated here: it depends
//! on the per-scope effective configuration and is checked by
//! [`PasswordPolicy`](crate::auth::password::PasswordPolicy) inside the
//! credential flows.

use crate::errors::ApiError;
use serde::de::DeserializeOwned;
use validator::Validate;

// =============================================================================
// Core Validation Functions
// =============================================================================

/// Validates a request DTO that implements `Validate`.
///
/// This is the primary validation function. Use it in handlers to
/// validate incoming data.
///
/// ## Errors
///
/// Returns `ApiError::ValidationError` with field-level details if
/// validation fails.
pub fn validate_request<T: Validate>(data: &T) -> Result<(), ApiError> {
    data.validate().map_err(ApiError::ValidationError)
}

/// Parses JSON string and validates in a single step.
///
/// ## Errors
///
/// - `ApiError::BadRequest` if JSON parsing fails
/// - `ApiError::ValidationError` if validation fails
pub fn parse_and_validate<T: DeserializeOwned + Validate>(json: &str) -> Result<T, ApiError> {
    let data: T = serde_json::from_str(json).map_err(|e| ApiError::BadRequest {
        message: e.to_string(),
    })?;

    validate_request(&data)?;

    Ok(data)
}

// =============================================================================
// Custom Validators
// =============================================================================

/// Custom validation functions for use with `#[validate(custom)]`.
///
/// These functions follow the validator crate's signature:
/// `fn(&T) -> Result<(), ValidationError>`
pub mod validators {
    use validator::ValidationError;

    /// Validates that a string is not blank (empty or whitespace-only).
    pub fn not_blank(value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new("blank"));
        }
        Ok(())
    }

    /// Validates an opaque identifier (tenant id, app id, key id).
    ///
    /// ## Rules
    ///
    /// - Non-empty, at most 64 characters
    /// - ASCII letters, digits, hyphens and underscores only
    ///
    /// Dots are excluded: identifiers travel inside composite key
    /// strings where `.` separates the secret.
    pub fn valid_identifier(value: &str) -> Result<(), ValidationError> {
        if value.is_empty() || value.len() > 64 {
            return Err(ValidationError::new("invalid_identifier"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::new("invalid_identifier"));
        }
        Ok(())
    }

    /// Validates a scope label (e.g. `read`, `keys:rotate`).
    ///
    /// Lowercase letters, digits, `:`, `-` and `_`; non-empty.
    pub fn valid_scope(value: &str) -> Result<(), ValidationError> {
        if value.is_empty()
            || !value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || ":-_".contains(c))
        {
            return Err(ValidationError::new("invalid_scope"));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::validators::*;

    #[test]
    fn test_not_blank_valid() {
        assert!(not_blank("ci-deploy-key").is_ok());
        assert!(not_blank("  padded  ").is_ok());
    }

    #[test]
    fn test_not_blank_invalid() {
        assert!(not_blank("").is_err());
        assert!(not_blank("   ").is_err());
        assert!(not_blank("\t\n").is_err());
    }

    #[test]
    fn test_valid_identifier_accepts_opaque_ids() {
        assert!(valid_identifier("t1").is_ok());
        assert!(valid_identifier("tenant-42").is_ok());
        assert!(valid_identifier("9f3a2b1c").is_ok());
        assert!(valid_identifier("app_main").is_ok());
    }

    #[test]
    fn test_valid_identifier_rejects_delimiters_and_blank() {
        assert!(valid_identifier("").is_err());
        assert!(valid_identifier("has.dot").is_err());
        assert!(valid_identifier("has space").is_err());
        assert!(valid_identifier(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_valid_scope() {
        assert!(valid_scope("read").is_ok());
        assert!(valid_scope("keys:rotate").is_ok());
        assert!(valid_scope("").is_err());
        assert!(valid_scope("Read").is_err());
        assert!(valid_scope("bad scope").is_err());
    }
}
