//! # JWT Token Service
//!
//! Handles generation and validation of the platform's self-contained
//! signed tokens ([RFC 7519](https://tools.ietf.org/html/rfc7519)).
//!
//! ## Token Structure
//!
//! ```text
//! xxxxx.yyyyy.zzzzz
//! ├────┼─────┼────┤
//! │    │     │    └── Signature (verifies integrity)
//! │    │     └─────── Payload (claims - the actual data)
//! │    └───────────── Header (algorithm and token type)
//! ```
//!
//! ## Token Types
//!
//! | Token Type | TTL (default) | Purpose |
//! |------------|---------------|---------|
//! | Access | 1 hour | API authorization |
//! | Refresh | 30 days | Obtain new token pairs (single-use, rotated) |
//! | Password reset | 15 minutes | One-shot reset links |
//!
//! ## Claims - Identifiers Only
//!
//! Tokens deliberately carry identifiers, never roles or permissions:
//!
//! | Claim | Description | Example |
//! |-------|-------------|---------|
//! | `sub` | Subject (user or key holder id) | `9f3a…` |
//! | `tenant_id` | Owning tenant | `t1` |
//! | `app_id` | Target app (optional) | `a1` |
//! | `type` | `access` / `refresh` / `password_reset`; absent means access | `refresh` |
//! | `iss` / `aud` | Issuer / audience | `gatehouse` |
//! | `exp` / `iat` | Expiry / issued-at (Unix seconds) | |
//! | `jti` | Unique token id | UUID |
//!
//! Anything beyond the reserved set (e.g. `email`) rides in the flattened
//! extras map and stays minimal. Identity (roles, permissions, groups,
//! profile) is re-hydrated per request by the identity resolver - that
//! keeps tokens inside header budgets and bounds the staleness window to
//! the identity-cache TTL instead of the token lifetime.
//!
//! ## Signing
//!
//! The algorithm is configurable; the default - and the only family this
//! deployment wires keys for - is HMAC-SHA-256 (`HS256`, plus `HS384`
//! and `HS512`). Tokens are validated for signature, expiry, issuer and
//! audience. Refresh-token revocation is *not* handled here: the token
//! manager in auth-service layers the revocation registry on top.

use crate::config::TokenConfig;
use crate::errors::ApiError;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// =============================================================================
// Token Type
// =============================================================================

/// Distinguishes the three token kinds this platform mints.
///
/// The type is stored in the token itself to prevent misuse: a refresh
/// token cannot pass as an access token and vice versa, and reset tokens
/// are accepted only by the reset-completion flow.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived token for API authorization. The wire default: a
    /// token without a `type` claim is an access token.
    #[default]
    Access,
    /// Long-lived token for obtaining new token pairs; single-use via
    /// rotation.
    Refresh,
    /// One-shot token minted by the forgot-password flow.
    PasswordReset,
}

// =============================================================================
// Claims Structure
// =============================================================================

/// Token payload: the reserved claims plus a minimal extras map.
///
/// Reserved claims are typed fields; everything else flattens into
/// `extra`. On serialization an access token omits its `type` claim
/// (absent means access).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the principal's unique identifier.
    pub sub: String,

    /// Owning tenant. Empty only for tokens minted outside tenant scope
    /// (none in the current flows).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,

    /// Target app, when the token is app-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Token kind; absent on the wire means access.
    #[serde(rename = "type", default, skip_serializing_if = "TokenType::is_access")]
    pub token_type: TokenType,

    /// Issuer - who created the token.
    pub iss: String,

    /// Audience - who the token is intended for.
    pub aud: String,

    /// Expiration time as Unix timestamp (seconds since epoch).
    pub exp: i64,

    /// Issued-at time as Unix timestamp.
    pub iat: i64,

    /// Unique identifier for this specific token.
    pub jti: Uuid,

    /// Minimal extra claims (e.g. `email`). Never roles or permissions.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenType {
    fn is_access(&self) -> bool {
        *self == TokenType::Access
    }
}

impl Claims {
    /// Returns an extra claim as a string, if present and textual.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

// =============================================================================
// Token Pair
// =============================================================================

/// A pair of access and refresh tokens returned after login or rotation.
///
/// ## Token Rotation
///
/// When refreshing, the client receives a new pair and the presented
/// refresh token becomes invalid in the same logical step (single-use).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// The access token. Send as `Authorization: Bearer <token>`.
    pub access_token: String,

    /// The refresh token for obtaining new pairs.
    pub refresh_token: String,

    /// Always `"Bearer"`.
    pub token_type: String,

    /// Seconds until the access token expires.
    pub expires_in: i64,

    /// Seconds until the refresh token expires.
    pub refresh_expires_in: i64,
}

// =============================================================================
// Signed Token
// =============================================================================

/// A freshly minted token together with its decoded claims.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// The compact serialized token
    pub token: String,
    /// The claims embedded in it
    pub claims: Claims,
}

// =============================================================================
// JWT Service
// =============================================================================

/// Service for token signing and validation.
///
/// Created once at startup and shared via `Arc`. The underlying keys are
/// immutable after construction.
#[derive(Clone)]
pub struct JwtService {
    /// Key for signing tokens (kept secret)
    encoding_key: EncodingKey,
    /// Key for verifying signatures
    decoding_key: DecodingKey,
    /// Resolved signing algorithm
    algorithm: Algorithm,
    /// Configuration with TTLs, issuer, audience
    config: TokenConfig,
}

impl JwtService {
    /// Creates a new JWT service with the given configuration.
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::InternalError` if the configured algorithm is
    /// unknown or outside the HMAC family (this deployment wires a
    /// symmetric secret; asymmetric algorithms would need key files).
    pub fn new(config: TokenConfig) -> Result<Self, ApiError> {
        let algorithm: Algorithm =
            config
                .algorithm
                .parse()
                .map_err(|_| ApiError::InternalError {
                    message: format!("unknown signing algorithm: {}", config.algorithm),
                })?;

        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ApiError::InternalError {
                message: format!(
                    "algorithm {} requires asymmetric keys; only the HMAC family is wired",
                    config.algorithm
                ),
            });
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm,
            config,
        })
    }

    /// Configured TTL for a token type.
    pub fn ttl_for(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => Duration::seconds(self.config.access_ttl_secs as i64),
            TokenType::Refresh => Duration::seconds(self.config.refresh_ttl_secs as i64),
            TokenType::PasswordReset => {
                Duration::seconds(self.config.password_reset_ttl_secs as i64)
            }
        }
    }

    /// Mints a token of the given type with the configured TTL.
    pub fn issue(
        &self,
        sub: &str,
        tenant_id: &str,
        app_id: Option<&str>,
        token_type: TokenType,
        extra: HashMap<String, serde_json::Value>,
    ) -> Result<SignedToken, ApiError> {
        self.issue_with_ttl(sub, tenant_id, app_id, token_type, extra, self.ttl_for(token_type))
    }

    /// Mints a token with an explicit TTL.
    ///
    /// Production paths use [`issue`](Self::issue); this entry point
    /// exists for callers that need a non-standard lifetime and for
    /// crafting expired tokens in tests.
    pub fn issue_with_ttl(
        &self,
        sub: &str,
        tenant_id: &str,
        app_id: Option<&str>,
        token_type: TokenType,
        extra: HashMap<String, serde_json::Value>,
        ttl: Duration,
    ) -> Result<SignedToken, ApiError> {
        let now = Utc::now();

        let claims = Claims {
            sub: sub.to_string(),
            tenant_id: tenant_id.to_string(),
            app_id: app_id.map(String::from),
            token_type,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
            extra,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key).map_err(
            |e| ApiError::InternalError {
                message: format!("failed to sign token: {}", e),
            },
        )?;

        Ok(SignedToken { token, claims })
    }

    /// Validates signature, expiry, issuer and audience, and returns the
    /// claims.
    ///
    /// Revocation is *not* checked here - the token manager consults the
    /// registry for refresh tokens.
    ///
    /// ## Errors
    ///
    /// - `ApiError::TokenExpired` - token has expired
    /// - `ApiError::InvalidToken` - invalid signature, issuer or audience
    pub fn decode(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let token_data: TokenData<Claims> =
            decode(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::TokenExpired,
                _ => ApiError::InvalidToken,
            })?;

        Ok(token_data.claims)
    }

    /// Extracts the token from an Authorization header.
    ///
    /// Expects the format: `Bearer <token>`
    pub fn extract_from_header(auth_header: &str) -> Result<&str, ApiError> {
        auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::InvalidToken)
    }
}

// Implement Debug manually to avoid exposing keys
impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TokenConfig {
        TokenConfig {
            secret: "test_secret_key_minimum_32_chars_required".to_string(),
            ..Default::default()
        }
    }

    fn service() -> JwtService {
        JwtService::new(test_config()).unwrap()
    }

    #[test]
    fn test_issue_and_decode_access_token() {
        let service = service();

        let signed = service
            .issue("user-1", "t1", Some("a1"), TokenType::Access, HashMap::new())
            .unwrap();
        let claims = service.decode(&signed.token).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.tenant_id, "t1");
        assert_eq!(claims.app_id.as_deref(), Some("a1"));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn test_access_type_claim_is_absent_on_wire() {
        let service = service();
        let signed = service
            .issue("user-1", "t1", None, TokenType::Access, HashMap::new())
            .unwrap();

        // Decode the payload segment by hand: no "type" key for access tokens
        let payload = signed.token.split('.').nth(1).unwrap();
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        let decoded = URL_SAFE_NO_PAD.decode(payload).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();

        assert!(json.get("type").is_none());

        // And a refresh token carries it
        let refresh = service
            .issue("user-1", "t1", None, TokenType::Refresh, HashMap::new())
            .unwrap();
        let payload = refresh.token.split('.').nth(1).unwrap();
        let decoded = URL_SAFE_NO_PAD.decode(payload).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(json["type"], "refresh");
    }

    #[test]
    fn test_extra_claims_round_trip() {
        let service = service();
        let mut extra = HashMap::new();
        extra.insert("email".to_string(), serde_json::json!("alice@t1.example"));

        let signed = service
            .issue("user-1", "t1", Some("a1"), TokenType::Access, extra)
            .unwrap();
        let claims = service.decode(&signed.token).unwrap();

        assert_eq!(claims.extra_str("email"), Some("alice@t1.example"));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let service = service();
        let signed = service
            .issue_with_ttl(
                "user-1",
                "t1",
                None,
                TokenType::Access,
                HashMap::new(),
                Duration::seconds(-300),
            )
            .unwrap();

        let result = service.decode(&signed.token);
        assert!(matches!(result, Err(ApiError::TokenExpired)));
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let service = service();
        let signed = service
            .issue("user-1", "t1", None, TokenType::Access, HashMap::new())
            .unwrap();

        let mut tampered = signed.token.clone();
        tampered.pop();
        tampered.push('x');

        assert!(matches!(
            service.decode(&tampered),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn test_wrong_issuer_is_rejected() {
        let minting = JwtService::new(TokenConfig {
            secret: "test_secret_key_minimum_32_chars_required".to_string(),
            issuer: "someone-else".to_string(),
            ..Default::default()
        })
        .unwrap();
        let verifying = service();

        let signed = minting
            .issue("user-1", "t1", None, TokenType::Access, HashMap::new())
            .unwrap();

        assert!(matches!(
            verifying.decode(&signed.token),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn test_each_token_has_unique_jti() {
        let service = service();
        let a = service
            .issue("user-1", "t1", None, TokenType::Access, HashMap::new())
            .unwrap();
        let b = service
            .issue("user-1", "t1", None, TokenType::Access, HashMap::new())
            .unwrap();

        assert_ne!(a.claims.jti, b.claims.jti);
    }

    #[test]
    fn test_non_hmac_algorithm_is_rejected() {
        let result = JwtService::new(TokenConfig {
            secret: "test_secret_key_minimum_32_chars_required".to_string(),
            algorithm: "RS256".to_string(),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_from_header() {
        let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";
        let header = format!("Bearer {}", token);

        assert_eq!(JwtService::extract_from_header(&header).unwrap(), token);
        assert!(JwtService::extract_from_header("Basic abc").is_err());
    }
}
