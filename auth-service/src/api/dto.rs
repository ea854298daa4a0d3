//! # Data Transfer Objects (DTOs)
//!
//! Request and response shapes for the HTTP surface.
//!
//! ## Conventions
//!
//! - **Requests** use `camelCase` field names (JavaScript clients).
//! - **Token envelopes** use the OAuth-style `snake_case` names
//!   (`access_token`, `token_type`, `expires_in`).
//! - **Sanitization is structural**: the key DTO has no `secret_hash`
//!   field and the user DTO has no password hash, so neither can leak.
//!
//! ## The Uniform Failure Envelope
//!
//! Credential endpoints answer authentication failures with HTTP 200 and
//!
//! ```json
//! {"success": false, "error": "invalid credentials"}
//! ```
//!
//! byte-identical across unknown-user / wrong-password / locked, so the
//! response shape cannot be used for user enumeration. The constructors
//! here are the single source of that envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use shared::auth::jwt::TokenPair;
use shared::validation::validators;

use crate::domain::{AppKey, KeyEnvironment, UserProfile};
use crate::service::apikey_service::KeyAuthentication;

// =============================================================================
// HEALTH
// =============================================================================

/// Health check response for monitoring and load balancers.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}

// =============================================================================
// GENERIC ENVELOPES
// =============================================================================

/// Uniform `{success, message}` envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// =============================================================================
// LOGIN
// =============================================================================

/// Request body for password login.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Login name within the tenant
    #[validate(length(min = 1, max = 255, message = "Username is required"))]
    pub username: String,

    /// Plain text password
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login response: the token pair on success, the uniform failure
/// envelope otherwise.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResponse {
    pub fn success(tokens: TokenPair, user: UserProfile) -> Self {
        Self {
            success: true,
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            token_type: Some(tokens.token_type),
            expires_in: Some(tokens.expires_in),
            user: Some(user),
            error: None,
        }
    }

    /// The one generic failure envelope for every authentication
    /// failure mode.
    pub fn invalid_credentials() -> Self {
        Self {
            success: false,
            access_token: None,
            refresh_token: None,
            token_type: None,
            expires_in: None,
            user: None,
            error: Some("invalid credentials".to_string()),
        }
    }
}

// =============================================================================
// PASSWORD MANAGEMENT
// =============================================================================

/// Request body for password change.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,

    #[validate(length(min = 1, message = "Old password is required"))]
    pub old_password: String,

    /// Strength is validated against the effective credential
    /// configuration, not here
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

/// Request body for initiating password reset.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Request body for completing password reset.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub reset_token: String,

    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

// =============================================================================
// API-KEY AUTHENTICATION
// =============================================================================

/// Request body for API-key authentication.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyAuthenticateRequest {
    /// The composite `{app_id}_{key_id}.{secret}` string
    #[validate(length(min = 1, message = "API key is required"))]
    pub api_key: String,
}

/// API-key authentication outcome.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeyAuthenticateResponse {
    pub success: bool,
    pub validated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<HashMap<String, serde_json::Value>>,
}

impl ApiKeyAuthenticateResponse {
    pub fn validated(auth: KeyAuthentication) -> Self {
        Self {
            success: true,
            validated: true,
            key_id: Some(auth.key_id),
            tenant_id: Some(auth.tenant_id),
            app_id: Some(auth.app_id),
            scopes: Some(auth.scopes),
            claims: Some(auth.claims),
        }
    }

    pub fn rejected() -> Self {
        Self {
            success: false,
            validated: false,
            key_id: None,
            tenant_id: None,
            app_id: None,
            scopes: None,
            claims: None,
        }
    }
}

// =============================================================================
// TOKEN OPERATIONS
// =============================================================================

/// Request body carrying one token (validate, revoke, introspect).
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

/// Request body for refresh rotation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Validation outcome: the `{valid, claims, error}` triple.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Rotation outcome: a fresh pair, or the refresh failure envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenRefreshResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TokenRefreshResponse {
    pub fn success(pair: TokenPair) -> Self {
        Self {
            success: true,
            access_token: Some(pair.access_token),
            refresh_token: Some(pair.refresh_token),
            token_type: Some(pair.token_type),
            expires_in: Some(pair.expires_in),
            error: None,
        }
    }

    pub fn invalid() -> Self {
        Self {
            success: false,
            access_token: None,
            refresh_token: None,
            token_type: None,
            expires_in: None,
            error: Some("invalid refresh token".to_string()),
        }
    }
}

/// Introspection result (RFC 7662 shape).
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenIntrospectResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

// =============================================================================
// APP-KEY ADMINISTRATION
// =============================================================================

/// Request body for minting an app key.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppKeyRequest {
    #[validate(custom(function = "validators::not_blank"))]
    #[validate(length(max = 200, message = "Name too long"))]
    pub name: String,

    #[serde(default)]
    pub scopes: Vec<String>,

    /// Key kind; defaults to "service"
    #[serde(default)]
    pub key_type: Option<String>,

    #[serde(default)]
    pub environment: Option<KeyEnvironment>,

    /// Optional user the key acts for
    #[serde(default)]
    pub user_id: Option<String>,

    /// `null` = configured default; `0` = never expires (if allowed)
    #[serde(default)]
    pub expires_in_days: Option<u32>,
}

/// Sanitized key record: **no** `secret_hash`, **no** secret.
///
/// List/get operations can only ever produce this shape, which is what
/// keeps hashes out of every response by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppKeyDto {
    pub id: String,
    pub tenant_id: String,
    pub app_id: String,
    pub key_id: String,
    pub prefix: String,
    pub key_type: String,
    pub environment: KeyEnvironment,
    pub user_id: Option<String>,
    pub name: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<AppKey> for AppKeyDto {
    fn from(key: AppKey) -> Self {
        Self {
            id: key.id,
            tenant_id: key.tenant_id,
            app_id: key.app_id,
            key_id: key.key_id,
            prefix: key.prefix,
            key_type: key.key_type,
            environment: key.environment,
            user_id: key.user_id,
            name: key.name,
            scopes: key.scopes,
            created_at: key.created_at,
            expires_at: key.expires_at,
            last_used_at: key.last_used_at,
            revoked: key.revoked,
            revoked_at: key.revoked_at,
        }
    }
}

/// Response to key creation: the record plus the one-shot composite
/// string. This is the only response that ever carries the secret.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppKeyResponse {
    /// `{app_id}_{key_id}.{secret}` - shown exactly once
    pub api_key: String,
    pub key: AppKeyDto,
}

/// Request body for key rotation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateAppKeyRequest {
    /// Whether to revoke the old key; defaults to true
    #[serde(default)]
    pub revoke_old: Option<bool>,
}

// =============================================================================
// AUTHORIZATION
// =============================================================================

/// Request body for an authorization check.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AuthzCheckRequest {
    /// Access token identifying the subject
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(custom(function = "validators::not_blank"))]
    pub resource_type: String,

    #[serde(default)]
    pub resource_id: Option<String>,

    #[validate(custom(function = "validators::not_blank"))]
    pub action: String,

    /// Request-time environment for condition evaluation
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

/// Authorization decision.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthzCheckResponse {
    pub allow: bool,
    pub reason: String,
}

// =============================================================================
// Tests
// =============================================================================
