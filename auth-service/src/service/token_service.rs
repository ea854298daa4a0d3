//! # Token Manager
//!
//! Issues, verifies and revokes the platform's tokens, layering the
//! revocation registry on top of the signing service in
//! [`shared::auth::jwt`].
//!
//! ## Registry Discipline
//!
//! | Token type | Registry consulted on verify? |
//! |------------|-------------------------------|
//! | Access | **No** - short-lived by design |
//! | Refresh | Yes (token identifier + family) |
//! | Password reset | Only by the reset-completion flow |
//!
//! ## Refresh Rotation (single-use)
//!
//! ```text
//!  client                    TokenManager                 registry
//!    │  refresh(R1)               │                          │
//!    │───────────────────────────▶│ decode, type == refresh  │
//!    │                            │ insert-if-absent(id(R1)) │
//!    │                            │─────────────────────────▶│
//!    │                            │        first writer wins │
//!    │                            │◀─────────────────────────│
//!    │   {A2, R2}   (winner)      │ mint A2 + R2             │
//!    │◀───────────────────────────│                          │
//!    │                            │                          │
//!    │  refresh(R1)  (again)      │ insert loses             │
//!    │───────────────────────────▶│ → token_reuse_detected   │
//!    │  "invalid refresh token"   │ → optional family revoke │
//!    │◀───────────────────────────│                          │
//! ```
//!
//! The registry insert *is* the consumption: of two concurrent rotations
//! presenting the same token, exactly one inserts and proceeds to mint.
//! Reuse of a consumed token is a security event
//! (`token_reuse_detected`); deployments choose the response through
//! [`ReusePolicy`].
//!
//! Token identifiers are SHA3-256 digests of the token value, so the
//! registry never stores usable tokens.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use shared::auth::jwt::{Claims, JwtService, TokenPair, TokenType};
use shared::crypto;
use shared::errors::ApiError;

use crate::domain::{AuditAction, AuditEvent};
use crate::repository::RevocationRegistry;
use crate::service::audit_service::AuditEmitter;

/// Extra claim carrying the refresh-token family id across rotations.
const FAMILY_CLAIM: &str = "fam";

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// The identifiers a token is minted from. Deliberately small: roles and
/// permissions never enter claims.
#[derive(Debug, Clone, Default)]
pub struct ClaimSpec {
    pub sub: String,
    pub tenant_id: String,
    pub app_id: Option<String>,
    /// Minimal extras (e.g. `email`)
    pub extra: HashMap<String, serde_json::Value>,
}

/// A freshly minted token with its metadata.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: String,
    /// Always `"Bearer"`
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claims: Claims,
}

/// Result of a verification: the `{valid, claims, error}` triple.
#[derive(Debug, Clone)]
pub struct Verification {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl Verification {
    fn ok(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

/// Deployment response to refresh-token reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReusePolicy {
    /// Reject the reused token only
    #[default]
    RejectOnly,
    /// Additionally revoke the whole token family, forcing re-login
    RevokeFamily,
}

// =============================================================================
// Token Manager
// =============================================================================

/// The token manager: signing service + revocation registry + audit.
pub struct TokenManager {
    jwt: Arc<JwtService>,
    registry: Arc<dyn RevocationRegistry>,
    audit: AuditEmitter,
    reuse_policy: ReusePolicy,
}

impl TokenManager {
    pub fn new(
        jwt: Arc<JwtService>,
        registry: Arc<dyn RevocationRegistry>,
        audit: AuditEmitter,
        reuse_policy: ReusePolicy,
    ) -> Self {
        Self {
            jwt,
            registry,
            audit,
            reuse_policy,
        }
    }

    /// Stable registry identifier for a token value.
    fn identifier(token: &str) -> String {
        crypto::sha3_256_hex(token.as_bytes())
    }

    fn family_identifier(family: &str) -> String {
        format!("fam:{}", family)
    }

    fn expires_at(claims: &Claims) -> DateTime<Utc> {
        Utc.timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn issued(signed: shared::auth::jwt::SignedToken) -> IssuedToken {
        let issued_at = Utc
            .timestamp_opt(signed.claims.iat, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let expires_at = Self::expires_at(&signed.claims);
        IssuedToken {
            value: signed.token,
            token_type: "Bearer".to_string(),
            issued_at,
            expires_at,
            claims: signed.claims,
        }
    }

    // =========================================================================
    // Issuance
    // =========================================================================

    /// Mints an access token with the configured access TTL.
    pub fn generate(&self, spec: &ClaimSpec) -> Result<IssuedToken, ApiError> {
        let signed = self.jwt.issue(
            &spec.sub,
            &spec.tenant_id,
            spec.app_id.as_deref(),
            TokenType::Access,
            spec.extra.clone(),
        )?;
        Ok(Self::issued(signed))
    }

    /// Mints a refresh token, tagging it with its family id (a fresh one
    /// unless the spec already carries `fam` from a rotation).
    pub fn generate_refresh(&self, spec: &ClaimSpec) -> Result<IssuedToken, ApiError> {
        let mut extra = spec.extra.clone();
        extra
            .entry(FAMILY_CLAIM.to_string())
            .or_insert_with(|| serde_json::json!(Uuid::new_v4().to_string()));

        let signed = self.jwt.issue(
            &spec.sub,
            &spec.tenant_id,
            spec.app_id.as_deref(),
            TokenType::Refresh,
            extra,
        )?;
        Ok(Self::issued(signed))
    }

    /// Mints an access/refresh pair from the same claims.
    pub fn issue_pair(&self, spec: &ClaimSpec) -> Result<TokenPair, ApiError> {
        let access = self.generate(spec)?;
        let refresh = self.generate_refresh(spec)?;

        Ok(TokenPair {
            access_token: access.value,
            refresh_token: refresh.value,
            token_type: "Bearer".to_string(),
            expires_in: (access.expires_at - access.issued_at).num_seconds(),
            refresh_expires_in: (refresh.expires_at - refresh.issued_at).num_seconds(),
        })
    }

    /// Mints a one-shot password-reset token (15 minutes by default).
    pub fn generate_password_reset(&self, spec: &ClaimSpec) -> Result<IssuedToken, ApiError> {
        let signed = self.jwt.issue(
            &spec.sub,
            &spec.tenant_id,
            spec.app_id.as_deref(),
            TokenType::PasswordReset,
            spec.extra.clone(),
        )?;
        Ok(Self::issued(signed))
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Verifies signature and expiry; consults the revocation registry
    /// for refresh tokens only.
    pub async fn verify(&self, token: &str) -> Verification {
        let claims = match self.jwt.decode(token) {
            Ok(claims) => claims,
            Err(e) => return Verification::invalid(e.to_string()),
        };

        if claims.token_type == TokenType::Refresh {
            match self.refresh_revocation_state(token, &claims).await {
                Ok(false) => {}
                Ok(true) => return Verification::invalid("token revoked"),
                Err(e) => return Verification::invalid(e.to_string()),
            }
        }

        Verification::ok(claims)
    }

    /// Whether a refresh token (or its family) is revoked.
    async fn refresh_revocation_state(
        &self,
        token: &str,
        claims: &Claims,
    ) -> Result<bool, ApiError> {
        if self
            .registry
            .is_revoked(&Self::identifier(token))
            .await
            .map_err(ApiError::from)?
        {
            return Ok(true);
        }
        if let Some(family) = claims.extra_str(FAMILY_CLAIM) {
            if self
                .registry
                .is_revoked(&Self::family_identifier(family))
                .await
                .map_err(ApiError::from)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Decodes and validates a password-reset token: type, tenant match,
    /// and one-shot consumption state.
    pub async fn verify_password_reset(
        &self,
        token: &str,
        expected_tenant: &str,
    ) -> Result<Claims, ApiError> {
        let claims = self.jwt.decode(token)?;

        if claims.token_type != TokenType::PasswordReset {
            return Err(ApiError::InvalidToken);
        }
        if claims.tenant_id != expected_tenant {
            return Err(ApiError::InvalidToken);
        }
        if self
            .registry
            .is_revoked(&Self::identifier(token))
            .await
            .map_err(ApiError::from)?
        {
            return Err(ApiError::InvalidToken);
        }

        Ok(claims)
    }

    // =========================================================================
    // Revocation
    // =========================================================================

    /// Records the token's identifier in the revocation registry.
    /// Idempotent; an already-expired token is a no-op success.
    pub async fn revoke(&self, token: &str) -> Result<(), ApiError> {
        let claims = match self.jwt.decode(token) {
            Ok(claims) => claims,
            // Expired tokens are already unusable; revoking them is moot
            Err(ApiError::TokenExpired) => return Ok(()),
            Err(e) => return Err(e),
        };

        self.registry
            .revoke(&Self::identifier(token), Self::expires_at(&claims))
            .await
            .map_err(ApiError::from)?;

        self.audit.emit(
            AuditEvent::new(AuditAction::TokenRevoke, "token", "token")
                .with_tenant(claims.tenant_id.clone())
                .with_user(claims.sub.clone())
                .with_metadata("jti", serde_json::json!(claims.jti.to_string())),
        );

        info!(jti = %claims.jti, "Token revoked");
        Ok(())
    }

    // =========================================================================
    // Refresh Rotation
    // =========================================================================

    /// Exchanges a refresh token for a new pair, consuming the presented
    /// token in the same logical step.
    ///
    /// The registry insert is the compare-and-set: the first of two
    /// concurrent rotations wins, the other observes the token as
    /// consumed and gets "invalid refresh token" plus a
    /// `token_reuse_detected` audit event.
    pub async fn refresh_rotate(&self, token: &str) -> Result<TokenPair, ApiError> {
        // Signature, expiry, type
        let claims = match self.jwt.decode(token) {
            Ok(claims) => claims,
            Err(_) => return Err(ApiError::InvalidRefreshToken),
        };
        if claims.token_type != TokenType::Refresh {
            return Err(ApiError::InvalidRefreshToken);
        }

        let family = claims.extra_str(FAMILY_CLAIM).map(String::from);

        // A revoked family means an earlier reuse already burned it
        if let Some(ref family) = family {
            if self
                .registry
                .is_revoked(&Self::family_identifier(family))
                .await
                .map_err(ApiError::from)?
            {
                return Err(ApiError::InvalidRefreshToken);
            }
        }

        // Consume: insert-if-absent is the serialization point
        let consumed = self
            .registry
            .revoke(&Self::identifier(token), Self::expires_at(&claims))
            .await
            .map_err(ApiError::from)?;

        if !consumed {
            // Reuse of an already-consumed refresh token: security event
            warn!(
                sub = %claims.sub,
                tenant_id = %claims.tenant_id,
                jti = %claims.jti,
                "Refresh token reuse detected"
            );
            self.audit.emit(
                AuditEvent::new(AuditAction::TokenReuseDetected, "token", "token")
                    .with_tenant(claims.tenant_id.clone())
                    .with_user(claims.sub.clone())
                    .failure("refresh token presented after consumption"),
            );

            if self.reuse_policy == ReusePolicy::RevokeFamily {
                if let Some(ref family) = family {
                    let family_expiry = Utc::now() + self.jwt.ttl_for(TokenType::Refresh);
                    if let Err(e) = self
                        .registry
                        .revoke(&Self::family_identifier(family), family_expiry)
                        .await
                    {
                        warn!(error = %e, "Failed to revoke token family after reuse");
                    }
                }
            }

            return Err(ApiError::InvalidRefreshToken);
        }

        // Mint the new pair from the same claims, keeping the family id
        let mut extra = claims.extra.clone();
        if let Some(ref family) = family {
            extra.insert(FAMILY_CLAIM.to_string(), serde_json::json!(family));
        }
        let spec = ClaimSpec {
            sub: claims.sub.clone(),
            tenant_id: claims.tenant_id.clone(),
            app_id: claims.app_id.clone(),
            extra,
        };
        let pair = self.issue_pair(&spec)?;

        self.audit.emit(
            AuditEvent::new(AuditAction::TokenRefresh, "token", "token")
                .with_tenant(claims.tenant_id.clone())
                .with_user(claims.sub.clone()),
        );

        Ok(pair)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// One registry purge pass; called periodically from the bootstrap.
    pub async fn purge_expired_revocations(&self) -> Result<u64, ApiError> {
        let purged = self
            .registry
            .purge_expired(Utc::now())
            .await
            .map_err(ApiError::from)?;
        if purged > 0 {
            info!(purged, "Purged expired revocation entries");
        }
        Ok(purged)
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("reuse_policy", &self.reuse_policy)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::{InMemoryAuditLogStore, InMemoryRevocationRegistry};
    use shared::config::TokenConfig;

    fn manager(reuse_policy: ReusePolicy) -> TokenManager {
        let jwt = Arc::new(
            JwtService::new(TokenConfig {
                secret: "test_secret_key_minimum_32_chars_required".to_string(),
                ..Default::default()
            })
            .unwrap(),
        );
        let (audit, _drain) = AuditEmitter::new(Arc::new(InMemoryAuditLogStore::new()), 64);
        TokenManager::new(
            jwt,
            Arc::new(InMemoryRevocationRegistry::new()),
            audit,
            reuse_policy,
        )
    }

    fn spec() -> ClaimSpec {
        let mut extra = HashMap::new();
        extra.insert("email".to_string(), serde_json::json!("alice@t1.example"));
        ClaimSpec {
            sub: "u1".to_string(),
            tenant_id: "t1".to_string(),
            app_id: Some("a1".to_string()),
            extra,
        }
    }

    #[tokio::test]
    async fn test_generate_and_verify_access_token() {
        let manager = manager(ReusePolicy::default());
        let issued = manager.generate(&spec()).unwrap();

        assert_eq!(issued.token_type, "Bearer");
        let verification = manager.verify(&issued.value).await;
        assert!(verification.valid);

        let claims = verification.claims.unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.tenant_id, "t1");
        assert_eq!(claims.extra_str("email"), Some("alice@t1.example"));
    }

    #[tokio::test]
    async fn test_garbage_is_invalid_with_error() {
        let manager = manager(ReusePolicy::default());
        let verification = manager.verify("not-a-token").await;

        assert!(!verification.valid);
        assert!(verification.claims.is_none());
        assert!(verification.error.is_some());
    }

    #[tokio::test]
    async fn test_refresh_token_usable_until_revoked() {
        let manager = manager(ReusePolicy::default());
        let refresh = manager.generate_refresh(&spec()).unwrap();

        assert!(manager.verify(&refresh.value).await.valid);
        manager.revoke(&refresh.value).await.unwrap();
        assert!(!manager.verify(&refresh.value).await.valid);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let manager = manager(ReusePolicy::default());
        let refresh = manager.generate_refresh(&spec()).unwrap();

        manager.revoke(&refresh.value).await.unwrap();
        manager.revoke(&refresh.value).await.unwrap();
        assert!(!manager.verify(&refresh.value).await.valid);
    }

    #[tokio::test]
    async fn test_access_tokens_skip_the_registry() {
        // Short-lived access tokens are deliberately not checked against
        // the registry on verify
        let manager = manager(ReusePolicy::default());
        let access = manager.generate(&spec()).unwrap();

        manager.revoke(&access.value).await.unwrap();
        assert!(manager.verify(&access.value).await.valid);
    }

    #[tokio::test]
    async fn test_rotation_consumes_presented_token() {
        let manager = manager(ReusePolicy::default());
        let pair = manager.issue_pair(&spec()).unwrap();

        let rotated = manager.refresh_rotate(&pair.refresh_token).await.unwrap();

        // Old refresh invalid, new pair valid
        assert!(!manager.verify(&pair.refresh_token).await.valid);
        assert!(manager.verify(&rotated.access_token).await.valid);
        assert!(manager.verify(&rotated.refresh_token).await.valid);

        // Reuse is rejected with the spec literal
        let reuse = manager.refresh_rotate(&pair.refresh_token).await;
        assert!(matches!(reuse, Err(ApiError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_concurrent_rotation_is_single_use() {
        let manager = Arc::new(manager(ReusePolicy::default()));
        let pair = manager.issue_pair(&spec()).unwrap();

        let (a, b) = tokio::join!(
            manager.refresh_rotate(&pair.refresh_token),
            manager.refresh_rotate(&pair.refresh_token),
        );

        // Exactly one rotation wins
        let successes = [a.is_ok(), b.is_ok()];
        assert_eq!(successes.iter().filter(|s| **s).count(), 1);

        let loser = if a.is_err() { a } else { b };
        assert!(matches!(loser, Err(ApiError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_access_token_cannot_rotate() {
        let manager = manager(ReusePolicy::default());
        let access = manager.generate(&spec()).unwrap();

        let result = manager.refresh_rotate(&access.value).await;
        assert!(matches!(result, Err(ApiError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_reuse_with_revoke_family_burns_descendants() {
        let manager = manager(ReusePolicy::RevokeFamily);
        let pair = manager.issue_pair(&spec()).unwrap();

        let rotated = manager.refresh_rotate(&pair.refresh_token).await.unwrap();
        assert!(manager.verify(&rotated.refresh_token).await.valid);

        // Reusing the consumed token burns the whole family
        let reuse = manager.refresh_rotate(&pair.refresh_token).await;
        assert!(reuse.is_err());

        // The rotated descendant is now invalid too
        assert!(!manager.verify(&rotated.refresh_token).await.valid);
        let result = manager.refresh_rotate(&rotated.refresh_token).await;
        assert!(matches!(result, Err(ApiError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_reuse_without_revoke_family_spares_descendants() {
        let manager = manager(ReusePolicy::RejectOnly);
        let pair = manager.issue_pair(&spec()).unwrap();

        let rotated = manager.refresh_rotate(&pair.refresh_token).await.unwrap();
        let _ = manager.refresh_rotate(&pair.refresh_token).await;

        // RejectOnly: the descendant stays valid
        assert!(manager.verify(&rotated.refresh_token).await.valid);
    }

    #[tokio::test]
    async fn test_rotation_preserves_claims() {
        let manager = manager(ReusePolicy::default());
        let pair = manager.issue_pair(&spec()).unwrap();

        let rotated = manager.refresh_rotate(&pair.refresh_token).await.unwrap();
        let verification = manager.verify(&rotated.access_token).await;
        let claims = verification.claims.unwrap();

        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.tenant_id, "t1");
        assert_eq!(claims.app_id.as_deref(), Some("a1"));
        assert_eq!(claims.extra_str("email"), Some("alice@t1.example"));
    }

    #[tokio::test]
    async fn test_password_reset_verification() {
        let manager = manager(ReusePolicy::default());
        let reset = manager.generate_password_reset(&spec()).unwrap();

        // Valid for the right tenant
        let claims = manager
            .verify_password_reset(&reset.value, "t1")
            .await
            .unwrap();
        assert_eq!(claims.sub, "u1");

        // Wrong tenant is rejected
        let result = manager.verify_password_reset(&reset.value, "t2").await;
        assert!(matches!(result, Err(ApiError::InvalidToken)));

        // Consumed (revoked) reset tokens are one-shot
        manager.revoke(&reset.value).await.unwrap();
        let result = manager.verify_password_reset(&reset.value, "t1").await;
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_access_token_rejected_as_password_reset() {
        let manager = manager(ReusePolicy::default());
        let access = manager.generate(&spec()).unwrap();

        let result = manager.verify_password_reset(&access.value, "t1").await;
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }
}
