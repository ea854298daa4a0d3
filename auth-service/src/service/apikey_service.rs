//! # API-Key Lifecycle
//!
//! Generation, verification, rotation and revocation of machine
//! credentials.
//!
//! ## The Composite Key String
//!
//! ```text
//! {app_id}_{key_id}.{secret}
//!    │        │        └── URL-safe base64 (no padding) of ≥32 random bytes
//!    │        └── public identifier, globally unique, no '_' or '.'
//!    └── routing to the owning app
//! ```
//!
//! The string is returned **exactly once** at creation; only the
//! SHA3-256 hash of the secret is persisted. `key_id` is minted without
//! `_` or `.`, so parsing from the right (`rsplit` on `.`, then on `_`)
//! is unambiguous even when `app_id` contains either character.
//!
//! ## Verification Discipline
//!
//! Every failure - malformed string, unknown key, tenant/app mismatch,
//! revoked, expired, wrong secret - yields the same generic failure, and
//! the secret comparison is constant-time over fixed-width digests.
//! `last_used_at` is stamped asynchronously; a failed stamp never fails
//! the authentication.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared::crypto;
use shared::errors::ApiError;

use crate::domain::{AppKey, AuditAction, AuditEvent, KeyEnvironment};
use crate::repository::{AppKeyStore, ApplicationStore};
use crate::service::audit_service::AuditEmitter;
use crate::service::config_resolver::EffectiveConfigResolver;

/// Length of the routing prefix taken from the front of `key_id`.
const PREFIX_LEN: usize = 8;

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// Parameters for minting a new key.
#[derive(Debug, Clone)]
pub struct NewAppKeyRequest {
    pub name: String,
    pub scopes: Vec<String>,
    /// Key kind; defaults to "service"
    pub key_type: Option<String>,
    pub environment: Option<KeyEnvironment>,
    /// Optional user the key acts for
    pub user_id: Option<String>,
    /// `None` = configured default; `Some(0)` = never expires (if the
    /// configuration allows it); `Some(n)` = n days
    pub expires_in_days: Option<u32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A minted key: the stored record plus the one-shot composite string.
#[derive(Debug, Clone)]
pub struct CreatedAppKey {
    pub record: AppKey,
    /// `{app_id}_{key_id}.{secret}` - shown exactly once, never
    /// recoverable afterwards
    pub key_string: String,
}

/// The parsed parts of a composite key string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKeyString {
    pub app_id: String,
    pub key_id: String,
    pub secret: String,
}

/// Successful key authentication.
#[derive(Debug, Clone)]
pub struct KeyAuthentication {
    pub key_id: String,
    pub tenant_id: String,
    pub app_id: String,
    pub user_id: Option<String>,
    pub scopes: Vec<String>,
    /// Claims a transport may mint a token from
    pub claims: HashMap<String, serde_json::Value>,
}

// =============================================================================
// Service
// =============================================================================

/// API-key lifecycle service.
pub struct ApiKeyService {
    keys: Arc<dyn AppKeyStore>,
    apps: Arc<dyn ApplicationStore>,
    resolver: Arc<EffectiveConfigResolver>,
    audit: AuditEmitter,
}

impl ApiKeyService {
    pub fn new(
        keys: Arc<dyn AppKeyStore>,
        apps: Arc<dyn ApplicationStore>,
        resolver: Arc<EffectiveConfigResolver>,
        audit: AuditEmitter,
    ) -> Self {
        Self {
            keys,
            apps,
            resolver,
            audit,
        }
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    /// Parses `{app_id}_{key_id}.{secret}`.
    ///
    /// Splits from the right: the secret alphabet excludes `.` and the
    /// minted `key_id` excludes both delimiters, so `app_id` may contain
    /// them freely.
    pub fn parse_key_string(key_string: &str) -> Result<ParsedKeyString, ApiError> {
        let malformed = || ApiError::BadRequest {
            message: "malformed api key".to_string(),
        };

        let (left, secret) = key_string.rsplit_once('.').ok_or_else(malformed)?;
        let (app_id, key_id) = left.rsplit_once('_').ok_or_else(malformed)?;

        if app_id.is_empty() || key_id.is_empty() || secret.is_empty() {
            return Err(malformed());
        }

        Ok(ParsedKeyString {
            app_id: app_id.to_string(),
            key_id: key_id.to_string(),
            secret: secret.to_string(),
        })
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Mints a key for `(tenant_id, app_id)`.
    ///
    /// The returned [`CreatedAppKey::key_string`] is the only time the
    /// secret exists in plaintext.
    pub async fn generate(
        &self,
        tenant_id: &str,
        app_id: &str,
        request: NewAppKeyRequest,
    ) -> Result<CreatedAppKey, ApiError> {
        // The app must exist in this tenant
        self.apps
            .find(tenant_id, app_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("app:{}", app_id),
            })?;

        let config = self.resolver.resolve(tenant_id, Some(app_id)).await?;
        let now = Utc::now();

        // Full-entropy secret; hash is all we keep
        let secret = crypto::random_secret(config.apikey.secret_length)?;
        let secret_hash = crypto::sha3_256_hex(secret.as_bytes());

        // key_id: 32 lowercase hex chars - no '_' or '.', parse-safe
        let key_id = Uuid::new_v4().simple().to_string();
        let prefix = key_id[..PREFIX_LEN].to_string();

        let expires_at = match request.expires_in_days {
            Some(0) if config.apikey.allow_never_expire => None,
            Some(0) => expiry_from_days(now, config.apikey.default_expiry_days),
            Some(days) => expiry_from_days(now, days),
            None => expiry_from_days(now, config.apikey.default_expiry_days),
        };

        let record = AppKey {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            app_id: app_id.to_string(),
            key_id: key_id.clone(),
            prefix,
            secret_hash,
            key_type: request.key_type.unwrap_or_else(|| "service".to_string()),
            environment: request.environment.unwrap_or(KeyEnvironment::Live),
            user_id: request.user_id,
            name: request.name,
            scopes: request.scopes,
            metadata: request.metadata,
            created_at: now,
            expires_at,
            last_used_at: None,
            revoked: false,
            revoked_at: None,
        };

        let record = self.keys.create(record).await?;
        let key_string = format!("{}_{}.{}", app_id, key_id, secret);

        self.audit.emit(
            AuditEvent::new(AuditAction::Create, "app_key", "apikey")
                .with_tenant(tenant_id)
                .with_app(app_id)
                .with_resource(key_id.clone()),
        );
        info!(tenant_id, app_id, key_id = %record.key_id, "App key created");

        Ok(CreatedAppKey { record, key_string })
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Authenticates a composite key string.
    ///
    /// `expected_tenant` / `expected_app` pin the key to the caller's
    /// scope when the transport knows it, preventing cross-tenant key
    /// confusion. Every failure mode surfaces as the same generic
    /// [`ApiError::InvalidCredentials`].
    pub async fn authenticate(
        &self,
        key_string: &str,
        expected_tenant: Option<&str>,
        expected_app: Option<&str>,
    ) -> Result<KeyAuthentication, ApiError> {
        let now = Utc::now();

        let parsed = match Self::parse_key_string(key_string) {
            Ok(parsed) => parsed,
            Err(_) => return Err(self.reject(expected_tenant, expected_app, "malformed")),
        };

        let record = match self.keys.find_by_key_id(&parsed.key_id).await? {
            Some(record) => record,
            None => return Err(self.reject(expected_tenant, expected_app, "unknown key")),
        };

        // The embedded app id and any caller-supplied scope must match
        // the stored row
        if record.app_id != parsed.app_id
            || expected_tenant.is_some_and(|t| t != record.tenant_id)
            || expected_app.is_some_and(|a| a != record.app_id)
        {
            return Err(self.reject(expected_tenant, expected_app, "scope mismatch"));
        }

        let config = self
            .resolver
            .resolve(&record.tenant_id, Some(&record.app_id))
            .await?;
        if !config.enable_apikey {
            return Err(self.reject(expected_tenant, expected_app, "apikey disabled"));
        }

        if !record.is_usable(now) {
            return Err(self.reject(expected_tenant, expected_app, "revoked or expired"));
        }

        // Constant-time compare over fixed-width digests
        let presented_hash = crypto::sha3_256_hex(parsed.secret.as_bytes());
        if !crypto::constant_time_eq(presented_hash.as_bytes(), record.secret_hash.as_bytes()) {
            return Err(self.reject(expected_tenant, expected_app, "secret mismatch"));
        }

        // Best-effort usage stamp: spawned, never failing the auth
        let keys = self.keys.clone();
        let key_id = record.key_id.clone();
        tokio::spawn(async move {
            if let Err(e) = keys.update_last_used(&key_id, now).await {
                debug!(error = %e, key_id = %key_id, "last_used_at update dropped");
            }
        });

        self.audit.emit(
            AuditEvent::new(AuditAction::Login, "app_key", "apikey")
                .with_tenant(record.tenant_id.clone())
                .with_app(record.app_id.clone())
                .with_resource(record.key_id.clone()),
        );

        let mut claims = HashMap::new();
        claims.insert(
            "sub".to_string(),
            serde_json::json!(record
                .user_id
                .clone()
                .unwrap_or_else(|| record.key_id.clone())),
        );
        claims.insert("tenant_id".to_string(), serde_json::json!(record.tenant_id));
        claims.insert("app_id".to_string(), serde_json::json!(record.app_id));
        claims.insert("key_id".to_string(), serde_json::json!(record.key_id));
        claims.insert("scopes".to_string(), serde_json::json!(record.scopes));

        Ok(KeyAuthentication {
            key_id: record.key_id,
            tenant_id: record.tenant_id,
            app_id: record.app_id,
            user_id: record.user_id,
            scopes: record.scopes,
            claims,
        })
    }

    /// One audit event + one generic error for every verification
    /// failure mode. The mode goes to the audit trail, never the caller.
    fn reject(&self, tenant: Option<&str>, app: Option<&str>, mode: &str) -> ApiError {
        let mut event =
            AuditEvent::new(AuditAction::LoginFailed, "app_key", "apikey").failure(mode);
        if let Some(tenant) = tenant {
            event = event.with_tenant(tenant);
        }
        if let Some(app) = app {
            event = event.with_app(app);
        }
        self.audit.emit(event);
        ApiError::InvalidCredentials
    }

    // =========================================================================
    // Rotation & Revocation
    // =========================================================================

    /// Issues a replacement key inheriting name, scopes, environment,
    /// type, user and metadata; optionally revokes the old key.
    pub async fn rotate(
        &self,
        tenant_id: &str,
        app_id: &str,
        key_id: &str,
        revoke_old: bool,
    ) -> Result<CreatedAppKey, ApiError> {
        let old = self
            .keys
            .find(tenant_id, app_id, key_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("app_key:{}", key_id),
            })?;

        let replacement = self
            .generate(
                tenant_id,
                app_id,
                NewAppKeyRequest {
                    name: old.name.clone(),
                    scopes: old.scopes.clone(),
                    key_type: Some(old.key_type.clone()),
                    environment: Some(old.environment),
                    user_id: old.user_id.clone(),
                    expires_in_days: None,
                    metadata: old.metadata.clone(),
                },
            )
            .await?;

        if revoke_old {
            self.revoke(tenant_id, app_id, key_id).await?;
        }

        self.audit.emit(
            AuditEvent::new(AuditAction::Update, "app_key", "apikey")
                .with_tenant(tenant_id)
                .with_app(app_id)
                .with_resource(key_id)
                .with_metadata(
                    "rotated_to",
                    serde_json::json!(replacement.record.key_id),
                ),
        );

        Ok(replacement)
    }

    /// Scoped, idempotent revocation.
    pub async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        key_id: &str,
    ) -> Result<AppKey, ApiError> {
        let record = self
            .keys
            .revoke(tenant_id, app_id, key_id, Utc::now())
            .await?;

        self.audit.emit(
            AuditEvent::new(AuditAction::Update, "app_key", "apikey")
                .with_tenant(tenant_id)
                .with_app(app_id)
                .with_resource(key_id)
                .with_metadata("revoked", serde_json::json!(true)),
        );
        info!(tenant_id, app_id, key_id, "App key revoked");

        Ok(record)
    }

    /// Single-key admin read, scoped.
    pub async fn get(
        &self,
        tenant_id: &str,
        app_id: &str,
        key_id: &str,
    ) -> Result<AppKey, ApiError> {
        self.keys
            .find(tenant_id, app_id, key_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("app_key:{}", key_id),
            })
    }

    /// Admin list, scoped.
    pub async fn list(&self, tenant_id: &str, app_id: &str) -> Result<Vec<AppKey>, ApiError> {
        Ok(self.keys.list(tenant_id, app_id).await?)
    }

    /// Hard delete, scoped.
    pub async fn delete(
        &self,
        tenant_id: &str,
        app_id: &str,
        key_id: &str,
    ) -> Result<(), ApiError> {
        self.keys.delete(tenant_id, app_id, key_id).await?;

        self.audit.emit(
            AuditEvent::new(AuditAction::Delete, "app_key", "apikey")
                .with_tenant(tenant_id)
                .with_app(app_id)
                .with_resource(key_id),
        );

        Ok(())
    }
}

fn expiry_from_days(
    now: chrono::DateTime<Utc>,
    days: u32,
) -> Option<chrono::DateTime<Utc>> {
    if days == 0 {
        None
    } else {
        Some(now + Duration::days(days as i64))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Application, ApplicationConfig, ApplicationStatus};
    use crate::repository::memory::{
        InMemoryApplicationStore, InMemoryAppKeyStore, InMemoryAuditLogStore,
        InMemoryTenantStore,
    };
    use shared::config::CredentialConfig;

    async fn service() -> (Arc<InMemoryAppKeyStore>, ApiKeyService) {
        let keys = Arc::new(InMemoryAppKeyStore::new());
        let apps = Arc::new(InMemoryApplicationStore::new());
        let tenants = Arc::new(InMemoryTenantStore::new());
        let (audit, _drain) = AuditEmitter::new(Arc::new(InMemoryAuditLogStore::new()), 64);

        let now = Utc::now();
        apps.create(Application {
            id: "a1".to_string(),
            tenant_id: "t1".to_string(),
            name: "App One".to_string(),
            app_type: "service".to_string(),
            status: ApplicationStatus::Active,
            config: ApplicationConfig::default(),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

        let resolver = Arc::new(EffectiveConfigResolver::new(
            tenants,
            apps.clone(),
            CredentialConfig::default(),
            audit.clone(),
        ));

        (keys.clone(), ApiKeyService::new(keys, apps, resolver, audit))
    }

    fn request(name: &str) -> NewAppKeyRequest {
        NewAppKeyRequest {
            name: name.to_string(),
            scopes: vec!["read".to_string()],
            key_type: None,
            environment: None,
            user_id: None,
            expires_in_days: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_generate_then_authenticate() {
        let (_keys, service) = service().await;
        let created = service.generate("t1", "a1", request("ci")).await.unwrap();

        // The composite string embeds the app and key ids
        assert!(created.key_string.starts_with("a1_"));
        assert!(created.key_string.contains('.'));

        let auth = service
            .authenticate(&created.key_string, Some("t1"), Some("a1"))
            .await
            .unwrap();
        assert_eq!(auth.key_id, created.record.key_id);
        assert_eq!(auth.scopes, vec!["read".to_string()]);
        assert_eq!(auth.claims["tenant_id"], serde_json::json!("t1"));
    }

    #[tokio::test]
    async fn test_record_never_contains_plaintext() {
        let (_keys, service) = service().await;
        let created = service.generate("t1", "a1", request("ci")).await.unwrap();

        let secret = created.key_string.rsplit_once('.').unwrap().1;
        assert_ne!(created.record.secret_hash, secret);
        // The stored hash is the SHA3-256 of the secret, nothing else
        assert_eq!(
            created.record.secret_hash,
            crypto::sha3_256_hex(secret.as_bytes())
        );
    }

    #[tokio::test]
    async fn test_parse_recovers_original_parts() {
        let (_keys, service) = service().await;
        let created = service.generate("t1", "a1", request("ci")).await.unwrap();

        let parsed = ApiKeyService::parse_key_string(&created.key_string).unwrap();
        assert_eq!(parsed.app_id, "a1");
        assert_eq!(parsed.key_id, created.record.key_id);
        assert_eq!(
            crypto::sha3_256_hex(parsed.secret.as_bytes()),
            created.record.secret_hash
        );
    }

    #[test]
    fn test_parse_handles_underscored_app_ids() {
        let parsed =
            ApiKeyService::parse_key_string("my_app_v2_abc123def456.secret-material").unwrap();
        assert_eq!(parsed.app_id, "my_app_v2");
        assert_eq!(parsed.key_id, "abc123def456");
        assert_eq!(parsed.secret, "secret-material");
    }

    #[test]
    fn test_parse_rejects_malformed_strings() {
        assert!(ApiKeyService::parse_key_string("").is_err());
        assert!(ApiKeyService::parse_key_string("no-dot-here").is_err());
        assert!(ApiKeyService::parse_key_string("nounderscore.secret").is_err());
        assert!(ApiKeyService::parse_key_string("_abc.secret").is_err());
        assert!(ApiKeyService::parse_key_string("app_.secret").is_err());
        assert!(ApiKeyService::parse_key_string("app_abc.").is_err());
    }

    #[tokio::test]
    async fn test_any_other_string_fails_verification() {
        let (_keys, service) = service().await;
        let created = service.generate("t1", "a1", request("ci")).await.unwrap();

        // Tampered secret
        let mut tampered = created.key_string.clone();
        tampered.push('x');
        assert!(matches!(
            service.authenticate(&tampered, None, None).await,
            Err(ApiError::InvalidCredentials)
        ));

        // Garbage
        assert!(matches!(
            service.authenticate("garbage", None, None).await,
            Err(ApiError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_tenant_scope_mismatch_is_generic_failure() {
        let (_keys, service) = service().await;
        let created = service.generate("t1", "a1", request("ci")).await.unwrap();

        let result = service
            .authenticate(&created.key_string, Some("t2"), None)
            .await;
        assert!(matches!(result, Err(ApiError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_revoked_key_fails_authentication() {
        let (_keys, service) = service().await;
        let created = service.generate("t1", "a1", request("ci")).await.unwrap();

        service
            .revoke("t1", "a1", &created.record.key_id)
            .await
            .unwrap();

        let result = service.authenticate(&created.key_string, None, None).await;
        assert!(matches!(result, Err(ApiError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_rotation_inherits_and_revokes_old() {
        let (_keys, service) = service().await;
        let created = service
            .generate(
                "t1",
                "a1",
                NewAppKeyRequest {
                    scopes: vec!["read".to_string(), "write".to_string()],
                    ..request("deploy")
                },
            )
            .await
            .unwrap();

        let rotated = service
            .rotate("t1", "a1", &created.record.key_id, true)
            .await
            .unwrap();

        assert_eq!(rotated.record.name, "deploy");
        assert_eq!(rotated.record.scopes, created.record.scopes);
        assert_ne!(rotated.record.key_id, created.record.key_id);

        // Old credential is dead, new one works
        assert!(service
            .authenticate(&created.key_string, None, None)
            .await
            .is_err());
        assert!(service
            .authenticate(&rotated.key_string, None, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_last_used_is_stamped_asynchronously() {
        let (keys, service) = service().await;
        let created = service.generate("t1", "a1", request("ci")).await.unwrap();

        service
            .authenticate(&created.key_string, None, None)
            .await
            .unwrap();

        // The stamp happens on a spawned task
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let stored = keys
            .find_by_key_id(&created.record.key_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_expiry_defaults_from_config() {
        let (_keys, service) = service().await;
        let created = service.generate("t1", "a1", request("ci")).await.unwrap();

        // Global default: 365 days
        let expires_at = created.record.expires_at.unwrap();
        let days = (expires_at - created.record.created_at).num_days();
        assert_eq!(days, 365);

        // Explicit never-expire is honored when allowed
        let never = service
            .generate(
                "t1",
                "a1",
                NewAppKeyRequest {
                    expires_in_days: Some(0),
                    ..request("forever")
                },
            )
            .await
            .unwrap();
        assert!(never.record.expires_at.is_none());
    }
}
