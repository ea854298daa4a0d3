//! # Effective-Configuration Resolver
//!
//! Produces the credential configuration that governs a request, and
//! applies administrative updates with merge semantics.
//!
//! ## Resolution Chain
//!
//! ```text
//! resolve(tenant_id, app_id)
//!        │
//!        ▼
//! ┌─────────────────────────────┐  set  ┌──────────┐
//! │ app.config.credentials      │──────▶│ use this │
//! └──────────────┬──────────────┘       └──────────┘
//!                │ unset / no app
//!                ▼
//! ┌─────────────────────────────┐  set  ┌──────────┐
//! │ tenant.config.              │──────▶│ use this │
//! │     default_credentials     │       └──────────┘
//! └──────────────┬──────────────┘
//!                │ unset
//!                ▼
//! ┌─────────────────────────────┐
//! │ process-wide default        │
//! └─────────────────────────────┘
//! ```
//!
//! The first non-null hit wins wholesale - sub-configs are not merged
//! across levels. Per-level *updates* merge per the
//! [`CredentialConfigUpdate`] rule: a provided sub-config replaces that
//! sub-config, a bare flag flips only the flag.

use std::sync::Arc;

use shared::config::{CredentialConfig, CredentialConfigUpdate};
use shared::errors::ApiError;

use crate::domain::{AuditAction, AuditEvent};
use crate::repository::{ApplicationStore, TenantStore};
use crate::service::audit_service::AuditEmitter;

/// Resolves and administers credential configuration along the
/// app → tenant → global chain.
pub struct EffectiveConfigResolver {
    tenants: Arc<dyn TenantStore>,
    apps: Arc<dyn ApplicationStore>,
    global_default: CredentialConfig,
    audit: AuditEmitter,
}

impl EffectiveConfigResolver {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        apps: Arc<dyn ApplicationStore>,
        global_default: CredentialConfig,
        audit: AuditEmitter,
    ) -> Self {
        Self {
            tenants,
            apps,
            global_default,
            audit,
        }
    }

    /// Returns the first non-null configuration along the chain.
    ///
    /// A missing app or tenant simply falls through to the next level;
    /// whether the scope *exists* is the caller's precondition (login
    /// checks tenant/app status separately, admin reads 404 on their
    /// own lookups).
    pub async fn resolve(
        &self,
        tenant_id: &str,
        app_id: Option<&str>,
    ) -> Result<CredentialConfig, ApiError> {
        if let Some(app_id) = app_id {
            if let Some(app) = self.apps.find(tenant_id, app_id).await? {
                if let Some(credentials) = app.config.credentials {
                    return Ok(credentials);
                }
            }
        }

        if let Some(tenant) = self.tenants.find(tenant_id).await? {
            if let Some(credentials) = tenant.config.default_credentials {
                return Ok(credentials);
            }
        }

        Ok(self.global_default.clone())
    }

    /// Admin read of the tenant-scope effective configuration.
    ///
    /// Unlike [`resolve`](Self::resolve), a missing tenant is a 404 -
    /// this serves the administrative GET endpoint.
    pub async fn tenant_credentials(&self, tenant_id: &str) -> Result<CredentialConfig, ApiError> {
        self.tenants
            .find(tenant_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("tenant:{}", tenant_id),
            })?;
        self.resolve(tenant_id, None).await
    }

    /// Admin read of the app-scope effective configuration; 404 when the
    /// app does not exist.
    pub async fn app_credentials(
        &self,
        tenant_id: &str,
        app_id: &str,
    ) -> Result<CredentialConfig, ApiError> {
        self.apps
            .find(tenant_id, app_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("app:{}", app_id),
            })?;
        self.resolve(tenant_id, Some(app_id)).await
    }

    /// Applies a merge update to the tenant-level default configuration.
    ///
    /// A tenant with no default yet starts from the process-wide
    /// default, so a bare flag flip lands on well-defined values.
    pub async fn update_tenant_credentials(
        &self,
        tenant_id: &str,
        update: &CredentialConfigUpdate,
    ) -> Result<CredentialConfig, ApiError> {
        let mut tenant = self
            .tenants
            .find(tenant_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("tenant:{}", tenant_id),
            })?;

        let mut config = tenant
            .config
            .default_credentials
            .take()
            .unwrap_or_else(|| self.global_default.clone());
        update.apply(&mut config);
        tenant.config.default_credentials = Some(config.clone());

        self.tenants.update(tenant).await?;

        self.audit.emit(
            AuditEvent::new(AuditAction::ConfigUpdate, "credential_config", "config")
                .with_tenant(tenant_id)
                .with_resource(format!("tenants/{}", tenant_id)),
        );

        Ok(config)
    }

    /// Applies a merge update to the app-level override.
    ///
    /// An app with no override yet starts from its *effective* config
    /// (tenant default or global), so flipping one flag does not
    /// silently reset the rest to global defaults.
    pub async fn update_app_credentials(
        &self,
        tenant_id: &str,
        app_id: &str,
        update: &CredentialConfigUpdate,
    ) -> Result<CredentialConfig, ApiError> {
        let mut app = self
            .apps
            .find(tenant_id, app_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("app:{}", app_id),
            })?;

        let mut config = match app.config.credentials.take() {
            Some(existing) => existing,
            None => self.resolve(tenant_id, None).await?,
        };
        update.apply(&mut config);
        app.config.credentials = Some(config.clone());

        self.apps.update(app).await?;

        self.audit.emit(
            AuditEvent::new(AuditAction::ConfigUpdate, "credential_config", "config")
                .with_tenant(tenant_id)
                .with_app(app_id)
                .with_resource(format!("tenants/{}/apps/{}", tenant_id, app_id)),
        );

        Ok(config)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Application, ApplicationConfig, ApplicationStatus, Tenant, TenantConfig, TenantStatus,
    };
    use crate::repository::memory::{
        InMemoryApplicationStore, InMemoryAuditLogStore, InMemoryTenantStore,
    };
    use chrono::Utc;
    use std::collections::HashMap;

    async fn setup() -> (
        Arc<InMemoryTenantStore>,
        Arc<InMemoryApplicationStore>,
        EffectiveConfigResolver,
    ) {
        let tenants = Arc::new(InMemoryTenantStore::new());
        let apps = Arc::new(InMemoryApplicationStore::new());
        let (audit, _drain) = AuditEmitter::new(Arc::new(InMemoryAuditLogStore::new()), 16);
        let resolver = EffectiveConfigResolver::new(
            tenants.clone(),
            apps.clone(),
            CredentialConfig::default(),
            audit,
        );
        (tenants, apps, resolver)
    }

    fn tenant(id: &str, default_credentials: Option<CredentialConfig>) -> Tenant {
        let now = Utc::now();
        Tenant {
            id: id.to_string(),
            name: id.to_string(),
            owner_id: "owner".to_string(),
            status: TenantStatus::Active,
            config: TenantConfig {
                default_credentials,
            },
            settings: HashMap::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn app(tenant_id: &str, id: &str, credentials: Option<CredentialConfig>) -> Application {
        let now = Utc::now();
        Application {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            name: id.to_string(),
            app_type: "web".to_string(),
            status: ApplicationStatus::Active,
            config: ApplicationConfig { credentials },
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_app_override_wins_over_tenant_default() {
        let (tenants, apps, resolver) = setup().await;

        let tenant_config = CredentialConfig {
            enable_oauth2: true,
            ..Default::default()
        };
        let app_config = CredentialConfig {
            enable_oauth2: false,
            ..Default::default()
        };

        tenants
            .create(tenant("t1", Some(tenant_config)))
            .await
            .unwrap();
        apps.create(app("t1", "a1", Some(app_config))).await.unwrap();

        // App scope: app override applies
        let effective = resolver.resolve("t1", Some("a1")).await.unwrap();
        assert!(!effective.enable_oauth2);

        // Tenant scope: tenant default applies
        let effective = resolver.resolve("t1", None).await.unwrap();
        assert!(effective.enable_oauth2);
    }

    #[tokio::test]
    async fn test_app_without_override_falls_to_tenant() {
        let (tenants, apps, resolver) = setup().await;

        let tenant_config = CredentialConfig {
            enable_passwordless: true,
            ..Default::default()
        };
        tenants
            .create(tenant("t1", Some(tenant_config)))
            .await
            .unwrap();
        apps.create(app("t1", "a1", None)).await.unwrap();

        let effective = resolver.resolve("t1", Some("a1")).await.unwrap();
        assert!(effective.enable_passwordless);
    }

    #[tokio::test]
    async fn test_unknown_scope_falls_to_global_default() {
        let (_tenants, _apps, resolver) = setup().await;

        let effective = resolver.resolve("missing", Some("nowhere")).await.unwrap();
        assert_eq!(effective, CredentialConfig::default());
    }

    #[tokio::test]
    async fn test_tenant_update_merges_onto_global_default() {
        let (tenants, _apps, resolver) = setup().await;
        tenants.create(tenant("t1", None)).await.unwrap();

        let update = CredentialConfigUpdate {
            enable_oauth2: Some(true),
            ..Default::default()
        };
        let updated = resolver
            .update_tenant_credentials("t1", &update)
            .await
            .unwrap();

        assert!(updated.enable_oauth2);
        // The rest stayed at global defaults
        assert!(updated.enable_basic);
        assert_eq!(updated.basic.max_login_attempts, 5);

        // And it persisted
        let effective = resolver.resolve("t1", None).await.unwrap();
        assert!(effective.enable_oauth2);
    }

    #[tokio::test]
    async fn test_app_update_starts_from_effective_config() {
        let (tenants, apps, resolver) = setup().await;

        let tenant_config = CredentialConfig {
            enable_oauth2: true,
            ..Default::default()
        };
        tenants
            .create(tenant("t1", Some(tenant_config)))
            .await
            .unwrap();
        apps.create(app("t1", "a1", None)).await.unwrap();

        // Flip one flag at the app level
        let update = CredentialConfigUpdate {
            enable_apikey: Some(false),
            ..Default::default()
        };
        let updated = resolver
            .update_app_credentials("t1", "a1", &update)
            .await
            .unwrap();

        // The flag flipped, and the tenant's oauth2 setting carried over
        assert!(!updated.enable_apikey);
        assert!(updated.enable_oauth2);
    }

    #[tokio::test]
    async fn test_update_unknown_tenant_is_404() {
        let (_tenants, _apps, resolver) = setup().await;

        let result = resolver
            .update_tenant_credentials("missing", &CredentialConfigUpdate::default())
            .await;
        assert!(matches!(result, Err(ApiError::NotFound { .. })));
    }
}
