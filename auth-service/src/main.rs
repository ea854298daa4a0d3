//! # Gatehouse - Authentication & Authorization Platform Service
//!
//! The **auth-service** binary hosts the whole platform: credential
//! flows, the token manager, identity resolution, the authorization
//! evaluator, and the administrative configuration surface.
//!
//! ## Architecture Overview
//!
//! This service follows **Clean Architecture** principles with clear
//! separation between layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        HTTP Layer (api/)                        │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │   routes    │  │  handlers   │  │    DTOs (sanitized)     │  │
//! │  └──────┬──────┘  └──────┬──────┘  └────────────┬────────────┘  │
//! └─────────┼────────────────┼─────────────────────┼────────────────┘
//!           ▼                ▼                     ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Service Layer (service/)                     │
//! │  CredentialService · ApiKeyService · TokenManager               │
//! │  ContextBuilder · AuthorizationService · EffectiveConfigResolver│
//! │  AuditEmitter · Mailer                                          │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Repository Layer (repository/)                 │
//! │  Store contracts + in-memory backends + Redis registry backend  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Domain Layer (domain/)                       │
//! │  Entities · Lockout state machine · Audit taxonomy              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Features
//!
//! - **Password hashing**: Argon2id with OWASP-recommended parameters
//! - **Small tokens**: identifiers only; identity re-hydrated per request
//! - **Refresh rotation**: single-use refresh tokens; reuse is a
//!   detected security event
//! - **Account lockout**: explicit state machine with auto-unlock
//! - **Uniform failure envelopes**: no user enumeration via responses
//!
//! ## Configuration
//!
//! Environment variables are loaded via [`shared::config::AppConfig`].
//! Key settings:
//!
//! - `TOKEN_SECRET` - signing key (32+ chars, required)
//! - `REDIS_URL` - optional Redis-backed revocation registry
//! - `APP_BOOTSTRAP__*` - optional seed tenant/app/owner

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use shared::auth::jwt::JwtService;
use shared::auth::password::PasswordHasher;
use shared::config::{AppConfig, BootstrapConfig};
use shared::errors::ApiError;
use shared::redis_client::RedisClient;
use shared::tracing_config;

mod api;
mod domain;
mod repository;
mod service;

use api::routes;
use domain::{
    Application, ApplicationConfig, ApplicationStatus, Tenant, TenantConfig, TenantStatus, User,
    UserStatus,
};
use repository::memory::{
    InMemoryApplicationStore, InMemoryAppKeyStore, InMemoryAuditLogStore,
    InMemoryCredentialProviderStore, InMemoryPermissionStore, InMemoryPolicyStore,
    InMemoryRevocationRegistry, InMemoryRolePermissionStore, InMemoryRoleStore,
    InMemoryTenantStore, InMemoryUserAppAccessStore, InMemoryUserIdentityStore,
    InMemoryUserPermissionStore, InMemoryUserRoleStore, InMemoryUserStore,
};
use repository::redis_registry::RedisRevocationRegistry;
use repository::{ApplicationStore, RevocationRegistry, StoreError, TenantStore, UserStore};
use service::identity_service::{
    ClaimMapping, ContextBuilder, IdentityCache, IdentityProviders, StoreProfileProvider,
    StoreRoleProvider, StorePermissionProvider,
};
use service::token_service::ReusePolicy;
use service::{
    ApiKeyService, AuditEmitter, AuthorizationService, CombiningAlgorithm, CredentialService,
    EffectiveConfigResolver, Mailer, TokenManager, TracingMailer,
};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state injected into all request handlers.
///
/// Wrapped in [`actix_web::web::Data`] and available to handlers via the
/// extractor pattern. All services are `Arc`-shared across workers.
pub struct AppState {
    /// Password flows, reset, identity linking
    pub credentials: Arc<CredentialService>,
    /// API-key lifecycle
    pub apikeys: Arc<ApiKeyService>,
    /// Token manager (issue/verify/revoke/rotate)
    pub tokens: Arc<TokenManager>,
    /// Identity resolver + context builder
    pub identity: Arc<ContextBuilder>,
    /// Authorization evaluator
    pub authz: Arc<AuthorizationService>,
    /// Effective-configuration resolver
    pub resolver: Arc<EffectiveConfigResolver>,
    /// Service name for the health endpoint
    pub service_name: String,
}

/// The full set of in-memory store backends.
///
/// Kept together so the bootstrap seeding (and tests) can reach the
/// concrete stores behind the trait objects handed to services.
pub struct MemoryBackends {
    pub tenants: Arc<InMemoryTenantStore>,
    pub apps: Arc<InMemoryApplicationStore>,
    pub users: Arc<InMemoryUserStore>,
    pub user_app_access: Arc<InMemoryUserAppAccessStore>,
    pub identities: Arc<InMemoryUserIdentityStore>,
    pub keys: Arc<InMemoryAppKeyStore>,
    pub credential_providers: Arc<InMemoryCredentialProviderStore>,
    pub roles: Arc<InMemoryRoleStore>,
    pub permissions: Arc<InMemoryPermissionStore>,
    pub role_permissions: Arc<InMemoryRolePermissionStore>,
    pub user_roles: Arc<InMemoryUserRoleStore>,
    pub user_permissions: Arc<InMemoryUserPermissionStore>,
    pub policies: Arc<InMemoryPolicyStore>,
    pub audit_log: Arc<InMemoryAuditLogStore>,
}

impl MemoryBackends {
    pub fn new() -> Self {
        Self {
            tenants: Arc::new(InMemoryTenantStore::new()),
            apps: Arc::new(InMemoryApplicationStore::new()),
            users: Arc::new(InMemoryUserStore::new()),
            user_app_access: Arc::new(InMemoryUserAppAccessStore::new()),
            identities: Arc::new(InMemoryUserIdentityStore::new()),
            keys: Arc::new(InMemoryAppKeyStore::new()),
            credential_providers: Arc::new(InMemoryCredentialProviderStore::new()),
            roles: Arc::new(InMemoryRoleStore::new()),
            permissions: Arc::new(InMemoryPermissionStore::new()),
            role_permissions: Arc::new(InMemoryRolePermissionStore::new()),
            user_roles: Arc::new(InMemoryUserRoleStore::new()),
            user_permissions: Arc::new(InMemoryUserPermissionStore::new()),
            policies: Arc::new(InMemoryPolicyStore::new()),
            audit_log: Arc::new(InMemoryAuditLogStore::new()),
        }
    }
}

impl Default for MemoryBackends {
    fn default() -> Self {
        Self::new()
    }
}

/// Wires the service graph over the given backends.
///
/// Returns the state plus the audit drain task handle.
pub fn build_state(
    config: &AppConfig,
    backends: &MemoryBackends,
    registry: Arc<dyn RevocationRegistry>,
    mailer: Arc<dyn Mailer>,
) -> Result<(AppState, JoinHandle<()>), ApiError> {
    let (audit, audit_drain) =
        AuditEmitter::new(backends.audit_log.clone(), config.audit.queue_capacity);

    let resolver = Arc::new(EffectiveConfigResolver::new(
        backends.tenants.clone(),
        backends.apps.clone(),
        config.default_credentials.clone(),
        audit.clone(),
    ));

    let hasher = Arc::new(PasswordHasher::new(&config.security));
    let jwt = Arc::new(JwtService::new(config.token.clone())?);

    let reuse_policy = if config.token.revoke_family_on_reuse {
        ReusePolicy::RevokeFamily
    } else {
        ReusePolicy::RejectOnly
    };
    let tokens = Arc::new(TokenManager::new(
        jwt,
        registry,
        audit.clone(),
        reuse_policy,
    ));

    let credentials = Arc::new(CredentialService::new(
        backends.tenants.clone(),
        backends.apps.clone(),
        backends.users.clone(),
        backends.identities.clone(),
        backends.credential_providers.clone(),
        resolver.clone(),
        hasher,
        tokens.clone(),
        mailer,
        audit.clone(),
    ));

    let apikeys = Arc::new(ApiKeyService::new(
        backends.keys.clone(),
        backends.apps.clone(),
        resolver.clone(),
        audit.clone(),
    ));

    // Identity providers: roles/permissions tenant+app scoped, profile
    // tenant scoped; no group directory is wired by default
    let providers = IdentityProviders {
        roles: Some(Arc::new(StoreRoleProvider::new(
            backends.user_roles.clone(),
            backends.roles.clone(),
        ))),
        permissions: Some(Arc::new(StorePermissionProvider::new(
            backends.user_permissions.clone(),
            backends.user_roles.clone(),
            backends.role_permissions.clone(),
            backends.permissions.clone(),
        ))),
        groups: None,
        profile: Some(Arc::new(StoreProfileProvider::new(backends.users.clone()))),
    };
    let cache = config
        .identity_cache
        .enabled
        .then(|| IdentityCache::new(Duration::from_secs(config.identity_cache.ttl_secs)));
    let identity = Arc::new(ContextBuilder::new(
        providers,
        cache,
        ClaimMapping::default(),
    ));

    let authz = Arc::new(AuthorizationService::new(
        backends.policies.clone(),
        backends.user_app_access.clone(),
        CombiningAlgorithm::default(),
        audit,
    ));

    Ok((
        AppState {
            credentials,
            apikeys,
            tokens,
            identity,
            authz,
            resolver,
            service_name: config.service_name.clone(),
        },
        audit_drain,
    ))
}

// =============================================================================
// Bootstrap Seeding
// =============================================================================

/// Seeds the configured tenant, app and owner account on first start.
///
/// Idempotent: conflicts (already seeded) are logged and ignored.
async fn seed_bootstrap(
    backends: &MemoryBackends,
    bootstrap: &BootstrapConfig,
    hasher: &PasswordHasher,
) -> Result<(), ApiError> {
    let now = Utc::now();
    let owner_id = Uuid::new_v4().to_string();

    let tenant = backends
        .tenants
        .create(Tenant {
            id: bootstrap.tenant_id.clone(),
            name: bootstrap.tenant_name.clone(),
            owner_id: owner_id.clone(),
            status: TenantStatus::Active,
            config: TenantConfig::default(),
            settings: HashMap::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
        .await;
    match tenant {
        Ok(_) => {}
        Err(StoreError::Conflict(_)) => {
            info!(tenant_id = %bootstrap.tenant_id, "Bootstrap tenant already present");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    backends
        .apps
        .create(Application {
            id: bootstrap.app_id.clone(),
            tenant_id: bootstrap.tenant_id.clone(),
            name: bootstrap.app_name.clone(),
            app_type: "web".to_string(),
            status: ApplicationStatus::Active,
            config: ApplicationConfig::default(),
            created_at: now,
            updated_at: now,
        })
        .await?;

    backends
        .users
        .create(User {
            id: owner_id,
            tenant_id: bootstrap.tenant_id.clone(),
            username: bootstrap.owner_username.clone(),
            email: bootstrap.owner_email.clone(),
            full_name: bootstrap.owner_username.clone(),
            is_tenant_owner: true,
            password_hash: Some(hasher.hash(&bootstrap.owner_password)?),
            status: UserStatus::Active,
            failed_login_attempts: 0,
            last_failed_login_at: None,
            locked_at: None,
            locked_until: None,
            lockout_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
        .await?;

    info!(
        tenant_id = %bootstrap.tenant_id,
        app_id = %bootstrap.app_id,
        "Bootstrap tenant, app and owner seeded"
    );
    Ok(())
}

// =============================================================================
// Entry Point
// =============================================================================

/// Application entry point and server initialization.
///
/// # Initialization Sequence
///
/// 1. Load configuration from environment variables
/// 2. Initialize structured logging/tracing
/// 3. Choose the revocation-registry backend (Redis when configured)
/// 4. Wire the service graph over in-memory stores
/// 5. Seed bootstrap data when configured
/// 6. Spawn the registry purge loop
/// 7. Configure and start the HTTP server
///
/// # Error Handling
///
/// Critical initialization errors use `expect()` so the service fails
/// fast instead of limping.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // ─────────────────────────────────────────────────────────────────────
    // Step 1: Configuration
    // ─────────────────────────────────────────────────────────────────────
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // ─────────────────────────────────────────────────────────────────────
    // Step 2: Structured logging
    // ─────────────────────────────────────────────────────────────────────
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = %config.server.port,
        "Starting gatehouse auth-service"
    );

    // ─────────────────────────────────────────────────────────────────────
    // Step 3: Revocation-registry backend
    // ─────────────────────────────────────────────────────────────────────
    // Redis when configured (multi-instance deployments), in-memory
    // otherwise. Same contract either way.
    let registry: Arc<dyn RevocationRegistry> = match &config.redis {
        Some(redis_config) => {
            let client = RedisClient::new(redis_config)
                .await
                .expect("Failed to connect to Redis");
            info!("Using Redis-backed revocation registry");
            Arc::new(RedisRevocationRegistry::new(client))
        }
        None => {
            info!("Using in-memory revocation registry");
            Arc::new(InMemoryRevocationRegistry::new())
        }
    };

    // ─────────────────────────────────────────────────────────────────────
    // Step 4: Service graph
    // ─────────────────────────────────────────────────────────────────────
    let backends = MemoryBackends::new();
    let mailer: Arc<dyn Mailer> = Arc::new(TracingMailer);
    let (state, _audit_drain) =
        build_state(&config, &backends, registry, mailer).expect("Failed to build services");

    // ─────────────────────────────────────────────────────────────────────
    // Step 5: Bootstrap seed data
    // ─────────────────────────────────────────────────────────────────────
    if let Some(ref bootstrap) = config.bootstrap {
        let hasher = PasswordHasher::new(&config.security);
        seed_bootstrap(&backends, bootstrap, &hasher)
            .await
            .expect("Failed to seed bootstrap data");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Step 6: Periodic registry purge
    // ─────────────────────────────────────────────────────────────────────
    // Expired entries guard tokens that are already invalid by expiry;
    // purging just bounds memory.
    let purge_tokens = state.tokens.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        ticker.tick().await; // first tick is immediate
        loop {
            ticker.tick().await;
            if let Err(e) = purge_tokens.purge_expired_revocations().await {
                warn!(error = %e, "Revocation purge pass failed");
            }
        }
    });

    let app_state = web::Data::new(state);

    // ─────────────────────────────────────────────────────────────────────
    // Step 7: HTTP server
    // ─────────────────────────────────────────────────────────────────────
    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    let workers = config.server.workers;

    info!("Server listening on {}:{}", server_host, server_port);

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            // Middleware stack (first added = last executed)
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            // Shared state
            .app_data(app_state.clone())
            // Routes
            .configure(routes::configure)
    });

    if workers > 0 {
        server = server.workers(workers);
    }

    server.bind((server_host, server_port))?.run().await
}
