//! # Credential Subsystem - Password Flows & Identity Linking
//!
//! Password login with the account-lockout state machine, password
//! change, password reset via one-shot token, and the post-verification
//! external-identity linking step.
//!
//! ## The Generic Failure Discipline
//!
//! Every login-path failure - unknown tenant, disabled app, unknown
//! user, wrong password, locked or suspended account - returns the
//! *same* [`ApiError::InvalidCredentials`]. The classification lives
//! only in the audit trail. Tests enforce that the HTTP envelope for
//! these cases is byte-identical.
//!
//! ## Login Pipeline
//!
//! ```text
//! tenant active ─▶ app active ─▶ basic enabled ─▶ user lookup
//!      │               │              │               │ miss: audit + generic
//!      ▼               ▼              ▼               ▼
//!  lock check ─▶ auto-unlock if due ─▶ password_verify
//!      │                                   │
//!      │ locked: generic                   │ fail: atomic counter/lock
//!      ▼                                   ▼ transition + audit
//!  issue pair ◀─ reset counters ◀── success
//! ```
//!
//! The failure counter and lock transitions run inside
//! [`UserStore::record_login_failure`], the user row's atomic update.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use shared::auth::jwt::TokenPair;
use shared::auth::password::{PasswordHasher, PasswordPolicy};
use shared::errors::ApiError;

use crate::domain::lockout::{LockState, LockoutPolicy, LockoutTransition};
use crate::domain::{
    AuditAction, AuditEvent, ResourceStatus, User, UserIdentity, UserProfile, UserStatus,
};
use crate::repository::{
    ApplicationStore, CredentialProviderStore, TenantStore, UserIdentityStore, UserStore,
};
use crate::service::audit_service::AuditEmitter;
use crate::service::config_resolver::EffectiveConfigResolver;
use crate::service::mailer::{EmailMessage, Mailer};
use crate::service::token_service::{ClaimSpec, TokenManager};

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// Client metadata captured for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Successful login: the token pair plus the sanitized user view.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub tokens: TokenPair,
    pub user: UserProfile,
}

/// Profile hints for first-login user provisioning from an external
/// identity.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub provider: String,
    pub provider_external_id: String,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub verified: bool,
}

// =============================================================================
// Service
// =============================================================================

/// Credential subsystem service.
pub struct CredentialService {
    tenants: Arc<dyn TenantStore>,
    apps: Arc<dyn ApplicationStore>,
    users: Arc<dyn UserStore>,
    identities: Arc<dyn UserIdentityStore>,
    providers: Arc<dyn CredentialProviderStore>,
    resolver: Arc<EffectiveConfigResolver>,
    hasher: Arc<PasswordHasher>,
    tokens: Arc<TokenManager>,
    mailer: Arc<dyn Mailer>,
    audit: AuditEmitter,
}

impl CredentialService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        apps: Arc<dyn ApplicationStore>,
        users: Arc<dyn UserStore>,
        identities: Arc<dyn UserIdentityStore>,
        providers: Arc<dyn CredentialProviderStore>,
        resolver: Arc<EffectiveConfigResolver>,
        hasher: Arc<PasswordHasher>,
        tokens: Arc<TokenManager>,
        mailer: Arc<dyn Mailer>,
        audit: AuditEmitter,
    ) -> Self {
        Self {
            tenants,
            apps,
            users,
            identities,
            providers,
            resolver,
            hasher,
            tokens,
            mailer,
            audit,
        }
    }

    // =========================================================================
    // Password Login
    // =========================================================================

    /// Authenticates a user with username and password.
    ///
    /// Every failure mode returns the same generic error; only the audit
    /// trail records why.
    pub async fn login(
        &self,
        tenant_id: &str,
        app_id: &str,
        username: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<LoginSuccess, ApiError> {
        let now = Utc::now();

        // Preconditions: tenant active, app active, basic auth enabled
        let tenant_ok = self
            .tenants
            .find(tenant_id)
            .await?
            .map_or(false, |t| t.is_active());
        if !tenant_ok {
            return Err(self.login_rejected(tenant_id, app_id, None, client, "tenant inactive"));
        }

        let app_ok = self
            .apps
            .find(tenant_id, app_id)
            .await?
            .map_or(false, |a| a.is_active());
        if !app_ok {
            return Err(self.login_rejected(tenant_id, app_id, None, client, "app inactive"));
        }

        let config = self.resolver.resolve(tenant_id, Some(app_id)).await?;
        if !config.enable_basic {
            return Err(self.login_rejected(
                tenant_id,
                app_id,
                None,
                client,
                "basic auth disabled",
            ));
        }

        // Do not disclose whether the user exists
        let mut user = match self.users.find_by_username(tenant_id, username).await? {
            Some(user) => user,
            None => {
                return Err(self.login_rejected(tenant_id, app_id, None, client, "unknown user"))
            }
        };

        if !matches!(user.status, UserStatus::Active | UserStatus::Locked) {
            return Err(self.login_rejected(
                tenant_id,
                app_id,
                Some(&user.id),
                client,
                "account not active",
            ));
        }

        // Lockout view, with the read-time auto-unlock transition
        match user.lock_state(now) {
            LockState::Temporary { .. } | LockState::Permanent => {
                return Err(self.login_rejected(
                    tenant_id,
                    app_id,
                    Some(&user.id),
                    client,
                    "account locked",
                ));
            }
            LockState::DueAutoUnlock => {
                user = self.users.auto_unlock_if_due(tenant_id, &user.id, now).await?;
                self.audit.emit(
                    AuditEvent::new(AuditAction::AccountUnlock, "user", "credential")
                        .with_tenant(tenant_id)
                        .with_app(app_id)
                        .with_user(user.id.clone()),
                );
                info!(tenant_id, user_id = %user.id, "Account auto-unlocked");
            }
            LockState::Unlocked => {}
        }

        let Some(ref password_hash) = user.password_hash else {
            return Err(self.login_rejected(
                tenant_id,
                app_id,
                Some(&user.id),
                client,
                "no password credential",
            ));
        };

        if !self.hasher.verify(password, password_hash)? {
            let policy = LockoutPolicy::from(&config.basic);
            return Err(self
                .record_failed_password(tenant_id, app_id, &user, &policy, client)
                .await?);
        }

        // Success: clear counters atomically, then mint the pair
        let user = self.users.record_login_success(tenant_id, &user.id, now).await?;
        let tokens = self.tokens.issue_pair(&Self::login_claims(&user, app_id))?;

        self.audit.emit(
            AuditEvent::new(AuditAction::Login, "user", "credential")
                .with_tenant(tenant_id)
                .with_app(app_id)
                .with_user(user.id.clone())
                .with_client(client.ip.clone(), client.user_agent.clone()),
        );
        info!(tenant_id, app_id, user_id = %user.id, "User logged in");

        Ok(LoginSuccess {
            tokens,
            user: user.into(),
        })
    }

    fn login_claims(user: &User, app_id: &str) -> ClaimSpec {
        let mut extra = HashMap::new();
        extra.insert("email".to_string(), serde_json::json!(user.email));
        extra.insert("username".to_string(), serde_json::json!(user.username));
        ClaimSpec {
            sub: user.id.clone(),
            tenant_id: user.tenant_id.clone(),
            app_id: Some(app_id.to_string()),
            extra,
        }
    }

    /// Applies the atomic failure transition, emits the audit trail, and
    /// returns the generic error.
    async fn record_failed_password(
        &self,
        tenant_id: &str,
        app_id: &str,
        user: &User,
        policy: &LockoutPolicy,
        client: &ClientInfo,
    ) -> Result<ApiError, ApiError> {
        let now = Utc::now();
        let (_, transition) = self
            .users
            .record_login_failure(tenant_id, &user.id, policy, now)
            .await?;

        self.audit.emit(
            AuditEvent::new(AuditAction::LoginFailed, "user", "credential")
                .with_tenant(tenant_id)
                .with_app(app_id)
                .with_user(user.id.clone())
                .with_client(client.ip.clone(), client.user_agent.clone())
                .failure("invalid credentials"),
        );

        match transition {
            LockoutTransition::Counted { attempts } => {
                warn!(tenant_id, user_id = %user.id, attempts, "Failed login attempt");
            }
            LockoutTransition::LockedTemporary { until } => {
                self.audit.emit(
                    AuditEvent::new(AuditAction::AccountLock, "user", "credential")
                        .with_tenant(tenant_id)
                        .with_app(app_id)
                        .with_user(user.id.clone())
                        .with_metadata("locked_until", serde_json::json!(until.to_rfc3339())),
                );
                warn!(tenant_id, user_id = %user.id, %until, "Account locked");
            }
            LockoutTransition::LockedPermanent => {
                self.audit.emit(
                    AuditEvent::new(AuditAction::AccountLock, "user", "credential")
                        .with_tenant(tenant_id)
                        .with_app(app_id)
                        .with_user(user.id.clone())
                        .with_metadata("permanent", serde_json::json!(true)),
                );
                warn!(tenant_id, user_id = %user.id, "Account permanently locked");
            }
        }

        Ok(ApiError::InvalidCredentials)
    }

    /// Emits a `login_failed` audit event and returns the generic error.
    fn login_rejected(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: Option<&str>,
        client: &ClientInfo,
        mode: &str,
    ) -> ApiError {
        let mut event = AuditEvent::new(AuditAction::LoginFailed, "user", "credential")
            .with_tenant(tenant_id)
            .with_app(app_id)
            .with_client(client.ip.clone(), client.user_agent.clone())
            .failure(mode);
        if let Some(user_id) = user_id {
            event = event.with_user(user_id);
        }
        self.audit.emit(event);
        ApiError::InvalidCredentials
    }

    // =========================================================================
    // Password Change
    // =========================================================================

    /// Replaces a user's password after verifying the old one.
    ///
    /// The old-password gate fails generically; the new-password policy
    /// check is allowed to be specific (the input came from the caller).
    pub async fn change_password(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let user = self
            .users
            .find(tenant_id, user_id)
            .await?
            .filter(|u| u.is_active())
            .ok_or(ApiError::InvalidCredentials)?;

        let Some(ref stored) = user.password_hash else {
            return Err(ApiError::InvalidCredentials);
        };
        if !self.hasher.verify(old_password, stored)? {
            self.audit.emit(
                AuditEvent::new(AuditAction::PasswordChange, "user", "credential")
                    .with_tenant(tenant_id)
                    .with_app(app_id)
                    .with_user(user_id)
                    .failure("old password mismatch"),
            );
            return Err(ApiError::InvalidCredentials);
        }

        let config = self.resolver.resolve(tenant_id, Some(app_id)).await?;
        if let Err(problems) = PasswordPolicy::validate(new_password, &config.basic) {
            return Err(ApiError::BadRequest {
                message: problems.join("; "),
            });
        }

        let new_hash = self.hasher.hash(new_password)?;
        self.users
            .update_password_hash(tenant_id, user_id, &new_hash, Utc::now())
            .await?;

        self.audit.emit(
            AuditEvent::new(AuditAction::PasswordChange, "user", "credential")
                .with_tenant(tenant_id)
                .with_app(app_id)
                .with_user(user_id),
        );
        info!(tenant_id, user_id, "Password changed");

        Ok(())
    }

    // =========================================================================
    // Password Reset
    // =========================================================================

    /// Initiates a password reset.
    ///
    /// Always succeeds with the same envelope whether or not the email
    /// exists; when it does, a one-shot reset token goes out through the
    /// mail collaborator. The token never appears in the response.
    pub async fn forgot_password(
        &self,
        tenant_id: &str,
        app_id: &str,
        email: &str,
        client: &ClientInfo,
    ) -> Result<(), ApiError> {
        let user = match self.users.find_by_email(tenant_id, email).await? {
            Some(user) if user.is_active() => user,
            _ => {
                // Same outcome as the found case, minus the email
                info!(tenant_id, "Password reset requested for unknown or inactive email");
                return Ok(());
            }
        };

        let reset = self.tokens.generate_password_reset(&ClaimSpec {
            sub: user.id.clone(),
            tenant_id: tenant_id.to_string(),
            app_id: Some(app_id.to_string()),
            extra: HashMap::new(),
        })?;

        self.mailer
            .send(EmailMessage {
                to: user.email.clone(),
                subject: "Password reset".to_string(),
                body: format!(
                    "A password reset was requested for your account. \
                     Use this token within 15 minutes to choose a new password:\n\n{}",
                    reset.value
                ),
            })
            .await?;

        self.audit.emit(
            AuditEvent::new(AuditAction::PasswordReset, "user", "credential")
                .with_tenant(tenant_id)
                .with_app(app_id)
                .with_user(user.id.clone())
                .with_client(client.ip.clone(), client.user_agent.clone())
                .with_metadata("phase", serde_json::json!("requested")),
        );
        info!(tenant_id, user_id = %user.id, "Password reset token issued");

        Ok(())
    }

    /// Completes a password reset with a one-shot token.
    pub async fn reset_password(
        &self,
        tenant_id: &str,
        reset_token: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        // Type, tenant match, signature, expiry, one-shot state
        let claims = self
            .tokens
            .verify_password_reset(reset_token, tenant_id)
            .await?;

        let config = self
            .resolver
            .resolve(tenant_id, claims.app_id.as_deref())
            .await?;
        if let Err(problems) = PasswordPolicy::validate(new_password, &config.basic) {
            return Err(ApiError::BadRequest {
                message: problems.join("; "),
            });
        }

        // An unknown subject reads as an invalid token, not a 404
        let user = self
            .users
            .find(tenant_id, &claims.sub)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        let new_hash = self.hasher.hash(new_password)?;
        self.users
            .update_password_hash(tenant_id, &user.id, &new_hash, Utc::now())
            .await?;

        // Best-effort one-shot consumption: the password already changed,
        // so a failed revoke is an operational warning, not a user error
        if let Err(e) = self.tokens.revoke(reset_token).await {
            warn!(error = %e, tenant_id, user_id = %user.id, "Failed to revoke used reset token");
        }

        self.audit.emit(
            AuditEvent::new(AuditAction::PasswordReset, "user", "credential")
                .with_tenant(tenant_id)
                .with_user(user.id.clone())
                .with_metadata("phase", serde_json::json!("completed")),
        );
        info!(tenant_id, user_id = %user.id, "Password reset completed");

        Ok(())
    }

    // =========================================================================
    // External Identity Linking
    // =========================================================================

    /// Links a verified external identity to an existing user.
    ///
    /// This is the post-verification step only - the provider dance
    /// happened elsewhere and asserted `identity.verified`.
    pub async fn link_identity(
        &self,
        tenant_id: &str,
        user_id: &str,
        identity: ExternalIdentity,
    ) -> Result<UserIdentity, ApiError> {
        self.users
            .find(tenant_id, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("user:{}", user_id),
            })?;

        let linked = self
            .identities
            .link(UserIdentity {
                id: Uuid::new_v4().to_string(),
                tenant_id: tenant_id.to_string(),
                user_id: user_id.to_string(),
                provider: identity.provider,
                provider_external_id: identity.provider_external_id,
                email: Some(identity.email),
                username: Some(identity.username),
                verified: identity.verified,
                metadata: HashMap::new(),
                created_at: Utc::now(),
            })
            .await?;

        self.audit.emit(
            AuditEvent::new(AuditAction::Create, "user_identity", "credential")
                .with_tenant(tenant_id)
                .with_user(user_id)
                .with_resource(linked.id.clone()),
        );

        Ok(linked)
    }

    /// Logs in through a verified external identity, provisioning the
    /// user on first login.
    pub async fn login_with_identity(
        &self,
        tenant_id: &str,
        app_id: &str,
        identity: ExternalIdentity,
        client: &ClientInfo,
    ) -> Result<LoginSuccess, ApiError> {
        let now = Utc::now();

        let tenant_ok = self
            .tenants
            .find(tenant_id)
            .await?
            .map_or(false, |t| t.is_active());
        let app_ok = self
            .apps
            .find(tenant_id, app_id)
            .await?
            .map_or(false, |a| a.is_active());
        if !tenant_ok || !app_ok {
            return Err(self.login_rejected(tenant_id, app_id, None, client, "scope inactive"));
        }

        // External logins need a configured provider for this scope
        // (app-level rows take precedence over tenant-level defaults)
        let provider_ok = self
            .providers
            .list_for_scope(tenant_id, Some(app_id))
            .await?
            .iter()
            .any(|p| {
                p.status == ResourceStatus::Active
                    && (p.name == identity.provider || p.provider_type == identity.provider)
            });
        if !provider_ok {
            return Err(self.login_rejected(
                tenant_id,
                app_id,
                None,
                client,
                "no credential provider for scope",
            ));
        }

        let user = match self
            .identities
            .find_by_provider(tenant_id, &identity.provider, &identity.provider_external_id)
            .await?
        {
            Some(link) => self
                .users
                .find(tenant_id, &link.user_id)
                .await?
                .ok_or(ApiError::InvalidCredentials)?,
            None => {
                // First external-identity login: provision and link
                let user = self
                    .users
                    .create(User {
                        id: Uuid::new_v4().to_string(),
                        tenant_id: tenant_id.to_string(),
                        username: identity.username.clone(),
                        email: identity.email.clone(),
                        full_name: identity.full_name.clone(),
                        is_tenant_owner: false,
                        password_hash: None,
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
                self.link_identity(tenant_id, &user.id, identity).await?;

                self.audit.emit(
                    AuditEvent::new(AuditAction::Register, "user", "credential")
                        .with_tenant(tenant_id)
                        .with_app(app_id)
                        .with_user(user.id.clone()),
                );
                user
            }
        };

        if !user.is_active() || user.lock_state(now) != LockState::Unlocked {
            return Err(self.login_rejected(
                tenant_id,
                app_id,
                Some(&user.id),
                client,
                "account not active",
            ));
        }

        let tokens = self.tokens.issue_pair(&Self::login_claims(&user, app_id))?;

        self.audit.emit(
            AuditEvent::new(AuditAction::Login, "user", "credential")
                .with_tenant(tenant_id)
                .with_app(app_id)
                .with_user(user.id.clone())
                .with_client(client.ip.clone(), client.user_agent.clone()),
        );

        Ok(LoginSuccess {
            tokens,
            user: user.into(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CredentialProvider;
    use crate::repository::memory::{
        InMemoryApplicationStore, InMemoryAuditLogStore, InMemoryCredentialProviderStore,
        InMemoryRevocationRegistry, InMemoryTenantStore, InMemoryUserIdentityStore,
        InMemoryUserStore,
    };
    use crate::service::mailer::MockMailer;
    use crate::service::token_service::ReusePolicy;
    use crate::domain::{
        Application, ApplicationConfig, ApplicationStatus, Tenant, TenantConfig, TenantStatus,
    };
    use shared::auth::jwt::JwtService;
    use shared::config::{CredentialConfig, SecurityConfig, TokenConfig};
    use std::sync::Mutex;

    /// Mailer that records every message for assertions.
    #[derive(Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait::async_trait]
    impl Mailer for CapturingMailer {
        async fn send(&self, message: EmailMessage) -> Result<(), ApiError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    struct Fixture {
        users: Arc<InMemoryUserStore>,
        tokens: Arc<TokenManager>,
        mailer: Arc<CapturingMailer>,
        service: CredentialService,
    }

    async fn fixture() -> Fixture {
        let tenants = Arc::new(InMemoryTenantStore::new());
        let apps = Arc::new(InMemoryApplicationStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        let identities = Arc::new(InMemoryUserIdentityStore::new());
        let providers = Arc::new(InMemoryCredentialProviderStore::new());
        let (audit, _drain) = AuditEmitter::new(Arc::new(InMemoryAuditLogStore::new()), 256);

        // A tenant-level OAuth2 provider so external-identity logins work
        providers
            .create(CredentialProvider {
                id: "prov-google".to_string(),
                tenant_id: "t1".to_string(),
                app_id: None,
                provider_type: "oauth2".to_string(),
                name: "google".to_string(),
                status: ResourceStatus::Active,
                config: serde_json::json!({}),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let now = Utc::now();
        tenants
            .create(Tenant {
                id: "t1".to_string(),
                name: "Tenant One".to_string(),
                owner_id: "owner".to_string(),
                status: TenantStatus::Active,
                config: TenantConfig::default(),
                settings: HashMap::new(),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            })
            .await
            .unwrap();
        apps.create(Application {
            id: "a1".to_string(),
            tenant_id: "t1".to_string(),
            name: "App One".to_string(),
            app_type: "web".to_string(),
            status: ApplicationStatus::Active,
            config: ApplicationConfig::default(),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

        let resolver = Arc::new(EffectiveConfigResolver::new(
            tenants.clone(),
            apps.clone(),
            CredentialConfig::default(),
            audit.clone(),
        ));
        let hasher = Arc::new(PasswordHasher::new(&SecurityConfig {
            argon2_memory_kib: 8,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        }));
        let jwt = Arc::new(
            JwtService::new(TokenConfig {
                secret: "test_secret_key_minimum_32_chars_required".to_string(),
                ..Default::default()
            })
            .unwrap(),
        );
        let tokens = Arc::new(TokenManager::new(
            jwt,
            Arc::new(InMemoryRevocationRegistry::new()),
            audit.clone(),
            ReusePolicy::default(),
        ));
        let mailer = Arc::new(CapturingMailer::default());

        let service = CredentialService::new(
            tenants,
            apps,
            users.clone(),
            identities,
            providers,
            resolver,
            hasher.clone(),
            tokens.clone(),
            mailer.clone(),
            audit,
        );

        let fixture = Fixture {
            users,
            tokens,
            mailer,
            service,
        };
        fixture.seed_user("alice", "P@ssw0rd!", &hasher).await;
        fixture
    }

    impl Fixture {
        async fn seed_user(&self, username: &str, password: &str, hasher: &PasswordHasher) {
            let now = Utc::now();
            self.users
                .create(User {
                    id: format!("user-{}", username),
                    tenant_id: "t1".to_string(),
                    username: username.to_string(),
                    email: format!("{}@t1.example", username),
                    full_name: username.to_string(),
                    is_tenant_owner: false,
                    password_hash: Some(hasher.hash(password).unwrap()),
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
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_login_success_returns_pair_and_profile() {
        let f = fixture().await;
        let client = ClientInfo::default();

        let success = f
            .service
            .login("t1", "a1", "alice", "P@ssw0rd!", &client)
            .await
            .unwrap();

        assert_eq!(success.user.username, "alice");
        assert!(f.tokens.verify(&success.tokens.access_token).await.valid);
        assert!(f.tokens.verify(&success.tokens.refresh_token).await.valid);

        // Claims carry identifiers only
        let claims = f
            .tokens
            .verify(&success.tokens.access_token)
            .await
            .claims
            .unwrap();
        assert_eq!(claims.sub, "user-alice");
        assert_eq!(claims.tenant_id, "t1");
        assert_eq!(claims.app_id.as_deref(), Some("a1"));
        assert_eq!(claims.extra_str("email"), Some("alice@t1.example"));
    }

    #[tokio::test]
    async fn test_unknown_user_and_wrong_password_fail_identically() {
        let f = fixture().await;
        let client = ClientInfo::default();

        let unknown = f
            .service
            .login("t1", "a1", "nobody", "P@ssw0rd!", &client)
            .await
            .unwrap_err();
        let wrong = f
            .service
            .login("t1", "a1", "alice", "WrongP@ss1", &client)
            .await
            .unwrap_err();

        assert!(matches!(unknown, ApiError::InvalidCredentials));
        assert!(matches!(wrong, ApiError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_lockout_after_max_attempts_then_auto_unlock() {
        let f = fixture().await;
        let client = ClientInfo::default();

        // Five wrong passwords lock the account
        for _ in 0..5 {
            let _ = f
                .service
                .login("t1", "a1", "alice", "WrongP@ss1", &client)
                .await;
        }
        let stored = f.users.find("t1", "user-alice").await.unwrap().unwrap();
        assert_eq!(stored.status, UserStatus::Locked);
        assert!(stored.locked_until.is_some());

        // The correct password still fails generically while locked
        let locked = f
            .service
            .login("t1", "a1", "alice", "P@ssw0rd!", &client)
            .await
            .unwrap_err();
        assert!(matches!(locked, ApiError::InvalidCredentials));

        // Advance the clock by rewriting locked_until into the past
        let mut user = f.users.find("t1", "user-alice").await.unwrap().unwrap();
        user.locked_until = Some(Utc::now() - chrono::Duration::seconds(1));
        f.users.update(user).await.unwrap();

        // Auto-unlock fires and the login succeeds with cleared counters
        let success = f
            .service
            .login("t1", "a1", "alice", "P@ssw0rd!", &client)
            .await;
        assert!(success.is_ok());

        let stored = f.users.find("t1", "user-alice").await.unwrap().unwrap();
        assert_eq!(stored.status, UserStatus::Active);
        assert_eq!(stored.failed_login_attempts, 0);
        assert_eq!(stored.locked_until, None);
    }

    #[tokio::test]
    async fn test_change_password_requires_old_and_policy() {
        let f = fixture().await;

        // Wrong old password: generic failure
        let result = f
            .service
            .change_password("t1", "a1", "user-alice", "WrongP@ss1", "NewP@ssw0rd1")
            .await;
        assert!(matches!(result, Err(ApiError::InvalidCredentials)));

        // Weak new password: specific validation error
        let result = f
            .service
            .change_password("t1", "a1", "user-alice", "P@ssw0rd!", "weak")
            .await;
        assert!(matches!(result, Err(ApiError::BadRequest { .. })));

        // Valid change, then the new password logs in
        f.service
            .change_password("t1", "a1", "user-alice", "P@ssw0rd!", "NewP@ssw0rd1")
            .await
            .unwrap();
        let client = ClientInfo::default();
        assert!(f
            .service
            .login("t1", "a1", "alice", "NewP@ssw0rd1", &client)
            .await
            .is_ok());
        assert!(f
            .service
            .login("t1", "a1", "alice", "P@ssw0rd!", &client)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_forgot_password_is_uniform_and_mails_token() {
        let f = fixture().await;
        let client = ClientInfo::default();

        // Unknown email: same Ok(()), no mail
        f.service
            .forgot_password("t1", "a1", "ghost@t1.example", &client)
            .await
            .unwrap();
        assert!(f.mailer.sent.lock().unwrap().is_empty());

        // Known email: same Ok(()), one mail carrying the token
        f.service
            .forgot_password("t1", "a1", "alice@t1.example", &client)
            .await
            .unwrap();
        let sent = f.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@t1.example");
        assert!(sent[0].body.contains("reset"));
    }

    #[tokio::test]
    async fn test_reset_password_is_one_shot() {
        let f = fixture().await;
        let client = ClientInfo::default();

        f.service
            .forgot_password("t1", "a1", "alice@t1.example", &client)
            .await
            .unwrap();
        let token = {
            let sent = f.mailer.sent.lock().unwrap();
            sent[0].body.split_whitespace().last().unwrap().to_string()
        };

        // First use succeeds
        f.service
            .reset_password("t1", &token, "Fresh3rP@ss")
            .await
            .unwrap();
        assert!(f
            .service
            .login("t1", "a1", "alice", "Fresh3rP@ss", &client)
            .await
            .is_ok());

        // Second use of the same token is rejected
        let result = f.service.reset_password("t1", &token, "An0therPass").await;
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_reset_token_is_tenant_bound() {
        let f = fixture().await;
        let client = ClientInfo::default();

        f.service
            .forgot_password("t1", "a1", "alice@t1.example", &client)
            .await
            .unwrap();
        let token = {
            let sent = f.mailer.sent.lock().unwrap();
            sent[0].body.split_whitespace().last().unwrap().to_string()
        };

        let result = f.service.reset_password("t2", &token, "Fresh3rP@ss").await;
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_mock_mailer_contract() {
        // The trait is mockable for collaborator-focused tests
        let mut mock = MockMailer::new();
        mock.expect_send().times(1).returning(|_| Ok(()));

        let mailer: Arc<dyn Mailer> = Arc::new(mock);
        mailer
            .send(EmailMessage {
                to: "a@b.c".to_string(),
                subject: "s".to_string(),
                body: "b".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_external_identity_first_login_provisions_user() {
        let f = fixture().await;
        let client = ClientInfo::default();
        let identity = ExternalIdentity {
            provider: "google".to_string(),
            provider_external_id: "sub-42".to_string(),
            email: "bob@t1.example".to_string(),
            username: "bob".to_string(),
            full_name: "Bob".to_string(),
            verified: true,
        };

        // First login creates the user and links the identity
        let first = f
            .service
            .login_with_identity("t1", "a1", identity.clone(), &client)
            .await
            .unwrap();
        assert_eq!(first.user.username, "bob");

        // Second login reuses the same account
        let second = f
            .service
            .login_with_identity("t1", "a1", identity, &client)
            .await
            .unwrap();
        assert_eq!(second.user.id, first.user.id);
    }

    #[tokio::test]
    async fn test_external_login_requires_configured_provider() {
        let f = fixture().await;
        let client = ClientInfo::default();
        let identity = ExternalIdentity {
            // No provider row matches "github" in the fixture
            provider: "github".to_string(),
            provider_external_id: "sub-7".to_string(),
            email: "carol@t1.example".to_string(),
            username: "carol".to_string(),
            full_name: "Carol".to_string(),
            verified: true,
        };

        let result = f
            .service
            .login_with_identity("t1", "a1", identity, &client)
            .await;
        assert!(matches!(result, Err(ApiError::InvalidCredentials)));
    }
}
