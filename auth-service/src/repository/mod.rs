//! # Repository Layer - Store Contracts
//!
//! The narrow store interfaces the core consumes, plus the backends that
//! implement them. The repository pattern keeps persistence swappable:
//! the in-memory backends here serve tests and single-process
//! deployments; a SQL backend would implement the same traits without
//! touching callers.
//!
//! ## Contract Requirements
//!
//! Every store:
//!
//! 1. **Enforces tenant isolation** in every query - a lookup never
//!    crosses its tenant scope.
//! 2. **Is safe for concurrent use** by many tasks (`Send + Sync`,
//!    interior synchronization).
//! 3. **Surfaces "not found" as a distinguished error**
//!    ([`StoreError::NotFound`]) so callers can decide between 404 and
//!    500. Lookups that may legitimately miss return `Ok(None)` instead.
//!
//! ## Error Mapping
//!
//! | StoreError | ApiError | HTTP |
//! |------------|----------|------|
//! | `NotFound` | `NotFound` | 404 |
//! | `Conflict` | `Conflict` | 409 |
//! | `Unavailable` | `StoreError` | 500 |
//! | `Cancelled` | `DeadlineExceeded` | 504 |
//!
//! ## Concurrency-Critical Methods
//!
//! Three methods carry the platform's serialization requirements:
//!
//! - [`UserStore::record_login_failure`] - the user row is the
//!   serialization point of the lockout machine; two concurrent wrong
//!   passwords count 2.
//! - [`RevocationRegistry::revoke`] - insert-if-absent; the first writer
//!   wins, which is what makes refresh rotation single-use.
//! - [`AppKeyStore::update_last_used`] - explicitly best-effort and
//!   droppable under load.

pub mod memory;
pub mod redis_registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use thiserror::Error;

use crate::domain::{
    AppKey, Application, AuditEvent, CredentialProvider, LockoutPolicy, LockoutTransition,
    Permission, PermissionComposition, Policy, Role, RolePermission, Tenant, User, UserAppAccess,
    UserIdentity, UserPermission, UserRole,
};

// =============================================================================
// Errors
// =============================================================================

/// Store-level error, converted to [`ApiError`] at the service boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed row does not exist (distinguished so callers can 404)
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint would be violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend failed or is unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The request deadline elapsed mid-operation
    #[error("operation cancelled")]
    Cancelled,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(resource) => ApiError::NotFound { resource },
            StoreError::Conflict(resource) => ApiError::Conflict { resource },
            StoreError::Unavailable(message) => ApiError::StoreError { message },
            StoreError::Cancelled => ApiError::DeadlineExceeded,
        }
    }
}

// =============================================================================
// Tenants & Applications
// =============================================================================

/// Store for [`Tenant`] rows.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn create(&self, tenant: Tenant) -> StoreResult<Tenant>;
    async fn find(&self, tenant_id: &str) -> StoreResult<Option<Tenant>>;
    async fn update(&self, tenant: Tenant) -> StoreResult<Tenant>;
    async fn soft_delete(&self, tenant_id: &str, now: DateTime<Utc>) -> StoreResult<()>;
    async fn list(&self) -> StoreResult<Vec<Tenant>>;
}

/// Store for [`Application`] rows, keyed `(tenant_id, id)`.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn create(&self, app: Application) -> StoreResult<Application>;
    async fn find(&self, tenant_id: &str, app_id: &str) -> StoreResult<Option<Application>>;
    async fn update(&self, app: Application) -> StoreResult<Application>;
    async fn delete(&self, tenant_id: &str, app_id: &str) -> StoreResult<()>;
    async fn list(&self, tenant_id: &str) -> StoreResult<Vec<Application>>;
}

// =============================================================================
// Users
// =============================================================================

/// Store for [`User`] rows.
///
/// Besides CRUD, this trait owns the *atomic* lockout transitions. A SQL
/// implementation would run them under a row lock / single UPDATE; the
/// in-memory implementation holds its write lock across the transition.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: User) -> StoreResult<User>;
    async fn find(&self, tenant_id: &str, user_id: &str) -> StoreResult<Option<User>>;
    async fn find_by_username(&self, tenant_id: &str, username: &str)
        -> StoreResult<Option<User>>;
    async fn find_by_email(&self, tenant_id: &str, email: &str) -> StoreResult<Option<User>>;
    async fn update(&self, user: User) -> StoreResult<User>;
    async fn soft_delete(&self, tenant_id: &str, user_id: &str, now: DateTime<Utc>)
        -> StoreResult<()>;

    /// Atomically records a failed login attempt and applies the lock
    /// transition when the threshold is reached.
    ///
    /// Two concurrent calls for the same user must observe counter
    /// values 1 and 2 - never both 1.
    async fn record_login_failure(
        &self,
        tenant_id: &str,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<(User, LockoutTransition)>;

    /// Atomically clears the failure counters after a successful login.
    async fn record_login_success(
        &self,
        tenant_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<User>;

    /// Applies the auto-unlock transition iff the user's temporary lock
    /// is due at `now`. Returns the (possibly updated) user.
    async fn auto_unlock_if_due(
        &self,
        tenant_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<User>;

    /// Atomically replaces the password hash.
    async fn update_password_hash(
        &self,
        tenant_id: &str,
        user_id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
}

// =============================================================================
// User App Access & Identities
// =============================================================================

/// Store for [`UserAppAccess`] grants.
#[async_trait]
pub trait UserAppAccessStore: Send + Sync {
    async fn grant(&self, access: UserAppAccess) -> StoreResult<UserAppAccess>;
    async fn find(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<UserAppAccess>>;
    async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn list_for_user(&self, tenant_id: &str, user_id: &str)
        -> StoreResult<Vec<UserAppAccess>>;
}

/// Store for linked external identities.
#[async_trait]
pub trait UserIdentityStore: Send + Sync {
    /// Links an identity. Fails with [`StoreError::Conflict`] when
    /// `(tenant_id, provider, provider_external_id)` is already linked.
    async fn link(&self, identity: UserIdentity) -> StoreResult<UserIdentity>;
    async fn find_by_provider(
        &self,
        tenant_id: &str,
        provider: &str,
        provider_external_id: &str,
    ) -> StoreResult<Option<UserIdentity>>;
    async fn list_for_user(&self, tenant_id: &str, user_id: &str)
        -> StoreResult<Vec<UserIdentity>>;
    async fn unlink(&self, tenant_id: &str, identity_id: &str) -> StoreResult<()>;
}

// =============================================================================
// App Keys
// =============================================================================

/// Store for [`AppKey`] rows.
///
/// `key_id` is globally unique; lookups by `key_id` and by `prefix`
/// support verification routing.
#[async_trait]
pub trait AppKeyStore: Send + Sync {
    async fn create(&self, key: AppKey) -> StoreResult<AppKey>;
    async fn find_by_key_id(&self, key_id: &str) -> StoreResult<Option<AppKey>>;
    async fn find_by_prefix(&self, prefix: &str) -> StoreResult<Vec<AppKey>>;
    async fn find(
        &self,
        tenant_id: &str,
        app_id: &str,
        key_id: &str,
    ) -> StoreResult<Option<AppKey>>;
    async fn list(&self, tenant_id: &str, app_id: &str) -> StoreResult<Vec<AppKey>>;

    /// Scoped revocation; idempotent. Returns the row as stored.
    async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        key_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<AppKey>;

    /// Best-effort usage stamp; callers may spawn-and-forget it and a
    /// loaded backend may drop it.
    async fn update_last_used(&self, key_id: &str, timestamp: DateTime<Utc>) -> StoreResult<()>;

    async fn delete(&self, tenant_id: &str, app_id: &str, key_id: &str) -> StoreResult<()>;
}

// =============================================================================
// Credential Providers
// =============================================================================

/// Store for [`CredentialProvider`] rows.
#[async_trait]
pub trait CredentialProviderStore: Send + Sync {
    async fn create(&self, provider: CredentialProvider) -> StoreResult<CredentialProvider>;
    async fn find(&self, tenant_id: &str, provider_id: &str)
        -> StoreResult<Option<CredentialProvider>>;
    /// Providers visible from `(tenant_id, app_id)`: app-level rows first,
    /// then tenant-level defaults (`app_id == None`).
    async fn list_for_scope(
        &self,
        tenant_id: &str,
        app_id: Option<&str>,
    ) -> StoreResult<Vec<CredentialProvider>>;
    async fn delete(&self, tenant_id: &str, provider_id: &str) -> StoreResult<()>;
}

// =============================================================================
// Roles, Permissions, Assignments
// =============================================================================

/// Store for [`Role`] rows, tenant+app scoped.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create(&self, role: Role) -> StoreResult<Role>;
    async fn find(&self, tenant_id: &str, app_id: &str, role_id: &str)
        -> StoreResult<Option<Role>>;
    async fn find_by_name(
        &self,
        tenant_id: &str,
        app_id: &str,
        name: &str,
    ) -> StoreResult<Option<Role>>;
    async fn list(&self, tenant_id: &str, app_id: &str) -> StoreResult<Vec<Role>>;
    async fn delete(&self, tenant_id: &str, app_id: &str, role_id: &str) -> StoreResult<()>;
}

/// Store for [`Permission`] rows and the compound-permission DAG.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn create(&self, permission: Permission) -> StoreResult<Permission>;
    async fn find(
        &self,
        tenant_id: &str,
        app_id: &str,
        permission_id: &str,
    ) -> StoreResult<Option<Permission>>;
    async fn find_by_name(
        &self,
        tenant_id: &str,
        app_id: &str,
        name: &str,
    ) -> StoreResult<Option<Permission>>;
    async fn list(&self, tenant_id: &str, app_id: &str) -> StoreResult<Vec<Permission>>;
    async fn delete(&self, tenant_id: &str, app_id: &str, permission_id: &str) -> StoreResult<()>;

    /// Adds a composition edge. Fails with [`StoreError::Conflict`] when
    /// the edge would create a cycle.
    async fn add_composition(&self, edge: PermissionComposition) -> StoreResult<()>;
    /// Direct children of `parent_id` in the composition DAG.
    async fn children_of(
        &self,
        tenant_id: &str,
        app_id: &str,
        parent_id: &str,
    ) -> StoreResult<Vec<PermissionComposition>>;
}

/// Store for role → permission assignments.
#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    async fn grant(&self, assignment: RolePermission) -> StoreResult<RolePermission>;
    async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        role_id: &str,
        permission_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn list_for_role(
        &self,
        tenant_id: &str,
        app_id: &str,
        role_id: &str,
    ) -> StoreResult<Vec<RolePermission>>;
}

/// Store for user → role assignments.
#[async_trait]
pub trait UserRoleStore: Send + Sync {
    async fn grant(&self, assignment: UserRole) -> StoreResult<UserRole>;
    async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
        role_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn list_for_user(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<UserRole>>;
}

/// Store for direct user → permission assignments.
#[async_trait]
pub trait UserPermissionStore: Send + Sync {
    async fn grant(&self, assignment: UserPermission) -> StoreResult<UserPermission>;
    async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
        permission_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn list_for_user(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<UserPermission>>;
}

// =============================================================================
// Policies
// =============================================================================

/// Store for [`Policy`] rows.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn create(&self, policy: Policy) -> StoreResult<Policy>;
    async fn find(&self, tenant_id: &str, policy_id: &str) -> StoreResult<Option<Policy>>;
    async fn update(&self, policy: Policy) -> StoreResult<Policy>;
    async fn delete(&self, tenant_id: &str, policy_id: &str) -> StoreResult<()>;
    /// Policies visible from `(tenant_id, app_id)`: exact app matches plus
    /// tenant-wide policies (empty `app_id`).
    async fn list_for_scope(&self, tenant_id: &str, app_id: &str) -> StoreResult<Vec<Policy>>;
}

// =============================================================================
// Revocation Registry
// =============================================================================

/// The refresh-token revocation registry: a single logical store with a
/// pluggable backend (in-memory or Redis).
///
/// `revoke` has insert-if-absent semantics and doubles as the
/// serialization primitive for refresh rotation: the first writer wins,
/// the loser observes the identifier as already revoked.
#[async_trait]
pub trait RevocationRegistry: Send + Sync {
    /// Records `identifier` as revoked until `expires_at`.
    ///
    /// Returns `true` when this call inserted the entry (first writer),
    /// `false` when the identifier was already revoked.
    async fn revoke(&self, identifier: &str, expires_at: DateTime<Utc>) -> StoreResult<bool>;

    /// Whether `identifier` is currently revoked.
    async fn is_revoked(&self, identifier: &str) -> StoreResult<bool>;

    /// Drops entries whose expiry is before `before`; returns the count.
    /// Safe to run periodically - an expired entry guards a token that
    /// is already invalid by expiry.
    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64>;
}

// =============================================================================
// Audit Log
// =============================================================================

/// Sink for audit events. Append-only from the emitter's drain task.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append(&self, event: AuditEvent) -> StoreResult<()>;
    /// Most recent events, optionally filtered by tenant.
    async fn list_recent(&self, tenant_id: Option<&str>, limit: usize)
        -> StoreResult<Vec<AuditEvent>>;
}
