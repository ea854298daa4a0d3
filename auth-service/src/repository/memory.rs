//! # In-Memory Store Backends
//!
//! Process-local implementations of every store contract, backed by
//! `tokio::sync::RwLock`-guarded maps. They serve tests and
//! single-process deployments; the trait boundary keeps them swappable
//! for SQL-backed implementations.
//!
//! ## Concurrency
//!
//! Each store holds one lock. Mutating operations take the write lock
//! for the whole transition, which is what makes the lockout counter and
//! the registry's insert-if-absent atomic: the write lock is the
//! in-process equivalent of a row lock.
//!
//! ## Tenant Isolation
//!
//! Keys embed the tenant id (and app id where the entity is tenant+app
//! scoped), so a query physically cannot cross tenants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::lockout::{apply_auto_unlock, apply_login_failure, apply_login_success};
use crate::domain::{
    AppKey, Application, AuditEvent, CredentialProvider, LockoutPolicy, LockoutTransition,
    Permission, PermissionComposition, Policy, Role, RolePermission, Tenant, User, UserAppAccess,
    UserIdentity, UserPermission, UserRole,
};

use super::{
    ApplicationStore, AppKeyStore, AuditLogStore, CredentialProviderStore, PermissionStore,
    PolicyStore, RevocationRegistry, RolePermissionStore, RoleStore, StoreError, StoreResult,
    TenantStore, UserAppAccessStore, UserIdentityStore, UserPermissionStore, UserRoleStore,
    UserStore,
};

// =============================================================================
// TENANTS
// =============================================================================

/// In-memory [`TenantStore`].
#[derive(Debug, Default)]
pub struct InMemoryTenantStore {
    rows: RwLock<HashMap<String, Tenant>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn create(&self, tenant: Tenant) -> StoreResult<Tenant> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&tenant.id) {
            return Err(StoreError::Conflict(format!("tenant:{}", tenant.id)));
        }
        rows.insert(tenant.id.clone(), tenant.clone());
        Ok(tenant)
    }

    async fn find(&self, tenant_id: &str) -> StoreResult<Option<Tenant>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(tenant_id)
            .filter(|t| t.deleted_at.is_none())
            .cloned())
    }

    async fn update(&self, tenant: Tenant) -> StoreResult<Tenant> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&tenant.id) {
            Some(existing) if existing.deleted_at.is_none() => {
                *existing = tenant.clone();
                Ok(tenant)
            }
            _ => Err(StoreError::NotFound(format!("tenant:{}", tenant.id))),
        }
    }

    async fn soft_delete(&self, tenant_id: &str, now: DateTime<Utc>) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(tenant_id) {
            Some(tenant) if tenant.deleted_at.is_none() => {
                tenant.deleted_at = Some(now);
                tenant.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("tenant:{}", tenant_id))),
        }
    }

    async fn list(&self) -> StoreResult<Vec<Tenant>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|t| t.deleted_at.is_none())
            .cloned()
            .collect())
    }
}

// =============================================================================
// APPLICATIONS
// =============================================================================

/// In-memory [`ApplicationStore`], keyed `(tenant_id, app_id)`.
#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    rows: RwLock<HashMap<(String, String), Application>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn create(&self, app: Application) -> StoreResult<Application> {
        let key = (app.tenant_id.clone(), app.id.clone());
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key) {
            return Err(StoreError::Conflict(format!("app:{}", app.id)));
        }
        rows.insert(key, app.clone());
        Ok(app)
    }

    async fn find(&self, tenant_id: &str, app_id: &str) -> StoreResult<Option<Application>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(tenant_id.to_string(), app_id.to_string()))
            .cloned())
    }

    async fn update(&self, app: Application) -> StoreResult<Application> {
        let key = (app.tenant_id.clone(), app.id.clone());
        let mut rows = self.rows.write().await;
        match rows.get_mut(&key) {
            Some(existing) => {
                *existing = app.clone();
                Ok(app)
            }
            None => Err(StoreError::NotFound(format!("app:{}", app.id))),
        }
    }

    async fn delete(&self, tenant_id: &str, app_id: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        rows.remove(&(tenant_id.to_string(), app_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("app:{}", app_id)))
    }

    async fn list(&self, tenant_id: &str) -> StoreResult<Vec<Application>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// USERS
// =============================================================================

/// In-memory [`UserStore`].
///
/// The write lock held across [`record_login_failure`] is the
/// serialization point of the lockout machine: concurrent failures for
/// the same user are applied one after the other.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    rows: RwLock<HashMap<(String, String), User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: User) -> StoreResult<User> {
        let key = (user.tenant_id.clone(), user.id.clone());
        let mut rows = self.rows.write().await;

        if rows.contains_key(&key) {
            return Err(StoreError::Conflict(format!("user:{}", user.id)));
        }
        // (tenant_id, username) and (tenant_id, email) are unique
        let clash = rows.values().any(|u| {
            u.tenant_id == user.tenant_id
                && u.deleted_at.is_none()
                && (u.username == user.username || u.email == user.email)
        });
        if clash {
            return Err(StoreError::Conflict(format!(
                "user username/email:{}",
                user.username
            )));
        }

        rows.insert(key, user.clone());
        Ok(user)
    }

    async fn find(&self, tenant_id: &str, user_id: &str) -> StoreResult<Option<User>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(tenant_id.to_string(), user_id.to_string()))
            .filter(|u| u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_username(
        &self,
        tenant_id: &str,
        username: &str,
    ) -> StoreResult<Option<User>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|u| {
                u.tenant_id == tenant_id && u.username == username && u.deleted_at.is_none()
            })
            .cloned())
    }

    async fn find_by_email(&self, tenant_id: &str, email: &str) -> StoreResult<Option<User>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|u| u.tenant_id == tenant_id && u.email == email && u.deleted_at.is_none())
            .cloned())
    }

    async fn update(&self, user: User) -> StoreResult<User> {
        let key = (user.tenant_id.clone(), user.id.clone());
        let mut rows = self.rows.write().await;
        match rows.get_mut(&key) {
            Some(existing) if existing.deleted_at.is_none() => {
                *existing = user.clone();
                Ok(user)
            }
            _ => Err(StoreError::NotFound(format!("user:{}", user.id))),
        }
    }

    async fn soft_delete(
        &self,
        tenant_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&(tenant_id.to_string(), user_id.to_string())) {
            Some(user) if user.deleted_at.is_none() => {
                user.deleted_at = Some(now);
                user.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("user:{}", user_id))),
        }
    }

    async fn record_login_failure(
        &self,
        tenant_id: &str,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<(User, LockoutTransition)> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&(tenant_id.to_string(), user_id.to_string())) {
            Some(user) if user.deleted_at.is_none() => {
                let transition = apply_login_failure(user, policy, now);
                Ok((user.clone(), transition))
            }
            _ => Err(StoreError::NotFound(format!("user:{}", user_id))),
        }
    }

    async fn record_login_success(
        &self,
        tenant_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&(tenant_id.to_string(), user_id.to_string())) {
            Some(user) if user.deleted_at.is_none() => {
                apply_login_success(user, now);
                Ok(user.clone())
            }
            _ => Err(StoreError::NotFound(format!("user:{}", user_id))),
        }
    }

    async fn auto_unlock_if_due(
        &self,
        tenant_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&(tenant_id.to_string(), user_id.to_string())) {
            Some(user) if user.deleted_at.is_none() => {
                apply_auto_unlock(user, now);
                Ok(user.clone())
            }
            _ => Err(StoreError::NotFound(format!("user:{}", user_id))),
        }
    }

    async fn update_password_hash(
        &self,
        tenant_id: &str,
        user_id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&(tenant_id.to_string(), user_id.to_string())) {
            Some(user) if user.deleted_at.is_none() => {
                user.password_hash = Some(password_hash.to_string());
                user.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("user:{}", user_id))),
        }
    }
}

// =============================================================================
// USER APP ACCESS
// =============================================================================

/// In-memory [`UserAppAccessStore`], keyed `(tenant, app, user)`.
#[derive(Debug, Default)]
pub struct InMemoryUserAppAccessStore {
    rows: RwLock<HashMap<(String, String, String), UserAppAccess>>,
}

impl InMemoryUserAppAccessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserAppAccessStore for InMemoryUserAppAccessStore {
    async fn grant(&self, access: UserAppAccess) -> StoreResult<UserAppAccess> {
        let key = (
            access.tenant_id.clone(),
            access.app_id.clone(),
            access.user_id.clone(),
        );
        let mut rows = self.rows.write().await;
        rows.insert(key, access.clone());
        Ok(access)
    }

    async fn find(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<UserAppAccess>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(
                tenant_id.to_string(),
                app_id.to_string(),
                user_id.to_string(),
            ))
            .cloned())
    }

    async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&(
            tenant_id.to_string(),
            app_id.to_string(),
            user_id.to_string(),
        )) {
            Some(access) => {
                access.status = crate::domain::AccessStatus::Revoked;
                access.revoked_at.get_or_insert(now);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "user_app_access:{}:{}",
                app_id, user_id
            ))),
        }
    }

    async fn list_for_user(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<UserAppAccess>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|a| a.tenant_id == tenant_id && a.user_id == user_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// USER IDENTITIES
// =============================================================================

/// In-memory [`UserIdentityStore`], keyed `(tenant, identity id)`.
#[derive(Debug, Default)]
pub struct InMemoryUserIdentityStore {
    rows: RwLock<HashMap<(String, String), UserIdentity>>,
}

impl InMemoryUserIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserIdentityStore for InMemoryUserIdentityStore {
    async fn link(&self, identity: UserIdentity) -> StoreResult<UserIdentity> {
        let mut rows = self.rows.write().await;

        // (tenant, provider, provider_external_id) maps to at most one user
        let taken = rows.values().any(|i| {
            i.tenant_id == identity.tenant_id
                && i.provider == identity.provider
                && i.provider_external_id == identity.provider_external_id
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "identity:{}:{}",
                identity.provider, identity.provider_external_id
            )));
        }

        let key = (identity.tenant_id.clone(), identity.id.clone());
        rows.insert(key, identity.clone());
        Ok(identity)
    }

    async fn find_by_provider(
        &self,
        tenant_id: &str,
        provider: &str,
        provider_external_id: &str,
    ) -> StoreResult<Option<UserIdentity>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|i| {
                i.tenant_id == tenant_id
                    && i.provider == provider
                    && i.provider_external_id == provider_external_id
            })
            .cloned())
    }

    async fn list_for_user(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<UserIdentity>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|i| i.tenant_id == tenant_id && i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn unlink(&self, tenant_id: &str, identity_id: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        rows.remove(&(tenant_id.to_string(), identity_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("identity:{}", identity_id)))
    }
}

// =============================================================================
// APP KEYS
// =============================================================================

/// In-memory [`AppKeyStore`], keyed by globally unique `key_id`.
#[derive(Debug, Default)]
pub struct InMemoryAppKeyStore {
    rows: RwLock<HashMap<String, AppKey>>,
}

impl InMemoryAppKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppKeyStore for InMemoryAppKeyStore {
    async fn create(&self, key: AppKey) -> StoreResult<AppKey> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key.key_id) {
            return Err(StoreError::Conflict(format!("app_key:{}", key.key_id)));
        }
        rows.insert(key.key_id.clone(), key.clone());
        Ok(key)
    }

    async fn find_by_key_id(&self, key_id: &str) -> StoreResult<Option<AppKey>> {
        let rows = self.rows.read().await;
        Ok(rows.get(key_id).cloned())
    }

    async fn find_by_prefix(&self, prefix: &str) -> StoreResult<Vec<AppKey>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|k| k.prefix == prefix)
            .cloned()
            .collect())
    }

    async fn find(
        &self,
        tenant_id: &str,
        app_id: &str,
        key_id: &str,
    ) -> StoreResult<Option<AppKey>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(key_id)
            .filter(|k| k.tenant_id == tenant_id && k.app_id == app_id)
            .cloned())
    }

    async fn list(&self, tenant_id: &str, app_id: &str) -> StoreResult<Vec<AppKey>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|k| k.tenant_id == tenant_id && k.app_id == app_id)
            .cloned()
            .collect())
    }

    async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        key_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<AppKey> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(key_id) {
            Some(key) if key.tenant_id == tenant_id && key.app_id == app_id => {
                // Idempotent: a second revoke keeps the original timestamp
                if !key.revoked {
                    key.revoked = true;
                    key.revoked_at = Some(now);
                }
                Ok(key.clone())
            }
            _ => Err(StoreError::NotFound(format!("app_key:{}", key_id))),
        }
    }

    async fn update_last_used(&self, key_id: &str, timestamp: DateTime<Utc>) -> StoreResult<()> {
        // Best-effort: a missing row is silently dropped, matching the
        // droppable contract of this method
        let mut rows = self.rows.write().await;
        if let Some(key) = rows.get_mut(key_id) {
            key.last_used_at = Some(timestamp);
        }
        Ok(())
    }

    async fn delete(&self, tenant_id: &str, app_id: &str, key_id: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        match rows.get(key_id) {
            Some(key) if key.tenant_id == tenant_id && key.app_id == app_id => {
                rows.remove(key_id);
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("app_key:{}", key_id))),
        }
    }
}

// =============================================================================
// CREDENTIAL PROVIDERS
// =============================================================================

/// In-memory [`CredentialProviderStore`].
#[derive(Debug, Default)]
pub struct InMemoryCredentialProviderStore {
    rows: RwLock<HashMap<(String, String), CredentialProvider>>,
}

impl InMemoryCredentialProviderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialProviderStore for InMemoryCredentialProviderStore {
    async fn create(&self, provider: CredentialProvider) -> StoreResult<CredentialProvider> {
        let key = (provider.tenant_id.clone(), provider.id.clone());
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key) {
            return Err(StoreError::Conflict(format!("provider:{}", provider.id)));
        }
        rows.insert(key, provider.clone());
        Ok(provider)
    }

    async fn find(
        &self,
        tenant_id: &str,
        provider_id: &str,
    ) -> StoreResult<Option<CredentialProvider>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(tenant_id.to_string(), provider_id.to_string()))
            .cloned())
    }

    async fn list_for_scope(
        &self,
        tenant_id: &str,
        app_id: Option<&str>,
    ) -> StoreResult<Vec<CredentialProvider>> {
        let rows = self.rows.read().await;
        let mut providers: Vec<CredentialProvider> = rows
            .values()
            .filter(|p| {
                p.tenant_id == tenant_id
                    && (p.app_id.is_none() || p.app_id.as_deref() == app_id)
            })
            .cloned()
            .collect();
        // App-level rows take precedence over tenant-level defaults
        providers.sort_by_key(|p| p.app_id.is_none());
        Ok(providers)
    }

    async fn delete(&self, tenant_id: &str, provider_id: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        rows.remove(&(tenant_id.to_string(), provider_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("provider:{}", provider_id)))
    }
}

// =============================================================================
// ROLES
// =============================================================================

/// In-memory [`RoleStore`], keyed `(tenant, app, role id)`.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    rows: RwLock<HashMap<(String, String, String), Role>>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn create(&self, role: Role) -> StoreResult<Role> {
        let key = (
            role.tenant_id.clone(),
            role.app_id.clone(),
            role.id.clone(),
        );
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key) {
            return Err(StoreError::Conflict(format!("role:{}", role.id)));
        }
        rows.insert(key, role.clone());
        Ok(role)
    }

    async fn find(
        &self,
        tenant_id: &str,
        app_id: &str,
        role_id: &str,
    ) -> StoreResult<Option<Role>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(
                tenant_id.to_string(),
                app_id.to_string(),
                role_id.to_string(),
            ))
            .cloned())
    }

    async fn find_by_name(
        &self,
        tenant_id: &str,
        app_id: &str,
        name: &str,
    ) -> StoreResult<Option<Role>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|r| r.tenant_id == tenant_id && r.app_id == app_id && r.name == name)
            .cloned())
    }

    async fn list(&self, tenant_id: &str, app_id: &str) -> StoreResult<Vec<Role>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.app_id == app_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, tenant_id: &str, app_id: &str, role_id: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        rows.remove(&(
            tenant_id.to_string(),
            app_id.to_string(),
            role_id.to_string(),
        ))
        .map(|_| ())
        .ok_or_else(|| StoreError::NotFound(format!("role:{}", role_id)))
    }
}

// =============================================================================
// PERMISSIONS + COMPOSITION DAG
// =============================================================================

/// In-memory [`PermissionStore`] with the composition edge list.
#[derive(Debug, Default)]
pub struct InMemoryPermissionStore {
    rows: RwLock<HashMap<(String, String, String), Permission>>,
    edges: RwLock<Vec<PermissionComposition>>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether adding `parent -> child` would close a cycle: true iff
    /// `parent` is reachable from `child` through existing edges.
    fn creates_cycle(
        edges: &[PermissionComposition],
        tenant_id: &str,
        app_id: &str,
        parent_id: &str,
        child_id: &str,
    ) -> bool {
        if parent_id == child_id {
            return true;
        }
        let mut stack = vec![child_id.to_string()];
        let mut seen = std::collections::HashSet::new();
        while let Some(node) = stack.pop() {
            if node == parent_id {
                return true;
            }
            if !seen.insert(node.clone()) {
                continue;
            }
            for edge in edges
                .iter()
                .filter(|e| e.tenant_id == tenant_id && e.app_id == app_id && e.parent_id == node)
            {
                stack.push(edge.child_id.clone());
            }
        }
        false
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn create(&self, permission: Permission) -> StoreResult<Permission> {
        let key = (
            permission.tenant_id.clone(),
            permission.app_id.clone(),
            permission.id.clone(),
        );
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "permission:{}",
                permission.id
            )));
        }
        rows.insert(key, permission.clone());
        Ok(permission)
    }

    async fn find(
        &self,
        tenant_id: &str,
        app_id: &str,
        permission_id: &str,
    ) -> StoreResult<Option<Permission>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(
                tenant_id.to_string(),
                app_id.to_string(),
                permission_id.to_string(),
            ))
            .cloned())
    }

    async fn find_by_name(
        &self,
        tenant_id: &str,
        app_id: &str,
        name: &str,
    ) -> StoreResult<Option<Permission>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|p| p.tenant_id == tenant_id && p.app_id == app_id && p.name == name)
            .cloned())
    }

    async fn list(&self, tenant_id: &str, app_id: &str) -> StoreResult<Vec<Permission>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.app_id == app_id)
            .cloned()
            .collect())
    }

    async fn delete(
        &self,
        tenant_id: &str,
        app_id: &str,
        permission_id: &str,
    ) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        rows.remove(&(
            tenant_id.to_string(),
            app_id.to_string(),
            permission_id.to_string(),
        ))
        .map(|_| ())
        .ok_or_else(|| StoreError::NotFound(format!("permission:{}", permission_id)))
    }

    async fn add_composition(&self, edge: PermissionComposition) -> StoreResult<()> {
        let mut edges = self.edges.write().await;
        if Self::creates_cycle(
            &edges,
            &edge.tenant_id,
            &edge.app_id,
            &edge.parent_id,
            &edge.child_id,
        ) {
            return Err(StoreError::Conflict(format!(
                "composition cycle: {} -> {}",
                edge.parent_id, edge.child_id
            )));
        }
        edges.push(edge);
        Ok(())
    }

    async fn children_of(
        &self,
        tenant_id: &str,
        app_id: &str,
        parent_id: &str,
    ) -> StoreResult<Vec<PermissionComposition>> {
        let edges = self.edges.read().await;
        Ok(edges
            .iter()
            .filter(|e| {
                e.tenant_id == tenant_id && e.app_id == app_id && e.parent_id == parent_id
            })
            .cloned()
            .collect())
    }
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

/// In-memory [`RolePermissionStore`].
#[derive(Debug, Default)]
pub struct InMemoryRolePermissionStore {
    rows: RwLock<Vec<RolePermission>>,
}

impl InMemoryRolePermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RolePermissionStore for InMemoryRolePermissionStore {
    async fn grant(&self, assignment: RolePermission) -> StoreResult<RolePermission> {
        let mut rows = self.rows.write().await;
        // Idempotent: an existing effective grant is returned as-is
        if let Some(existing) = rows.iter().find(|a| {
            a.tenant_id == assignment.tenant_id
                && a.app_id == assignment.app_id
                && a.role_id == assignment.role_id
                && a.permission_id == assignment.permission_id
                && a.is_effective()
        }) {
            return Ok(existing.clone());
        }
        rows.push(assignment.clone());
        Ok(assignment)
    }

    async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        role_id: &str,
        permission_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|a| {
            a.tenant_id == tenant_id
                && a.app_id == app_id
                && a.role_id == role_id
                && a.permission_id == permission_id
                && a.is_effective()
        }) {
            Some(assignment) => {
                assignment.revoked_at = Some(now);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "role_permission:{}:{}",
                role_id, permission_id
            ))),
        }
    }

    async fn list_for_role(
        &self,
        tenant_id: &str,
        app_id: &str,
        role_id: &str,
    ) -> StoreResult<Vec<RolePermission>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.app_id == app_id && a.role_id == role_id)
            .cloned()
            .collect())
    }
}

/// In-memory [`UserRoleStore`].
#[derive(Debug, Default)]
pub struct InMemoryUserRoleStore {
    rows: RwLock<Vec<UserRole>>,
}

impl InMemoryUserRoleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRoleStore for InMemoryUserRoleStore {
    async fn grant(&self, assignment: UserRole) -> StoreResult<UserRole> {
        let mut rows = self.rows.write().await;
        if let Some(existing) = rows.iter().find(|a| {
            a.tenant_id == assignment.tenant_id
                && a.app_id == assignment.app_id
                && a.user_id == assignment.user_id
                && a.role_id == assignment.role_id
                && a.is_effective()
        }) {
            return Ok(existing.clone());
        }
        rows.push(assignment.clone());
        Ok(assignment)
    }

    async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
        role_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|a| {
            a.tenant_id == tenant_id
                && a.app_id == app_id
                && a.user_id == user_id
                && a.role_id == role_id
                && a.is_effective()
        }) {
            Some(assignment) => {
                assignment.revoked_at = Some(now);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "user_role:{}:{}",
                user_id, role_id
            ))),
        }
    }

    async fn list_for_user(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<UserRole>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.app_id == app_id && a.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// In-memory [`UserPermissionStore`].
#[derive(Debug, Default)]
pub struct InMemoryUserPermissionStore {
    rows: RwLock<Vec<UserPermission>>,
}

impl InMemoryUserPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserPermissionStore for InMemoryUserPermissionStore {
    async fn grant(&self, assignment: UserPermission) -> StoreResult<UserPermission> {
        let mut rows = self.rows.write().await;
        if let Some(existing) = rows.iter().find(|a| {
            a.tenant_id == assignment.tenant_id
                && a.app_id == assignment.app_id
                && a.user_id == assignment.user_id
                && a.permission_id == assignment.permission_id
                && a.is_effective()
        }) {
            return Ok(existing.clone());
        }
        rows.push(assignment.clone());
        Ok(assignment)
    }

    async fn revoke(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
        permission_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|a| {
            a.tenant_id == tenant_id
                && a.app_id == app_id
                && a.user_id == user_id
                && a.permission_id == permission_id
                && a.is_effective()
        }) {
            Some(assignment) => {
                assignment.revoked_at = Some(now);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "user_permission:{}:{}",
                user_id, permission_id
            ))),
        }
    }

    async fn list_for_user(
        &self,
        tenant_id: &str,
        app_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<UserPermission>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.app_id == app_id && a.user_id == user_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// POLICIES
// =============================================================================

/// In-memory [`PolicyStore`], keyed `(tenant, policy id)`.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    rows: RwLock<HashMap<(String, String), Policy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn create(&self, policy: Policy) -> StoreResult<Policy> {
        let key = (policy.tenant_id.clone(), policy.id.clone());
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key) {
            return Err(StoreError::Conflict(format!("policy:{}", policy.id)));
        }
        rows.insert(key, policy.clone());
        Ok(policy)
    }

    async fn find(&self, tenant_id: &str, policy_id: &str) -> StoreResult<Option<Policy>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(tenant_id.to_string(), policy_id.to_string()))
            .cloned())
    }

    async fn update(&self, policy: Policy) -> StoreResult<Policy> {
        let key = (policy.tenant_id.clone(), policy.id.clone());
        let mut rows = self.rows.write().await;
        match rows.get_mut(&key) {
            Some(existing) => {
                *existing = policy.clone();
                Ok(policy)
            }
            None => Err(StoreError::NotFound(format!("policy:{}", policy.id))),
        }
    }

    async fn delete(&self, tenant_id: &str, policy_id: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        rows.remove(&(tenant_id.to_string(), policy_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("policy:{}", policy_id)))
    }

    async fn list_for_scope(&self, tenant_id: &str, app_id: &str) -> StoreResult<Vec<Policy>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|p| {
                p.tenant_id == tenant_id && (p.app_id == app_id || p.app_id.is_empty())
            })
            .cloned()
            .collect())
    }
}

// =============================================================================
// REVOCATION REGISTRY
// =============================================================================

/// In-memory [`RevocationRegistry`].
///
/// The write lock makes `revoke` an atomic insert-if-absent: of two
/// concurrent rotations presenting the same refresh token, exactly one
/// inserts and wins.
#[derive(Debug, Default)]
pub struct InMemoryRevocationRegistry {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryRevocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationRegistry for InMemoryRevocationRegistry {
    async fn revoke(&self, identifier: &str, expires_at: DateTime<Utc>) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(identifier) {
            return Ok(false);
        }
        entries.insert(identifier.to_string(), expires_at);
        Ok(true)
    }

    async fn is_revoked(&self, identifier: &str) -> StoreResult<bool> {
        let entries = self.entries.read().await;
        Ok(entries.contains_key(identifier))
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut entries = self.entries.write().await;
        let before_len = entries.len();
        entries.retain(|_, expires_at| *expires_at >= before);
        Ok((before_len - entries.len()) as u64)
    }
}

// =============================================================================
// AUDIT LOG
// =============================================================================

/// In-memory [`AuditLogStore`]: an append-only vector.
#[derive(Debug, Default)]
pub struct InMemoryAuditLogStore {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn append(&self, event: AuditEvent) -> StoreResult<()> {
        let mut events = self.events.write().await;
        events.push(event);
        Ok(())
    }

    async fn list_recent(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<AuditEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .rev()
            .filter(|e| tenant_id.is_none() || e.tenant_id.as_deref() == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TenantConfig, TenantStatus, UserStatus};
    use std::sync::Arc;

    fn user(tenant: &str, id: &str, username: &str) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            username: username.to_string(),
            email: format!("{}@{}.example", username, tenant),
            full_name: username.to_string(),
            is_tenant_owner: false,
            password_hash: Some("$argon2id$stub".to_string()),
            status: UserStatus::Active,
            failed_login_attempts: 0,
            last_failed_login_at: None,
            locked_at: None,
            locked_until: None,
            lockout_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn policy() -> LockoutPolicy {
        LockoutPolicy {
            max_attempts: 5,
            lockout_duration_secs: 300,
            reset_attempts_after_secs: 3600,
            permanent_lock_after: 0,
        }
    }

    #[tokio::test]
    async fn test_user_uniqueness_is_tenant_scoped() {
        let store = InMemoryUserStore::new();
        store.create(user("t1", "u1", "alice")).await.unwrap();

        // Same username in the same tenant conflicts
        let result = store.create(user("t1", "u2", "alice")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        // Same username in another tenant is fine
        store.create(user("t2", "u3", "alice")).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_is_tenant_scoped() {
        let store = InMemoryUserStore::new();
        store.create(user("t1", "u1", "alice")).await.unwrap();

        assert!(store.find("t1", "u1").await.unwrap().is_some());
        assert!(store.find("t2", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_login_failures_count_exactly() {
        let store = Arc::new(InMemoryUserStore::new());
        store.create(user("t1", "u1", "alice")).await.unwrap();
        let now = Utc::now();
        let lockout = policy();

        // Two concurrent wrong-password attempts must produce counter 2
        let (a, b) = tokio::join!(
            store.record_login_failure("t1", "u1", &lockout, now),
            store.record_login_failure("t1", "u1", &lockout, now),
        );
        let attempts: Vec<u32> = [a.unwrap().1, b.unwrap().1]
            .iter()
            .map(|t| match t {
                LockoutTransition::Counted { attempts } => *attempts,
                _ => panic!("unexpected lock below threshold"),
            })
            .collect();

        let mut sorted = attempts.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2]);

        let stored = store.find("t1", "u1").await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 2);
    }

    #[tokio::test]
    async fn test_registry_insert_if_absent_first_writer_wins() {
        let registry = Arc::new(InMemoryRevocationRegistry::new());
        let expires = Utc::now() + chrono::Duration::days(30);

        let (a, b) = tokio::join!(
            registry.revoke("token-id-1", expires),
            registry.revoke("token-id-1", expires),
        );

        let wins = [a.unwrap(), b.unwrap()];
        assert_eq!(wins.iter().filter(|w| **w).count(), 1);
        assert!(registry.is_revoked("token-id-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_registry_purge_expired() {
        let registry = InMemoryRevocationRegistry::new();
        let now = Utc::now();

        registry
            .revoke("stale", now - chrono::Duration::days(1))
            .await
            .unwrap();
        registry
            .revoke("live", now + chrono::Duration::days(1))
            .await
            .unwrap();

        let purged = registry.purge_expired(now).await.unwrap();
        assert_eq!(purged, 1);
        assert!(!registry.is_revoked("stale").await.unwrap());
        assert!(registry.is_revoked("live").await.unwrap());
    }

    #[tokio::test]
    async fn test_app_key_revoke_is_idempotent() {
        let store = InMemoryAppKeyStore::new();
        let now = Utc::now();
        let key = AppKey {
            id: "row-1".to_string(),
            tenant_id: "t1".to_string(),
            app_id: "a1".to_string(),
            key_id: "abc123def456".to_string(),
            prefix: "abc123de".to_string(),
            secret_hash: "00".repeat(32),
            key_type: "service".to_string(),
            environment: crate::domain::KeyEnvironment::Live,
            user_id: None,
            name: "ci".to_string(),
            scopes: vec![],
            metadata: HashMap::new(),
            created_at: now,
            expires_at: None,
            last_used_at: None,
            revoked: false,
            revoked_at: None,
        };
        store.create(key).await.unwrap();

        let first = store.revoke("t1", "a1", "abc123def456", now).await.unwrap();
        let later = now + chrono::Duration::seconds(60);
        let second = store
            .revoke("t1", "a1", "abc123def456", later)
            .await
            .unwrap();

        assert!(first.revoked && second.revoked);
        // The original timestamp is preserved
        assert_eq!(second.revoked_at, Some(now));
    }

    #[tokio::test]
    async fn test_app_key_revoke_is_scoped() {
        let store = InMemoryAppKeyStore::new();
        let now = Utc::now();
        let key = AppKey {
            id: "row-1".to_string(),
            tenant_id: "t1".to_string(),
            app_id: "a1".to_string(),
            key_id: "abc123def456".to_string(),
            prefix: "abc123de".to_string(),
            secret_hash: "00".repeat(32),
            key_type: "service".to_string(),
            environment: crate::domain::KeyEnvironment::Live,
            user_id: None,
            name: "ci".to_string(),
            scopes: vec![],
            metadata: HashMap::new(),
            created_at: now,
            expires_at: None,
            last_used_at: None,
            revoked: false,
            revoked_at: None,
        };
        store.create(key).await.unwrap();

        // A caller from another tenant cannot revoke the key
        let result = store.revoke("t2", "a1", "abc123def456", now).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));

        assert!(!store
            .find_by_key_id("abc123def456")
            .await
            .unwrap()
            .unwrap()
            .revoked);
    }

    #[tokio::test]
    async fn test_composition_cycle_rejected() {
        let store = InMemoryPermissionStore::new();
        let edge = |parent: &str, child: &str| PermissionComposition {
            parent_id: parent.to_string(),
            child_id: child.to_string(),
            tenant_id: "t1".to_string(),
            app_id: "a1".to_string(),
            is_required: true,
            priority: 0,
        };

        store.add_composition(edge("a", "b")).await.unwrap();
        store.add_composition(edge("b", "c")).await.unwrap();

        // c -> a would close the cycle a -> b -> c -> a
        let result = store.add_composition(edge("c", "a")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        // Self edges are cycles too
        let result = store.add_composition(edge("d", "d")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_identity_uniqueness_per_provider_subject() {
        let store = InMemoryUserIdentityStore::new();
        let identity = |id: &str, user: &str| UserIdentity {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            user_id: user.to_string(),
            provider: "google".to_string(),
            provider_external_id: "sub-123".to_string(),
            email: None,
            username: None,
            verified: true,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };

        store.link(identity("i1", "u1")).await.unwrap();
        let result = store.link(identity("i2", "u2")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_policy_scope_includes_tenant_wide() {
        let store = InMemoryPolicyStore::new();
        let now = Utc::now();
        let policy = |id: &str, app: &str| Policy {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            app_id: app.to_string(),
            name: id.to_string(),
            effect: crate::domain::PolicyEffect::Allow,
            subjects: vec!["*".to_string()],
            resources: vec!["*".to_string()],
            actions: vec!["*".to_string()],
            conditions: None,
            status: crate::domain::PolicyStatus::Active,
            priority: 0,
            created_at: now,
        };

        store.create(policy("p-app", "a1")).await.unwrap();
        store.create(policy("p-wide", "")).await.unwrap();
        store.create(policy("p-other", "a2")).await.unwrap();

        let scoped = store.list_for_scope("t1", "a1").await.unwrap();
        let mut ids: Vec<&str> = scoped.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["p-app", "p-wide"]);
    }

    #[tokio::test]
    async fn test_app_key_prefix_routing() {
        let store = InMemoryAppKeyStore::new();
        let now = Utc::now();
        for (row, key_id) in [("row-1", "abcd1111efgh"), ("row-2", "abcd1111zzzz")] {
            store
                .create(AppKey {
                    id: row.to_string(),
                    tenant_id: "t1".to_string(),
                    app_id: "a1".to_string(),
                    key_id: key_id.to_string(),
                    prefix: key_id[..8].to_string(),
                    secret_hash: "00".repeat(32),
                    key_type: "service".to_string(),
                    environment: crate::domain::KeyEnvironment::Live,
                    user_id: None,
                    name: row.to_string(),
                    scopes: vec![],
                    metadata: HashMap::new(),
                    created_at: now,
                    expires_at: None,
                    last_used_at: None,
                    revoked: false,
                    revoked_at: None,
                })
                .await
                .unwrap();
        }

        let routed = store.find_by_prefix("abcd1111").await.unwrap();
        assert_eq!(routed.len(), 2);
        assert!(store.find_by_prefix("ffff0000").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identity_unlink_frees_the_slot() {
        let store = InMemoryUserIdentityStore::new();
        let identity = UserIdentity {
            id: "i1".to_string(),
            tenant_id: "t1".to_string(),
            user_id: "u1".to_string(),
            provider: "google".to_string(),
            provider_external_id: "sub-9".to_string(),
            email: None,
            username: None,
            verified: true,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };
        store.link(identity.clone()).await.unwrap();
        assert_eq!(store.list_for_user("t1", "u1").await.unwrap().len(), 1);

        store.unlink("t1", "i1").await.unwrap();
        assert!(store
            .find_by_provider("t1", "google", "sub-9")
            .await
            .unwrap()
            .is_none());

        // Relinking the same provider subject now succeeds
        store.link(identity).await.unwrap();
    }

    #[tokio::test]
    async fn test_access_grant_revoke_and_listing() {
        let store = InMemoryUserAppAccessStore::new();
        let now = Utc::now();
        store
            .grant(UserAppAccess {
                tenant_id: "t1".to_string(),
                app_id: "a1".to_string(),
                user_id: "u1".to_string(),
                status: crate::domain::AccessStatus::Active,
                granted_at: now,
                revoked_at: None,
            })
            .await
            .unwrap();

        assert!(store.find("t1", "a1", "u1").await.unwrap().unwrap().is_active());

        store.revoke("t1", "a1", "u1", now).await.unwrap();
        let rows = store.list_for_user("t1", "u1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_active());
    }

    #[tokio::test]
    async fn test_role_and_permission_name_lookups() {
        let roles = InMemoryRoleStore::new();
        roles
            .create(Role {
                id: "r1".to_string(),
                tenant_id: "t1".to_string(),
                app_id: "a1".to_string(),
                name: "admin".to_string(),
                status: crate::domain::ResourceStatus::Active,
            })
            .await
            .unwrap();
        assert!(roles.find_by_name("t1", "a1", "admin").await.unwrap().is_some());
        assert!(roles.find_by_name("t1", "a2", "admin").await.unwrap().is_none());
        assert_eq!(roles.list("t1", "a1").await.unwrap().len(), 1);
        roles.delete("t1", "a1", "r1").await.unwrap();

        let permissions = InMemoryPermissionStore::new();
        permissions
            .create(Permission {
                id: "p1".to_string(),
                tenant_id: "t1".to_string(),
                app_id: "a1".to_string(),
                name: "doc:read".to_string(),
                resource: "doc".to_string(),
                action: "read".to_string(),
                status: crate::domain::ResourceStatus::Active,
            })
            .await
            .unwrap();
        assert!(permissions
            .find_by_name("t1", "a1", "doc:read")
            .await
            .unwrap()
            .is_some());
        permissions.delete("t1", "a1", "p1").await.unwrap();
        assert!(permissions.list("t1", "a1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_policy_update_and_delete() {
        let store = InMemoryPolicyStore::new();
        let now = Utc::now();
        let mut policy = Policy {
            id: "p1".to_string(),
            tenant_id: "t1".to_string(),
            app_id: "a1".to_string(),
            name: "readers".to_string(),
            effect: crate::domain::PolicyEffect::Allow,
            subjects: vec!["*".to_string()],
            resources: vec!["*".to_string()],
            actions: vec!["read".to_string()],
            conditions: None,
            status: crate::domain::PolicyStatus::Active,
            priority: 0,
            created_at: now,
        };
        store.create(policy.clone()).await.unwrap();

        policy.status = crate::domain::PolicyStatus::Disabled;
        store.update(policy).await.unwrap();
        assert_eq!(
            store.find("t1", "p1").await.unwrap().unwrap().status,
            crate::domain::PolicyStatus::Disabled
        );

        store.delete("t1", "p1").await.unwrap();
        assert!(matches!(
            store.delete("t1", "p1").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_scope_precedence() {
        let store = InMemoryCredentialProviderStore::new();
        let provider = |id: &str, app: Option<&str>| CredentialProvider {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            app_id: app.map(String::from),
            provider_type: "oauth2".to_string(),
            name: "google".to_string(),
            status: crate::domain::ResourceStatus::Active,
            config: serde_json::json!({}),
            created_at: Utc::now(),
        };

        store.create(provider("tenant-level", None)).await.unwrap();
        store.create(provider("app-level", Some("a1"))).await.unwrap();
        store.create(provider("other-app", Some("a2"))).await.unwrap();

        let scoped = store.list_for_scope("t1", Some("a1")).await.unwrap();
        let ids: Vec<&str> = scoped.iter().map(|p| p.id.as_str()).collect();
        // App-level rows come first, other apps are invisible
        assert_eq!(ids, vec!["app-level", "tenant-level"]);

        assert!(store.find("t1", "app-level").await.unwrap().is_some());
        store.delete("t1", "other-app").await.unwrap();
    }

    #[tokio::test]
    async fn test_bulk_users_stay_addressable_by_username() {
        use fake::faker::internet::en::SafeEmail;
        use fake::Fake;

        let store = InMemoryUserStore::new();
        for i in 0..25 {
            let email: String = SafeEmail().fake();
            let mut seeded = user("t1", &format!("u{}", i), &format!("member{}", i));
            // Faker output may collide; prefix keeps the unique-email rule
            seeded.email = format!("{}-{}", i, email);
            store.create(seeded).await.unwrap();
        }

        for i in 0..25 {
            let found = store
                .find_by_username("t1", &format!("member{}", i))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(found.id, format!("u{}", i));
        }
    }

    #[tokio::test]
    async fn test_soft_deleted_user_is_invisible() {
        let store = InMemoryUserStore::new();
        store.create(user("t1", "u1", "alice")).await.unwrap();
        store.soft_delete("t1", "u1", Utc::now()).await.unwrap();

        assert!(store.find("t1", "u1").await.unwrap().is_none());
        assert!(store
            .find_by_username("t1", "alice")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_soft_deleted_tenant_is_invisible() {
        let store = InMemoryTenantStore::new();
        let now = Utc::now();
        store
            .create(Tenant {
                id: "t1".to_string(),
                name: "Tenant One".to_string(),
                owner_id: "u1".to_string(),
                status: TenantStatus::Active,
                config: TenantConfig::default(),
                settings: HashMap::new(),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            })
            .await
            .unwrap();

        store.soft_delete("t1", now).await.unwrap();
        assert!(store.find("t1").await.unwrap().is_none());
    }
}
