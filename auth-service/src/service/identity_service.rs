//! # Identity Resolver & Context Builder
//!
//! Tokens carry identifiers only; this module re-hydrates the full
//! identity per request from authoritative stores.
//!
//! ## Why Re-Hydrate?
//!
//! Embedding roles in access tokens would freeze them for the token
//! lifetime (the "stale role" attack) and blow through header budgets.
//! Rebuilding from providers keeps tokens small and bounds staleness to
//! the identity-cache TTL (5 minutes by default).
//!
//! ## Provider Composition
//!
//! ```text
//! claims ──▶ Subject ──▶ ContextBuilder
//!                            │
//!            ┌───────────────┼──────────────────┬──────────────┐
//!            ▼               ▼                  ▼              ▼
//!      RoleProvider   PermissionProvider  GroupProvider  ProfileProvider
//!      (tenant+app)   (tenant+app,        (tenant)       (tenant)
//!                      incl. compound
//!                      expansion)
//! ```
//!
//! Each provider is a narrow interface per concern; any of them may be
//! absent, in which case its slice of the context is simply empty -
//! never an error. Store-backed implementations live here; swapping in
//! SQL-backed ones touches no caller.
//!
//! ## Caching
//!
//! The optional cache is keyed `(tenant_id, app_id, subject_id)` with a
//! TTL. Misses go through a per-key single-flight so concurrent misses
//! do not stampede the providers. Mutation paths call
//! [`IdentityCache::invalidate`]; stale reads inside the TTL are
//! accepted by design.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use shared::auth::jwt::Claims;
use shared::errors::ApiError;

use crate::domain::{ResourceStatus, COMPOSITION_MAX_DEPTH};
use crate::repository::{
    PermissionStore, RolePermissionStore, RoleStore, UserPermissionStore, UserRoleStore,
    UserStore,
};

// =============================================================================
// Subject Extraction
// =============================================================================

/// How to pull a [`Subject`] out of token claims.
#[derive(Debug, Clone)]
pub struct ClaimMapping {
    /// Claim holding the subject id
    pub id_claim: String,
    /// Claims tried in order for the human-readable principal
    pub principal_claims: Vec<String>,
    /// Subject type label
    pub subject_type: String,
}

impl Default for ClaimMapping {
    fn default() -> Self {
        Self {
            id_claim: "sub".to_string(),
            principal_claims: vec![
                "username".to_string(),
                "email".to_string(),
                "name".to_string(),
            ],
            subject_type: "user".to_string(),
        }
    }
}

/// The authenticated principal extracted from claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    #[serde(rename = "type")]
    pub subject_type: String,
    /// Human-readable principal (username, email, ...)
    pub principal: String,
    /// The full claim map, for condition evaluation
    pub attributes: HashMap<String, serde_json::Value>,
}

/// Extracts a subject using the mapping; falls back to `sub` when the
/// configured claims are absent.
pub fn extract_subject(claims: &Claims, mapping: &ClaimMapping) -> Subject {
    // Attributes = the full claim map
    let attributes: HashMap<String, serde_json::Value> = match serde_json::to_value(claims) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => HashMap::new(),
    };

    let id = attributes
        .get(&mapping.id_claim)
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| claims.sub.clone());

    let principal = mapping
        .principal_claims
        .iter()
        .find_map(|claim| attributes.get(claim).and_then(|v| v.as_str()))
        .map(String::from)
        .unwrap_or_else(|| claims.sub.clone());

    Subject {
        id,
        subject_type: mapping.subject_type.clone(),
        principal,
        attributes,
    }
}

// =============================================================================
// Identity Context
// =============================================================================

/// The fully enriched view of a subject, built on demand per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityContext {
    pub subject: Subject,
    pub tenant_id: String,
    pub app_id: String,
    pub roles: Vec<String>,
    /// Effective permissions: direct + role-derived + compound closure
    pub permissions: Vec<String>,
    pub groups: Vec<String>,
    pub profile: Option<serde_json::Value>,
}

impl IdentityContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }

    pub fn has_all_roles(&self, roles: &[&str]) -> bool {
        roles.iter().all(|role| self.has_role(role))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

// =============================================================================
// Provider Interfaces
// =============================================================================

/// Roles of a subject, tenant+app scoped.
#[async_trait]
pub trait RoleProvider: Send + Sync {
    async fn roles(
        &self,
        tenant_id: &str,
        app_id: &str,
        subject_id: &str,
    ) -> Result<Vec<String>, ApiError>;
}

/// Effective permissions of a subject, tenant+app scoped.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn permissions(
        &self,
        tenant_id: &str,
        app_id: &str,
        subject_id: &str,
    ) -> Result<Vec<String>, ApiError>;
}

/// Group memberships, tenant scoped.
#[async_trait]
pub trait GroupProvider: Send + Sync {
    async fn groups(&self, tenant_id: &str, subject_id: &str) -> Result<Vec<String>, ApiError>;
}

/// Profile payload, tenant scoped.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn profile(
        &self,
        tenant_id: &str,
        subject_id: &str,
    ) -> Result<Option<serde_json::Value>, ApiError>;
}

/// The provider set a builder composes. Every slot is optional; an
/// absent provider contributes an empty collection.
#[derive(Clone, Default)]
pub struct IdentityProviders {
    pub roles: Option<Arc<dyn RoleProvider>>,
    pub permissions: Option<Arc<dyn PermissionProvider>>,
    pub groups: Option<Arc<dyn GroupProvider>>,
    pub profile: Option<Arc<dyn ProfileProvider>>,
}

// =============================================================================
// Store-Backed Providers
// =============================================================================

/// [`RoleProvider`] over the user-role assignment store.
pub struct StoreRoleProvider {
    user_roles: Arc<dyn UserRoleStore>,
    roles: Arc<dyn RoleStore>,
}

impl StoreRoleProvider {
    pub fn new(user_roles: Arc<dyn UserRoleStore>, roles: Arc<dyn RoleStore>) -> Self {
        Self { user_roles, roles }
    }
}

#[async_trait]
impl RoleProvider for StoreRoleProvider {
    async fn roles(
        &self,
        tenant_id: &str,
        app_id: &str,
        subject_id: &str,
    ) -> Result<Vec<String>, ApiError> {
        let assignments = self
            .user_roles
            .list_for_user(tenant_id, app_id, subject_id)
            .await?;

        let mut names = BTreeSet::new();
        for assignment in assignments.iter().filter(|a| a.is_effective()) {
            if let Some(role) = self.roles.find(tenant_id, app_id, &assignment.role_id).await? {
                if role.status == ResourceStatus::Active {
                    names.insert(role.name);
                }
            }
        }
        Ok(names.into_iter().collect())
    }
}

/// [`PermissionProvider`] composing direct grants, role-derived grants,
/// and the compound-permission closure.
pub struct StorePermissionProvider {
    user_permissions: Arc<dyn UserPermissionStore>,
    user_roles: Arc<dyn UserRoleStore>,
    role_permissions: Arc<dyn RolePermissionStore>,
    permissions: Arc<dyn PermissionStore>,
}

impl StorePermissionProvider {
    pub fn new(
        user_permissions: Arc<dyn UserPermissionStore>,
        user_roles: Arc<dyn UserRoleStore>,
        role_permissions: Arc<dyn RolePermissionStore>,
        permissions: Arc<dyn PermissionStore>,
    ) -> Self {
        Self {
            user_permissions,
            user_roles,
            role_permissions,
            permissions,
        }
    }

    /// Expands seed permission ids through the composition DAG.
    ///
    /// Bounded DFS: nodes deeper than [`COMPOSITION_MAX_DEPTH`] edges
    /// from a seed are not expanded; the visited set makes revisits
    /// (and any cycle that slipped past the write-side check) harmless.
    async fn expand_closure(
        &self,
        tenant_id: &str,
        app_id: &str,
        seeds: BTreeSet<String>,
    ) -> Result<BTreeSet<String>, ApiError> {
        let mut closure = BTreeSet::new();
        let mut stack: Vec<(String, usize)> = seeds.into_iter().map(|id| (id, 0)).collect();

        while let Some((id, depth)) = stack.pop() {
            if !closure.insert(id.clone()) {
                continue;
            }
            if depth >= COMPOSITION_MAX_DEPTH {
                continue;
            }
            for edge in self.permissions.children_of(tenant_id, app_id, &id).await? {
                stack.push((edge.child_id, depth + 1));
            }
        }

        Ok(closure)
    }
}

#[async_trait]
impl PermissionProvider for StorePermissionProvider {
    async fn permissions(
        &self,
        tenant_id: &str,
        app_id: &str,
        subject_id: &str,
    ) -> Result<Vec<String>, ApiError> {
        let mut seeds = BTreeSet::new();

        // Direct grants
        for assignment in self
            .user_permissions
            .list_for_user(tenant_id, app_id, subject_id)
            .await?
            .iter()
            .filter(|a| a.is_effective())
        {
            seeds.insert(assignment.permission_id.clone());
        }

        // Role-derived grants
        for role_assignment in self
            .user_roles
            .list_for_user(tenant_id, app_id, subject_id)
            .await?
            .iter()
            .filter(|a| a.is_effective())
        {
            for grant in self
                .role_permissions
                .list_for_role(tenant_id, app_id, &role_assignment.role_id)
                .await?
                .iter()
                .filter(|a| a.is_effective())
            {
                seeds.insert(grant.permission_id.clone());
            }
        }

        // Compound closure, then ids -> names
        let closure = self.expand_closure(tenant_id, app_id, seeds).await?;

        let mut names = BTreeSet::new();
        for id in closure {
            if let Some(permission) = self.permissions.find(tenant_id, app_id, &id).await? {
                if permission.status == ResourceStatus::Active {
                    names.insert(permission.name);
                }
            }
        }
        Ok(names.into_iter().collect())
    }
}

/// [`ProfileProvider`] over the user store.
pub struct StoreProfileProvider {
    users: Arc<dyn UserStore>,
}

impl StoreProfileProvider {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl ProfileProvider for StoreProfileProvider {
    async fn profile(
        &self,
        tenant_id: &str,
        subject_id: &str,
    ) -> Result<Option<serde_json::Value>, ApiError> {
        Ok(self.users.find(tenant_id, subject_id).await?.map(|user| {
            serde_json::json!({
                "username": user.username,
                "email": user.email,
                "full_name": user.full_name,
            })
        }))
    }
}

/// [`GroupProvider`] over an in-process membership map.
///
/// There is no group store contract; deployments with a directory plug
/// their own provider in here.
#[derive(Default)]
pub struct StaticGroupProvider {
    memberships: RwLock<HashMap<(String, String), Vec<String>>>,
}

impl StaticGroupProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_groups(&self, tenant_id: &str, subject_id: &str, groups: Vec<String>) {
        self.memberships
            .write()
            .await
            .insert((tenant_id.to_string(), subject_id.to_string()), groups);
    }
}

#[async_trait]
impl GroupProvider for StaticGroupProvider {
    async fn groups(&self, tenant_id: &str, subject_id: &str) -> Result<Vec<String>, ApiError> {
        Ok(self
            .memberships
            .read()
            .await
            .get(&(tenant_id.to_string(), subject_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// Identity Cache
// =============================================================================

type CacheKey = (String, String, String);

struct CachedEntry {
    context: IdentityContext,
    inserted_at: Instant,
}

/// TTL cache for built identity contexts with per-key single-flight.
pub struct IdentityCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CachedEntry>>,
    flights: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl IdentityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    async fn get(&self, key: &CacheKey) -> Option<IdentityContext> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| entry.context.clone())
    }

    async fn insert(&self, key: CacheKey, context: IdentityContext) {
        self.entries.write().await.insert(
            key,
            CachedEntry {
                context,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Per-key build guard: concurrent misses serialize here instead of
    /// stampeding the providers.
    async fn flight(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().await;
        flights.entry(key.clone()).or_default().clone()
    }

    async fn clear_flight(&self, key: &CacheKey) {
        self.flights.lock().await.remove(key);
    }

    /// Drops the cached context for one subject; called on role,
    /// permission, or assignment mutations.
    pub async fn invalidate(&self, tenant_id: &str, app_id: &str, subject_id: &str) {
        self.entries.write().await.remove(&(
            tenant_id.to_string(),
            app_id.to_string(),
            subject_id.to_string(),
        ));
    }
}

// =============================================================================
// Context Builder
// =============================================================================

/// Builds [`IdentityContext`]s from verified claims.
pub struct ContextBuilder {
    providers: IdentityProviders,
    cache: Option<IdentityCache>,
    mapping: ClaimMapping,
}

impl ContextBuilder {
    pub fn new(
        providers: IdentityProviders,
        cache: Option<IdentityCache>,
        mapping: ClaimMapping,
    ) -> Self {
        Self {
            providers,
            cache,
            mapping,
        }
    }

    /// Access to the cache for mutation-path invalidation.
    pub fn cache(&self) -> Option<&IdentityCache> {
        self.cache.as_ref()
    }

    /// Builds the context for the claims' subject, consulting the cache
    /// when enabled.
    pub async fn build(&self, claims: &Claims) -> Result<IdentityContext, ApiError> {
        let subject = extract_subject(claims, &self.mapping);
        let tenant_id = claims.tenant_id.clone();
        let app_id = claims.app_id.clone().unwrap_or_default();

        let Some(cache) = &self.cache else {
            return self.build_uncached(subject, tenant_id, app_id).await;
        };

        let key = (tenant_id.clone(), app_id.clone(), subject.id.clone());
        if let Some(context) = cache.get(&key).await {
            return Ok(context);
        }

        // Miss: serialize concurrent builders for this key
        let flight = cache.flight(&key).await;
        let _guard = flight.lock().await;

        // Another flight may have filled the cache while we waited
        if let Some(context) = cache.get(&key).await {
            cache.clear_flight(&key).await;
            return Ok(context);
        }

        let result = self.build_uncached(subject, tenant_id, app_id).await;
        if let Ok(ref context) = result {
            cache.insert(key.clone(), context.clone()).await;
        }
        cache.clear_flight(&key).await;
        result
    }

    async fn build_uncached(
        &self,
        subject: Subject,
        tenant_id: String,
        app_id: String,
    ) -> Result<IdentityContext, ApiError> {
        // Roles and permissions are tenant+app scoped
        let roles = match &self.providers.roles {
            Some(provider) => provider.roles(&tenant_id, &app_id, &subject.id).await?,
            None => Vec::new(),
        };
        let permissions = match &self.providers.permissions {
            Some(provider) => provider.permissions(&tenant_id, &app_id, &subject.id).await?,
            None => Vec::new(),
        };
        // Groups and profile are tenant scoped
        let groups = match &self.providers.groups {
            Some(provider) => provider.groups(&tenant_id, &subject.id).await?,
            None => Vec::new(),
        };
        let profile = match &self.providers.profile {
            Some(provider) => provider.profile(&tenant_id, &subject.id).await?,
            None => None,
        };

        Ok(IdentityContext {
            subject,
            tenant_id,
            app_id,
            roles,
            permissions,
            groups,
            profile,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Permission, PermissionComposition, Role, RolePermission, UserPermission, UserRole,
    };
    use crate::repository::memory::{
        InMemoryPermissionStore, InMemoryRolePermissionStore, InMemoryRoleStore,
        InMemoryUserPermissionStore, InMemoryUserRoleStore,
    };
    use chrono::Utc;
    use shared::auth::jwt::TokenType;
    use uuid::Uuid;

    fn claims(sub: &str) -> Claims {
        let mut extra = HashMap::new();
        extra.insert("username".to_string(), serde_json::json!("alice"));
        extra.insert("email".to_string(), serde_json::json!("alice@t1.example"));
        Claims {
            sub: sub.to_string(),
            tenant_id: "t1".to_string(),
            app_id: Some("a1".to_string()),
            token_type: TokenType::Access,
            iss: "gatehouse".to_string(),
            aud: "gatehouse-api".to_string(),
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
            iat: Utc::now().timestamp(),
            jti: Uuid::new_v4(),
            extra,
        }
    }

    struct AuthzFixture {
        roles: Arc<InMemoryRoleStore>,
        permissions: Arc<InMemoryPermissionStore>,
        role_permissions: Arc<InMemoryRolePermissionStore>,
        user_roles: Arc<InMemoryUserRoleStore>,
        user_permissions: Arc<InMemoryUserPermissionStore>,
    }

    impl AuthzFixture {
        fn new() -> Self {
            Self {
                roles: Arc::new(InMemoryRoleStore::new()),
                permissions: Arc::new(InMemoryPermissionStore::new()),
                role_permissions: Arc::new(InMemoryRolePermissionStore::new()),
                user_roles: Arc::new(InMemoryUserRoleStore::new()),
                user_permissions: Arc::new(InMemoryUserPermissionStore::new()),
            }
        }

        fn providers(&self) -> IdentityProviders {
            IdentityProviders {
                roles: Some(Arc::new(StoreRoleProvider::new(
                    self.user_roles.clone(),
                    self.roles.clone(),
                ))),
                permissions: Some(Arc::new(StorePermissionProvider::new(
                    self.user_permissions.clone(),
                    self.user_roles.clone(),
                    self.role_permissions.clone(),
                    self.permissions.clone(),
                ))),
                groups: None,
                profile: None,
            }
        }

        async fn add_role(&self, id: &str, name: &str) {
            self.roles
                .create(Role {
                    id: id.to_string(),
                    tenant_id: "t1".to_string(),
                    app_id: "a1".to_string(),
                    name: name.to_string(),
                    status: ResourceStatus::Active,
                })
                .await
                .unwrap();
        }

        async fn add_permission(&self, id: &str, name: &str) {
            self.permissions
                .create(Permission {
                    id: id.to_string(),
                    tenant_id: "t1".to_string(),
                    app_id: "a1".to_string(),
                    name: name.to_string(),
                    resource: name.split(':').next().unwrap_or(name).to_string(),
                    action: name.split(':').nth(1).unwrap_or("*").to_string(),
                    status: ResourceStatus::Active,
                })
                .await
                .unwrap();
        }

        async fn grant_role(&self, user: &str, role: &str) {
            self.user_roles
                .grant(UserRole {
                    tenant_id: "t1".to_string(),
                    app_id: "a1".to_string(),
                    user_id: user.to_string(),
                    role_id: role.to_string(),
                    granted_at: Utc::now(),
                    revoked_at: None,
                })
                .await
                .unwrap();
        }

        async fn grant_role_permission(&self, role: &str, permission: &str) {
            self.role_permissions
                .grant(RolePermission {
                    tenant_id: "t1".to_string(),
                    app_id: "a1".to_string(),
                    role_id: role.to_string(),
                    permission_id: permission.to_string(),
                    granted_at: Utc::now(),
                    revoked_at: None,
                })
                .await
                .unwrap();
        }

        async fn grant_user_permission(&self, user: &str, permission: &str) {
            self.user_permissions
                .grant(UserPermission {
                    tenant_id: "t1".to_string(),
                    app_id: "a1".to_string(),
                    user_id: user.to_string(),
                    permission_id: permission.to_string(),
                    granted_at: Utc::now(),
                    revoked_at: None,
                })
                .await
                .unwrap();
        }

        async fn compose(&self, parent: &str, child: &str) {
            self.permissions
                .add_composition(PermissionComposition {
                    parent_id: parent.to_string(),
                    child_id: child.to_string(),
                    tenant_id: "t1".to_string(),
                    app_id: "a1".to_string(),
                    is_required: true,
                    priority: 0,
                })
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_subject_extraction_defaults() {
        let subject = extract_subject(&claims("u1"), &ClaimMapping::default());

        assert_eq!(subject.id, "u1");
        assert_eq!(subject.subject_type, "user");
        // Principal: first of username|email|name
        assert_eq!(subject.principal, "alice");
        // Attributes carry the full claim map
        assert_eq!(subject.attributes["tenant_id"], "t1");
        assert_eq!(subject.attributes["email"], "alice@t1.example");
    }

    #[test]
    fn test_subject_principal_falls_back_to_sub() {
        let mut bare = claims("u1");
        bare.extra.clear();

        let subject = extract_subject(&bare, &ClaimMapping::default());
        assert_eq!(subject.principal, "u1");
    }

    #[tokio::test]
    async fn test_missing_providers_yield_empty_context() {
        let builder = ContextBuilder::new(
            IdentityProviders::default(),
            None,
            ClaimMapping::default(),
        );

        let context = builder.build(&claims("u1")).await.unwrap();
        assert!(context.roles.is_empty());
        assert!(context.permissions.is_empty());
        assert!(context.groups.is_empty());
        assert!(context.profile.is_none());
    }

    #[tokio::test]
    async fn test_roles_exclude_revoked_assignments() {
        let f = AuthzFixture::new();
        f.add_role("r-admin", "admin").await;
        f.add_role("r-editor", "editor").await;
        f.grant_role("u1", "r-admin").await;
        f.grant_role("u1", "r-editor").await;
        f.user_roles
            .revoke("t1", "a1", "u1", "r-editor", Utc::now())
            .await
            .unwrap();

        let builder = ContextBuilder::new(f.providers(), None, ClaimMapping::default());
        let context = builder.build(&claims("u1")).await.unwrap();

        assert_eq!(context.roles, vec!["admin".to_string()]);
        assert!(context.has_role("admin"));
        assert!(!context.has_role("editor"));
        assert!(context.has_any_role(&["editor", "admin"]));
        assert!(!context.has_all_roles(&["editor", "admin"]));
    }

    #[tokio::test]
    async fn test_compound_permission_grants_full_closure() {
        let f = AuthzFixture::new();
        f.add_permission("p-all", "admin:all").await;
        f.add_permission("p-read", "doc:read").await;
        f.add_permission("p-write", "doc:write").await;
        f.add_permission("p-delete", "doc:delete").await;
        f.compose("p-all", "p-read").await;
        f.compose("p-all", "p-write").await;
        f.compose("p-all", "p-delete").await;

        // Alice holds only the compound permission
        f.grant_user_permission("u1", "p-all").await;

        let builder = ContextBuilder::new(f.providers(), None, ClaimMapping::default());
        let context = builder.build(&claims("u1")).await.unwrap();

        assert!(context.has_permission("doc:write"));
        for name in ["admin:all", "doc:read", "doc:write", "doc:delete"] {
            assert!(
                context.permissions.contains(&name.to_string()),
                "missing {}",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_role_derived_permissions_are_included() {
        let f = AuthzFixture::new();
        f.add_role("r-editor", "editor").await;
        f.add_permission("p-write", "doc:write").await;
        f.grant_role("u1", "r-editor").await;
        f.grant_role_permission("r-editor", "p-write").await;

        let builder = ContextBuilder::new(f.providers(), None, ClaimMapping::default());
        let context = builder.build(&claims("u1")).await.unwrap();

        assert!(context.has_permission("doc:write"));
    }

    #[tokio::test]
    async fn test_composition_depth_is_bounded() {
        let f = AuthzFixture::new();

        // A chain p0 -> p1 -> ... -> p11, one edge deeper than the bound
        for i in 0..=11 {
            f.add_permission(&format!("p{}", i), &format!("level:{}", i)).await;
        }
        for i in 0..11 {
            f.compose(&format!("p{}", i), &format!("p{}", i + 1)).await;
        }
        f.grant_user_permission("u1", "p0").await;

        let builder = ContextBuilder::new(f.providers(), None, ClaimMapping::default());
        let context = builder.build(&claims("u1")).await.unwrap();

        // Depth 10 is reachable, depth 11 is cut off
        assert!(context.has_permission("level:10"));
        assert!(!context.has_permission("level:11"));
    }

    #[tokio::test]
    async fn test_cache_bounds_staleness_until_invalidated() {
        let f = AuthzFixture::new();
        f.add_role("r-admin", "admin").await;

        let builder = ContextBuilder::new(
            f.providers(),
            Some(IdentityCache::new(Duration::from_secs(300))),
            ClaimMapping::default(),
        );

        // First build: no roles yet
        let before = builder.build(&claims("u1")).await.unwrap();
        assert!(before.roles.is_empty());

        // Grant lands, but the cached context is served inside the TTL
        f.grant_role("u1", "r-admin").await;
        let stale = builder.build(&claims("u1")).await.unwrap();
        assert!(stale.roles.is_empty());

        // Invalidation on the mutation path makes the next build fresh
        builder.cache().unwrap().invalidate("t1", "a1", "u1").await;
        let fresh = builder.build(&claims("u1")).await.unwrap();
        assert_eq!(fresh.roles, vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_builds_agree() {
        let f = AuthzFixture::new();
        f.add_role("r-admin", "admin").await;
        f.grant_role("u1", "r-admin").await;

        let builder = Arc::new(ContextBuilder::new(
            f.providers(),
            Some(IdentityCache::new(Duration::from_secs(300))),
            ClaimMapping::default(),
        ));

        let c = claims("u1");
        let (a, b) = tokio::join!(builder.build(&c), builder.build(&c));
        assert_eq!(a.unwrap().roles, b.unwrap().roles);
    }

    #[tokio::test]
    async fn test_static_group_provider() {
        let groups = StaticGroupProvider::new();
        groups
            .set_groups("t1", "u1", vec!["engineering".to_string()])
            .await;

        let builder = ContextBuilder::new(
            IdentityProviders {
                groups: Some(Arc::new(groups)),
                ..Default::default()
            },
            None,
            ClaimMapping::default(),
        );

        let context = builder.build(&claims("u1")).await.unwrap();
        assert_eq!(context.groups, vec!["engineering".to_string()]);
    }
}
