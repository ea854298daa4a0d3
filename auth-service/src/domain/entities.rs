//! # Platform Domain Entities
//!
//! This module defines the core domain entities of the multi-tenant
//! authentication platform. Entities represent persistent business
//! objects; the stores in [`crate::repository`] own their rows.
//!
//! ## Entity Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Domain Entities                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────┐ 1:N ┌─────────────┐ 1:N ┌──────────┐                      │
//! │  │  Tenant  │────▶│ Application │────▶│  AppKey  │                      │
//! │  └────┬─────┘     └──────┬──────┘     └──────────┘                      │
//! │       │ 1:N              │                                              │
//! │       ▼                  │ tenant+app scoped                            │
//! │  ┌──────────┐            ▼                                              │
//! │  │   User   │     ┌─────────────────────────────────┐                   │
//! │  └────┬─────┘     │ Role  Permission  Policy        │                   │
//! │       │ 1:N       │   └── RolePermission ──┐        │                   │
//! │       ▼           │ UserRole  UserPermission        │                   │
//! │  ┌──────────────┐ │ PermissionComposition (DAG)     │                   │
//! │  │ UserIdentity │ └─────────────────────────────────┘                   │
//! │  │ UserAppAccess│                                                       │
//! │  └──────────────┘                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scoping Rules
//!
//! | Entity | Scope | Unique Key |
//! |--------|-------|------------|
//! | [`Tenant`] | global | `id` |
//! | [`Application`] | tenant | `(tenant_id, id)` |
//! | [`User`] | tenant | `(tenant_id, username)`, `(tenant_id, email)` |
//! | [`UserIdentity`] | tenant | `(tenant_id, provider, provider_external_id)` |
//! | [`AppKey`] | tenant+app | `key_id` (globally unique) |
//! | [`Role`] / [`Permission`] / [`Policy`] | tenant+app | `(tenant_id, app_id, id)` |
//!
//! Groups and profile are tenant-scoped and come from identity providers,
//! not from rows here.
//!
//! ## Security Considerations
//!
//! - **Never expose `password_hash`**: use [`UserProfile`] for API responses
//! - **Never expose `secret_hash`**: the API layer's sanitized key DTO has
//!   no such field, so it cannot leak by construction
//! - **Soft deletes**: `deleted_at` preserves rows for audit trails

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::config::CredentialConfig;
use std::collections::HashMap;

use crate::domain::lockout::LockState;

// =============================================================================
// TENANT
// =============================================================================

/// Tenant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

/// Per-tenant configuration.
///
/// Holds the tenant's default credential configuration; the second link
/// of the app → tenant → global resolution chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Tenant-wide credential defaults. `None` falls through to the
    /// process-wide default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_credentials: Option<CredentialConfig>,
}

/// An isolated organizational unit. Every other entity except the global
/// default configuration is tenant-scoped.
///
/// # Invariants
///
/// - Exactly one `owner_id` per tenant; the owner user's
///   `is_tenant_owner` flag is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Opaque unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// User id of the tenant owner
    pub owner_id: String,
    /// Lifecycle status
    pub status: TenantStatus,
    /// Credential/token defaults for the tenant
    pub config: TenantConfig,
    /// Free-form tenant settings
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
    /// Soft delete marker (None = live row)
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// A tenant can authenticate principals only while active and not
    /// soft-deleted.
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active && self.deleted_at.is_none()
    }
}

// =============================================================================
// APPLICATION
// =============================================================================

/// Application lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Active,
    Disabled,
}

/// Per-application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// App-level credential override. `None` falls through to the tenant
    /// default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialConfig>,
}

/// A tenant-scoped deployment target (web app, mobile app, service) that
/// may override tenant credential defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    /// Opaque identifier, unique within the tenant
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Display name
    pub name: String,
    /// Deployment kind (e.g. "web", "mobile", "service")
    pub app_type: String,
    /// Lifecycle status
    pub status: ApplicationStatus,
    /// App-level configuration overrides
    pub config: ApplicationConfig,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn is_active(&self) -> bool {
        self.status == ApplicationStatus::Active
    }
}

// =============================================================================
// USER
// =============================================================================

/// User lifecycle status.
///
/// `Locked` is reached through the lockout state machine in
/// [`lockout`](crate::domain::lockout); the other transitions are
/// administrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
    Deleted,
    Locked,
}

/// A human principal within a tenant.
///
/// `(tenant_id, username)` and `(tenant_id, email)` are unique. A user
/// may have no password hash at all (external-identity-only accounts).
///
/// # Lockout Fields
///
/// The lockout counters and timestamps form the state the lockout
/// machine transitions over. The user row is the serialization point:
/// stores must apply failure/success/unlock transitions atomically with
/// respect to concurrent login attempts for the same user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Opaque unique identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Login name, unique within the tenant
    pub username: String,
    /// Email address, unique within the tenant
    pub email: String,
    /// Display name
    pub full_name: String,
    /// True for the tenant's owner account
    pub is_tenant_owner: bool,
    /// Argon2id hash in PHC format; `None` for external-identity accounts.
    /// Never expose - use [`UserProfile`] for API responses.
    pub password_hash: Option<String>,
    /// Lifecycle status
    pub status: UserStatus,
    /// Consecutive failed login attempts (decays after the configured window)
    pub failed_login_attempts: u32,
    /// Timestamp of the most recent failed attempt
    pub last_failed_login_at: Option<DateTime<Utc>>,
    /// When the current lock was applied
    pub locked_at: Option<DateTime<Utc>>,
    /// Auto-unlock due time; `None` while locked means permanent
    pub locked_until: Option<DateTime<Utc>>,
    /// Times this account has been locked out (drives permanent lock)
    pub lockout_count: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
    /// Soft delete marker (None = live row)
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Computes the lock view of this user at `now`.
    ///
    /// A user is locked iff `status == Locked` OR (`locked_until` is set
    /// AND `now < locked_until`). A temporary lock whose due time has
    /// passed reads as [`LockState::DueAutoUnlock`]; the observing flow
    /// performs the unlock through the store's atomic transition.
    pub fn lock_state(&self, now: DateTime<Utc>) -> LockState {
        match (self.status, self.locked_until) {
            (UserStatus::Locked, None) => LockState::Permanent,
            (UserStatus::Locked, Some(until)) if now < until => LockState::Temporary { until },
            (UserStatus::Locked, Some(_)) => LockState::DueAutoUnlock,
            (_, Some(until)) if now < until => LockState::Temporary { until },
            (_, Some(_)) => LockState::DueAutoUnlock,
            _ => LockState::Unlocked,
        }
    }

    /// A user may authenticate only while active (or due for auto-unlock)
    /// and not soft-deleted.
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active && self.deleted_at.is_none()
    }
}

/// Public user view without sensitive data.
///
/// Use this struct for API responses instead of [`User`]. It excludes
/// `password_hash` and the lockout bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub tenant_id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub is_tenant_owner: bool,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    /// Strips sensitive fields, making the result safe for API responses.
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            is_tenant_owner: user.is_tenant_owner,
            status: user.status,
            created_at: user.created_at,
        }
    }
}

// =============================================================================
// USER APP ACCESS
// =============================================================================

/// Grant status of a user-app access row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Active,
    Revoked,
}

/// Presence of an active row means the user is permitted to use the app;
/// finer-grained authorization is decided by the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAppAccess {
    pub tenant_id: String,
    pub app_id: String,
    pub user_id: String,
    pub status: AccessStatus,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl UserAppAccess {
    pub fn is_active(&self) -> bool {
        self.status == AccessStatus::Active && self.revoked_at.is_none()
    }
}

// =============================================================================
// USER IDENTITY
// =============================================================================

/// A linked external identity (OAuth2 subject, passkey handle, ...).
///
/// Only the post-verification linking step is modeled here; the provider
/// negotiation dance happens elsewhere. `(tenant_id, provider,
/// provider_external_id)` maps to at most one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Opaque unique identifier
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    /// Provider label (e.g. "google", "github")
    pub provider: String,
    /// The provider's stable subject identifier
    pub provider_external_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    /// Whether the provider asserted a verified identity
    pub verified: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// CREDENTIAL PROVIDER
// =============================================================================

/// Generic resource status used by administrative rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Active,
    Disabled,
}

/// A configured credential provider.
///
/// `app_id == None` marks a tenant-level default. Lookup precedence:
/// app-level first, then tenant-level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialProvider {
    pub id: String,
    pub tenant_id: String,
    /// None = tenant-level default provider
    pub app_id: Option<String>,
    /// Provider kind (e.g. "basic", "apikey", "oauth2")
    pub provider_type: String,
    pub name: String,
    pub status: ResourceStatus,
    /// Provider-specific configuration blob
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// APP KEY
// =============================================================================

/// Deployment environment a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEnvironment {
    Live,
    Test,
}

/// A machine credential for an application.
///
/// The plaintext secret exists exactly once: in the composite key string
/// returned at creation. Only `secret_hash` (SHA3-256) is persisted.
///
/// # Usability Invariant
///
/// A key is usable iff `revoked == false` AND (`expires_at` is `None` OR
/// `now < expires_at`) - see [`AppKey::is_usable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppKey {
    /// Opaque row identifier
    pub id: String,
    pub tenant_id: String,
    pub app_id: String,
    /// Public key identifier, globally unique, free of `_` and `.` so the
    /// composite string parses unambiguously
    pub key_id: String,
    /// Short routing prefix (first characters of `key_id`)
    pub prefix: String,
    /// SHA3-256 hex digest of the secret. Never expose.
    pub secret_hash: String,
    /// Key kind (e.g. "service", "personal")
    pub key_type: String,
    pub environment: KeyEnvironment,
    /// Optional user the key acts for
    pub user_id: Option<String>,
    /// Human-readable label
    pub name: String,
    /// Scope labels attached to the key
    pub scopes: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// None = never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Best-effort usage timestamp
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AppKey {
    /// Usability check: not revoked and not expired at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at.map_or(true, |exp| now < exp)
    }
}

// =============================================================================
// ROLES & PERMISSIONS
// =============================================================================

/// A named role, tenant+app scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub tenant_id: String,
    pub app_id: String,
    pub name: String,
    pub status: ResourceStatus,
}

/// A named permission, tenant+app scoped.
///
/// The `resource:action` naming convention is descriptive only; matching
/// happens on the `resource` and `action` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub tenant_id: String,
    pub app_id: String,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub status: ResourceStatus,
}

/// An edge of the compound-permission DAG: granting `parent_id`
/// transitively grants `child_id`.
///
/// The graph must stay acyclic; expansion is a bounded DFS
/// (depth ≤ [`COMPOSITION_MAX_DEPTH`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionComposition {
    pub parent_id: String,
    pub child_id: String,
    pub tenant_id: String,
    pub app_id: String,
    pub is_required: bool,
    pub priority: i32,
}

/// Depth bound for compound-permission expansion.
pub const COMPOSITION_MAX_DEPTH: usize = 10;

// =============================================================================
// ASSIGNMENTS
// =============================================================================
// An assignment is effective iff revoked_at is None.

/// Role → permission assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermission {
    pub tenant_id: String,
    pub app_id: String,
    pub role_id: String,
    pub permission_id: String,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RolePermission {
    pub fn is_effective(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// User → role assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRole {
    pub tenant_id: String,
    pub app_id: String,
    pub user_id: String,
    pub role_id: String,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl UserRole {
    pub fn is_effective(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// Direct user → permission assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPermission {
    pub tenant_id: String,
    pub app_id: String,
    pub user_id: String,
    pub permission_id: String,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl UserPermission {
    pub fn is_effective(&self) -> bool {
        self.revoked_at.is_none()
    }
}

// =============================================================================
// POLICIES
// =============================================================================

/// Whether an applicable policy allows or denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    Allow,
    Deny,
}

/// Policy lifecycle status; only active policies participate in
/// evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Active,
    Disabled,
}

/// A declarative authorization policy.
///
/// `subjects`, `resources` and `actions` hold literals or glob patterns
/// (`"*"` and `"type:*"`). An empty `app_id` makes the policy
/// tenant-wide. `conditions` maps condition names to expected values,
/// equal-matched against subject attributes and the request environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub tenant_id: String,
    /// Empty string = tenant-wide
    #[serde(default)]
    pub app_id: String,
    pub name: String,
    pub effect: PolicyEffect,
    pub subjects: Vec<String>,
    pub resources: Vec<String>,
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<HashMap<String, serde_json::Value>>,
    pub status: PolicyStatus,
    /// Evaluation order for the first-applicable combining algorithm
    #[serde(default)]
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================
