//! # Audit Event Taxonomy
//!
//! Every security-relevant action in the platform emits exactly one
//! structured [`AuditEvent`] with an action from the closed
//! [`AuditAction`] set. The emitter in
//! [`service::audit_service`](crate::service::audit_service) enqueues
//! events without blocking the request path; this module defines only
//! the contract.
//!
//! ## Action Groups
//!
//! | Group | Actions |
//! |-------|---------|
//! | Sessions | `login`, `logout`, `login_failed`, `register` |
//! | Credentials | `password_change`, `password_reset` |
//! | Tokens | `token_refresh`, `token_revoke`, `token_reuse_detected` |
//! | Authorization | `authz_check`, `authz_deny` |
//! | CRUD | `create`, `read`, `update`, `delete`, `list` |
//! | Accounts | `account_lock`, `account_unlock`, `account_suspend`, `account_activate` |
//! | Grants | `role_assign`, `role_revoke`, `permission_grant`, `permission_revoke` |
//! | Administration | `ownership_transfer`, `config_update` |
//!
//! `token_reuse_detected` is the security event: a refresh token
//! presented after it was already consumed by rotation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// =============================================================================
// Actions
// =============================================================================

/// The closed set of auditable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Logout,
    LoginFailed,
    Register,
    PasswordChange,
    PasswordReset,
    TokenRefresh,
    TokenRevoke,
    TokenReuseDetected,
    AuthzCheck,
    AuthzDeny,
    Create,
    Read,
    Update,
    Delete,
    List,
    AccountLock,
    AccountUnlock,
    AccountSuspend,
    AccountActivate,
    RoleAssign,
    RoleRevoke,
    PermissionGrant,
    PermissionRevoke,
    OwnershipTransfer,
    ConfigUpdate,
}

impl AuditAction {
    /// The snake_case wire label, also used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::LoginFailed => "login_failed",
            Self::Register => "register",
            Self::PasswordChange => "password_change",
            Self::PasswordReset => "password_reset",
            Self::TokenRefresh => "token_refresh",
            Self::TokenRevoke => "token_revoke",
            Self::TokenReuseDetected => "token_reuse_detected",
            Self::AuthzCheck => "authz_check",
            Self::AuthzDeny => "authz_deny",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::AccountLock => "account_lock",
            Self::AccountUnlock => "account_unlock",
            Self::AccountSuspend => "account_suspend",
            Self::AccountActivate => "account_activate",
            Self::RoleAssign => "role_assign",
            Self::RoleRevoke => "role_revoke",
            Self::PermissionGrant => "permission_grant",
            Self::PermissionRevoke => "permission_revoke",
            Self::OwnershipTransfer => "ownership_transfer",
            Self::ConfigUpdate => "config_update",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Event
// =============================================================================

/// One structured audit record.
///
/// Construct with [`AuditEvent::new`] and chain the `with_*` builders
/// for whatever context the emitting site has:
///
/// ```rust,ignore
/// let event = AuditEvent::new(AuditAction::LoginFailed, "user", "credential")
///     .with_tenant("t1")
///     .with_app("a1")
///     .failure("invalid credentials");
/// audit.emit(event);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id
    pub id: String,
    pub tenant_id: Option<String>,
    pub app_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// What happened
    pub action: AuditAction,
    /// Kind of resource acted on (e.g. "user", "app_key", "policy")
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// HTTP method, when emitted from a handler
    pub method: Option<String>,
    /// Request path, when emitted from a handler
    pub path: Option<String>,
    pub status_code: Option<u16>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Emitting subsystem ("credential", "token", "apikey", "authz", "config")
    pub source: String,
    pub success: bool,
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Creates a successful event; flip with [`failure`](Self::failure).
    pub fn new(
        action: AuditAction,
        resource_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: None,
            app_id: None,
            user_id: None,
            session_id: None,
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            method: None,
            path: None,
            status_code: None,
            ip: None,
            user_agent: None,
            source: source.into(),
            success: true,
            error_message: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_app(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_client(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Marks the event as failed with an operator-facing message.
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error.into());
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_labels_are_snake_case() {
        assert_eq!(AuditAction::LoginFailed.as_str(), "login_failed");
        assert_eq!(
            AuditAction::TokenReuseDetected.as_str(),
            "token_reuse_detected"
        );
        assert_eq!(AuditAction::AuthzDeny.as_str(), "authz_deny");
        assert_eq!(AuditAction::ConfigUpdate.as_str(), "config_update");
    }

    #[test]
    fn test_action_serializes_to_label() {
        let json = serde_json::to_string(&AuditAction::TokenReuseDetected).unwrap();
        assert_eq!(json, "\"token_reuse_detected\"");
    }

    #[test]
    fn test_builder_composes_context() {
        let event = AuditEvent::new(AuditAction::LoginFailed, "user", "credential")
            .with_tenant("t1")
            .with_app("a1")
            .with_client(Some("203.0.113.9".to_string()), None)
            .failure("invalid credentials");

        assert_eq!(event.tenant_id.as_deref(), Some("t1"));
        assert_eq!(event.app_id.as_deref(), Some("a1"));
        assert_eq!(event.ip.as_deref(), Some("203.0.113.9"));
        assert!(!event.success);
        assert_eq!(event.error_message.as_deref(), Some("invalid credentials"));
    }

    #[test]
    fn test_events_have_unique_ids() {
        let a = AuditEvent::new(AuditAction::Login, "user", "credential");
        let b = AuditEvent::new(AuditAction::Login, "user", "credential");
        assert_ne!(a.id, b.id);
    }
}
