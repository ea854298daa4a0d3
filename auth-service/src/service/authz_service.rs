//! # Authorization Evaluator
//!
//! Role checks, permission checks, and the declarative policy engine
//! with its combining algorithms.
//!
//! ## Decision Pipeline
//!
//! ```text
//! AuthorizationRequest + IdentityContext
//!         │
//!         ▼
//! load policies (tenant+app exact, plus tenant-wide)
//!         │
//!         ▼
//! filter applicable:  status active
//!                     subject  ∈ {*, id, role, group}
//!                     resource ∈ {*, type:id, type:*}
//!                     action   ∈ {*, exact}
//!                     conditions equal-match attributes/environment
//!         │
//!         ▼
//! combine: deny-overrides (default) | allow-overrides | first-applicable
//! ```
//!
//! ## Failure Semantics
//!
//! The evaluator **never returns allow on error**. A store failure or
//! condition-evaluation error surfaces as deny with reason
//! `evaluator error: …` plus an `authz_deny` audit event.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::errors::ApiError;

use crate::domain::{AuditAction, AuditEvent, Policy, PolicyEffect, PolicyStatus};
use crate::repository::{PolicyStore, UserAppAccessStore};
use crate::service::audit_service::AuditEmitter;
use crate::service::identity_service::IdentityContext;

// =============================================================================
// Request & Decision
// =============================================================================

/// One authorization question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Kind of resource (e.g. "doc")
    pub resource_type: String,
    /// Specific resource, when addressing one (e.g. "secret")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Requested action (e.g. "read")
    pub action: String,
    /// Request-time environment for condition evaluation
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

/// The answer, always with a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    pub allow: bool,
    pub reason: String,
}

impl AuthorizationDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allow: true,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: reason.into(),
        }
    }
}

/// How conflicting applicable policies are reduced to one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombiningAlgorithm {
    /// Any applicable deny wins; otherwise any allow; otherwise deny.
    #[default]
    DenyOverrides,
    /// Any applicable allow wins; otherwise any deny; otherwise deny.
    AllowOverrides,
    /// Policies ordered by (priority, created_at) ascending; the first
    /// applicable one decides.
    FirstApplicable,
}

// =============================================================================
// Service
// =============================================================================

/// The authorization evaluator.
pub struct AuthorizationService {
    policies: Arc<dyn PolicyStore>,
    app_access: Arc<dyn UserAppAccessStore>,
    algorithm: CombiningAlgorithm,
    audit: AuditEmitter,
}

impl AuthorizationService {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        app_access: Arc<dyn UserAppAccessStore>,
        algorithm: CombiningAlgorithm,
        audit: AuditEmitter,
    ) -> Self {
        Self {
            policies,
            app_access,
            algorithm,
            audit,
        }
    }

    // =========================================================================
    // RBAC Checks
    // =========================================================================

    /// Direct role check against the identity.
    pub fn require_role(identity: &IdentityContext, role: &str) -> AuthorizationDecision {
        if identity.has_role(role) {
            AuthorizationDecision::allow(format!("has role: {}", role))
        } else {
            AuthorizationDecision::deny(format!("missing role: {}", role))
        }
    }

    /// Direct permission check against the (post-composition) effective
    /// permission set.
    pub fn require_permission(
        identity: &IdentityContext,
        permission: &str,
    ) -> AuthorizationDecision {
        if identity.has_permission(permission) {
            AuthorizationDecision::allow(format!("has permission: {}", permission))
        } else {
            AuthorizationDecision::deny(format!("missing permission: {}", permission))
        }
    }

    // =========================================================================
    // Policy Evaluation
    // =========================================================================

    /// Evaluates the applicable policies for this identity and request.
    ///
    /// Infallible by design: errors become deny decisions.
    pub async fn evaluate(
        &self,
        identity: &IdentityContext,
        request: &AuthorizationRequest,
    ) -> AuthorizationDecision {
        let decision = match self.evaluate_inner(identity, request).await {
            Ok(decision) => decision,
            Err(e) => AuthorizationDecision::deny(format!("evaluator error: {}", e)),
        };

        let action = if decision.allow {
            AuditAction::AuthzCheck
        } else {
            AuditAction::AuthzDeny
        };
        let mut event = AuditEvent::new(action, request.resource_type.clone(), "authz")
            .with_tenant(identity.tenant_id.clone())
            .with_user(identity.subject.id.clone())
            .with_metadata("action", serde_json::json!(request.action))
            .with_metadata("reason", serde_json::json!(decision.reason));
        if !identity.app_id.is_empty() {
            event = event.with_app(identity.app_id.clone());
        }
        if let Some(ref resource_id) = request.resource_id {
            event = event.with_resource(resource_id.clone());
        }
        if !decision.allow {
            event = event.failure(decision.reason.clone());
        }
        self.audit.emit(event);

        decision
    }

    async fn evaluate_inner(
        &self,
        identity: &IdentityContext,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationDecision, ApiError> {
        // An explicitly revoked app-access grant overrides any policy.
        // No row at all is not a denial - presence of an *active* row is
        // what grants app entry, refinements are decided by policies.
        if !identity.app_id.is_empty() {
            if let Some(access) = self
                .app_access
                .find(&identity.tenant_id, &identity.app_id, &identity.subject.id)
                .await?
            {
                if !access.is_active() {
                    return Ok(AuthorizationDecision::deny(format!(
                        "app access revoked: {}",
                        identity.subject.id
                    )));
                }
            }
        }

        let mut policies = self
            .policies
            .list_for_scope(&identity.tenant_id, &identity.app_id)
            .await?;

        // Deterministic order: priority, then age, then id
        policies.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let applicable: Vec<&Policy> = policies
            .iter()
            .filter(|policy| Self::is_applicable(policy, identity, request))
            .collect();

        Ok(Self::combine(self.algorithm, &applicable))
    }

    /// Whether a policy applies to this request.
    fn is_applicable(
        policy: &Policy,
        identity: &IdentityContext,
        request: &AuthorizationRequest,
    ) -> bool {
        if policy.status != PolicyStatus::Active {
            return false;
        }

        // Subjects: "*", the subject id, or any role/group the subject
        // holds (policies may reference principals or roles alike)
        let subject_match = policy.subjects.iter().any(|entry| {
            entry == "*"
                || *entry == identity.subject.id
                || identity.has_role(entry)
                || identity.groups.iter().any(|g| g == entry)
        });
        if !subject_match {
            return false;
        }

        // Resources: "*", "type:id" literal, or "type:*" wildcard
        let type_wildcard = format!("{}:*", request.resource_type);
        let literal = request
            .resource_id
            .as_ref()
            .map(|id| format!("{}:{}", request.resource_type, id));
        let resource_match = policy.resources.iter().any(|entry| {
            entry == "*"
                || *entry == type_wildcard
                || literal.as_ref().is_some_and(|l| entry == l)
        });
        if !resource_match {
            return false;
        }

        // Actions: "*" or exact
        let action_match = policy
            .actions
            .iter()
            .any(|entry| entry == "*" || *entry == request.action);
        if !action_match {
            return false;
        }

        // Conditions: every key must equal-match an attribute or an
        // environment value; any mismatch makes the policy inapplicable
        if let Some(ref conditions) = policy.conditions {
            for (key, expected) in conditions {
                let matched = if let Some(env_value) = request.environment.get(key) {
                    Self::value_matches(expected, &serde_json::json!(env_value))
                } else if let Some(attr_value) = identity.subject.attributes.get(key) {
                    Self::value_matches(expected, attr_value)
                } else {
                    false
                };
                if !matched {
                    return false;
                }
            }
        }

        true
    }

    /// Equal-match on JSON values, tolerant of string/scalar encoding
    /// differences ("42" vs 42).
    fn value_matches(expected: &serde_json::Value, actual: &serde_json::Value) -> bool {
        if expected == actual {
            return true;
        }
        match (expected.as_str(), actual.as_str()) {
            (Some(e), None) => e == actual.to_string(),
            (None, Some(a)) => expected.to_string() == a,
            _ => false,
        }
    }

    /// Reduces the applicable set to one decision.
    fn combine(algorithm: CombiningAlgorithm, applicable: &[&Policy]) -> AuthorizationDecision {
        let first_of = |effect: PolicyEffect| {
            applicable.iter().find(|p| p.effect == effect)
        };

        match algorithm {
            CombiningAlgorithm::DenyOverrides => {
                if let Some(deny) = first_of(PolicyEffect::Deny) {
                    return AuthorizationDecision::deny(format!("explicit deny: {}", deny.id));
                }
                if let Some(allow) = first_of(PolicyEffect::Allow) {
                    return AuthorizationDecision::allow(format!("explicit allow: {}", allow.id));
                }
                AuthorizationDecision::deny("no applicable allow policy")
            }
            CombiningAlgorithm::AllowOverrides => {
                if let Some(allow) = first_of(PolicyEffect::Allow) {
                    return AuthorizationDecision::allow(format!("explicit allow: {}", allow.id));
                }
                if let Some(deny) = first_of(PolicyEffect::Deny) {
                    return AuthorizationDecision::deny(format!("explicit deny: {}", deny.id));
                }
                AuthorizationDecision::deny("no applicable allow policy")
            }
            CombiningAlgorithm::FirstApplicable => match applicable.first() {
                Some(policy) if policy.effect == PolicyEffect::Allow => {
                    AuthorizationDecision::allow(format!("explicit allow: {}", policy.id))
                }
                Some(policy) => {
                    AuthorizationDecision::deny(format!("explicit deny: {}", policy.id))
                }
                None => AuthorizationDecision::deny("no applicable allow policy"),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
