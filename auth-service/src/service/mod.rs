//! # Service Layer
//!
//! The core subsystems of the platform. Each service orchestrates the
//! repository layer (store contracts) below it and is consumed by the
//! API layer above.
//!
//! ## Subsystems
//!
//! | Module | Subsystem |
//! |--------|-----------|
//! | [`config_resolver`] | Effective-configuration resolution (app → tenant → global) |
//! | [`credential_service`] | Password login + lockout, change, reset, identity linking |
//! | [`apikey_service`] | API-key lifecycle (generate, verify, rotate, revoke) |
//! | [`token_service`] | Token manager: issue, verify, revoke, refresh rotation |
//! | [`identity_service`] | Subject extraction, provider composition, identity cache |
//! | [`authz_service`] | RBAC checks + policy evaluation with combining algorithms |
//! | [`audit_service`] | Non-blocking audit emission over a bounded queue |
//! | [`mailer`] | Email delivery collaborator (`send(message)`) |

pub mod apikey_service;
pub mod audit_service;
pub mod authz_service;
pub mod config_resolver;
pub mod credential_service;
pub mod identity_service;
pub mod mailer;
pub mod token_service;

pub use apikey_service::ApiKeyService;
pub use audit_service::AuditEmitter;
pub use authz_service::{AuthorizationService, CombiningAlgorithm};
pub use config_resolver::EffectiveConfigResolver;
pub use credential_service::CredentialService;
pub use identity_service::{ContextBuilder, IdentityCache, IdentityProviders};
pub use mailer::{Mailer, TracingMailer};
pub use token_service::{ReusePolicy, TokenManager};
