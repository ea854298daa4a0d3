//! # Gatehouse - Shared Library
//!
//! Cross-cutting functionality for the Gatehouse authentication platform.
//!
//! This crate provides the primitives and utilities the platform service
//! is built from: configuration, error types, crypto primitives, token
//! signing, password hashing, validation and logging.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      auth-service                           │
//! │  ┌──────────┐ ┌─────────┐ ┌──────────┐ ┌──────────────┐     │
//! │  │Credential│ │ Tokens  │ │ Identity │ │Authorization │     │
//! │  └────┬─────┘ └────┬────┘ └────┬─────┘ └──────┬───────┘     │
//! │       └────────────┴─────┬─────┴──────────────┘             │
//! │                          │                                  │
//! │                 ┌────────▼────────┐                         │
//! │                 │  shared crate   │ ◄── You are here        │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose | Key Types |
//! |--------|---------|-----------|
//! | [`config`] | Environment-based configuration + credential config | [`AppConfig`], [`config::CredentialConfig`] |
//! | [`errors`] | Standardized error handling | [`ApiError`], [`ApiResult`] |
//! | [`crypto`] | Random secrets, SHA3-256, constant-time compare | [`crypto::random_secret`](crypto::random_secret) |
//! | [`auth`] | Token signing, password hashing | [`auth::JwtService`], [`auth::PasswordHasher`] |
//! | [`redis_client`] | Revocation-registry backend client | [`redis_client::RedisClient`] |
//! | [`tracing_config`] | Structured logging setup | [`tracing_config::init_tracing`](tracing_config::init_tracing) |
//! | [`validation`] | Request validation helpers | Custom validators |
//!
//! ## Design Decisions
//!
//! 1. **Single source of truth**: shared types live here to prevent drift
//! 2. **Security first**: auth and crypto follow OWASP guidelines;
//!    passwords get the slow KDF, full-entropy secrets get the fast digest
//! 3. **Observable by default**: structured logging and tracing built-in

pub mod auth;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod redis_client;
pub mod tracing_config;
pub mod validation;

// Re-exports for convenience - import commonly used types directly from `shared`
pub use config::AppConfig;
pub use errors::{ApiError, ApiResult};
