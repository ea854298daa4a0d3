//! # Application Configuration
//!
//! Centralized configuration management using environment variables.
//!
//! ## How It Works
//!
//! Configuration is loaded from multiple sources in order of precedence:
//!
//! 1. **Default values** - Sensible defaults for development
//! 2. **`.env` file** - Local overrides (git-ignored)
//! 3. **Environment variables** - Docker/K8s configuration
//!
//! ## Environment Variable Format
//!
//! Variables use the `APP_` prefix with `__` as nested separator:
//!
//! ```bash
//! # Server configuration
//! APP_SERVER__HOST=0.0.0.0
//! APP_SERVER__PORT=8080
//!
//! # Token settings (also accepts TOKEN_SECRET directly for Docker compatibility)
//! APP_TOKEN__SECRET=your_secret_key_minimum_32_characters
//! APP_TOKEN__ACCESS_TTL_SECS=3600
//!
//! # Optional Redis-backed revocation registry
//! REDIS_URL=redis://localhost:6379
//! ```
//!
//! ## Configuration Sections
//!
//! | Section | Purpose | See Also |
//! |---------|---------|----------|
//! | `server` | HTTP server settings | Actix-web docs |
//! | `token` | Signing key and token lifetimes | [`auth::jwt`](crate::auth::jwt) module |
//! | `security` | Argon2id cost parameters | [`auth::password`](crate::auth::password) module |
//! | `redis` | Optional revocation-registry backend | [`redis_client`](crate::redis_client) module |
//! | `identity_cache` | Identity-context cache TTL | auth-service identity resolver |
//! | `audit` | Audit queue sizing | auth-service audit emitter |
//! | `default_credentials` | Process-wide credential defaults | [`CredentialConfig`] |
//! | `bootstrap` | Optional seed tenant/app/owner | auth-service startup |
//!
//! ## Credential Configuration Resolution
//!
//! [`CredentialConfig`] is the unit of the app → tenant → global resolution
//! chain. The struct defined here *is* the global default; tenants and apps
//! may carry their own copy that overrides it wholesale for their scope.
//!
//! ## Security Notes
//!
//! - Never commit `.env` files with real secrets
//! - Use strong signing secrets (32+ characters)
//! - In production, use secret management (Vault, AWS Secrets Manager)

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

/// Main application configuration.
///
/// This struct is the root of all configuration. It's designed to be
/// immutable after creation - create once at startup and share via `Arc`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings (host, port, workers)
    #[serde(default)]
    pub server: ServerConfig,

    /// Token signing and lifetime configuration
    #[serde(default)]
    pub token: TokenConfig,

    /// Password-hashing cost parameters
    #[serde(default)]
    pub security: SecurityConfig,

    /// Optional Redis connection for the refresh-token revocation registry.
    /// When absent the in-memory registry backend is used.
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// Identity-context cache settings
    #[serde(default)]
    pub identity_cache: IdentityCacheConfig,

    /// Audit emitter queue settings
    #[serde(default)]
    pub audit: AuditConfig,

    /// Process-wide default credential configuration; the last link of the
    /// app → tenant → global resolution chain.
    #[serde(default)]
    pub default_credentials: CredentialConfig,

    /// Optional seed data created at startup (tenant, app, owner user).
    #[serde(default)]
    pub bootstrap: Option<BootstrapConfig>,

    /// Service name for tracing and logging
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Runtime environment (development/staging/production)
    #[serde(default)]
    pub environment: AppEnvironment,
}

/// HTTP server configuration.
///
/// These settings control how Actix-web binds and scales.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind to.
    /// Default: `0.0.0.0` (all interfaces)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number to listen on.
    /// Default: `8080`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads.
    /// Default: `0` (auto-detect based on CPU cores)
    #[serde(default)]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: 0,
        }
    }
}

/// Token signing configuration.
///
/// Controls token generation and validation.
/// For implementation details, see [`auth::jwt`](crate::auth::jwt).
///
/// ## Security Requirements
///
/// - Access tokens: short-lived (1 hour default)
/// - Refresh tokens: long-lived (30 days default) with single-use rotation
/// - Password-reset tokens: one-shot, 15 minutes
/// - Secret must be at least 32 characters
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Secret key for HMAC signing.
    ///
    /// **Security**: Must be at least 32 characters.
    /// In production, use a cryptographically random string.
    #[serde(default)]
    pub secret: String,

    /// Signing algorithm name. HMAC family only (`HS256`, `HS384`, `HS512`).
    /// Default: `HS256`
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Access token time-to-live in seconds.
    /// Default: `3600` (1 hour)
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,

    /// Refresh token time-to-live in seconds.
    /// Default: `2592000` (30 days)
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,

    /// Password-reset token time-to-live in seconds.
    /// Default: `900` (15 minutes)
    #[serde(default = "default_reset_ttl")]
    pub password_reset_ttl_secs: u64,

    /// Token issuer claim (`iss`).
    /// Default: `gatehouse`
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Token audience claim (`aud`).
    /// Default: `gatehouse-api`
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Response to refresh-token reuse: when true, a detected reuse
    /// revokes the whole token family, forcing re-login on every device
    /// descending from the stolen token. Default: `false`
    #[serde(default)]
    pub revoke_family_on_reuse: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: default_algorithm(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            password_reset_ttl_secs: default_reset_ttl(),
            issuer: default_issuer(),
            audience: default_audience(),
            revoke_family_on_reuse: false,
        }
    }
}

/// Argon2id cost parameters for password hashing.
///
/// The defaults are the OWASP-recommended settings and target roughly
/// 100ms per hash on a single modern core. Raising them is safe; existing
/// hashes keep their embedded parameters and verify unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Memory cost in KiB. Default: `65536` (64 MiB)
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Time cost (iterations). Default: `3`
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Parallelism (lanes). Default: `4`
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
        }
    }
}

/// Redis configuration.
///
/// Used as the pluggable backend of the refresh-token revocation registry.
/// See [`redis_client`](crate::redis_client) for usage.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    /// Format: `redis://[:password@]host:port[/db]`
    pub url: String,
}

/// Identity-context cache configuration.
///
/// The cache bounds staleness of roles/permissions/groups/profile to its
/// TTL; disabling it rebuilds the context from providers on every request.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityCacheConfig {
    /// Whether the cache is enabled. Default: `true`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry time-to-live in seconds. Default: `300` (5 minutes)
    #[serde(default = "default_identity_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for IdentityCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_identity_cache_ttl(),
        }
    }
}

/// Audit emitter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Bounded queue capacity between request handlers and the drain task.
    /// Events beyond this are dropped (counted) rather than blocking.
    /// Default: `1024`
    #[serde(default = "default_audit_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_audit_queue_capacity(),
        }
    }
}

/// Seed data created once at startup when configured.
///
/// Tenants and apps are otherwise created by an administrative flow that
/// is out of scope here; bootstrap gives a fresh deployment one usable
/// tenant, app and owner account.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub tenant_id: String,
    pub tenant_name: String,
    pub app_id: String,
    pub app_name: String,
    pub owner_username: String,
    pub owner_email: String,
    /// Plain-text initial password, hashed at seed time. Dev/test only.
    pub owner_password: String,
}

/// Application runtime environment.
///
/// Affects logging format, security settings, and feature flags.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    /// Local development - verbose logging, relaxed security
    Development,
    /// Pre-production testing
    Staging,
    /// Production - JSON logging, strict security
    Production,
}

impl Default for AppEnvironment {
    fn default() -> Self {
        Self::Development
    }
}

// =============================================================================
// Credential Configuration
// =============================================================================

/// The credential configuration that governs a login attempt.
///
/// One instance applies per scope. Resolution order (first hit wins):
///
/// 1. `app.config.credentials` - app-level override
/// 2. `tenant.config.default_credentials` - tenant default
/// 3. [`CredentialConfig::default()`] - process-wide default
///
/// The global default enables basic auth and API-key auth and disables
/// the mechanisms that require explicit provider setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Permit password login. Default: `true`
    #[serde(default = "default_true")]
    pub enable_basic: bool,

    /// Basic-auth sub-configuration (validation + lockout)
    #[serde(default)]
    pub basic: BasicCredentialConfig,

    /// Permit API-key authentication. Default: `true`
    #[serde(default = "default_true")]
    pub enable_apikey: bool,

    /// API-key sub-configuration
    #[serde(default)]
    pub apikey: ApiKeyCredentialConfig,

    /// Permit OAuth2 logins. Requires explicit provider config. Default: `false`
    #[serde(default)]
    pub enable_oauth2: bool,

    /// Permit passwordless (magic-link) logins. Default: `false`
    #[serde(default)]
    pub enable_passwordless: bool,

    /// Permit passkey (WebAuthn) logins. Default: `false`
    #[serde(default)]
    pub enable_passkey: bool,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            enable_basic: true,
            basic: BasicCredentialConfig::default(),
            enable_apikey: true,
            apikey: ApiKeyCredentialConfig::default(),
            enable_oauth2: false,
            enable_passwordless: false,
            enable_passkey: false,
        }
    }
}

/// Basic-auth (username + password) parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicCredentialConfig {
    /// Minimum username length. Default: `3`
    #[serde(default = "default_min_username_length")]
    pub min_username_length: usize,

    /// Maximum username length. Default: `32`
    #[serde(default = "default_max_username_length")]
    pub max_username_length: usize,

    /// Minimum password length. Default: `8`
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,

    /// Require upper + lower + digit character classes. Default: `true`
    #[serde(default = "default_true")]
    pub require_strong_pwd: bool,

    /// Failed attempts before lockout. Default: `5`
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,

    /// Auto-unlock delay in seconds. Default: `300`
    #[serde(default = "default_lockout_duration")]
    pub lockout_duration_secs: u64,

    /// Failure counter decays after this many seconds without a failed
    /// attempt. Default: `3600`
    #[serde(default = "default_reset_attempts_after")]
    pub reset_attempts_after_secs: u64,

    /// Lockouts before the lock becomes permanent. `0` = never. Default: `0`
    #[serde(default)]
    pub permanent_lock_after: u32,
}

impl Default for BasicCredentialConfig {
    fn default() -> Self {
        Self {
            min_username_length: default_min_username_length(),
            max_username_length: default_max_username_length(),
            min_password_length: default_min_password_length(),
            require_strong_pwd: true,
            max_login_attempts: default_max_login_attempts(),
            lockout_duration_secs: default_lockout_duration(),
            reset_attempts_after_secs: default_reset_attempts_after(),
            permanent_lock_after: 0,
        }
    }
}

/// API-key parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyCredentialConfig {
    /// Secret entropy in bytes. Default: `32` (256 bits)
    #[serde(default = "default_apikey_secret_length")]
    pub secret_length: usize,

    /// Secret hash algorithm. Only `sha3-256` is supported. Default: `sha3-256`
    #[serde(default = "default_apikey_hash_algo")]
    pub hash_algo: String,

    /// Default key lifetime in days. `0` = never expires. Default: `365`
    #[serde(default = "default_apikey_expiry_days")]
    pub default_expiry_days: u32,

    /// Whether callers may create keys without an expiry. Default: `true`
    #[serde(default = "default_true")]
    pub allow_never_expire: bool,
}

impl Default for ApiKeyCredentialConfig {
    fn default() -> Self {
        Self {
            secret_length: default_apikey_secret_length(),
            hash_algo: default_apikey_hash_algo(),
            default_expiry_days: default_apikey_expiry_days(),
            allow_never_expire: true,
        }
    }
}

// =============================================================================
// Credential Configuration Updates (merge semantics)
// =============================================================================

/// Partial update applied to a [`CredentialConfig`] by the admin PUT
/// endpoints.
///
/// Merge rule (one rule per field, applied uniformly):
///
/// - A provided sub-config (`basic`, `apikey`) **replaces** the
///   corresponding sub-config wholly.
/// - A provided bare enable flag flips **only** that flag.
/// - Absent fields leave the current value unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_basic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic: Option<BasicCredentialConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_apikey: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apikey: Option<ApiKeyCredentialConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_oauth2: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_passwordless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_passkey: Option<bool>,
}

impl CredentialConfigUpdate {
    /// Applies this update to `config` in place.
    pub fn apply(&self, config: &mut CredentialConfig) {
        if let Some(v) = self.enable_basic {
            config.enable_basic = v;
        }
        if let Some(ref basic) = self.basic {
            config.basic = basic.clone();
        }
        if let Some(v) = self.enable_apikey {
            config.enable_apikey = v;
        }
        if let Some(ref apikey) = self.apikey {
            config.apikey = apikey.clone();
        }
        if let Some(v) = self.enable_oauth2 {
            config.enable_oauth2 = v;
        }
        if let Some(v) = self.enable_passwordless {
            config.enable_passwordless = v;
        }
        if let Some(v) = self.enable_passkey {
            config.enable_passkey = v;
        }
    }

    /// Returns `true` when the update carries no changes.
    pub fn is_empty(&self) -> bool {
        self.enable_basic.is_none()
            && self.basic.is_none()
            && self.enable_apikey.is_none()
            && self.apikey.is_none()
            && self.enable_oauth2.is_none()
            && self.enable_passwordless.is_none()
            && self.enable_passkey.is_none()
    }
}

// =============================================================================
// Loading
// =============================================================================

impl AppConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Process
    ///
    /// 1. Loads `.env` file if present (silently ignores if missing)
    /// 2. Applies default values
    /// 3. Overrides with `APP_*` environment variables
    /// 4. Applies Docker-compatible overrides (`TOKEN_SECRET`, `REDIS_URL`)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed to expected types
    /// or the token secret is missing/too short.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists (development convenience)
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 0)?
            .set_default("environment", "development")?
            .set_default("service_name", default_service_name())?
            // Load from APP_* environment variables
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Docker-compatible overrides (no prefix)
            .set_override_option("token.secret", std::env::var("TOKEN_SECRET").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("service_name", std::env::var("SERVICE_NAME").ok())?
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;

        if app_config.token.secret.len() < 32 {
            return Err(ConfigError::Message(
                "token.secret must be at least 32 characters (set TOKEN_SECRET)".to_string(),
            ));
        }

        Ok(app_config)
    }

    /// Returns `true` if running in development mode.
    #[inline]
    pub fn is_development(&self) -> bool {
        self.environment == AppEnvironment::Development
    }

    /// Returns `true` if running in production mode.
    #[inline]
    pub fn is_production(&self) -> bool {
        self.environment == AppEnvironment::Production
    }
}

// =============================================================================
// Default Value Functions
// =============================================================================
// These functions provide defaults when env vars are not set.

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_service_name() -> String {
    "gatehouse-auth".to_string()
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_access_ttl() -> u64 {
    3600 // 1 hour
}

fn default_refresh_ttl() -> u64 {
    2_592_000 // 30 days
}

fn default_reset_ttl() -> u64 {
    900 // 15 minutes
}

fn default_issuer() -> String {
    "gatehouse".to_string()
}

fn default_audience() -> String {
    "gatehouse-api".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    64 * 1024
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_identity_cache_ttl() -> u64 {
    300 // 5 minutes
}

fn default_audit_queue_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_min_username_length() -> usize {
    3
}

fn default_max_username_length() -> usize {
    32
}

fn default_min_password_length() -> usize {
    8
}

fn default_max_login_attempts() -> u32 {
    5
}

fn default_lockout_duration() -> u64 {
    300
}

fn default_reset_attempts_after() -> u64 {
    3600
}

fn default_apikey_secret_length() -> usize {
    32
}

fn default_apikey_hash_algo() -> String {
    "sha3-256".to_string()
}

fn default_apikey_expiry_days() -> u32 {
    365
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_environment_is_development() {
        assert_eq!(AppEnvironment::default(), AppEnvironment::Development);
    }

    #[test]
    fn test_global_credential_defaults_match_table() {
        let config = CredentialConfig::default();

        assert!(config.enable_basic);
        assert!(config.enable_apikey);
        assert!(!config.enable_oauth2);
        assert!(!config.enable_passwordless);
        assert!(!config.enable_passkey);

        assert_eq!(config.basic.min_username_length, 3);
        assert_eq!(config.basic.max_username_length, 32);
        assert_eq!(config.basic.min_password_length, 8);
        assert!(config.basic.require_strong_pwd);
        assert_eq!(config.basic.max_login_attempts, 5);
        assert_eq!(config.basic.lockout_duration_secs, 300);
        assert_eq!(config.basic.reset_attempts_after_secs, 3600);
        assert_eq!(config.basic.permanent_lock_after, 0);

        assert_eq!(config.apikey.secret_length, 32);
        assert_eq!(config.apikey.hash_algo, "sha3-256");
        assert_eq!(config.apikey.default_expiry_days, 365);
        assert!(config.apikey.allow_never_expire);
    }

    #[test]
    fn test_update_flag_only_keeps_sub_config() {
        let mut config = CredentialConfig::default();
        config.basic.max_login_attempts = 7;

        let update = CredentialConfigUpdate {
            enable_basic: Some(false),
            ..Default::default()
        };
        update.apply(&mut config);

        // Bare boolean toggle flips only the flag
        assert!(!config.enable_basic);
        assert_eq!(config.basic.max_login_attempts, 7);
    }

    #[test]
    fn test_update_sub_config_replaces_wholly() {
        let mut config = CredentialConfig::default();
        config.basic.max_login_attempts = 7;
        config.basic.min_password_length = 12;

        let update = CredentialConfigUpdate {
            basic: Some(BasicCredentialConfig {
                max_login_attempts: 3,
                ..Default::default()
            }),
            ..Default::default()
        };
        update.apply(&mut config);

        // The whole sub-config is replaced, not field-merged
        assert_eq!(config.basic.max_login_attempts, 3);
        assert_eq!(config.basic.min_password_length, 8);
    }

    #[test]
    fn test_empty_update_changes_nothing() {
        let mut config = CredentialConfig::default();
        let before = config.clone();

        let update = CredentialConfigUpdate::default();
        assert!(update.is_empty());
        update.apply(&mut config);

        assert_eq!(config, before);
    }

    #[test]
    fn test_credential_config_deserializes_from_partial_json() {
        let json = r#"{"enable_oauth2": true}"#;
        let config: CredentialConfig = serde_json::from_str(json).unwrap();

        assert!(config.enable_oauth2);
        // Everything else takes defaults
        assert!(config.enable_basic);
        assert_eq!(config.basic.max_login_attempts, 5);
    }
}
