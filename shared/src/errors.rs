//! # Application Error Types
//!
//! Unified error handling for the platform with automatic HTTP conversion.
//!
//! ## Design Philosophy
//!
//! This module follows the "make illegal states unrepresentable" principle.
//! Each error variant maps to a specific HTTP status code and error code,
//! ensuring consistent API responses across all endpoints.
//!
//! ## Error Categories
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ApiError Categories                            │
//! ├─────────────────────────┬───────────────────┬───────────────────────────┤
//! │ Authentication (401)    │ Authorization(403)│ Validation (400)          │
//! ├─────────────────────────┼───────────────────┼───────────────────────────┤
//! │ InvalidCredentials      │ InsufficientPerms │ ValidationError           │
//! │ TokenExpired            │ AccessDenied      │ BadRequest                │
//! │ InvalidToken            │                   │                           │
//! │ InvalidRefreshToken     │                   │                           │
//! │ MissingAuth             │                   │                           │
//! ├─────────────────────────┴───────────────────┴───────────────────────────┤
//! │ Resources (404, 409)    │ Server (5xx)                                  │
//! ├─────────────────────────┼───────────────────────────────────────────────┤
//! │ NotFound                │ StoreError, RedisError, InternalError,        │
//! │ Conflict                │ ServiceUnavailable, DeadlineExceeded          │
//! └─────────────────────────┴───────────────────────────────────────────────┘
//! ```
//!
//! ## Boundary Uniformity
//!
//! The credential endpoints (login, forgot-password) never surface these
//! variants directly: their handlers collapse every authentication failure
//! into one generic 200 envelope so response shape cannot be used for
//! user enumeration. `ApiError` carries the classification *internally*;
//! the boundary decides what leaks.
//!
//! ## HTTP Response Format
//!
//! All other errors are serialized to a consistent JSON format:
//!
//! ```json
//! {
//!   "code": "VALIDATION_ERROR",
//!   "message": "Validation error",
//!   "request_id": "550e8400-e29b-41d4-a716-446655440000",
//!   "details": { ... },
//!   "timestamp": "2024-01-15T10:30:00Z"
//! }
//! ```
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::errors::{ApiError, ApiResult};
//!
//! async fn get_key(tenant: &str, app: &str, key_id: &str) -> ApiResult<AppKey> {
//!     store
//!         .find_by_key_id(key_id)
//!         .await?                       // StoreError -> 500
//!         .ok_or(ApiError::NotFound {
//!             resource: format!("app_key:{}", key_id),
//!         })                            // NotFound -> 404
//! }
//! ```

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for handlers and services.
///
/// Use this instead of `Result<T, ApiError>` for cleaner signatures:
///
/// ```rust,ignore
/// async fn handler() -> ApiResult<HttpResponse> { ... }
/// ```
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Main Error Enum
// =============================================================================

/// Application error type with automatic HTTP status mapping.
///
/// Each variant represents a specific error condition and maps to an
/// appropriate HTTP status code. The `#[error]` attribute defines the
/// error message format.
#[derive(Debug, Error)]
pub enum ApiError {
    // =========================================================================
    // Authentication Errors (401 Unauthorized)
    // =========================================================================
    // The caller is not authenticated or their credentials are invalid.
    // Login-path handlers collapse these into the generic failure envelope.

    /// Wrong username/password combination, unknown user, or locked account.
    /// The credential boundary surfaces all three identically.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token has expired.
    /// Returns 401 Unauthorized.
    #[error("token expired")]
    TokenExpired,

    /// Token is malformed, has an invalid signature, a wrong type claim,
    /// or fails issuer/audience checks.
    /// Returns 401 Unauthorized.
    #[error("invalid token")]
    InvalidToken,

    /// Refresh token is revoked, already consumed by rotation, or not a
    /// refresh token at all. Reuse additionally emits a security audit
    /// event upstream.
    /// Returns 401 Unauthorized.
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// Request doesn't include required authentication material.
    /// Returns 401 Unauthorized.
    #[error("missing authentication")]
    MissingAuth,

    // =========================================================================
    // Authorization Errors (403 Forbidden)
    // =========================================================================
    // Authenticated but not permitted. Re-authenticating won't help.

    /// The identity lacks a required role or permission.
    /// Returns 403 Forbidden.
    #[error("insufficient permissions")]
    InsufficientPermissions,

    /// The policy evaluator denied the request.
    /// Returns 403 Forbidden with the evaluator's reason.
    #[error("access denied: {reason}")]
    AccessDenied {
        /// Reason produced by the authorization evaluator
        reason: String,
    },

    // =========================================================================
    // Validation Errors (400 Bad Request)
    // =========================================================================
    // Request is syntactically correct but semantically invalid. Specific
    // messages are allowed because the input came from the caller.

    /// Request body failed validation rules.
    /// Contains field-level errors from the `validator` crate.
    #[error("validation error")]
    ValidationError(#[from] ValidationErrors),

    /// Generic bad request with custom message.
    /// Use for validation that doesn't fit the validator pattern
    /// (password policy, malformed composite key shapes, config updates).
    #[error("invalid input: {message}")]
    BadRequest {
        /// Human-readable description of what's wrong
        message: String,
    },

    // =========================================================================
    // Resource Errors (404 Not Found, 409 Conflict)
    // =========================================================================

    /// Requested resource doesn't exist.
    /// Returns 404 Not Found.
    #[error("resource not found: {resource}")]
    NotFound {
        /// Resource identifier (e.g., "tenant:t1", "app_key:abc")
        resource: String,
    },

    /// Action would violate a uniqueness constraint.
    /// Returns 409 Conflict.
    #[error("resource already exists: {resource}")]
    Conflict {
        /// Description of the conflict (e.g., "username already taken")
        resource: String,
    },

    // =========================================================================
    // Server Errors (5xx)
    // =========================================================================
    // Logged as errors and monitored. Details are NOT exposed to clients.
    // Never downgraded to an allow decision anywhere.

    /// A backing store failed.
    /// Returns 500 Internal Server Error.
    #[error("store error")]
    StoreError {
        /// Internal message for logging (not exposed to client)
        message: String,
    },

    /// Redis operation failed (revocation-registry backend).
    /// Returns 500 Internal Server Error.
    #[error("redis error")]
    RedisError(#[from] redis::RedisError),

    /// Unspecified internal error (crypto source failure, encoding failure).
    /// Returns 500 Internal Server Error.
    #[error("internal server error")]
    InternalError {
        /// Internal message for logging (not exposed to client)
        message: String,
    },

    /// A collaborator (email delivery, registry backend) is down.
    /// Returns 503 Service Unavailable.
    #[error("service unavailable")]
    ServiceUnavailable {
        /// Name of the unavailable collaborator
        service: String,
    },

    /// The request deadline elapsed or the request was cancelled before
    /// completion. No partial user-visible success is produced.
    /// Returns 504 Gateway Timeout.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

// =============================================================================
// Error Methods
// =============================================================================

impl ApiError {
    /// Returns a machine-readable error code.
    ///
    /// These codes are stable and can be used by API clients for
    /// programmatic error handling. They follow the format:
    /// `CATEGORY_SPECIFIC_ERROR` in SCREAMING_SNAKE_CASE.
    pub fn error_code(&self) -> &'static str {
        match self {
            // Authentication
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            Self::MissingAuth => "MISSING_AUTH",
            // Authorization
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            // Validation
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::BadRequest { .. } => "BAD_REQUEST",
            // Resources
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            // Server
            Self::StoreError { .. } => "STORE_ERROR",
            Self::RedisError(_) => "REDIS_ERROR",
            Self::InternalError { .. } => "INTERNAL_ERROR",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// This is the source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized - Authentication required or failed
            Self::InvalidCredentials
            | Self::TokenExpired
            | Self::InvalidToken
            | Self::InvalidRefreshToken
            | Self::MissingAuth => StatusCode::UNAUTHORIZED,

            // 403 Forbidden - Authenticated but not authorized
            Self::InsufficientPermissions | Self::AccessDenied { .. } => StatusCode::FORBIDDEN,

            // 400 Bad Request - Client sent invalid data
            Self::ValidationError(_) | Self::BadRequest { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found - Resource doesn't exist
            Self::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict - Would violate uniqueness/business rules
            Self::Conflict { .. } => StatusCode::CONFLICT,

            // 500 Internal Server Error - Something went wrong on our side
            Self::StoreError { .. } | Self::RedisError(_) | Self::InternalError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 503 Service Unavailable - Dependency is down
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout - Deadline exceeded / cancelled
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Returns `true` if this is a server-side error (5xx).
    ///
    /// Server errors should be:
    /// - Logged at ERROR level
    /// - Monitored and alerted
    /// - Not expose internal details to clients
    ///
    /// Client errors (4xx) are logged at WARN level.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::StoreError { .. }
                | Self::RedisError(_)
                | Self::InternalError { .. }
                | Self::ServiceUnavailable { .. }
                | Self::DeadlineExceeded
        )
    }
}

// =============================================================================
// Response Structure
// =============================================================================

/// Standard error response body for the API.
///
/// All API errors (outside the uniform credential envelopes) are
/// serialized to this format for consistency.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code for programmatic handling
    pub code: String,

    /// Human-readable message (for debugging, not for user display)
    pub message: String,

    /// Request ID for tracing across services.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Additional error details (varies by error type).
    /// - ValidationError: field-level errors
    /// - AccessDenied: evaluator reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// When the error occurred (ISO 8601 format)
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorResponse {
    /// Creates a new error response from an `ApiError`.
    pub fn new(error: &ApiError) -> Self {
        // Extract type-specific details
        let details = match error {
            ApiError::ValidationError(errors) => {
                Some(serde_json::to_value(errors).unwrap_or_default())
            }
            ApiError::AccessDenied { reason } => Some(serde_json::json!({ "reason": reason })),
            // Server errors: don't expose internal details
            ApiError::StoreError { .. }
            | ApiError::RedisError(_)
            | ApiError::InternalError { .. } => None,
            _ => None,
        };

        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            request_id: None,
            details,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Adds a request ID for tracing.
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }
}

// =============================================================================
// Actix-web Integration
// =============================================================================

/// Implements Actix-web's `ResponseError` trait.
///
/// This allows returning `ApiError` directly from handlers:
///
/// ```rust,ignore
/// async fn handler() -> Result<HttpResponse, ApiError> {
///     Err(ApiError::NotFound { resource: "tenant:t1".into() })
/// }
/// ```
impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        // Delegate to our implementation
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let response = ErrorResponse::new(self);
        HttpResponse::build(self.status_code()).json(response)
    }
}

// =============================================================================
// Tests
// =============================================================================
