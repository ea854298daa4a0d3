//! # Request Handlers
//!
//! HTTP request handlers that bridge the API layer with the service
//! layer. Each handler follows this pattern:
//!
//! 1. **Extract** request data using Actix extractors
//! 2. **Validate** input using the `validator` crate
//! 3. **Call** the service layer
//! 4. **Transform** and return the HTTP response
//!
//! ## Envelope Discipline
//!
//! Two places deliberately bend the usual error mapping:
//!
//! - **Login-shaped endpoints** (`basic_login`, `apikey_authenticate`,
//!   `change_password`) convert [`ApiError::InvalidCredentials`] into an
//!   HTTP **200** with the uniform failure envelope, so the response
//!   shape and status cannot classify the failure.
//! - **`forgot_password`** returns the same success envelope whether or
//!   not the email exists.
//!
//! Everything else returns `Result<HttpResponse, ApiError>` and lets the
//! `ResponseError` impl map the status.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use shared::config::CredentialConfigUpdate;
use shared::errors::ApiError;
use shared::validation;
use std::collections::HashMap;

use crate::service::apikey_service::NewAppKeyRequest;
use crate::service::authz_service::AuthorizationRequest;
use crate::service::credential_service::ClientInfo;
use crate::AppState;

use super::dto::{
    ApiKeyAuthenticateRequest, ApiKeyAuthenticateResponse, AppKeyDto, AuthzCheckRequest,
    AuthzCheckResponse, ChangePasswordRequest, CreateAppKeyRequest, CreateAppKeyResponse,
    ForgotPasswordRequest, HealthResponse, LoginRequest, LoginResponse, MessageResponse,
    RefreshTokenRequest, ResetPasswordRequest, RotateAppKeyRequest, TokenIntrospectResponse,
    TokenRefreshResponse, TokenRequest, TokenValidateResponse,
};

/// Pulls client ip / user-agent out of the request for the audit trail.
fn client_info(req: &HttpRequest) -> ClientInfo {
    ClientInfo {
        ip: req.connection_info().peer_addr().map(String::from),
        user_agent: req
            .headers()
            .get("User-Agent")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    }
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

/// Health check endpoint for monitoring and load balancers.
///
/// # Route
///
/// `GET /health`
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: state.service_name.clone(),
        timestamp: Utc::now().to_rfc3339(),
    };

    HttpResponse::Ok().json(response)
}

// =============================================================================
// BASIC CREDENTIALS
// =============================================================================

/// Password login.
///
/// # Route
///
/// `POST /api/v1/tenants/{tenant_id}/apps/{app_id}/cred/basic/login`
///
/// # Responses
///
/// - **200** `{success:true, access_token, refresh_token, token_type,
///   expires_in, user}` on success
/// - **200** `{success:false, error:"invalid credentials"}` on *any*
///   authentication failure - unknown user, wrong password and locked
///   account are indistinguishable by design
pub async fn basic_login(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id) = path.into_inner();
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let client = client_info(&req);
    match state
        .credentials
        .login(&tenant_id, &app_id, &body.username, &body.password, &client)
        .await
    {
        Ok(outcome) => {
            Ok(HttpResponse::Ok().json(LoginResponse::success(outcome.tokens, outcome.user)))
        }
        Err(ApiError::InvalidCredentials) => {
            Ok(HttpResponse::Ok().json(LoginResponse::invalid_credentials()))
        }
        Err(e) => Err(e),
    }
}

/// Password change (requires the old password).
///
/// # Route
///
/// `POST /api/v1/tenants/{tenant_id}/apps/{app_id}/cred/basic/change-password`
///
/// # Responses
///
/// - **200** `{}` on success
/// - **200** generic failure envelope when the old credential is wrong
/// - **400** with specifics when the new password fails policy
pub async fn change_password(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id) = path.into_inner();
    let body = body.into_inner();
    validation::validate_request(&body)?;

    match state
        .credentials
        .change_password(
            &tenant_id,
            &app_id,
            &body.user_id,
            &body.old_password,
            &body.new_password,
        )
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({}))),
        Err(ApiError::InvalidCredentials) => {
            Ok(HttpResponse::Ok().json(LoginResponse::invalid_credentials()))
        }
        Err(e) => Err(e),
    }
}

/// Initiates a password reset.
///
/// # Route
///
/// `POST /api/v1/tenants/{tenant_id}/apps/{app_id}/cred/basic/forgot-password`
///
/// # Response
///
/// Always the same envelope, whether or not the email exists:
///
/// ```json
/// {"success": true, "message": "If the email exists, a reset link has been sent"}
/// ```
pub async fn forgot_password(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id) = path.into_inner();
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let client = client_info(&req);
    state
        .credentials
        .forgot_password(&tenant_id, &app_id, &body.email, &client)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::ok(
        "If the email exists, a reset link has been sent",
    )))
}

/// Completes a password reset with a one-shot token.
///
/// # Route
///
/// `POST /api/v1/tenants/{tenant_id}/apps/{app_id}/cred/basic/reset-password`
pub async fn reset_password(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, _app_id) = path.into_inner();
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state
        .credentials
        .reset_password(&tenant_id, &body.reset_token, &body.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::ok("password has been reset")))
}

// =============================================================================
// API-KEY AUTHENTICATION
// =============================================================================

/// Authenticates a composite API-key string.
///
/// # Route
///
/// `POST /api/v1/tenants/{tenant_id}/apps/{app_id}/cred/apikey/authenticate`
///
/// # Responses
///
/// - **200** `{success, validated:true, key_id, tenant_id, app_id,
///   scopes, claims}` on success
/// - **200** `{success:false, validated:false}` on any failure
pub async fn apikey_authenticate(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<ApiKeyAuthenticateRequest>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id) = path.into_inner();
    let body = body.into_inner();
    validation::validate_request(&body)?;

    match state
        .apikeys
        .authenticate(&body.api_key, Some(&tenant_id), Some(&app_id))
        .await
    {
        Ok(auth) => Ok(HttpResponse::Ok().json(ApiKeyAuthenticateResponse::validated(auth))),
        Err(ApiError::InvalidCredentials) => {
            Ok(HttpResponse::Ok().json(ApiKeyAuthenticateResponse::rejected()))
        }
        Err(e) => Err(e),
    }
}

// =============================================================================
// TOKEN OPERATIONS
// =============================================================================

/// Verifies a token and returns its claims.
///
/// # Route
///
/// `POST /api/v1/token/validate`
pub async fn token_validate(
    state: web::Data<AppState>,
    body: web::Json<TokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let verification = state.tokens.verify(&body.token).await;
    let claims = verification
        .claims
        .as_ref()
        .and_then(|claims| serde_json::to_value(claims).ok());

    Ok(HttpResponse::Ok().json(TokenValidateResponse {
        valid: verification.valid,
        claims,
        error: verification.error,
    }))
}

/// Refresh rotation: exchanges a refresh token for a new pair.
///
/// # Route
///
/// `POST /api/v1/token/refresh`
///
/// # Responses
///
/// - **200** with the new pair on success
/// - **401** `{success:false, error:"invalid refresh token"}` when the
///   token is invalid, expired, or already consumed (reuse)
pub async fn token_refresh(
    state: web::Data<AppState>,
    body: web::Json<RefreshTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    match state.tokens.refresh_rotate(&body.refresh_token).await {
        Ok(pair) => Ok(HttpResponse::Ok().json(TokenRefreshResponse::success(pair))),
        Err(
            ApiError::InvalidRefreshToken | ApiError::InvalidToken | ApiError::TokenExpired,
        ) => Ok(HttpResponse::Unauthorized().json(TokenRefreshResponse::invalid())),
        Err(e) => Err(e),
    }
}

/// Revokes a token (idempotent).
///
/// # Route
///
/// `POST /api/v1/token/revoke`
pub async fn token_revoke(
    state: web::Data<AppState>,
    body: web::Json<TokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state.tokens.revoke(&body.token).await?;

    Ok(HttpResponse::Ok().json(MessageResponse::ok("token revoked")))
}

/// Token introspection (RFC 7662 shape).
///
/// # Route
///
/// `POST /api/v1/token/introspect`
pub async fn token_introspect(
    state: web::Data<AppState>,
    body: web::Json<TokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let verification = state.tokens.verify(&body.token).await;
    let valid = verification.valid;
    let response = match verification.claims.filter(|_| valid) {
        Some(claims) => TokenIntrospectResponse {
            active: true,
            sub: Some(claims.sub),
            tenant_id: Some(claims.tenant_id),
            app_id: claims.app_id,
            token_type: serde_json::to_value(claims.token_type)
                .ok()
                .and_then(|v| v.as_str().map(String::from)),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            jti: Some(claims.jti.to_string()),
        },
        None => TokenIntrospectResponse {
            active: false,
            sub: None,
            tenant_id: None,
            app_id: None,
            token_type: None,
            exp: None,
            iat: None,
            jti: None,
        },
    };

    Ok(HttpResponse::Ok().json(response))
}

// =============================================================================
// APP-KEY ADMINISTRATION
// =============================================================================

/// Mints a new app key.
///
/// # Route
///
/// `POST /api/v1/tenants/{tenant_id}/apps/{app_id}/keys`
///
/// # Response
///
/// **201** with the sanitized record and the one-shot composite key
/// string - the only response that ever carries the secret.
pub async fn create_app_key(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<CreateAppKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id) = path.into_inner();
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let created = state
        .apikeys
        .generate(
            &tenant_id,
            &app_id,
            NewAppKeyRequest {
                name: body.name,
                scopes: body.scopes,
                key_type: body.key_type,
                environment: body.environment,
                user_id: body.user_id,
                expires_in_days: body.expires_in_days,
                metadata: HashMap::new(),
            },
        )
        .await?;

    Ok(HttpResponse::Created().json(CreateAppKeyResponse {
        api_key: created.key_string,
        key: created.record.into(),
    }))
}

/// Lists an app's keys (sanitized).
///
/// # Route
///
/// `GET /api/v1/tenants/{tenant_id}/apps/{app_id}/keys`
pub async fn list_app_keys(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id) = path.into_inner();

    let keys: Vec<AppKeyDto> = state
        .apikeys
        .list(&tenant_id, &app_id)
        .await?
        .into_iter()
        .map(AppKeyDto::from)
        .collect();

    Ok(HttpResponse::Ok().json(keys))
}

/// Reads one key (sanitized).
///
/// # Route
///
/// `GET /api/v1/tenants/{tenant_id}/apps/{app_id}/keys/{key_id}`
pub async fn get_app_key(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id, key_id) = path.into_inner();

    let key = state.apikeys.get(&tenant_id, &app_id, &key_id).await?;

    Ok(HttpResponse::Ok().json(AppKeyDto::from(key)))
}

/// Rotates a key: mints a replacement and (by default) revokes the old
/// one.
///
/// # Route
///
/// `POST /api/v1/tenants/{tenant_id}/apps/{app_id}/keys/{key_id}/rotate`
pub async fn rotate_app_key(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
    body: Option<web::Json<RotateAppKeyRequest>>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id, key_id) = path.into_inner();
    let revoke_old = body
        .map(|b| b.into_inner())
        .unwrap_or_default()
        .revoke_old
        .unwrap_or(true);

    let rotated = state
        .apikeys
        .rotate(&tenant_id, &app_id, &key_id, revoke_old)
        .await?;

    Ok(HttpResponse::Ok().json(CreateAppKeyResponse {
        api_key: rotated.key_string,
        key: rotated.record.into(),
    }))
}

/// Revokes a key (idempotent, scoped).
///
/// # Route
///
/// `POST /api/v1/tenants/{tenant_id}/apps/{app_id}/keys/{key_id}/revoke`
pub async fn revoke_app_key(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id, key_id) = path.into_inner();

    let revoked = state.apikeys.revoke(&tenant_id, &app_id, &key_id).await?;

    Ok(HttpResponse::Ok().json(AppKeyDto::from(revoked)))
}

/// Hard-deletes a key.
///
/// # Route
///
/// `DELETE /api/v1/tenants/{tenant_id}/apps/{app_id}/keys/{key_id}`
pub async fn delete_app_key(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id, key_id) = path.into_inner();

    state.apikeys.delete(&tenant_id, &app_id, &key_id).await?;

    Ok(HttpResponse::NoContent().finish())
}

// =============================================================================
// CREDENTIAL CONFIGURATION
// =============================================================================

/// Reads the tenant-scope effective credential configuration.
///
/// # Route
///
/// `GET /api/v1/config/credentials/tenants/{tenant_id}`
pub async fn get_tenant_credential_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant_id = path.into_inner();
    let config = state.resolver.tenant_credentials(&tenant_id).await?;
    Ok(HttpResponse::Ok().json(config))
}

/// Merge-updates the tenant default credential configuration.
///
/// A provided sub-config replaces that sub-config wholly; a bare enable
/// flag flips only the flag.
///
/// # Route
///
/// `PUT /api/v1/config/credentials/tenants/{tenant_id}`
pub async fn put_tenant_credential_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CredentialConfigUpdate>,
) -> Result<HttpResponse, ApiError> {
    let tenant_id = path.into_inner();
    let updated = state
        .resolver
        .update_tenant_credentials(&tenant_id, &body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Reads the app-scope effective credential configuration.
///
/// # Route
///
/// `GET /api/v1/config/credentials/tenants/{tenant_id}/apps/{app_id}`
pub async fn get_app_credential_config(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id) = path.into_inner();
    let config = state.resolver.app_credentials(&tenant_id, &app_id).await?;
    Ok(HttpResponse::Ok().json(config))
}

/// Merge-updates the app-level credential override.
///
/// # Route
///
/// `PUT /api/v1/config/credentials/tenants/{tenant_id}/apps/{app_id}`
pub async fn put_app_credential_config(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<CredentialConfigUpdate>,
) -> Result<HttpResponse, ApiError> {
    let (tenant_id, app_id) = path.into_inner();
    let updated = state
        .resolver
        .update_app_credentials(&tenant_id, &app_id, &body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(updated))
}

// =============================================================================
// AUTHORIZATION
// =============================================================================

/// Authorization check: verifies the token, builds the identity context
/// from providers, and evaluates policies.
///
/// # Route
///
/// `POST /api/v1/authz/check`
///
/// # Responses
///
/// - **200** `{allow, reason}` - the decision itself is the payload
/// - **401** when the presented token does not verify
pub async fn authz_check(
    state: web::Data<AppState>,
    body: web::Json<AuthzCheckRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let verification = state.tokens.verify(&body.token).await;
    let valid = verification.valid;
    let claims = match verification.claims.filter(|_| valid) {
        Some(claims) => claims,
        None => return Err(ApiError::InvalidToken),
    };

    let identity = state.identity.build(&claims).await?;
    let decision = state
        .authz
        .evaluate(
            &identity,
            &AuthorizationRequest {
                resource_type: body.resource_type,
                resource_id: body.resource_id,
                action: body.action,
                environment: body.environment,
            },
        )
        .await;

    Ok(HttpResponse::Ok().json(AuthzCheckResponse {
        allow: decision.allow,
        reason: decision.reason,
    }))
}

// =============================================================================
// Tests
// =============================================================================
