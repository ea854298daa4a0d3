//! # Route Configuration
//!
//! Defines URL patterns and maps them to handler functions.
//!
//! ## Route Structure
//!
//! ```text
//! /
//! ├── health                                          GET  → health_check
//! │
//! └── api/v1/
//!     ├── tenants/{tenant_id}/apps/{app_id}/
//!     │   ├── cred/basic/
//!     │   │   ├── login                               POST → basic_login
//!     │   │   ├── change-password                     POST → change_password
//!     │   │   ├── forgot-password                     POST → forgot_password
//!     │   │   └── reset-password                      POST → reset_password
//!     │   ├── cred/apikey/authenticate                POST → apikey_authenticate
//!     │   └── keys
//!     │       ├── ""                                  POST → create_app_key
//!     │       ├── ""                                  GET  → list_app_keys
//!     │       └── {key_id}                            GET  → get_app_key
//!     │           ├── rotate                          POST → rotate_app_key
//!     │           ├── revoke                          POST → revoke_app_key
//!     │           └── ""                              DELETE → delete_app_key
//!     ├── token/
//!     │   ├── validate                                POST → token_validate
//!     │   ├── refresh                                 POST → token_refresh
//!     │   ├── revoke                                  POST → token_revoke
//!     │   └── introspect                              POST → token_introspect
//!     ├── authz/check                                 POST → authz_check
//!     └── config/credentials/tenants/{tenant_id}
//!         ├── ""                                      GET/PUT → tenant config
//!         └── apps/{app_id}                           GET/PUT → app config
//! ```
//!
//! ## Versioning
//!
//! All endpoints are versioned under `/api/v1` so breaking changes can
//! ship as `/api/v2` without disturbing existing clients.

use actix_web::web;

use super::handlers;

/// Configures all routes for the platform service.
///
/// Called from `main.rs` during app initialization:
///
/// ```rust,ignore
/// App::new()
///     .configure(routes::configure)
/// ```
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // ─────────────────────────────────────────────────────────────────
        // Health Check
        // ─────────────────────────────────────────────────────────────────
        .route("/health", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1")
                // ─────────────────────────────────────────────────────────
                // Credential endpoints (tenant + app scoped)
                // ─────────────────────────────────────────────────────────
                .service(
                    web::scope("/tenants/{tenant_id}/apps/{app_id}")
                        .route(
                            "/cred/basic/login",
                            web::post().to(handlers::basic_login),
                        )
                        .route(
                            "/cred/basic/change-password",
                            web::post().to(handlers::change_password),
                        )
                        .route(
                            "/cred/basic/forgot-password",
                            web::post().to(handlers::forgot_password),
                        )
                        .route(
                            "/cred/basic/reset-password",
                            web::post().to(handlers::reset_password),
                        )
                        .route(
                            "/cred/apikey/authenticate",
                            web::post().to(handlers::apikey_authenticate),
                        )
                        // ─────────────────────────────────────────────
                        // App-key administration
                        // ─────────────────────────────────────────────
                        .route("/keys", web::post().to(handlers::create_app_key))
                        .route("/keys", web::get().to(handlers::list_app_keys))
                        .route("/keys/{key_id}", web::get().to(handlers::get_app_key))
                        .route(
                            "/keys/{key_id}/rotate",
                            web::post().to(handlers::rotate_app_key),
                        )
                        .route(
                            "/keys/{key_id}/revoke",
                            web::post().to(handlers::revoke_app_key),
                        )
                        .route(
                            "/keys/{key_id}",
                            web::delete().to(handlers::delete_app_key),
                        ),
                )
                // ─────────────────────────────────────────────────────────
                // Token operations
                // ─────────────────────────────────────────────────────────
                .route("/token/validate", web::post().to(handlers::token_validate))
                .route("/token/refresh", web::post().to(handlers::token_refresh))
                .route("/token/revoke", web::post().to(handlers::token_revoke))
                .route(
                    "/token/introspect",
                    web::post().to(handlers::token_introspect),
                )
                // ─────────────────────────────────────────────────────────
                // Authorization
                // ─────────────────────────────────────────────────────────
                .route("/authz/check", web::post().to(handlers::authz_check))
                // ─────────────────────────────────────────────────────────
                // Credential configuration administration
                // ─────────────────────────────────────────────────────────
                .route(
                    "/config/credentials/tenants/{tenant_id}",
                    web::get().to(handlers::get_tenant_credential_config),
                )
                .route(
                    "/config/credentials/tenants/{tenant_id}",
                    web::put().to(handlers::put_tenant_credential_config),
                )
                .route(
                    "/config/credentials/tenants/{tenant_id}/apps/{app_id}",
                    web::get().to(handlers::get_app_credential_config),
                )
                .route(
                    "/config/credentials/tenants/{tenant_id}/apps/{app_id}",
                    web::put().to(handlers::put_app_credential_config),
                ),
        );
}
