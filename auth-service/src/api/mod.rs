//! # API Layer
//!
//! HTTP request/response processing for the platform's surface. It
//! bridges the HTTP world with the service layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            HTTP Request                                 │
//! └───────────────────────────────┬─────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Routes (routes.rs)                             │
//! │  Define URL patterns and HTTP methods, map to handlers                  │
//! └───────────────────────────────┬─────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Handlers (handlers.rs)                           │
//! │  1. Extract request data (JSON body, headers, path params)              │
//! │  2. Validate input using DTOs                                           │
//! │  3. Call service layer                                                  │
//! │  4. Transform response (incl. the uniform failure envelopes)            │
//! └───────────────────────────────┬─────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          DTOs (dto.rs)                                  │
//! │  - Request validation (serde, validator)                                │
//! │  - Response serialization (sanitized by construction)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Endpoint Summary
//!
//! All routes live under `/api/v1`; `{t}` = tenant id, `{a}` = app id.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | POST | `/tenants/{t}/apps/{a}/cred/basic/login` | `basic_login` |
//! | POST | `/tenants/{t}/apps/{a}/cred/basic/change-password` | `change_password` |
//! | POST | `/tenants/{t}/apps/{a}/cred/basic/forgot-password` | `forgot_password` |
//! | POST | `/tenants/{t}/apps/{a}/cred/basic/reset-password` | `reset_password` |
//! | POST | `/tenants/{t}/apps/{a}/cred/apikey/authenticate` | `apikey_authenticate` |
//! | POST | `/token/validate` `/refresh` `/revoke` `/introspect` | `token_*` |
//! | POST/GET | `/tenants/{t}/apps/{a}/keys…` | app-key admin |
//! | GET/PUT | `/config/credentials/tenants/{t}[/apps/{a}]` | credential config |
//! | POST | `/authz/check` | `authz_check` |
//! | GET | `/health` | `health_check` |

pub mod dto;
pub mod handlers;
pub mod routes;
