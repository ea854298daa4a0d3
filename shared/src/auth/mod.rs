//! # Authentication Building Blocks
//!
//! Token signing and password hashing, shared by the platform service.
//!
//! ## Module Structure
//!
//! ```text
//! auth/
//! ├── jwt.rs      - Claims model, token signing and validation
//! └── password.rs - Argon2id password hashing + configurable policy
//! ```
//!
//! ## Overview
//!
//! | Component | Purpose | See Also |
//! |-----------|---------|----------|
//! | [`JwtService`] | Mint and validate signed tokens | [RFC 7519](https://tools.ietf.org/html/rfc7519) |
//! | [`Claims`] / [`TokenType`] | Reserved claims + extras map | [`jwt`] |
//! | [`PasswordHasher`] | Argon2id password hashing | [OWASP Password Storage](https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html) |
//! | [`PasswordPolicy`] | Config-driven strength rules | [`password`] |
//!
//! ## Division of Labor
//!
//! This module knows how to *sign* and *hash*. The platform's token
//! manager (revocation registry, refresh rotation) and credential flows
//! (lockout, reset) live in auth-service and compose these primitives.
//!
//! ## Token Flow
//!
//! ```text
//! ┌────────┐        ┌──────────────┐        ┌────────────┐
//! │ Client │        │ Gatehouse    │        │ Protected  │
//! └───┬────┘        └─────┬────────┘        │    API     │
//!     │                   │                 └─────┬──────┘
//!     │ POST login        │                       │
//!     │ (username, pass)  │                       │
//!     │──────────────────>│                       │
//!     │ {access, refresh} │                       │
//!     │<──────────────────│                       │
//!     │                   │                       │
//!     │ Bearer <access>   │                       │
//!     │──────────────────────────────────────────>│
//!     │                   │                       │
//!     │ (on expiry)       │                       │
//!     │ POST token/refresh│                       │
//!     │──────────────────>│  rotation: old refresh│
//!     │ {new pair}        │  token is consumed    │
//!     │<──────────────────│                       │
//! ```

pub mod jwt;
pub mod password;

// Re-export main types for convenient access
pub use jwt::{Claims, JwtService, SignedToken, TokenPair, TokenType};
pub use password::{PasswordHasher, PasswordPolicy};
