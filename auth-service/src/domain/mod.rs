//! # Domain Layer
//!
//! The domain layer contains the core business entities of the
//! authentication platform. This layer is **framework-agnostic** and
//! represents the heart of the business logic.
//!
//! ## Clean Architecture Principles
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         Domain Layer                              │
//! │  ┌─────────────────────────────────────────────────────────────┐  │
//! │  │                       Entities                              │  │
//! │  │  - Tenant / Application: isolation + deployment scopes      │  │
//! │  │  - User: credential holder with lockout state               │  │
//! │  │  - AppKey: machine credential (hash only, never secrets)    │  │
//! │  │  - Role / Permission / Policy: authorization material       │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! │                                                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐  │
//! │  │                  Lockout State Machine                      │  │
//! │  │  - LockState: unlocked / temporary / permanent as sum type  │  │
//! │  │  - explicit transitions, auto-unlock observed at read time  │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! │                                                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐  │
//! │  │                    Audit Taxonomy                           │  │
//! │  │  - AuditAction: the closed set of security-relevant actions │  │
//! │  │  - AuditEvent: one structured record per action             │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! | Module     | Purpose                                            |
//! |------------|----------------------------------------------------|
//! | `entities` | Core domain entities and their invariants          |
//! | `lockout`  | Account-lockout state machine transitions          |
//! | `audit`    | Audit event taxonomy and record shape              |
//!
//! ## Design Decisions
//!
//! 1. **Entities vs DTOs**: Domain entities carry every field including
//!    sensitive ones (password hashes, secret hashes); the API layer
//!    exposes only sanitized DTOs.
//!
//! 2. **Opaque string identifiers**: All ids are opaque strings; the
//!    platform mints UUIDs but accepts caller-chosen ids for tenants and
//!    apps at bootstrap.
//!
//! 3. **Soft deletes**: `deleted_at` markers preserve rows for audit
//!    trails; every lookup filters them.

pub mod audit;
pub mod entities;
pub mod lockout;

pub use audit::{AuditAction, AuditEvent};
pub use entities::*;
pub use lockout::{LockoutPolicy, LockoutTransition};
