//! # Tracing and Structured Logging Configuration
//!
//! Initializes the logging system with environment-appropriate settings.
//!
//! ## Output Formats
//!
//! | Environment | Format | Purpose |
//! |-------------|--------|---------|
//! | Development | Pretty | Human-readable, colored output |
//! | Production | JSON | Machine-parseable for log aggregation |
//!
//! ## Log Levels
//!
//! | Level | When to Use | Default Enabled |
//! |-------|-------------|-----------------|
//! | ERROR | Something failed that shouldn't | Always |
//! | WARN | Recoverable issues, degraded service | Always |
//! | INFO | Significant events (startup, logins, revocations) | Always |
//! | DEBUG | Detailed troubleshooting info | Dev only |
//! | TRACE | Very verbose, step-by-step | Never by default |
//!
//! ## Filter Configuration
//!
//! Control verbosity via `RUST_LOG` environment variable:
//!
//! ```bash
//! # All debug
//! RUST_LOG=debug
//!
//! # Info for most, debug for our code
//! RUST_LOG=info,auth_service=debug
//! ```
//!
//! ## Security
//!
//! Never log secrets: passwords, token values, API-key secrets and their
//! hashes stay out of log fields. Log identifiers (`user_id`, `key_id`,
//! `jti`) instead.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// =============================================================================
// Initialization
// =============================================================================

/// Initializes the tracing/logging system.
///
/// This should be called **once** at the very start of the application,
/// before any other code that might emit logs.
///
/// ## Parameters
///
/// - `service_name`: Name of the service (for identification in logs)
/// - `is_production`: If true, outputs JSON; if false, outputs pretty format
///
/// ## Defaults
///
/// If `RUST_LOG` is not set:
/// - Production: `info`
/// - Development: `debug,hyper=info,actix_server=info`
pub fn init_tracing(service_name: &str, is_production: bool) {
    // Build filter from RUST_LOG env var, or use defaults
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_production {
            EnvFilter::new("info")
        } else {
            // Development: debug level, but silence noisy crates
            EnvFilter::new("debug,hyper=info,actix_server=info")
        }
    });

    if is_production {
        // Production: JSON structured output for log aggregation tools
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true)
                    .with_current_span(true),
            )
            .init();
    } else {
        // Development: pretty, human-readable output
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
    }

    tracing::info!(
        service = service_name,
        production = is_production,
        "Tracing initialized"
    );
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Logs an error with context.
///
/// Use this for consistent error logging format across the application.
pub fn log_error<E: std::fmt::Display>(error: &E, context: &str) {
    tracing::error!(
        error = %error,
        context = context,
        "Error occurred"
    );
}
