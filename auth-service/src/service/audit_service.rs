//! # Audit Emitter
//!
//! Centralized, non-blocking emission of [`AuditEvent`]s.
//!
//! ## Back-Pressure Discipline
//!
//! ```text
//! ┌──────────┐ try_send ┌─────────────────┐ recv ┌───────────────┐
//! │ Handlers │─────────▶│  bounded queue  │─────▶│  drain task   │
//! │ Services │          │ (mpsc, cap N)   │      │ AuditLogStore │
//! └──────────┘          └─────────────────┘      └───────────────┘
//!                          │ full
//!                          ▼
//!                    dropped counter (metric)
//! ```
//!
//! Emission never blocks the request path beyond the enqueue: a full
//! queue drops the event and increments a counter instead of failing
//! the operation. Store failures in the drain task are logged, never
//! surfaced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::AuditEvent;
use crate::repository::AuditLogStore;

/// Handle for emitting audit events; cheap to clone.
#[derive(Clone)]
pub struct AuditEmitter {
    tx: mpsc::Sender<AuditEvent>,
    dropped: Arc<AtomicU64>,
}

impl AuditEmitter {
    /// Creates the emitter and spawns its drain task.
    ///
    /// The returned handle finishes when every emitter clone has been
    /// dropped and the queue has drained.
    pub fn new(store: Arc<dyn AuditLogStore>, queue_capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(queue_capacity.max(1));

        let drain = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = store.append(event).await {
                    // Losing an audit row must not fail anything upstream
                    warn!(error = %e, "Failed to persist audit event");
                }
            }
        });

        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            drain,
        )
    }

    /// Enqueues an event without blocking.
    ///
    /// A full (or closed) queue drops the event and bumps the counter.
    pub fn emit(&self, event: AuditEvent) {
        if let Err(rejected) = self.tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let event = match rejected {
                mpsc::error::TrySendError::Full(e) => e,
                mpsc::error::TrySendError::Closed(e) => e,
            };
            debug!(action = %event.action, "Audit queue full, event dropped");
        }
    }

    /// Number of events dropped due to back-pressure since startup.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AuditEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditEmitter")
            .field("dropped", &self.dropped_events())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
