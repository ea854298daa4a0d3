//! # Account Lockout State Machine
//!
//! Brute-force protection for password login, encoded as explicit
//! transitions over the [`User`] lockout fields.
//!
//! ## States
//!
//! ```text
//!                     failed attempt
//!        ┌──────────┐ (< max)        ┌──────────────────┐
//!        │ Unlocked │───────────────▶│ Unlocked(counted)│
//!        └────┬─────┘                └────────┬─────────┘
//!             ▲                               │ attempts ≥ max
//!             │ auto-unlock                   ▼
//!             │ (read-time,          ┌──────────────────┐
//!             │  now ≥ locked_until) │ Locked-temporary │
//!             └──────────────────────┴────────┬─────────┘
//!                                             │ lockout_count ≥
//!                                             │ permanent_lock_after (> 0)
//!                                             ▼
//!                                    ┌──────────────────┐
//!                                    │ Locked-permanent │
//!                                    └──────────────────┘
//! ```
//!
//! Auto-unlock is a *read-time* transition: the first flow that observes
//! a temporary lock at or past `locked_until` moves the user back to
//! active (clearing the counters but keeping `lockout_count`).
//!
//! ## Atomicity
//!
//! The functions here are pure state transitions over `&mut User`. The
//! user store applies them inside its atomic update primitive (row lock
//! in SQL, write lock in memory) so that two concurrent wrong-password
//! attempts produce a counter of exactly 2, never 1.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::config::BasicCredentialConfig;

use crate::domain::entities::{User, UserStatus};

// =============================================================================
// Lock View
// =============================================================================

/// The lock view of a user at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Not locked
    Unlocked,
    /// Locked until `until`; login attempts fail generically
    Temporary { until: DateTime<Utc> },
    /// Temporary lock whose due time has passed; the observer should
    /// apply the auto-unlock transition before continuing
    DueAutoUnlock,
    /// Locked with no due time; only administrative action unlocks
    Permanent,
}

// =============================================================================
// Policy
// =============================================================================

/// Lockout thresholds derived from the effective credential
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutPolicy {
    /// Failed attempts before lockout
    pub max_attempts: u32,
    /// Temporary lock duration in seconds
    pub lockout_duration_secs: u64,
    /// Failure counter decays after this many seconds without a failure
    pub reset_attempts_after_secs: u64,
    /// Lockouts before the lock becomes permanent; 0 = never
    pub permanent_lock_after: u32,
}

impl From<&BasicCredentialConfig> for LockoutPolicy {
    fn from(config: &BasicCredentialConfig) -> Self {
        Self {
            max_attempts: config.max_login_attempts,
            lockout_duration_secs: config.lockout_duration_secs,
            reset_attempts_after_secs: config.reset_attempts_after_secs,
            permanent_lock_after: config.permanent_lock_after,
        }
    }
}

impl LockoutPolicy {
    fn lockout_duration(&self) -> Duration {
        Duration::seconds(self.lockout_duration_secs as i64)
    }

    fn reset_window(&self) -> Duration {
        Duration::seconds(self.reset_attempts_after_secs as i64)
    }
}

// =============================================================================
// Transitions
// =============================================================================

/// Outcome of recording a failed login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutTransition {
    /// Counter incremented, still below the threshold
    Counted { attempts: u32 },
    /// Threshold reached; temporary lock applied
    LockedTemporary { until: DateTime<Utc> },
    /// Threshold reached and the lockout count crossed the permanent
    /// limit; no due time
    LockedPermanent,
}

/// Records a failed login attempt on the user row.
///
/// Applies counter decay (attempts older than the reset window restart
/// the count), increments, and performs the lock transition when the
/// threshold is reached. Must run inside the store's atomic update.
pub fn apply_login_failure(
    user: &mut User,
    policy: &LockoutPolicy,
    now: DateTime<Utc>,
) -> LockoutTransition {
    // Counter decay: a quiet hour (by default) forgives earlier failures
    if let Some(last) = user.last_failed_login_at {
        if now - last > policy.reset_window() {
            user.failed_login_attempts = 0;
        }
    }

    user.failed_login_attempts += 1;
    user.last_failed_login_at = Some(now);
    user.updated_at = now;

    if user.failed_login_attempts < policy.max_attempts {
        return LockoutTransition::Counted {
            attempts: user.failed_login_attempts,
        };
    }

    // Threshold reached: lock
    user.status = UserStatus::Locked;
    user.locked_at = Some(now);
    user.lockout_count += 1;

    if policy.permanent_lock_after > 0 && user.lockout_count >= policy.permanent_lock_after {
        user.locked_until = None;
        return LockoutTransition::LockedPermanent;
    }

    let until = now + policy.lockout_duration();
    user.locked_until = Some(until);
    LockoutTransition::LockedTemporary { until }
}

/// Records a successful login: clears the failure counters.
pub fn apply_login_success(user: &mut User, now: DateTime<Utc>) {
    user.failed_login_attempts = 0;
    user.last_failed_login_at = None;
    user.updated_at = now;
}

/// Applies the auto-unlock transition if the user's temporary lock is
/// due at `now`.
///
/// Returns `true` when the transition fired. `lockout_count` is kept so
/// repeated lockouts can still escalate to a permanent lock.
pub fn apply_auto_unlock(user: &mut User, now: DateTime<Utc>) -> bool {
    if user.lock_state(now) != LockState::DueAutoUnlock {
        return false;
    }

    user.status = UserStatus::Active;
    user.failed_login_attempts = 0;
    user.last_failed_login_at = None;
    user.locked_at = None;
    user.locked_until = None;
    user.updated_at = now;
    true
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: "u1".to_string(),
            tenant_id: "t1".to_string(),
            username: "alice".to_string(),
            email: "alice@t1.example".to_string(),
            full_name: "Alice".to_string(),
            is_tenant_owner: false,
            password_hash: Some("$argon2id$stub".to_string()),
            status: UserStatus::Active,
            failed_login_attempts: 0,
            last_failed_login_at: None,
            locked_at: None,
            locked_until: None,
            lockout_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn test_policy() -> LockoutPolicy {
        LockoutPolicy {
            max_attempts: 5,
            lockout_duration_secs: 300,
            reset_attempts_after_secs: 3600,
            permanent_lock_after: 0,
        }
    }

    #[test]
    fn test_failures_count_up_to_threshold() {
        let mut user = test_user();
        let policy = test_policy();
        let now = Utc::now();

        for expected in 1..=4 {
            let transition = apply_login_failure(&mut user, &policy, now);
            assert_eq!(
                transition,
                LockoutTransition::Counted { attempts: expected }
            );
        }

        // Fifth failure locks with locked_until = now + lockout_duration
        let transition = apply_login_failure(&mut user, &policy, now);
        assert_eq!(
            transition,
            LockoutTransition::LockedTemporary {
                until: now + Duration::seconds(300)
            }
        );
        assert_eq!(user.status, UserStatus::Locked);
        assert_eq!(user.lockout_count, 1);
    }

    #[test]
    fn test_counter_decays_after_reset_window() {
        let mut user = test_user();
        let policy = test_policy();
        let now = Utc::now();

        user.failed_login_attempts = 4;
        user.last_failed_login_at = Some(now - Duration::seconds(3700));

        // The stale failures are forgiven; this counts as attempt 1
        let transition = apply_login_failure(&mut user, &policy, now);
        assert_eq!(transition, LockoutTransition::Counted { attempts: 1 });
        assert_eq!(user.status, UserStatus::Active);
    }

    #[test]
    fn test_permanent_lock_after_repeated_lockouts() {
        let mut user = test_user();
        let policy = LockoutPolicy {
            permanent_lock_after: 2,
            ..test_policy()
        };
        let now = Utc::now();

        // First lockout is temporary
        user.failed_login_attempts = 4;
        assert!(matches!(
            apply_login_failure(&mut user, &policy, now),
            LockoutTransition::LockedTemporary { .. }
        ));

        // Unlock, fail again to the threshold: second lockout is permanent
        apply_auto_unlock(&mut user, now + Duration::seconds(301));
        user.failed_login_attempts = 4;
        user.last_failed_login_at = Some(now + Duration::seconds(302));
        assert_eq!(
            apply_login_failure(&mut user, &policy, now + Duration::seconds(302)),
            LockoutTransition::LockedPermanent
        );
        assert_eq!(user.locked_until, None);
        assert_eq!(user.lock_state(now + Duration::days(365)), LockState::Permanent);
    }

    #[test]
    fn test_auto_unlock_only_when_due() {
        let mut user = test_user();
        let policy = test_policy();
        let now = Utc::now();

        user.failed_login_attempts = 4;
        apply_login_failure(&mut user, &policy, now);

        // Not due yet
        assert!(!apply_auto_unlock(&mut user, now + Duration::seconds(299)));
        assert_eq!(user.status, UserStatus::Locked);

        // Due: unlock clears counters but keeps lockout_count
        assert!(apply_auto_unlock(&mut user, now + Duration::seconds(300)));
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(user.failed_login_attempts, 0);
        assert_eq!(user.locked_until, None);
        assert_eq!(user.lockout_count, 1);
    }

    #[test]
    fn test_success_clears_counters() {
        let mut user = test_user();
        let policy = test_policy();
        let now = Utc::now();

        apply_login_failure(&mut user, &policy, now);
        apply_login_failure(&mut user, &policy, now);
        apply_login_success(&mut user, now);

        assert_eq!(user.failed_login_attempts, 0);
        assert_eq!(user.last_failed_login_at, None);
    }
}
