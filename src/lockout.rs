//! Per-client PIN brute-force lockout
//!
//! Tracks failed PIN attempts per client identifier and enforces a timed
//! lockout once the failure threshold is reached. State lives in memory
//! only and is lost on restart.
//!
//! Per client the guard moves between two states:
//!
//! - `Unlocked(count)`: each failure increments `count`; reaching the
//!   threshold locks the client and resets `count` to zero.
//! - `Locked(until)`: expires lazily. The next [`LockoutGuard::remaining_lockout`]
//!   or [`LockoutGuard::record_failure`] at or after `until` observes the
//!   expiry and drops the record.
//!
//! Callers check [`LockoutGuard::remaining_lockout`] before evaluating a PIN;
//! [`LockoutGuard::record_failure`] does not reject attempts made while locked.

use crate::config::LockoutConfig;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Failed-attempt bookkeeping for one client
#[derive(Debug, Clone, Default)]
struct FailedAttempt {
    /// Failures since the last lockout or success
    count: u32,
    /// Set only when `count` reached the threshold
    locked_until: Option<Instant>,
}

/// In-memory lockout tracker keyed by client identifier
pub struct LockoutGuard {
    attempts: Mutex<HashMap<String, FailedAttempt>>,
    max_attempts: u32,
    duration: Duration,
}

impl LockoutGuard {
    /// Create a guard from configuration
    pub fn new(config: &LockoutConfig) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts: config.max_attempts.max(1),
            duration: config.duration,
        }
    }

    /// Seconds until `client` may try again, or 0 when not locked
    ///
    /// Evicts the client's record when its lockout has expired.
    pub async fn remaining_lockout(&self, client: &str) -> u64 {
        let mut attempts = self.attempts.lock().await;

        let Some(until) = attempts.get(client).and_then(|a| a.locked_until) else {
            return 0;
        };

        let now = Instant::now();
        if now >= until {
            attempts.remove(client);
            tracing::debug!(client, "lockout expired");
            return 0;
        }

        ceil_secs(until - now)
    }

    /// Record a failed PIN attempt for `client`
    ///
    /// Returns the lockout length in seconds when this failure reaches the
    /// threshold, otherwise 0.
    pub async fn record_failure(&self, client: &str) -> u64 {
        let mut attempts = self.attempts.lock().await;
        let now = Instant::now();

        let attempt = attempts.entry(client.to_string()).or_default();
        if attempt.locked_until.is_some_and(|until| now >= until) {
            *attempt = FailedAttempt::default();
        }

        attempt.count += 1;
        if attempt.count < self.max_attempts {
            tracing::debug!(client, count = attempt.count, "failed PIN attempt");
            return 0;
        }

        attempt.count = 0;
        attempt.locked_until = Some(now + self.duration);
        tracing::warn!(
            client,
            seconds = self.duration.as_secs(),
            "client locked out after repeated PIN failures"
        );
        ceil_secs(self.duration)
    }

    /// Forget all state for `client`; called after a successful PIN
    pub async fn clear(&self, client: &str) {
        self.attempts.lock().await.remove(client);
    }

    /// Number of clients with a live record
    pub async fn tracked_clients(&self) -> usize {
        self.attempts.lock().await.len()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
