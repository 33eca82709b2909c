//! Failed-handshake rate limiter.
//!
//! Counts failures per [`RateLimitKey`] inside a sliding window and locks the
//! key out once the limit is reached. Per-key state transitions are serialized
//! by the map's entry locks; different keys never contend on the same entry.
//!
//! Every attempt holds an [`AttemptPermit`] while it is being verified.
//! Attempts in flight count against the limit, so concurrent handshakes from
//! one key cannot get more than `max_attempts` tokens to the auth service.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use thiserror::Error;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::domain::RateLimitKey;

/// Default number of failures allowed within the window
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default failure-counting window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Default lockout duration
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(15 * 60);

/// Default interval between cleanup sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Rate limiting parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Failures within `window` that trigger a lockout
    pub max_attempts: u32,
    /// Window in which failures are counted
    pub window: Duration,
    /// How long a key stays locked
    pub lockout: Duration,
    /// Interval of the background cleanup sweep
    pub sweep_interval: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: DEFAULT_WINDOW,
            lockout: DEFAULT_LOCKOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Why an attempt was not admitted
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("too many failed attempts, retry in {}s", retry_after.as_secs())]
    LockedOut { retry_after: Duration },

    /// Counted failures plus attempts in flight already reach the limit
    #[error("too many attempts in progress")]
    Saturated,
}

/// What recording a failure did to the key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Failure counted; `remaining` attempts before lockout
    Counted { remaining: u32 },
    /// Limit reached; key locked until `until`
    LockedOut { until: Instant },
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    failures: u32,
    first_failure: Instant,
    last_activity: Instant,
    locked_until: Option<Instant>,
    in_flight: u32,
}

impl RateLimitEntry {
    fn new(now: Instant) -> Self {
        Self {
            failures: 0,
            first_failure: now,
            last_activity: now,
            locked_until: None,
            in_flight: 0,
        }
    }

    fn is_locked(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Failures that still count toward the limit at `now`.
    fn live_failures(&self, now: Instant, window: Duration) -> u32 {
        if now.saturating_duration_since(self.first_failure) > window {
            0
        } else {
            self.failures
        }
    }

    /// Nothing worth keeping: no failures, no lock, no attempt in flight.
    fn is_idle(&self, now: Instant) -> bool {
        self.failures == 0 && self.in_flight == 0 && !self.is_locked(now)
    }
}

/// Admission of one attempt, held until its outcome is recorded.
///
/// Dropping the permit without recording an outcome releases the slot
/// without counting a failure.
#[derive(Debug)]
pub struct AttemptPermit<'a> {
    limiter: &'a RateLimiter,
    key: RateLimitKey,
}

impl AttemptPermit<'_> {
    /// Count the attempt as failed.
    pub fn fail(self) -> FailureOutcome {
        self.limiter.record_failure(&self.key)
    }

    /// Clear the failure count after a successful authentication.
    pub fn succeed(self) {
        self.limiter.record_success(&self.key);
    }
}

impl Drop for AttemptPermit<'_> {
    fn drop(&mut self) {
        if let Some(mut entry) = self.limiter.entries.get_mut(&self.key) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
        }
        let now = Instant::now();
        self.limiter
            .entries
            .remove_if(&self.key, |_, entry| entry.is_idle(now));
    }
}

/// Per-key failure tracking with temporary lockouts
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    entries: DashMap<RateLimitKey, RateLimitEntry>,
}

impl RateLimiter {
    /// Create a new RateLimiter
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Admit one attempt for `key`, or reject it while the key is locked out
    /// or its remaining attempts are all in flight.
    pub fn acquire(&self, key: &RateLimitKey) -> Result<AttemptPermit<'_>, RateLimitError> {
        self.acquire_at(key, Instant::now())
    }

    pub fn acquire_at(
        &self,
        key: &RateLimitKey,
        now: Instant,
    ) -> Result<AttemptPermit<'_>, RateLimitError> {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| RateLimitEntry::new(now));
        entry.last_activity = now;

        if let Some(until) = entry.locked_until
            && until > now
        {
            return Err(RateLimitError::LockedOut {
                retry_after: until.saturating_duration_since(now),
            });
        }
        if entry.live_failures(now, self.policy.window) + entry.in_flight
            >= self.policy.max_attempts
        {
            return Err(RateLimitError::Saturated);
        }

        entry.in_flight += 1;
        Ok(AttemptPermit {
            limiter: self,
            key: key.clone(),
        })
    }

    /// Count a failed attempt for `key`.
    pub fn record_failure(&self, key: &RateLimitKey) -> FailureOutcome {
        self.record_failure_at(key, Instant::now())
    }

    pub fn record_failure_at(&self, key: &RateLimitKey, now: Instant) -> FailureOutcome {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| RateLimitEntry::new(now));
        entry.last_activity = now;

        if let Some(until) = entry.locked_until {
            if until > now {
                return FailureOutcome::LockedOut { until };
            }
            // lockout expired: start over
            entry.locked_until = None;
            entry.failures = 0;
        }

        if entry.failures == 0 || now.saturating_duration_since(entry.first_failure) > self.policy.window
        {
            entry.failures = 0;
            entry.first_failure = now;
        }

        entry.failures += 1;
        if entry.failures >= self.policy.max_attempts {
            let until = now + self.policy.lockout;
            entry.failures = 0;
            entry.locked_until = Some(until);
            tracing::warn!(key = %key, lockout_secs = self.policy.lockout.as_secs(), "Rate limit lockout");
            return FailureOutcome::LockedOut { until };
        }

        FailureOutcome::Counted {
            remaining: self.policy.max_attempts - entry.failures,
        }
    }

    /// Clear the failure count after a successful authentication.
    pub fn record_success(&self, key: &RateLimitKey) {
        self.record_success_at(key, Instant::now());
    }

    pub fn record_success_at(&self, key: &RateLimitKey, now: Instant) {
        if let Some(mut entry) = self.entries.get_mut(key)
            && !entry.is_locked(now)
        {
            entry.failures = 0;
        }
        self.entries.remove_if(key, |_, entry| entry.is_idle(now));
    }

    /// Failures currently counted for `key` (0 when unknown or locked).
    pub fn failure_count(&self, key: &RateLimitKey) -> u32 {
        self.entries.get(key).map_or(0, |entry| entry.failures)
    }

    /// Number of keys locked out right now.
    pub fn lockout_count(&self) -> usize {
        self.lockout_count_at(Instant::now())
    }

    pub fn lockout_count_at(&self, now: Instant) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_locked(now))
            .count()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop keys that are not locked, have no attempt in flight and have been
    /// idle for a full window.
    ///
    /// # Returns
    ///
    /// Number of keys removed
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let window = self.policy.window;
        self.entries.retain(|_, entry| {
            entry.is_locked(now)
                || entry.in_flight > 0
                || now.saturating_duration_since(entry.last_activity) < window
        });
        before.saturating_sub(self.entries.len())
    }

    /// Run [`Self::sweep_at`] every `sweep_interval` until `shutdown` fires.
    pub fn spawn_sweeper(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.policy.sweep_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.sweep_at(Instant::now());
                        if removed > 0 {
                            tracing::debug!(removed, "Swept idle rate-limit entries");
                        }
                    }
                }
            }
            tracing::debug!("Rate-limit sweeper stopped");
        })
    }
}
