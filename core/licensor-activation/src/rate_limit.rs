//! Multi-window request throttle.
//!
//! Three rules are applied in a fixed order to every request of one identity:
//!
//! 1. **Lockout**: while a lockout is running every request is refused with
//!    `rate_limit_throttled`.
//! 2. **Interval**: a request less than the minimum interval after the last
//!    allowed one is refused with `rate_limit_interval`.
//! 3. **Burst**: once the burst limit of allowed requests sits in the trailing
//!    window, the request is refused with `rate_limit_exceeded` and a lockout
//!    starts from that moment.
//!
//! Only allowed requests are recorded. Timestamps that fall out of the burst
//! window are pruned lazily on the next check; identities no rule refers to
//! any more are dropped by [`RateLimiter::prune`].

use crate::config::RateLimitPolicy;
use crate::error::ActivationError;
use chrono::{DateTime, Duration, Utc};
use licensor_types::RateLimitReason;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Outcome of [`RateLimiter::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Deny(RateLimitDenial),
}

impl RateDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Converts a denial into an `Err`.
    pub fn into_result(self) -> Result<(), RateLimitDenial> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(denial) => Err(denial),
        }
    }
}

/// Why a request was refused and when the blocking rule lapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDenial {
    pub reason: RateLimitReason,
    pub retry_after: Duration,
}

impl RateLimitDenial {
    /// Retry hint in whole seconds, rounded up.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let millis = self.retry_after.num_milliseconds().max(0);
        u64::try_from((millis + 999) / 1000).unwrap_or(0)
    }
}

impl From<RateLimitDenial> for ActivationError {
    fn from(denial: RateLimitDenial) -> Self {
        Self::RateLimited {
            reason: denial.reason,
            retry_after_secs: denial.retry_after_secs(),
        }
    }
}

/// Recent allowed requests of one identity.
#[derive(Debug, Default)]
struct RateWindow {
    recent: VecDeque<DateTime<Utc>>,
    last_allowed: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
}

impl RateWindow {
    fn evaluate(&mut self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> RateDecision {
        let cutoff = now - policy.burst_window;
        while self.recent.front().is_some_and(|ts| *ts <= cutoff) {
            self.recent.pop_front();
        }

        if let Some(until) = self.locked_until {
            if now < until {
                return deny(RateLimitReason::RateLimitThrottled, until - now);
            }
            self.locked_until = None;
        }

        if let Some(last) = self.last_allowed {
            let next = last + policy.min_interval;
            if now < next {
                return deny(RateLimitReason::RateLimitInterval, next - now);
            }
        }

        if self.recent.len() >= policy.burst_limit {
            self.locked_until = Some(now + policy.lockout);
            return deny(RateLimitReason::RateLimitExceeded, policy.lockout);
        }

        RateDecision::Allow
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.recent.push_back(now);
        self.last_allowed = Some(now);
    }

    /// Returns true once forgetting this window would change no decision.
    fn is_idle(&self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> bool {
        let cutoff = now - policy.burst_window;
        self.recent.iter().all(|ts| *ts <= cutoff)
            && self.locked_until.is_none_or(|until| until <= now)
            && self
                .last_allowed
                .is_none_or(|last| last + policy.min_interval <= now)
    }
}

fn log_denial(decision: RateDecision) {
    if let RateDecision::Deny(denial) = decision {
        debug!(
            reason = %denial.reason,
            retry_after_secs = denial.retry_after_secs(),
            "request throttled"
        );
    }
}

fn deny(reason: RateLimitReason, retry_after: Duration) -> RateDecision {
    RateDecision::Deny(RateLimitDenial {
        reason,
        retry_after,
    })
}

/// Per-identity throttle shared by every caller of one operation.
///
/// The outer map is only held long enough to find the identity's window;
/// the check-and-record itself runs under that window's own lock, so
/// requests for distinct identities do not contend.
#[derive(Debug)]
pub struct RateLimiter<K> {
    policy: RateLimitPolicy,
    windows: Mutex<HashMap<K, Arc<Mutex<RateWindow>>>>,
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn window(&self, identity: &K) -> Arc<Mutex<RateWindow>> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(windows.entry(identity.clone()).or_default())
    }

    /// Applies the rules for `identity` at `now`, recording the request if
    /// it is allowed.
    pub fn check_and_record(&self, identity: &K, now: DateTime<Utc>) -> RateDecision {
        let window = self.window(identity);
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        let decision = window.evaluate(&self.policy, now);
        if decision.is_allowed() {
            window.record(now);
        }
        log_denial(decision);
        decision
    }

    /// Applies the rules for `identity` at `now` without recording anything.
    ///
    /// Pair with [`record`](Self::record) to count only some requests, e.g.
    /// failed attempts. A burst violation still starts the lockout.
    pub fn check(&self, identity: &K, now: DateTime<Utc>) -> RateDecision {
        let window = {
            let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
            match windows.get(identity) {
                Some(window) => Arc::clone(window),
                None => return RateDecision::Allow,
            }
        };
        let decision = window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .evaluate(&self.policy, now);
        log_denial(decision);
        decision
    }

    /// Counts a request of `identity` at `now` against its window.
    pub fn record(&self, identity: &K, now: DateTime<Utc>) {
        self.window(identity)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(now);
    }

    /// Forgets identities whose window is idle at `now`. Returns how many
    /// were dropped.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, window| {
            // A second handle belongs to a check in progress.
            Arc::strong_count(window) > 1
                || !window
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_idle(&self.policy, now)
        });
        before - windows.len()
    }

    /// Number of identities currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K> Default for RateLimiter<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}
