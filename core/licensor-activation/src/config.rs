//! Protocol constants and the policies built from them.

use chrono::Duration;

/// Minimum spacing between two allowed requests of one identity.
pub const MIN_REQUEST_INTERVAL_SECS: i64 = 60;
/// Allowed requests per identity inside [`BURST_WINDOW_SECS`].
pub const BURST_LIMIT: usize = 5;
/// Trailing window the burst limit is counted over.
pub const BURST_WINDOW_SECS: i64 = 10 * 60;
/// Lockout entered when the burst limit is hit.
pub const LOCKOUT_SECS: i64 = 15 * 60;
/// Failed sign-in or passcode attempts per account inside
/// [`AUTH_FAILURE_WINDOW_SECS`] before further attempts are refused.
pub const AUTH_FAILURE_LIMIT: usize = 5;
/// Window the failed attempts are counted over, and the lockout that follows.
pub const AUTH_FAILURE_WINDOW_SECS: i64 = 15 * 60;
/// How long a cached activation is trusted without confirmation.
pub const GRACE_PERIOD_SECS: i64 = 5 * 60;
/// Device transfers allowed per account inside [`TRANSFER_WINDOW_SECS`].
pub const TRANSFER_QUOTA: u32 = 10;
/// Rolling window of the transfer quota.
pub const TRANSFER_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;
/// Lifetime of an issued transfer token.
pub const TRANSFER_TOKEN_TTL_SECS: i64 = 10 * 60;
/// Lifetime of an emailed one-time passcode.
pub const OTP_TTL_SECS: i64 = 10 * 60;
/// Length of a free trial.
pub const TRIAL_DURATION_DAYS: u32 = 7;
/// Transport timeout for authority calls.
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Multi-window throttle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub min_interval: Duration,
    pub burst_limit: usize,
    pub burst_window: Duration,
    pub lockout: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::seconds(MIN_REQUEST_INTERVAL_SECS),
            burst_limit: BURST_LIMIT,
            burst_window: Duration::seconds(BURST_WINDOW_SECS),
            lockout: Duration::seconds(LOCKOUT_SECS),
        }
    }
}

impl RateLimitPolicy {
    /// Limit on failed attempts; no spacing rule between attempts.
    #[must_use]
    pub fn failed_attempts() -> Self {
        Self {
            min_interval: Duration::zero(),
            burst_limit: AUTH_FAILURE_LIMIT,
            burst_window: Duration::seconds(AUTH_FAILURE_WINDOW_SECS),
            lockout: Duration::seconds(AUTH_FAILURE_WINDOW_SECS),
        }
    }
}

/// Transfer token lifetime and rolling quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    pub quota: u32,
    pub window: Duration,
    pub token_ttl: Duration,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            quota: TRANSFER_QUOTA,
            window: Duration::seconds(TRANSFER_WINDOW_SECS),
            token_ttl: Duration::seconds(TRANSFER_TOKEN_TTL_SECS),
        }
    }
}

/// Controller tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Grace granted to a freshly confirmed record.
    pub grace_period: Duration,
    /// Re-verify at this interval once the main application is shown.
    /// `None` verifies only at startup and after each prompt.
    pub revalidate_interval: Option<std::time::Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::seconds(GRACE_PERIOD_SECS),
            revalidate_interval: None,
        }
    }
}
