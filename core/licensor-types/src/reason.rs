//! Machine-readable failure reasons carried by authority responses.
//!
//! Callers match on these tags, never on the human-readable message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a rate limiter refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitReason {
    /// Less than the minimum spacing since the last allowed request.
    RateLimitInterval,
    /// The burst quota for the trailing window is used up.
    RateLimitExceeded,
    /// A lockout entered after a burst violation is still running.
    RateLimitThrottled,
}

impl RateLimitReason {
    /// Returns the wire tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitInterval => "rate_limit_interval",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::RateLimitThrottled => "rate_limit_throttled",
        }
    }
}

impl fmt::Display for RateLimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed classification of every non-success authority response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    RateLimitInterval,
    RateLimitExceeded,
    RateLimitThrottled,

    /// Subscription is past its expiry date.
    Expired,
    /// The host application the product augments is not running.
    #[serde(rename = "fortnite_closed")]
    HostNotRunning,
    /// The authority could not be reached.
    NoInternet,
    /// No record exists for the account (or hardware id).
    NotFound,
    /// A record exists but is deactivated.
    NotActive,
    /// The subscription is bound to a different machine.
    DeviceMismatch,

    InvalidCode,
    CodeExpired,
    CodeAlreadyUsed,
    DeviceLimit,

    InvalidOtp,
    OtpExpired,
    SendFailed,

    /// The machine or account has had its free trial.
    #[serde(rename = "trial_already_used_on_device")]
    TrialUsed,

    /// Covers wrong, expired and already-consumed transfer tokens alike.
    InvalidTransferToken,
    MaxTransfersExceeded,

    InvalidRequest,
    Generic,
}

impl Reason {
    /// Returns the rate-limit reason if this is a throttling denial.
    #[must_use]
    pub fn rate_limit(&self) -> Option<RateLimitReason> {
        match self {
            Self::RateLimitInterval => Some(RateLimitReason::RateLimitInterval),
            Self::RateLimitExceeded => Some(RateLimitReason::RateLimitExceeded),
            Self::RateLimitThrottled => Some(RateLimitReason::RateLimitThrottled),
            _ => None,
        }
    }

    /// Returns true for reasons that mean the entitlement itself is gone.
    #[must_use]
    pub fn is_entitlement_failure(&self) -> bool {
        matches!(self, Self::Expired | Self::NotFound | Self::DeviceMismatch)
    }
}

impl From<RateLimitReason> for Reason {
    fn from(reason: RateLimitReason) -> Self {
        match reason {
            RateLimitReason::RateLimitInterval => Self::RateLimitInterval,
            RateLimitReason::RateLimitExceeded => Self::RateLimitExceeded,
            RateLimitReason::RateLimitThrottled => Self::RateLimitThrottled,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Serialized form is the canonical tag.
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(tag)) => f.write_str(&tag),
            _ => write!(f, "{self:?}"),
        }
    }
}
