//! Email verification by one-time passcode.

use crate::authority::ActivationAuthority;
use crate::clock::Clock;
use crate::config::RateLimitPolicy;
use crate::error::{ActivationError, ActivationResult};
use crate::rate_limit::RateLimiter;
use licensor_types::{AccountId, HardwareId, SubscriptionSummary};
use std::sync::Arc;
use tracing::{info, warn};

/// Sends passcodes through a per-account throttle and verifies them.
pub struct OtpFlow {
    authority: Arc<dyn ActivationAuthority>,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter<AccountId>,
}

impl OtpFlow {
    pub fn new(authority: Arc<dyn ActivationAuthority>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(authority, clock, RateLimitPolicy::default())
    }

    pub fn with_policy(
        authority: Arc<dyn ActivationAuthority>,
        clock: Arc<dyn Clock>,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            authority,
            clock,
            limiter: RateLimiter::new(policy),
        }
    }

    /// Passes `account` through the local passcode throttle.
    pub(crate) fn throttle(&self, account: &AccountId) -> ActivationResult<()> {
        self.limiter
            .check_and_record(account, self.clock.now())
            .into_result()
            .map_err(|denial| {
                warn!(
                    account = %account.masked(),
                    reason = %denial.reason,
                    "verification code request throttled"
                );
                denial.into()
            })
    }

    /// Asks the authority to email a passcode to `account`.
    ///
    /// Throttled requests never reach the authority.
    pub async fn request_code(&self, account: &AccountId) -> ActivationResult<()> {
        self.throttle(account)?;
        self.authority.generate_otp(account).await?;
        info!(account = %account.masked(), "verification code sent");
        Ok(())
    }

    /// Verifies `otp` for `account`.
    pub async fn confirm(
        &self,
        account: &AccountId,
        otp: &str,
        hardware_id: &HardwareId,
    ) -> ActivationResult<Option<SubscriptionSummary>> {
        let otp = passcode(otp)?;
        let summary = self.authority.verify_otp(account, otp, hardware_id).await?;
        info!(account = %account.masked(), "email verified");
        Ok(summary)
    }
}

/// Trims a typed passcode and checks it is all digits.
pub(crate) fn passcode(otp: &str) -> ActivationResult<&str> {
    let otp = otp.trim();
    if otp.is_empty() || !otp.chars().all(|c| c.is_ascii_digit()) {
        return Err(ActivationError::InvalidInput(
            "verification code must be numeric".to_string(),
        ));
    }
    Ok(otp)
}
