//! Contract of the remote activation authority.
//!
//! The authority is the only writer of durable subscription state and the
//! only issuer of transfer tokens. Everything in this crate talks to it
//! through [`ActivationAuthority`]; failures come back as the closed
//! classification in [`AuthorityError`].

use async_trait::async_trait;
use licensor_types::{
    AccountId, ActivationRecord, CodeBinding, CodeValidation, HardwareId, RateLimitReason,
    Reason, SubscriptionSummary, TransferReceipt, TransferTicket, TransferToken, TransferUsage,
    TrialOffer,
};
use thiserror::Error;

/// Classified authority failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    /// Transport failure or timeout.
    #[error("authority unreachable: {0}")]
    Unreachable(String),

    /// The authority answered with a failure.
    #[error("{message} ({reason})")]
    Rejected { reason: Reason, message: String },

    /// The authority throttled the request.
    #[error("rate limited ({reason}), retry in {retry_after_secs}s")]
    RateLimited {
        reason: RateLimitReason,
        retry_after_secs: u64,
    },

    /// The rolling transfer quota is used up.
    #[error("transfer limit reached ({used} of {max})")]
    QuotaExhausted { used: u32, max: u32 },

    /// The response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AuthorityError {
    /// Builds a rejection.
    pub fn rejected(reason: Reason, message: impl Into<String>) -> Self {
        Self::Rejected {
            reason,
            message: message.into(),
        }
    }

    /// Machine-readable tag of this failure.
    #[must_use]
    pub fn reason(&self) -> Reason {
        match self {
            Self::Unreachable(_) => Reason::NoInternet,
            Self::Rejected { reason, .. } => *reason,
            Self::RateLimited { reason, .. } => (*reason).into(),
            Self::QuotaExhausted { .. } => Reason::MaxTransfersExceeded,
            Self::Protocol(_) => Reason::Generic,
        }
    }

    /// Returns true when the authority could not be reached at all.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable(_))
            || matches!(
                self,
                Self::Rejected {
                    reason: Reason::NoInternet,
                    ..
                }
            )
    }

    /// Returns the rate-limit tag if the request was throttled.
    #[must_use]
    pub fn rate_limit(&self) -> Option<RateLimitReason> {
        match self {
            Self::RateLimited { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Returns quota usage attached to a quota denial.
    #[must_use]
    pub fn usage(&self) -> Option<TransferUsage> {
        match self {
            Self::QuotaExhausted { used, max } => Some(TransferUsage {
                used: *used,
                max: *max,
            }),
            _ => None,
        }
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for authority calls.
pub type AuthorityResult<T> = Result<T, AuthorityError>;

/// The remote decision point for activation and device binding.
#[async_trait]
pub trait ActivationAuthority: Send + Sync {
    /// Finds the active subscription bound to `hardware_id`.
    ///
    /// No match is `Ok(None)`, not an error.
    async fn subscription_by_hardware(
        &self,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<Option<SubscriptionSummary>>;

    /// Returns the authoritative record for `account`.
    async fn check_status(&self, account: &AccountId) -> AuthorityResult<ActivationRecord>;

    /// Binds `account` to `hardware_id` using existing credentials.
    async fn authenticate(
        &self,
        account: &AccountId,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary>;

    /// Checks a subscription code without redeeming it.
    async fn validate_code(
        &self,
        code: &str,
        account: &AccountId,
    ) -> AuthorityResult<CodeValidation>;

    /// Redeems a subscription code and binds the result to `hardware_id`.
    async fn redeem_code(
        &self,
        code: &str,
        account: &AccountId,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary>;

    /// Emails a one-time passcode to `account`.
    async fn generate_otp(&self, account: &AccountId) -> AuthorityResult<()>;

    /// Verifies a passcode, marking the account's email as verified.
    ///
    /// Returns the subscription bound to `hardware_id` if the account
    /// already has one; a fresh account has none until a code is redeemed.
    async fn verify_otp(
        &self,
        account: &AccountId,
        otp: &str,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<Option<SubscriptionSummary>>;

    /// Starts a device transfer from `current_hardware_id`.
    async fn initiate_transfer(
        &self,
        account: &AccountId,
        current_hardware_id: &HardwareId,
    ) -> AuthorityResult<TransferTicket>;

    /// Completes a device transfer onto `new_hardware_id`.
    async fn complete_transfer(
        &self,
        account: &AccountId,
        new_hardware_id: &HardwareId,
        token: &TransferToken,
    ) -> AuthorityResult<TransferReceipt>;

    /// Checks trial eligibility of `account` on `hardware_id` and emails a
    /// passcode to confirm it.
    async fn start_trial(
        &self,
        account: &AccountId,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<TrialOffer>;

    /// Verifies the trial passcode and starts the trial on `hardware_id`, or
    /// moves a running trial there.
    async fn continue_trial(
        &self,
        account: &AccountId,
        otp: &str,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary>;

    /// Reports whether a redeemed code's subscription is bound elsewhere.
    async fn check_code_binding(
        &self,
        code: &str,
        current_hardware_id: &HardwareId,
    ) -> AuthorityResult<CodeBinding>;

    /// Emails a passcode to the account that redeemed `code`.
    async fn request_code_rebind(&self, code: &str) -> AuthorityResult<()>;

    /// Verifies that passcode and binds the code's subscription to
    /// `new_hardware_id`. A move counts against the transfer quota.
    async fn confirm_code_rebind(
        &self,
        code: &str,
        otp: &str,
        new_hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary>;
}
