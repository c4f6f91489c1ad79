//! Wire protocol of the activation authority.
//!
//! Every operation is a `POST` of a JSON request to a fixed path. Every
//! response is an [`Envelope`]: a success flag, a human-readable message, a
//! machine-readable [`Reason`] on failure and the operation's data on success.

use crate::{AccountId, HardwareId, Reason, TransferToken, TransferUsage};
use serde::{Deserialize, Serialize};

pub const GET_SUBSCRIPTION_BY_HARDWARE: &str = "/get-subscription-by-hardware";
pub const CHECK_ACTIVATION_STATUS: &str = "/check-activation-status";
pub const AUTHENTICATE: &str = "/activate";
pub const VALIDATE_CODE: &str = "/validate-code";
pub const REDEEM_CODE: &str = "/redeem-code";
pub const GENERATE_OTP: &str = "/generate-otp";
pub const VERIFY_OTP: &str = "/verify-otp";
pub const INITIATE_DEVICE_TRANSFER: &str = "/initiate-device-transfer";
pub const COMPLETE_DEVICE_TRANSFER: &str = "/complete-device-transfer";
pub const START_TRIAL: &str = "/start-trial";
pub const CONTINUE_TRIAL: &str = "/continue-trial-with-otp";
pub const CHECK_CODE_DEVICE_MISMATCH: &str = "/check-code-device-mismatch";
pub const REQUEST_CODE_REBIND: &str = "/request-code-rebind";
pub const REBIND_SUBSCRIPTION_CODE: &str = "/rebind-subscription-code";

/// Common response wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Seconds until a rate-limited request may be retried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Quota usage attached to `max_transfers_exceeded` denials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TransferUsage>,
}

impl<T> Envelope<T> {
    /// A successful response carrying `data`.
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            reason: None,
            data: Some(data),
            retry_after_secs: None,
            usage: None,
        }
    }

    /// A successful response without a payload.
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            reason: None,
            data: None,
            retry_after_secs: None,
            usage: None,
        }
    }

    /// A failed response classified by `reason`.
    pub fn fail(reason: Reason, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            reason: Some(reason),
            data: None,
            retry_after_secs: None,
            usage: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn with_usage(mut self, usage: TransferUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareLookupRequest {
    pub hardware_id: HardwareId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub email: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub email: AccountId,
    pub hardware_id: HardwareId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateCodeRequest {
    pub code: String,
    pub email: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemCodeRequest {
    pub code: String,
    pub email: AccountId,
    pub hardware_id: HardwareId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateOtpRequest {
    pub email: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: AccountId,
    pub otp_code: String,
    pub hardware_id: HardwareId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateTransferRequest {
    pub email: AccountId,
    pub current_hardware_id: HardwareId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTransferRequest {
    pub email: AccountId,
    pub new_hardware_id: HardwareId,
    pub transfer_token: TransferToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTrialRequest {
    pub email: AccountId,
    pub hardware_id: HardwareId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueTrialRequest {
    pub email: AccountId,
    pub hardware_id: HardwareId,
    pub otp_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBindingRequest {
    pub code: String,
    pub current_hardware_id: HardwareId,
}

/// Asks for a passcode to be mailed to the account holding `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRebindRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmCodeRebindRequest {
    pub code: String,
    pub otp_code: String,
    pub new_hardware_id: HardwareId,
}
