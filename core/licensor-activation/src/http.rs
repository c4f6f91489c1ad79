//! HTTP client for a remote activation authority.

use crate::authority::{ActivationAuthority, AuthorityError, AuthorityResult};
use crate::config::REQUEST_TIMEOUT_MS;
use async_trait::async_trait;
use licensor_types::protocol::{self, Envelope};
use licensor_types::{
    AccountId, ActivationRecord, CodeBinding, CodeValidation, HardwareId, Reason,
    SubscriptionSummary, TransferReceipt, TransferTicket, TransferToken, TrialOffer,
};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use std::time::Duration;
use tracing::{debug, warn};

/// Where the authority lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl AuthorityConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: REQUEST_TIMEOUT_MS,
        }
    }
}

/// [`ActivationAuthority`] over JSON-over-HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthority {
    pub fn new(config: AuthorityConfig) -> AuthorityResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AuthorityError::Protocol(e.to_string()))?;
        Ok(Self::from_reqwest(&config.base_url, client))
    }

    /// Uses a preconfigured client.
    #[must_use]
    pub fn from_reqwest(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> AuthorityResult<Option<T>>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(%path, "authority request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthorityError::Unreachable(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuthorityError::Unreachable(e.to_string()))?;

        let envelope: Envelope<T> = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(%path, %status, "unreadable authority response");
            AuthorityError::Protocol(format!("HTTP {status}: {e}"))
        })?;
        classify(envelope)
    }

    async fn post_required<B, T>(&self, path: &str, body: &B) -> AuthorityResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        self.post(path, body)
            .await?
            .ok_or_else(|| AuthorityError::Protocol(format!("{path}: response without data")))
    }
}

/// Maps a failure envelope onto the closed classification.
fn classify<T>(envelope: Envelope<T>) -> AuthorityResult<Option<T>> {
    if envelope.success {
        return Ok(envelope.data);
    }

    let reason = envelope.reason.unwrap_or(Reason::Generic);
    if let Some(rate_limit) = reason.rate_limit() {
        return Err(AuthorityError::RateLimited {
            reason: rate_limit,
            retry_after_secs: envelope.retry_after_secs.unwrap_or(0),
        });
    }
    if reason == Reason::MaxTransfersExceeded {
        if let Some(usage) = envelope.usage {
            return Err(AuthorityError::QuotaExhausted {
                used: usage.used,
                max: usage.max,
            });
        }
    }
    Err(AuthorityError::Rejected {
        reason,
        message: envelope.message,
    })
}

#[async_trait]
impl ActivationAuthority for HttpAuthority {
    async fn subscription_by_hardware(
        &self,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<Option<SubscriptionSummary>> {
        let body = protocol::HardwareLookupRequest {
            hardware_id: hardware_id.clone(),
        };
        match self.post(protocol::GET_SUBSCRIPTION_BY_HARDWARE, &body).await {
            Err(AuthorityError::Rejected {
                reason: Reason::NotFound,
                ..
            }) => Ok(None),
            other => other,
        }
    }

    async fn check_status(&self, account: &AccountId) -> AuthorityResult<ActivationRecord> {
        let body = protocol::StatusRequest {
            email: account.clone(),
        };
        self.post_required(protocol::CHECK_ACTIVATION_STATUS, &body)
            .await
    }

    async fn authenticate(
        &self,
        account: &AccountId,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        let body = protocol::AuthenticateRequest {
            email: account.clone(),
            hardware_id: hardware_id.clone(),
        };
        self.post_required(protocol::AUTHENTICATE, &body).await
    }

    async fn validate_code(
        &self,
        code: &str,
        account: &AccountId,
    ) -> AuthorityResult<CodeValidation> {
        let body = protocol::ValidateCodeRequest {
            code: code.to_string(),
            email: account.clone(),
        };
        self.post_required(protocol::VALIDATE_CODE, &body).await
    }

    async fn redeem_code(
        &self,
        code: &str,
        account: &AccountId,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        let body = protocol::RedeemCodeRequest {
            code: code.to_string(),
            email: account.clone(),
            hardware_id: hardware_id.clone(),
        };
        self.post_required(protocol::REDEEM_CODE, &body).await
    }

    async fn generate_otp(&self, account: &AccountId) -> AuthorityResult<()> {
        let body = protocol::GenerateOtpRequest {
            email: account.clone(),
        };
        self.post::<_, IgnoredAny>(protocol::GENERATE_OTP, &body)
            .await
            .map(|_| ())
    }

    async fn verify_otp(
        &self,
        account: &AccountId,
        otp: &str,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<Option<SubscriptionSummary>> {
        let body = protocol::VerifyOtpRequest {
            email: account.clone(),
            otp_code: otp.to_string(),
            hardware_id: hardware_id.clone(),
        };
        self.post(protocol::VERIFY_OTP, &body).await
    }

    async fn initiate_transfer(
        &self,
        account: &AccountId,
        current_hardware_id: &HardwareId,
    ) -> AuthorityResult<TransferTicket> {
        let body = protocol::InitiateTransferRequest {
            email: account.clone(),
            current_hardware_id: current_hardware_id.clone(),
        };
        self.post_required(protocol::INITIATE_DEVICE_TRANSFER, &body)
            .await
    }

    async fn complete_transfer(
        &self,
        account: &AccountId,
        new_hardware_id: &HardwareId,
        token: &TransferToken,
    ) -> AuthorityResult<TransferReceipt> {
        let body = protocol::CompleteTransferRequest {
            email: account.clone(),
            new_hardware_id: new_hardware_id.clone(),
            transfer_token: token.clone(),
        };
        self.post_required(protocol::COMPLETE_DEVICE_TRANSFER, &body)
            .await
    }

    async fn start_trial(
        &self,
        account: &AccountId,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<TrialOffer> {
        let body = protocol::StartTrialRequest {
            email: account.clone(),
            hardware_id: hardware_id.clone(),
        };
        self.post_required(protocol::START_TRIAL, &body).await
    }

    async fn continue_trial(
        &self,
        account: &AccountId,
        otp: &str,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        let body = protocol::ContinueTrialRequest {
            email: account.clone(),
            hardware_id: hardware_id.clone(),
            otp_code: otp.to_string(),
        };
        self.post_required(protocol::CONTINUE_TRIAL, &body).await
    }

    async fn check_code_binding(
        &self,
        code: &str,
        current_hardware_id: &HardwareId,
    ) -> AuthorityResult<CodeBinding> {
        let body = protocol::CodeBindingRequest {
            code: code.to_string(),
            current_hardware_id: current_hardware_id.clone(),
        };
        self.post_required(protocol::CHECK_CODE_DEVICE_MISMATCH, &body)
            .await
    }

    async fn request_code_rebind(&self, code: &str) -> AuthorityResult<()> {
        let body = protocol::CodeRebindRequest {
            code: code.to_string(),
        };
        self.post::<_, IgnoredAny>(protocol::REQUEST_CODE_REBIND, &body)
            .await
            .map(|_| ())
    }

    async fn confirm_code_rebind(
        &self,
        code: &str,
        otp: &str,
        new_hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        let body = protocol::ConfirmCodeRebindRequest {
            code: code.to_string(),
            otp_code: otp.to_string(),
            new_hardware_id: new_hardware_id.clone(),
        };
        self.post_required(protocol::REBIND_SUBSCRIPTION_CODE, &body)
            .await
    }
}
