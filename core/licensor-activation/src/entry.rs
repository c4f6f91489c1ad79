//! Activation paths behind the license-entry prompt.
//!
//! Three ways in: existing credentials, a subscription code, or a free
//! trial. Codes and trials are confirmed by an emailed passcode. A code whose
//! subscription runs on another machine can be pulled onto this one once the
//! account that redeemed it confirms a passcode. Each path ends with the
//! authority binding the account to this machine and an [`ActivationRecord`]
//! the prompt hands back to the controller.

use crate::authority::{ActivationAuthority, AuthorityError};
use crate::clock::Clock;
use crate::device::HardwareIdSource;
use crate::error::{ActivationError, ActivationResult};
use crate::verification::{OtpFlow, passcode};
use licensor_types::{
    AccountId, ActivationRecord, CodeBinding, CodeValidation, HardwareId, Reason,
    SubscriptionSummary, TrialOffer,
};
use std::sync::Arc;
use tracing::info;

/// A validated code waiting for passcode confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCodeActivation {
    pub account: AccountId,
    pub code: String,
    pub validation: CodeValidation,
}

/// A trial waiting for passcode confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTrial {
    pub account: AccountId,
    pub offer: TrialOffer,
}

/// A code rebind waiting for its owner's passcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCodeRebind {
    pub code: String,
}

pub struct LicenseEntry {
    authority: Arc<dyn ActivationAuthority>,
    device: Arc<dyn HardwareIdSource>,
    clock: Arc<dyn Clock>,
    otp: OtpFlow,
}

impl LicenseEntry {
    pub fn new(
        authority: Arc<dyn ActivationAuthority>,
        device: Arc<dyn HardwareIdSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let otp = OtpFlow::new(Arc::clone(&authority), Arc::clone(&clock));
        Self::with_otp_flow(authority, device, clock, otp)
    }

    pub fn with_otp_flow(
        authority: Arc<dyn ActivationAuthority>,
        device: Arc<dyn HardwareIdSource>,
        clock: Arc<dyn Clock>,
        otp: OtpFlow,
    ) -> Self {
        Self {
            authority,
            device,
            clock,
            otp,
        }
    }

    /// Binds an account that already holds a subscription.
    pub async fn activate_with_credentials(
        &self,
        email: &str,
    ) -> ActivationResult<ActivationRecord> {
        let account = AccountId::new(email)?;
        let hardware_id = self.device.hardware_id()?;

        let summary = self.authority.authenticate(&account, &hardware_id).await?;
        info!(account = %account.masked(), hw = hardware_id.short(), "activated with credentials");
        Ok(self.record_for(&summary, hardware_id))
    }

    /// Validates `code` and emails a passcode to confirm ownership of the
    /// account.
    pub async fn begin_code_activation(
        &self,
        email: &str,
        code: &str,
    ) -> ActivationResult<PendingCodeActivation> {
        let account = AccountId::new(email)?;
        let code = normalize_code(code)?;

        let validation = self.authority.validate_code(&code, &account).await?;
        if !validation.valid {
            return Err(AuthorityError::rejected(
                Reason::InvalidCode,
                "subscription code is not valid",
            )
            .into());
        }

        self.otp.request_code(&account).await?;
        Ok(PendingCodeActivation {
            account,
            code,
            validation,
        })
    }

    /// Sends another passcode for a pending activation.
    pub async fn resend_code(&self, pending: &PendingCodeActivation) -> ActivationResult<()> {
        self.otp.request_code(&pending.account).await
    }

    /// Verifies the passcode, then redeems the code onto this machine.
    pub async fn confirm_code_activation(
        &self,
        pending: &PendingCodeActivation,
        otp: &str,
    ) -> ActivationResult<ActivationRecord> {
        let hardware_id = self.device.hardware_id()?;
        self.otp.confirm(&pending.account, otp, &hardware_id).await?;

        let summary = self
            .authority
            .redeem_code(&pending.code, &pending.account, &hardware_id)
            .await?;
        info!(
            account = %pending.account.masked(),
            tier = %summary.tier,
            "subscription code redeemed"
        );

        let mut record = self.record_for(&summary, hardware_id);
        record.code = Some(pending.code.clone());
        record.email_verified = true;
        Ok(record)
    }

    /// Redeems a code without passcode confirmation.
    pub async fn activate_with_code(
        &self,
        email: &str,
        code: &str,
    ) -> ActivationResult<ActivationRecord> {
        let account = AccountId::new(email)?;
        let code = normalize_code(code)?;
        let hardware_id = self.device.hardware_id()?;

        let summary = self
            .authority
            .redeem_code(&code, &account, &hardware_id)
            .await?;
        info!(account = %account.masked(), tier = %summary.tier, "subscription code redeemed");

        let mut record = self.record_for(&summary, hardware_id);
        record.code = Some(code);
        Ok(record)
    }

    /// Checks trial eligibility of this machine and emails a passcode.
    pub async fn begin_trial(&self, email: &str) -> ActivationResult<PendingTrial> {
        let account = AccountId::new(email)?;
        let hardware_id = self.device.hardware_id()?;

        self.otp.throttle(&account)?;
        let offer = self.authority.start_trial(&account, &hardware_id).await?;
        info!(
            account = %account.masked(),
            days = offer.trial_days,
            existing = offer.existing_trial,
            "trial passcode sent"
        );
        Ok(PendingTrial { account, offer })
    }

    /// Verifies the passcode and starts, or resumes, the trial here.
    pub async fn confirm_trial(
        &self,
        pending: &PendingTrial,
        otp: &str,
    ) -> ActivationResult<ActivationRecord> {
        let otp = passcode(otp)?;
        let hardware_id = self.device.hardware_id()?;

        let summary = self
            .authority
            .continue_trial(&pending.account, otp, &hardware_id)
            .await?;
        info!(
            account = %pending.account.masked(),
            expires_at = %summary.expires_at,
            "trial activated"
        );

        let mut record = self.record_for(&summary, hardware_id);
        record.email_verified = true;
        Ok(record)
    }

    /// Asks whether `code` is already in use on another machine.
    pub async fn check_code_binding(&self, code: &str) -> ActivationResult<CodeBinding> {
        let code = normalize_code(code)?;
        let hardware_id = self.device.hardware_id()?;
        Ok(self.authority.check_code_binding(&code, &hardware_id).await?)
    }

    /// Emails a passcode to the account that redeemed `code`.
    ///
    /// Only the authority knows that account, so throttling is left to it.
    pub async fn begin_code_rebind(&self, code: &str) -> ActivationResult<PendingCodeRebind> {
        let code = normalize_code(code)?;
        self.authority.request_code_rebind(&code).await?;
        info!("code rebind passcode sent");
        Ok(PendingCodeRebind { code })
    }

    /// Verifies the owner's passcode and moves the code's subscription here.
    pub async fn confirm_code_rebind(
        &self,
        pending: &PendingCodeRebind,
        otp: &str,
    ) -> ActivationResult<ActivationRecord> {
        let otp = passcode(otp)?;
        let hardware_id = self.device.hardware_id()?;

        let summary = self
            .authority
            .confirm_code_rebind(&pending.code, otp, &hardware_id)
            .await?;
        info!(
            account = %summary.account.masked(),
            hw = hardware_id.short(),
            "subscription code rebound"
        );

        let mut record = self.record_for(&summary, hardware_id);
        record.code = Some(pending.code.clone());
        record.email_verified = true;
        Ok(record)
    }

    fn record_for(
        &self,
        summary: &SubscriptionSummary,
        hardware_id: HardwareId,
    ) -> ActivationRecord {
        let now = self.clock.now();
        let mut record = ActivationRecord::from_summary(summary, hardware_id);
        record.activated_at = Some(now);
        record.last_synced_at = Some(now);
        record
    }
}

fn normalize_code(code: &str) -> ActivationResult<String> {
    let code = code.trim().to_uppercase();
    if code.is_empty() || code.chars().any(char::is_whitespace) {
        return Err(ActivationError::InvalidInput(
            "subscription code is empty or malformed".to_string(),
        ));
    }
    Ok(code)
}
