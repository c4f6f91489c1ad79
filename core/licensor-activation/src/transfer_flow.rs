//! Two-phase move of a subscription to a new machine.
//!
//! `initiate` runs on the machine that currently holds the license and asks
//! the authority for a transfer token, which is delivered out of band.
//! `complete` runs on the new machine and trades the token for a rebinding.
//! Initiation passes a per-account throttle before the authority is asked.

use crate::authority::{ActivationAuthority, AuthorityError};
use crate::clock::Clock;
use crate::config::{RateLimitPolicy, TransferPolicy};
use crate::device::HardwareIdSource;
use crate::error::{ActivationError, ActivationResult};
use crate::rate_limit::RateLimiter;
use crate::transfer::{CodeKind, CodeRejection, TransferLedger};
use chrono::Duration;
use licensor_types::{
    AccountId, HardwareId, Reason, TransferReceipt, TransferTicket, TransferToken,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct DeviceTransferFlow {
    authority: Arc<dyn ActivationAuthority>,
    device: Arc<dyn HardwareIdSource>,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter<AccountId>,
    ledger: TransferLedger,
}

impl DeviceTransferFlow {
    pub fn new(
        authority: Arc<dyn ActivationAuthority>,
        device: Arc<dyn HardwareIdSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_policies(
            authority,
            device,
            clock,
            RateLimitPolicy::default(),
            TransferPolicy::default(),
        )
    }

    pub fn with_policies(
        authority: Arc<dyn ActivationAuthority>,
        device: Arc<dyn HardwareIdSource>,
        clock: Arc<dyn Clock>,
        rate_limit: RateLimitPolicy,
        transfer: TransferPolicy,
    ) -> Self {
        Self {
            authority,
            device,
            clock,
            limiter: RateLimiter::new(rate_limit),
            ledger: TransferLedger::new(transfer),
        }
    }

    /// Starts a transfer away from this machine.
    pub async fn initiate(&self, email: &str) -> ActivationResult<TransferTicket> {
        let account = AccountId::new(email)?;
        let current = self.device.hardware_id()?;
        self.initiate_from(&account, &current).await
    }

    /// Starts a transfer away from `current_hardware_id`.
    pub async fn initiate_from(
        &self,
        account: &AccountId,
        current_hardware_id: &HardwareId,
    ) -> ActivationResult<TransferTicket> {
        let now = self.clock.now();
        if let Err(denial) = self.limiter.check_and_record(account, now).into_result() {
            warn!(
                account = %account.masked(),
                reason = %denial.reason,
                "transfer initiation throttled"
            );
            return Err(denial.into());
        }

        let ticket = self
            .authority
            .initiate_transfer(account, current_hardware_id)
            .await?;

        // Never trust a token longer than the local policy allows.
        let max_ttl = self.ledger.policy().token_ttl;
        let ttl = i64::try_from(ticket.expires_in_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .map_or(max_ttl, |ttl| ttl.min(max_ttl));
        if self
            .ledger
            .issue_code(
                CodeKind::Transfer,
                account,
                ticket.transfer_token.as_str(),
                ttl,
                now,
            )
            .is_none()
        {
            warn!(account = %account.masked(), "transfer token expiry out of range");
        }
        info!(
            account = %account.masked(),
            expires_in_seconds = ticket.expires_in_seconds,
            "device transfer initiated"
        );
        Ok(ticket)
    }

    /// Moves the subscription onto this machine.
    pub async fn complete(&self, email: &str, token: &str) -> ActivationResult<TransferReceipt> {
        let account = AccountId::new(email)?;
        let token = TransferToken::parse(token).map_err(|_| ActivationError::InvalidTransferToken)?;
        let new_hardware_id = self.device.hardware_id()?;
        self.complete_onto(&account, &new_hardware_id, &token).await
    }

    /// Moves the subscription onto `new_hardware_id`.
    ///
    /// A token this process already saw used or expire is refused without
    /// asking the authority. Any token failure surfaces as
    /// [`ActivationError::InvalidTransferToken`] with no further detail.
    pub async fn complete_onto(
        &self,
        account: &AccountId,
        new_hardware_id: &HardwareId,
        token: &TransferToken,
    ) -> ActivationResult<TransferReceipt> {
        let now = self.clock.now();
        match self
            .ledger
            .check_code(CodeKind::Transfer, account, token.as_str(), now)
        {
            Err(CodeRejection::Consumed | CodeRejection::Expired) => {
                warn!(account = %account.masked(), "stale transfer token refused locally");
                return Err(ActivationError::InvalidTransferToken);
            }
            // Tokens issued to another machine are only known to the authority.
            Ok(()) | Err(CodeRejection::Unknown) => {}
        }

        match self
            .authority
            .complete_transfer(account, new_hardware_id, token)
            .await
        {
            Ok(receipt) => {
                self.ledger
                    .mark_consumed(CodeKind::Transfer, account, token.as_str(), now);
                info!(
                    account = %account.masked(),
                    hw = new_hardware_id.short(),
                    used = receipt.transfers_used_in_30days,
                    max = receipt.max_transfers_per_30days,
                    "device transfer completed"
                );
                Ok(receipt)
            }
            Err(AuthorityError::Rejected {
                reason: Reason::InvalidTransferToken,
                ..
            }) => Err(ActivationError::InvalidTransferToken),
            Err(err) => {
                if let Some(usage) = err.usage() {
                    warn!(
                        account = %account.masked(),
                        used = usage.used,
                        max = usage.max,
                        "transfer quota exhausted"
                    );
                }
                Err(err.into())
            }
        }
    }
}
