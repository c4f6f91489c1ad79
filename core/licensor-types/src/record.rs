//! Entitlement records exchanged with the authority.

use crate::{AccountId, HardwareId, TransferToken};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entitlement snapshot for one account, as confirmed by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// Account email.
    #[serde(rename = "email")]
    pub account: AccountId,
    /// Machine the subscription is bound to.
    pub hardware_id: HardwareId,
    /// Subscription tier, e.g. `"pro"`.
    #[serde(rename = "subscription_type")]
    pub tier: String,
    /// Subscription code used to activate, if any.
    #[serde(rename = "subscription_code", default)]
    pub code: Option<String>,
    #[serde(rename = "activation_date", default)]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(rename = "expiry_date")]
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub email_verified: bool,
    /// Last successful online confirmation.
    #[serde(rename = "last_sync", default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Lifetime number of device transfers.
    #[serde(rename = "device_transfer_count", default)]
    pub transfer_count: u32,
    #[serde(rename = "last_device_transfer_date", default)]
    pub last_transfer_at: Option<DateTime<Utc>>,
}

impl ActivationRecord {
    /// Builds a record from a subscription summary found for `hardware_id`.
    #[must_use]
    pub fn from_summary(summary: &SubscriptionSummary, hardware_id: HardwareId) -> Self {
        Self {
            account: summary.account.clone(),
            hardware_id,
            tier: summary.tier.clone(),
            code: None,
            activated_at: None,
            expires_at: summary.expires_at,
            is_active: summary.is_active,
            email_verified: false,
            last_synced_at: None,
            transfer_count: 0,
            last_transfer_at: None,
        }
    }

    /// Returns true once `now` has reached the expiry date.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the record is bound to `hardware_id`.
    #[must_use]
    pub fn is_bound_to(&self, hardware_id: &HardwareId) -> bool {
        &self.hardware_id == hardware_id
    }

    /// Whole days left before expiry, never negative.
    #[must_use]
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days().max(0)
    }

    /// Returns the short summary form of this record.
    #[must_use]
    pub fn summary(&self) -> SubscriptionSummary {
        SubscriptionSummary {
            account: self.account.clone(),
            tier: self.tier.clone(),
            expires_at: self.expires_at,
            is_active: self.is_active,
            hardware_id: Some(self.hardware_id.clone()),
        }
    }
}

/// Short subscription description returned by binding operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    #[serde(rename = "email")]
    pub account: AccountId,
    #[serde(rename = "subscription_type")]
    pub tier: String,
    #[serde(rename = "expiry_date")]
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_id: Option<HardwareId>,
}

/// Result of checking a subscription code without redeeming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeValidation {
    pub valid: bool,
    #[serde(rename = "subscription_type")]
    pub tier: String,
    pub duration_days: u32,
}

/// Issued by `initiate-device-transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTicket {
    pub transfer_token: TransferToken,
    pub expires_in_seconds: u64,
}

/// Transfers counted against the rolling quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferUsage {
    #[serde(rename = "transfers_used")]
    pub used: u32,
    #[serde(rename = "max_transfers_per_30days")]
    pub max: u32,
}

impl TransferUsage {
    /// Transfers still available in the current window.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }

    /// Returns true when no transfer is left.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }
}

/// Returned by a successful `complete-device-transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub subscription: SubscriptionSummary,
    #[serde(rename = "device_transfer_count")]
    pub transfer_count: u32,
    pub transfers_used_in_30days: u32,
    pub max_transfers_per_30days: u32,
}

/// Returned by `start-trial` once a passcode is on its way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialOffer {
    pub trial_days: u32,
    /// The account already holds a running trial, which will be moved to
    /// the requesting machine rather than restarted.
    #[serde(rename = "existing_subscription", default)]
    pub existing_trial: bool,
}

/// Where a subscription code's subscription is bound, relative to the
/// asking machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBinding {
    /// The code was redeemed and its subscription runs on another machine.
    pub mismatch: bool,
    /// Masked email of the account that redeemed the code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_email: Option<String>,
}
