//! One-time codes and the rolling device-transfer quota.
//!
//! A code belongs to one account and carries a [`CodeKind`]; an OTP can never
//! be presented as a transfer token or the other way round. Codes move one
//! way, `unused -> consumed`, and an expired code is inert.
//!
//! The transfer quota is derived on demand from the timestamps of past
//! transfers inside the trailing window.

use crate::config::TransferPolicy;
use chrono::{DateTime, Duration, Utc};
use licensor_types::{AccountId, TransferToken, TransferUsage};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// What a one-time code authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeKind {
    /// Email verification passcode.
    Otp,
    /// Device transfer token.
    Transfer,
}

/// Why a presented code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodeRejection {
    #[error("unknown code")]
    Unknown,
    #[error("code expired")]
    Expired,
    #[error("code already used")]
    Consumed,
}

/// Why a transfer could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransferDenial {
    /// Wrong, expired or replayed token, indistinguishably.
    #[error("invalid or expired transfer token")]
    InvalidToken,
    #[error("transfer limit reached ({} of {})", .0.used, .0.max)]
    QuotaExceeded(TransferUsage),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CodeKey {
    kind: CodeKind,
    account: AccountId,
    code: String,
}

#[derive(Debug, Clone)]
struct IssuedCode {
    expires_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
}

impl IssuedCode {
    fn check(&self, now: DateTime<Utc>) -> Result<(), CodeRejection> {
        if self.consumed_at.is_some() {
            return Err(CodeRejection::Consumed);
        }
        if now >= self.expires_at {
            return Err(CodeRejection::Expired);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    codes: HashMap<CodeKey, IssuedCode>,
    transfers: HashMap<AccountId, Vec<DateTime<Utc>>>,
}

impl LedgerState {
    fn recent_transfers(&mut self, account: &AccountId, cutoff: DateTime<Utc>) -> u32 {
        let Some(history) = self.transfers.get_mut(account) else {
            return 0;
        };
        history.retain(|at| *at > cutoff);
        u32::try_from(history.len()).unwrap_or(u32::MAX)
    }
}

/// Token issuance, consumption and quota accounting.
#[derive(Debug)]
pub struct TransferLedger {
    policy: TransferPolicy,
    state: Mutex<LedgerState>,
}

impl TransferLedger {
    #[must_use]
    pub fn new(policy: TransferPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(LedgerState::default()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &TransferPolicy {
        &self.policy
    }

    /// Records a one-time code valid for `ttl` from `now`.
    ///
    /// Returns `None` and records nothing if the expiry is out of range.
    pub fn issue_code(
        &self,
        kind: CodeKind,
        account: &AccountId,
        code: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let expires_at = now.checked_add_signed(ttl)?;
        let key = CodeKey {
            kind,
            account: account.clone(),
            code: code.to_string(),
        };
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.codes.insert(
            key,
            IssuedCode {
                expires_at,
                consumed_at: None,
            },
        );
        Some(expires_at)
    }

    /// Checks a code without consuming it.
    pub fn check_code(
        &self,
        kind: CodeKind,
        account: &AccountId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CodeRejection> {
        let key = CodeKey {
            kind,
            account: account.clone(),
            code: code.to_string(),
        };
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .codes
            .get(&key)
            .ok_or(CodeRejection::Unknown)?
            .check(now)
    }

    /// Checks and consumes a code in one step.
    pub fn consume_code(
        &self,
        kind: CodeKind,
        account: &AccountId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CodeRejection> {
        let key = CodeKey {
            kind,
            account: account.clone(),
            code: code.to_string(),
        };
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let issued = state.codes.get_mut(&key).ok_or(CodeRejection::Unknown)?;
        issued.check(now)?;
        issued.consumed_at = Some(now);
        Ok(())
    }

    /// Marks a code as used whether or not it was issued here.
    pub fn mark_consumed(
        &self,
        kind: CodeKind,
        account: &AccountId,
        code: &str,
        now: DateTime<Utc>,
    ) {
        let key = CodeKey {
            kind,
            account: account.clone(),
            code: code.to_string(),
        };
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .codes
            .entry(key)
            .or_insert(IssuedCode {
                expires_at: now,
                consumed_at: None,
            })
            .consumed_at = Some(now);
    }

    /// Issues a transfer token for `account`, returning its expiry.
    pub fn issue(
        &self,
        account: &AccountId,
        token: &TransferToken,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        debug!(account = %account.masked(), "transfer token issued");
        self.issue_code(
            CodeKind::Transfer,
            account,
            token.as_str(),
            self.policy.token_ttl,
            now,
        )
    }

    /// Consumes a transfer token and counts the transfer against the quota.
    ///
    /// The token check, the quota check and the consumption happen under one
    /// lock. A quota denial leaves the token unconsumed.
    pub fn redeem(
        &self,
        account: &AccountId,
        token: &TransferToken,
        now: DateTime<Utc>,
    ) -> Result<TransferUsage, TransferDenial> {
        let key = CodeKey {
            kind: CodeKind::Transfer,
            account: account.clone(),
            code: token.as_str().to_string(),
        };
        let cutoff = now - self.policy.window;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        match state.codes.get(&key) {
            Some(issued) if issued.check(now).is_ok() => {}
            _ => return Err(TransferDenial::InvalidToken),
        }

        let used = state.recent_transfers(account, cutoff);
        if used >= self.policy.quota {
            return Err(TransferDenial::QuotaExceeded(TransferUsage {
                used,
                max: self.policy.quota,
            }));
        }

        if let Some(issued) = state.codes.get_mut(&key) {
            issued.consumed_at = Some(now);
        }
        state.transfers.entry(account.clone()).or_default().push(now);

        Ok(TransferUsage {
            used: used + 1,
            max: self.policy.quota,
        })
    }

    /// Records a transfer that happened at `at`, outside of [`redeem`](Self::redeem).
    pub fn record_transfer(&self, account: &AccountId, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.transfers.entry(account.clone()).or_default().push(at);
    }

    /// Transfers used by `account` in the window ending at `now`.
    pub fn usage(&self, account: &AccountId, now: DateTime<Utc>) -> TransferUsage {
        let cutoff = now - self.policy.window;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        TransferUsage {
            used: state.recent_transfers(account, cutoff),
            max: self.policy.quota,
        }
    }

    /// Drops codes that expired by `now`, used or not, and transfers that
    /// left the quota window. Returns how many codes were removed.
    ///
    /// A purged code is rejected as unknown, which callers treat the same as
    /// expired or used.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.policy.window;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state.codes.len();
        state.codes.retain(|_, issued| now < issued.expires_at);
        state.transfers.retain(|_, history| {
            history.retain(|at| *at > cutoff);
            !history.is_empty()
        });
        before - state.codes.len()
    }
}

impl Default for TransferLedger {
    fn default() -> Self {
        Self::new(TransferPolicy::default())
    }
}
