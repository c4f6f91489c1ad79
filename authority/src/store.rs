//! In-memory authority.
//!
//! Holds every subscription, subscription code, verified email and trial
//! device in one lock. Passcodes and transfer tokens live in a
//! [`TransferLedger`], which also counts completed transfers against the
//! rolling quota. Passcode requests and transfer initiations go through
//! their own per-account [`RateLimiter`]; a third one counts failed sign-in
//! and passcode attempts.

use crate::mailer::Mailer;
use crate::seed::{CodeSeed, Seed};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use licensor_activation::config::{
    OTP_TTL_SECS, RateLimitPolicy, TRIAL_DURATION_DAYS, TransferPolicy,
};
use licensor_activation::{
    ActivationAuthority, AuthorityError, AuthorityResult, Clock, CodeKind, CodeRejection,
    RateLimitDenial, RateLimiter, TransferDenial, TransferLedger,
};
use licensor_types::{
    AccountId, ActivationRecord, CodeBinding, CodeValidation, HardwareId, Reason,
    SubscriptionSummary, TransferReceipt, TransferTicket, TransferToken, TrialOffer,
};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Server-side limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityOptions {
    /// Lifetime of an emailed passcode.
    pub otp_ttl: Duration,
    pub otp_rate_limit: RateLimitPolicy,
    pub transfer_rate_limit: RateLimitPolicy,
    /// Failed sign-in and passcode attempts per account.
    pub attempt_limit: RateLimitPolicy,
    pub transfer: TransferPolicy,
    pub trial_days: u32,
}

impl Default for AuthorityOptions {
    fn default() -> Self {
        Self {
            otp_ttl: Duration::seconds(OTP_TTL_SECS),
            otp_rate_limit: RateLimitPolicy::default(),
            transfer_rate_limit: RateLimitPolicy::default(),
            attempt_limit: RateLimitPolicy::failed_attempts(),
            transfer: TransferPolicy::default(),
            trial_days: TRIAL_DURATION_DAYS,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredCode {
    tier: String,
    duration_days: u32,
    expires_at: Option<DateTime<Utc>>,
    redeemed_by: Option<AccountId>,
}

#[derive(Debug, Default)]
struct StoreState {
    subscriptions: HashMap<AccountId, ActivationRecord>,
    codes: HashMap<String, StoredCode>,
    verified: HashSet<AccountId>,
    /// Machines that have run a trial, and for whom.
    trial_devices: HashMap<HardwareId, AccountId>,
}

pub struct MemoryAuthority {
    state: Mutex<StoreState>,
    ledger: TransferLedger,
    otp_limiter: RateLimiter<AccountId>,
    transfer_limiter: RateLimiter<AccountId>,
    attempt_limiter: RateLimiter<AccountId>,
    options: AuthorityOptions,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
}

impl MemoryAuthority {
    pub fn new(mailer: Arc<dyn Mailer>, clock: Arc<dyn Clock>) -> Self {
        Self::with_options(mailer, clock, AuthorityOptions::default())
    }

    pub fn with_options(
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        options: AuthorityOptions,
    ) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            ledger: TransferLedger::new(options.transfer),
            otp_limiter: RateLimiter::new(options.otp_rate_limit),
            transfer_limiter: RateLimiter::new(options.transfer_rate_limit),
            attempt_limiter: RateLimiter::new(options.attempt_limit),
            options,
            mailer,
            clock,
        }
    }

    #[must_use]
    pub fn options(&self) -> &AuthorityOptions {
        &self.options
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads subscriptions, their transfer history and codes.
    pub fn apply_seed(&self, seed: Seed) {
        let (subscriptions, codes) = (seed.subscriptions.len(), seed.codes.len());
        for subscription in seed.subscriptions {
            for at in &subscription.recent_transfers {
                self.ledger.record_transfer(&subscription.record.account, *at);
            }
            self.insert_subscription(subscription.record);
        }
        for code in seed.codes {
            self.insert_code(code);
        }
        info!(subscriptions, codes, "seed loaded");
    }

    pub fn insert_subscription(&self, record: ActivationRecord) {
        let mut state = self.lock();
        if record.tier == TRIAL_TIER {
            state
                .trial_devices
                .insert(record.hardware_id.clone(), record.account.clone());
        }
        state.subscriptions.insert(record.account.clone(), record);
    }

    pub fn insert_code(&self, code: CodeSeed) {
        self.lock().codes.insert(
            normalize_code(&code.code),
            StoredCode {
                tier: code.tier,
                duration_days: code.duration_days,
                expires_at: code.expires_at,
                redeemed_by: code.redeemed_by,
            },
        );
    }

    /// Counts a transfer made at `at` against the quota of `account`.
    pub fn record_transfer(&self, account: &AccountId, at: DateTime<Utc>) {
        self.ledger.record_transfer(account, at);
    }

    /// Current record of `account`.
    pub fn subscription(&self, account: &AccountId) -> Option<ActivationRecord> {
        self.lock().subscriptions.get(account).cloned()
    }

    /// Drops expired passcodes and transfer tokens and forgets throttle
    /// windows that no longer affect any decision. Returns how many codes
    /// were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = self.ledger.purge_expired(now);
        let forgotten = self.otp_limiter.prune(now)
            + self.transfer_limiter.prune(now)
            + self.attempt_limiter.prune(now);
        if removed > 0 || forgotten > 0 {
            debug!(removed, forgotten, "expired state purged");
        }
        removed
    }

    /// Accounts currently held by any throttle.
    #[must_use]
    pub fn throttled_accounts(&self) -> usize {
        self.otp_limiter.tracked()
            + self.transfer_limiter.tracked()
            + self.attempt_limiter.tracked()
    }

    /// Refuses `account` while it is locked out for failed attempts.
    fn check_attempts(&self, account: &AccountId, now: DateTime<Utc>) -> AuthorityResult<()> {
        self.attempt_limiter
            .check(account, now)
            .into_result()
            .map_err(|denial| rate_limited(account, denial, "sign-in attempt"))
    }

    /// Counts `result` against `account` if it failed.
    fn count_failure<T>(
        &self,
        account: &AccountId,
        now: DateTime<Utc>,
        result: AuthorityResult<T>,
    ) -> AuthorityResult<T> {
        if result.is_err() {
            self.attempt_limiter.record(account, now);
        }
        result
    }

    async fn send_passcode(&self, account: &AccountId, now: DateTime<Utc>) -> AuthorityResult<()> {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.ledger
            .issue_code(CodeKind::Otp, account, &code, self.options.otp_ttl, now)
            .ok_or_else(|| {
                AuthorityError::rejected(Reason::Generic, "passcode lifetime out of range")
            })?;

        self.mailer.send_otp(account, &code).await.map_err(|err| {
            warn!(account = %account.masked(), error = %err, "verification email failed");
            AuthorityError::rejected(Reason::SendFailed, "could not send verification email")
        })
    }

    fn consume_passcode(
        &self,
        account: &AccountId,
        otp: &str,
        now: DateTime<Utc>,
    ) -> AuthorityResult<()> {
        self.ledger
            .consume_code(CodeKind::Otp, account, otp.trim(), now)
            .map_err(|rejection| match rejection {
                CodeRejection::Expired => {
                    AuthorityError::rejected(Reason::OtpExpired, "verification code expired")
                }
                CodeRejection::Unknown | CodeRejection::Consumed => {
                    AuthorityError::rejected(Reason::InvalidOtp, "invalid verification code")
                }
            })
    }

    fn bind_credentials(
        &self,
        account: &AccountId,
        hardware_id: &HardwareId,
        now: DateTime<Utc>,
    ) -> AuthorityResult<SubscriptionSummary> {
        let mut state = self.lock();
        let record = state.subscriptions.get_mut(account).ok_or_else(not_found)?;
        usable(record, hardware_id, now)?;
        record.last_synced_at = Some(now);
        Ok(record.summary())
    }

    /// Account that redeemed `code`.
    fn code_owner(&self, code: &str) -> AuthorityResult<AccountId> {
        let state = self.lock();
        let stored = state
            .codes
            .get(&normalize_code(code))
            .ok_or_else(unknown_code)?;
        stored.redeemed_by.clone().ok_or_else(|| {
            AuthorityError::rejected(Reason::NotFound, "subscription code has not been redeemed")
        })
    }
}

const TRIAL_TIER: &str = "trial";

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn rate_limited(account: &AccountId, denial: RateLimitDenial, operation: &str) -> AuthorityError {
    warn!(
        account = %account.masked(),
        reason = %denial.reason,
        "{operation} throttled"
    );
    AuthorityError::RateLimited {
        reason: denial.reason,
        retry_after_secs: denial.retry_after_secs(),
    }
}

fn throttle(
    limiter: &RateLimiter<AccountId>,
    account: &AccountId,
    now: DateTime<Utc>,
    operation: &str,
) -> AuthorityResult<()> {
    limiter
        .check_and_record(account, now)
        .into_result()
        .map_err(|denial| rate_limited(account, denial, operation))
}

fn unknown_code() -> AuthorityError {
    AuthorityError::rejected(Reason::InvalidCode, "unknown subscription code")
}

/// Whether `account` may run a trial on `hardware_id`. `Ok(true)` means it
/// already runs one.
fn trial_eligibility(
    state: &StoreState,
    account: &AccountId,
    hardware_id: &HardwareId,
    now: DateTime<Utc>,
) -> AuthorityResult<bool> {
    if state
        .trial_devices
        .get(hardware_id)
        .is_some_and(|owner| owner != account)
    {
        return Err(AuthorityError::rejected(
            Reason::TrialUsed,
            "this device already used a free trial",
        ));
    }
    match state.subscriptions.get(account) {
        None => Ok(false),
        Some(record)
            if record.tier == TRIAL_TIER && record.is_active && !record.is_expired(now) =>
        {
            Ok(true)
        }
        Some(record) if record.tier == TRIAL_TIER => Err(AuthorityError::rejected(
            Reason::TrialUsed,
            "free trial already used",
        )),
        Some(_) => Err(AuthorityError::rejected(
            Reason::TrialUsed,
            "account already has a subscription",
        )),
    }
}

fn redeemable<'a>(
    codes: &'a HashMap<String, StoredCode>,
    code: &str,
    now: DateTime<Utc>,
) -> AuthorityResult<&'a StoredCode> {
    let stored = codes.get(code).ok_or_else(unknown_code)?;
    if stored.redeemed_by.is_some() {
        return Err(AuthorityError::rejected(
            Reason::CodeAlreadyUsed,
            "subscription code already used",
        ));
    }
    if stored.expires_at.is_some_and(|at| now >= at) {
        return Err(AuthorityError::rejected(
            Reason::CodeExpired,
            "subscription code expired",
        ));
    }
    Ok(stored)
}

/// Checks that `record` may be used from `hardware_id` right now.
fn usable(
    record: &ActivationRecord,
    hardware_id: &HardwareId,
    now: DateTime<Utc>,
) -> AuthorityResult<()> {
    if !record.is_active {
        return Err(AuthorityError::rejected(
            Reason::NotActive,
            "subscription is not active",
        ));
    }
    if record.is_expired(now) {
        return Err(AuthorityError::rejected(Reason::Expired, "subscription expired"));
    }
    if !record.is_bound_to(hardware_id) {
        return Err(AuthorityError::rejected(
            Reason::DeviceMismatch,
            "subscription is bound to another device",
        ));
    }
    Ok(())
}

fn not_found() -> AuthorityError {
    AuthorityError::rejected(Reason::NotFound, "no subscription for this account")
}

fn invalid_token() -> AuthorityError {
    AuthorityError::rejected(
        Reason::InvalidTransferToken,
        "invalid or expired transfer token",
    )
}

#[async_trait]
impl ActivationAuthority for MemoryAuthority {
    async fn subscription_by_hardware(
        &self,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<Option<SubscriptionSummary>> {
        let now = self.clock.now();
        let state = self.lock();
        Ok(state
            .subscriptions
            .values()
            .find(|record| {
                record.is_bound_to(hardware_id) && record.is_active && !record.is_expired(now)
            })
            .map(ActivationRecord::summary))
    }

    async fn check_status(&self, account: &AccountId) -> AuthorityResult<ActivationRecord> {
        let now = self.clock.now();
        let state = self.lock();
        let record = state.subscriptions.get(account).ok_or_else(not_found)?;
        if record.is_expired(now) {
            return Err(AuthorityError::rejected(Reason::Expired, "subscription expired"));
        }
        Ok(record.clone())
    }

    async fn authenticate(
        &self,
        account: &AccountId,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        let now = self.clock.now();
        self.check_attempts(account, now)?;
        let bound = self.bind_credentials(account, hardware_id, now);
        let summary = self.count_failure(account, now, bound)?;
        info!(account = %account.masked(), hw = hardware_id.short(), "account authenticated");
        Ok(summary)
    }

    async fn validate_code(
        &self,
        code: &str,
        _account: &AccountId,
    ) -> AuthorityResult<CodeValidation> {
        let now = self.clock.now();
        let state = self.lock();
        let stored = redeemable(&state.codes, &normalize_code(code), now)?;
        Ok(CodeValidation {
            valid: true,
            tier: stored.tier.clone(),
            duration_days: stored.duration_days,
        })
    }

    async fn redeem_code(
        &self,
        code: &str,
        account: &AccountId,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        let now = self.clock.now();
        let code = normalize_code(code);
        let mut guard = self.lock();
        let state = &mut *guard;

        let stored = redeemable(&state.codes, &code, now)?.clone();
        let current = state
            .subscriptions
            .get(account)
            .filter(|record| record.is_active && !record.is_expired(now));
        if current.is_some_and(|record| !record.is_bound_to(hardware_id)) {
            return Err(AuthorityError::rejected(
                Reason::DeviceLimit,
                "subscription is active on another device",
            ));
        }
        // Unused time on a live subscription carries over.
        let base = current.map_or(now, |record| record.expires_at);
        let expires_at = base + Duration::days(i64::from(stored.duration_days));

        let record = state
            .subscriptions
            .entry(account.clone())
            .or_insert_with(|| ActivationRecord {
                account: account.clone(),
                hardware_id: hardware_id.clone(),
                tier: stored.tier.clone(),
                code: None,
                activated_at: Some(now),
                expires_at,
                is_active: true,
                email_verified: false,
                last_synced_at: None,
                transfer_count: 0,
                last_transfer_at: None,
            });
        record.hardware_id = hardware_id.clone();
        record.tier = stored.tier;
        record.code = Some(code.clone());
        record.expires_at = expires_at;
        record.is_active = true;
        record.email_verified |= state.verified.contains(account);
        record.last_synced_at = Some(now);
        let summary = record.summary();

        if let Some(entry) = state.codes.get_mut(&code) {
            entry.redeemed_by = Some(account.clone());
        }
        info!(
            account = %account.masked(),
            tier = %summary.tier,
            days = stored.duration_days,
            "subscription code redeemed"
        );
        Ok(summary)
    }

    async fn generate_otp(&self, account: &AccountId) -> AuthorityResult<()> {
        let now = self.clock.now();
        throttle(&self.otp_limiter, account, now, "verification code request")?;
        self.send_passcode(account, now).await
    }

    async fn verify_otp(
        &self,
        account: &AccountId,
        otp: &str,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<Option<SubscriptionSummary>> {
        let now = self.clock.now();
        self.check_attempts(account, now)?;
        let consumed = self.consume_passcode(account, otp, now);
        self.count_failure(account, now, consumed)?;

        let mut guard = self.lock();
        let state = &mut *guard;
        state.verified.insert(account.clone());
        info!(account = %account.masked(), "email verified");

        let Some(record) = state.subscriptions.get_mut(account) else {
            return Ok(None);
        };
        record.email_verified = true;
        Ok(record.is_bound_to(hardware_id).then(|| record.summary()))
    }

    async fn initiate_transfer(
        &self,
        account: &AccountId,
        current_hardware_id: &HardwareId,
    ) -> AuthorityResult<TransferTicket> {
        let now = self.clock.now();
        throttle(&self.transfer_limiter, account, now, "transfer initiation")?;

        {
            let state = self.lock();
            let record = state.subscriptions.get(account).ok_or_else(not_found)?;
            usable(record, current_hardware_id, now)?;
        }

        let token = TransferToken::generate();
        self.ledger.issue(account, &token, now).ok_or_else(|| {
            AuthorityError::rejected(Reason::Generic, "transfer token lifetime out of range")
        })?;
        info!(
            account = %account.masked(),
            hw = current_hardware_id.short(),
            "device transfer initiated"
        );
        Ok(TransferTicket {
            transfer_token: token,
            expires_in_seconds: u64::try_from(self.ledger.policy().token_ttl.num_seconds())
                .unwrap_or(0),
        })
    }

    async fn complete_transfer(
        &self,
        account: &AccountId,
        new_hardware_id: &HardwareId,
        token: &TransferToken,
    ) -> AuthorityResult<TransferReceipt> {
        let now = self.clock.now();
        // Unknown accounts get the same answer as a bad token.
        if !self.lock().subscriptions.contains_key(account) {
            return Err(invalid_token());
        }

        let usage = self
            .ledger
            .redeem(account, token, now)
            .map_err(|denial| match denial {
                TransferDenial::InvalidToken => invalid_token(),
                TransferDenial::QuotaExceeded(usage) => {
                    warn!(
                        account = %account.masked(),
                        used = usage.used,
                        max = usage.max,
                        "transfer quota exhausted"
                    );
                    AuthorityError::QuotaExhausted {
                        used: usage.used,
                        max: usage.max,
                    }
                }
            })?;

        let mut state = self.lock();
        let record = state
            .subscriptions
            .get_mut(account)
            .ok_or_else(invalid_token)?;
        let previous = record.hardware_id.clone();
        record.hardware_id = new_hardware_id.clone();
        record.transfer_count += 1;
        record.last_transfer_at = Some(now);
        record.last_synced_at = Some(now);
        info!(
            account = %account.masked(),
            from = previous.short(),
            to = new_hardware_id.short(),
            used = usage.used,
            "device transfer completed"
        );

        Ok(TransferReceipt {
            subscription: record.summary(),
            transfer_count: record.transfer_count,
            transfers_used_in_30days: usage.used,
            max_transfers_per_30days: usage.max,
        })
    }

    async fn start_trial(
        &self,
        account: &AccountId,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<TrialOffer> {
        let now = self.clock.now();
        throttle(&self.otp_limiter, account, now, "trial request")?;
        let existing_trial = trial_eligibility(&self.lock(), account, hardware_id, now)?;

        self.send_passcode(account, now).await?;
        info!(
            account = %account.masked(),
            hw = hardware_id.short(),
            existing_trial,
            "trial passcode sent"
        );
        Ok(TrialOffer {
            trial_days: self.options.trial_days,
            existing_trial,
        })
    }

    async fn continue_trial(
        &self,
        account: &AccountId,
        otp: &str,
        hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        let now = self.clock.now();
        self.check_attempts(account, now)?;
        let consumed = self.consume_passcode(account, otp, now);
        self.count_failure(account, now, consumed)?;

        let mut guard = self.lock();
        let state = &mut *guard;
        let existing = trial_eligibility(state, account, hardware_id, now)?;
        state.verified.insert(account.clone());
        state
            .trial_devices
            .insert(hardware_id.clone(), account.clone());

        let expires_at = now + Duration::days(i64::from(self.options.trial_days));
        let record = state
            .subscriptions
            .entry(account.clone())
            .or_insert_with(|| ActivationRecord {
                account: account.clone(),
                hardware_id: hardware_id.clone(),
                tier: TRIAL_TIER.to_string(),
                code: None,
                activated_at: Some(now),
                expires_at,
                is_active: true,
                email_verified: true,
                last_synced_at: None,
                transfer_count: 0,
                last_transfer_at: None,
            });
        record.hardware_id = hardware_id.clone();
        record.email_verified = true;
        record.last_synced_at = Some(now);
        info!(
            account = %account.masked(),
            hw = hardware_id.short(),
            existing,
            "trial activated"
        );
        Ok(record.summary())
    }

    async fn check_code_binding(
        &self,
        code: &str,
        current_hardware_id: &HardwareId,
    ) -> AuthorityResult<CodeBinding> {
        let state = self.lock();
        let stored = state
            .codes
            .get(&normalize_code(code))
            .ok_or_else(unknown_code)?;
        let Some(owner) = &stored.redeemed_by else {
            return Ok(CodeBinding {
                mismatch: false,
                linked_email: None,
            });
        };
        let mismatch = state
            .subscriptions
            .get(owner)
            .is_some_and(|record| !record.is_bound_to(current_hardware_id));
        Ok(CodeBinding {
            mismatch,
            linked_email: Some(owner.masked()),
        })
    }

    async fn request_code_rebind(&self, code: &str) -> AuthorityResult<()> {
        let now = self.clock.now();
        let owner = self.code_owner(code)?;
        throttle(&self.otp_limiter, &owner, now, "code rebind request")?;

        self.send_passcode(&owner, now).await?;
        info!(account = %owner.masked(), "code rebind passcode sent");
        Ok(())
    }

    async fn confirm_code_rebind(
        &self,
        code: &str,
        otp: &str,
        new_hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        let now = self.clock.now();
        let owner = self.code_owner(code)?;
        self.check_attempts(&owner, now)?;
        let consumed = self.consume_passcode(&owner, otp, now);
        self.count_failure(&owner, now, consumed)?;

        let mut guard = self.lock();
        let state = &mut *guard;
        state.verified.insert(owner.clone());
        let record = state.subscriptions.get_mut(&owner).ok_or_else(not_found)?;
        if !record.is_active {
            return Err(AuthorityError::rejected(
                Reason::NotActive,
                "subscription is not active",
            ));
        }
        if record.is_expired(now) {
            return Err(AuthorityError::rejected(Reason::Expired, "subscription expired"));
        }

        if !record.is_bound_to(new_hardware_id) {
            let usage = self.ledger.usage(&owner, now);
            if usage.is_exhausted() {
                warn!(
                    account = %owner.masked(),
                    used = usage.used,
                    max = usage.max,
                    "transfer quota exhausted"
                );
                return Err(AuthorityError::QuotaExhausted {
                    used: usage.used,
                    max: usage.max,
                });
            }
            self.ledger.record_transfer(&owner, now);
            record.hardware_id = new_hardware_id.clone();
            record.transfer_count += 1;
            record.last_transfer_at = Some(now);
        }
        record.email_verified = true;
        record.last_synced_at = Some(now);
        info!(
            account = %owner.masked(),
            hw = new_hardware_id.short(),
            "subscription code rebound"
        );
        Ok(record.summary())
    }
}
