//! Shared test helpers for activation tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use licensor_activation::{
    ActivationAuthority, AuthorityError, AuthorityResult, LicensePrompt, ManualClock, Notice,
};
use licensor_types::{
    AccountId, ActivationRecord, CodeBinding, CodeValidation, HardwareId, SubscriptionSummary,
    TransferReceipt, TransferTicket, TransferToken, TrialOffer,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Fixed start time for every test.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap()
}

pub fn account(email: &str) -> AccountId {
    AccountId::new(email).unwrap()
}

pub fn hw(id: &str) -> HardwareId {
    HardwareId::new(id).unwrap()
}

pub fn summary(email: &str, hardware: Option<&str>, now: DateTime<Utc>) -> SubscriptionSummary {
    SubscriptionSummary {
        account: account(email),
        tier: "pro".to_string(),
        expires_at: now + Duration::days(30),
        is_active: true,
        hardware_id: hardware.map(hw),
    }
}

/// Active record with a 30-day expiry.
pub fn active_record(email: &str, hardware: &str, now: DateTime<Utc>) -> ActivationRecord {
    let mut record = ActivationRecord::from_summary(&summary(email, None, now), hw(hardware));
    record.activated_at = Some(now - Duration::days(1));
    record.email_verified = true;
    record
}

pub fn rejected(reason: licensor_types::Reason) -> AuthorityError {
    AuthorityError::rejected(reason, format!("rejected: {reason}"))
}

pub fn unreachable() -> AuthorityError {
    AuthorityError::Unreachable("connection refused".to_string())
}

/// Replays scripted results in order; the last one repeats forever.
pub struct Script<T>(Mutex<VecDeque<T>>);

impl<T: Clone> Script<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self(Mutex::new(items.into()))
    }

    fn next(&self) -> Option<T> {
        let mut queue = self.0.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl<T: Clone> Default for Script<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn unscripted<T>(op: &str) -> AuthorityResult<T> {
    Err(AuthorityError::Protocol(format!("{op} not scripted")))
}

/// Scripted [`ActivationAuthority`].
#[derive(Default)]
pub struct MockAuthority {
    pub lookup: Script<AuthorityResult<Option<SubscriptionSummary>>>,
    pub status: Script<AuthorityResult<ActivationRecord>>,
    pub authenticate: Script<AuthorityResult<SubscriptionSummary>>,
    pub validate: Script<AuthorityResult<CodeValidation>>,
    pub redeem: Script<AuthorityResult<SubscriptionSummary>>,
    pub otp: Script<AuthorityResult<()>>,
    pub verify: Script<AuthorityResult<Option<SubscriptionSummary>>>,
    pub initiate: Script<AuthorityResult<TransferTicket>>,
    pub complete: Script<AuthorityResult<TransferReceipt>>,
    pub trial: Script<AuthorityResult<TrialOffer>>,
    pub continue_trial: Script<AuthorityResult<SubscriptionSummary>>,
    pub binding: Script<AuthorityResult<CodeBinding>>,
    pub rebind: Script<AuthorityResult<SubscriptionSummary>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    /// Advances this clock on every status check.
    tick: Option<(ManualClock, Duration)>,
}

impl MockAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookup(mut self, items: Vec<AuthorityResult<Option<SubscriptionSummary>>>) -> Self {
        self.lookup = Script::new(items);
        self
    }

    pub fn with_status(mut self, items: Vec<AuthorityResult<ActivationRecord>>) -> Self {
        self.status = Script::new(items);
        self
    }

    pub fn with_authenticate(mut self, items: Vec<AuthorityResult<SubscriptionSummary>>) -> Self {
        self.authenticate = Script::new(items);
        self
    }

    pub fn with_validate(mut self, items: Vec<AuthorityResult<CodeValidation>>) -> Self {
        self.validate = Script::new(items);
        self
    }

    pub fn with_redeem(mut self, items: Vec<AuthorityResult<SubscriptionSummary>>) -> Self {
        self.redeem = Script::new(items);
        self
    }

    pub fn with_otp(mut self, items: Vec<AuthorityResult<()>>) -> Self {
        self.otp = Script::new(items);
        self
    }

    pub fn with_verify(mut self, items: Vec<AuthorityResult<Option<SubscriptionSummary>>>) -> Self {
        self.verify = Script::new(items);
        self
    }

    pub fn with_initiate(mut self, items: Vec<AuthorityResult<TransferTicket>>) -> Self {
        self.initiate = Script::new(items);
        self
    }

    pub fn with_complete(mut self, items: Vec<AuthorityResult<TransferReceipt>>) -> Self {
        self.complete = Script::new(items);
        self
    }

    pub fn with_trial(mut self, items: Vec<AuthorityResult<TrialOffer>>) -> Self {
        self.trial = Script::new(items);
        self
    }

    pub fn with_continue_trial(mut self, items: Vec<AuthorityResult<SubscriptionSummary>>) -> Self {
        self.continue_trial = Script::new(items);
        self
    }

    pub fn with_binding(mut self, items: Vec<AuthorityResult<CodeBinding>>) -> Self {
        self.binding = Script::new(items);
        self
    }

    pub fn with_rebind(mut self, items: Vec<AuthorityResult<SubscriptionSummary>>) -> Self {
        self.rebind = Script::new(items);
        self
    }

    pub fn ticking(mut self, clock: ManualClock, step: Duration) -> Self {
        self.tick = Some((clock, step));
        self
    }

    /// How many times `op` was called.
    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
    }
}

#[async_trait]
impl ActivationAuthority for MockAuthority {
    async fn subscription_by_hardware(
        &self,
        _hardware_id: &HardwareId,
    ) -> AuthorityResult<Option<SubscriptionSummary>> {
        self.record("lookup");
        self.lookup.next().unwrap_or(Ok(None))
    }

    async fn check_status(&self, _account: &AccountId) -> AuthorityResult<ActivationRecord> {
        self.record("status");
        if let Some((clock, step)) = &self.tick {
            clock.advance(*step);
        }
        self.status.next().unwrap_or_else(|| unscripted("status"))
    }

    async fn authenticate(
        &self,
        _account: &AccountId,
        _hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        self.record("authenticate");
        self.authenticate
            .next()
            .unwrap_or_else(|| unscripted("authenticate"))
    }

    async fn validate_code(
        &self,
        _code: &str,
        _account: &AccountId,
    ) -> AuthorityResult<CodeValidation> {
        self.record("validate");
        self.validate.next().unwrap_or_else(|| unscripted("validate"))
    }

    async fn redeem_code(
        &self,
        _code: &str,
        _account: &AccountId,
        _hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        self.record("redeem");
        self.redeem.next().unwrap_or_else(|| unscripted("redeem"))
    }

    async fn generate_otp(&self, _account: &AccountId) -> AuthorityResult<()> {
        self.record("otp");
        self.otp.next().unwrap_or(Ok(()))
    }

    async fn verify_otp(
        &self,
        _account: &AccountId,
        _otp: &str,
        _hardware_id: &HardwareId,
    ) -> AuthorityResult<Option<SubscriptionSummary>> {
        self.record("verify");
        self.verify.next().unwrap_or_else(|| unscripted("verify"))
    }

    async fn initiate_transfer(
        &self,
        _account: &AccountId,
        _current_hardware_id: &HardwareId,
    ) -> AuthorityResult<TransferTicket> {
        self.record("initiate");
        self.initiate.next().unwrap_or_else(|| unscripted("initiate"))
    }

    async fn complete_transfer(
        &self,
        _account: &AccountId,
        _new_hardware_id: &HardwareId,
        _token: &TransferToken,
    ) -> AuthorityResult<TransferReceipt> {
        self.record("complete");
        self.complete.next().unwrap_or_else(|| unscripted("complete"))
    }

    async fn start_trial(
        &self,
        _account: &AccountId,
        _hardware_id: &HardwareId,
    ) -> AuthorityResult<TrialOffer> {
        self.record("trial");
        self.trial.next().unwrap_or_else(|| unscripted("trial"))
    }

    async fn continue_trial(
        &self,
        _account: &AccountId,
        _otp: &str,
        _hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        self.record("continue_trial");
        self.continue_trial
            .next()
            .unwrap_or_else(|| unscripted("continue_trial"))
    }

    async fn check_code_binding(
        &self,
        _code: &str,
        _current_hardware_id: &HardwareId,
    ) -> AuthorityResult<CodeBinding> {
        self.record("binding");
        self.binding.next().unwrap_or_else(|| unscripted("binding"))
    }

    async fn request_code_rebind(&self, _code: &str) -> AuthorityResult<()> {
        self.record("rebind_otp");
        self.otp.next().unwrap_or(Ok(()))
    }

    async fn confirm_code_rebind(
        &self,
        _code: &str,
        _otp: &str,
        _new_hardware_id: &HardwareId,
    ) -> AuthorityResult<SubscriptionSummary> {
        self.record("rebind");
        self.rebind.next().unwrap_or_else(|| unscripted("rebind"))
    }
}

/// License prompt that hands out scripted activations and remembers the
/// notices it was shown.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Option<ActivationRecord>>>,
    notices: Mutex<Vec<Option<Notice>>>,
}

impl ScriptedPrompt {
    pub fn new(answers: Vec<Option<ActivationRecord>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            notices: Mutex::new(Vec::new()),
        }
    }

    pub fn notices(&self) -> Vec<Option<Notice>> {
        self.notices.lock().unwrap().clone()
    }

    pub fn times_shown(&self) -> usize {
        self.notices.lock().unwrap().len()
    }
}

#[async_trait]
impl LicensePrompt for ScriptedPrompt {
    async fn request_activation(&self, notice: Option<&Notice>) -> Option<ActivationRecord> {
        self.notices.lock().unwrap().push(notice.cloned());
        self.answers.lock().unwrap().pop_front().flatten()
    }
}
