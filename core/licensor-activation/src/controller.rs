//! Activation state machine.
//!
//! The controller decides whether this process may run. It never touches a
//! window: every decision is published as an [`Outcome`] on a channel that
//! the UI side drains and acts on.
//!
//! ```text
//! Unchecked ──► DbHit ────┐
//!           ├─► CacheHit ─┼─► Verifying ──► MainApp | LicensePrompt | Shutdown
//!           └─► NoRecord ─┘        ▲                        │
//!                                  └──── prompt activation ─┘
//! ```

use crate::authority::{ActivationAuthority, AuthorityError};
use crate::cache::ActivationCache;
use crate::clock::Clock;
use crate::config::ControllerConfig;
use crate::device::HardwareIdSource;
use crate::error::ActivationResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use licensor_types::{AccountId, ActivationRecord, Reason};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Unchecked,
    DbHit,
    CacheHit,
    NoRecord,
    Verifying,
    MainApp,
    LicensePrompt,
    Shutdown,
}

/// What the UI should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Show (or keep showing) the main application.
    ShowMain(ActivationRecord),
    /// Show the license-entry prompt, optionally with a notice.
    ShowLicensePrompt { notice: Option<Notice> },
    /// Show a warning, then the license-entry prompt.
    ShowWarningThenPrompt(Warning),
    /// Exit the application.
    Terminate(TerminateReason),
}

/// Message shown above the license-entry prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SubscriptionExpired,
    /// The authority's own message.
    VerificationFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// The subscription is bound to a different machine.
    HardwareMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// The host application is not running.
    HostNotRunning,
    NoInternet,
    /// The user closed the prompt without activating.
    ActivationAbandoned,
}

/// Result of the startup lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupDecision {
    /// The authority knows an active subscription for this machine.
    DbHit(ActivationRecord),
    /// A record inside its grace period was cached.
    CacheHit(ActivationRecord),
    NoRecord,
}

/// The license-entry UI as seen by the controller.
#[async_trait]
pub trait LicensePrompt: Send + Sync {
    /// Waits for the user to activate. `None` means the prompt was closed.
    async fn request_activation(&self, notice: Option<&Notice>) -> Option<ActivationRecord>;
}

pub struct ActivationController {
    authority: Arc<dyn ActivationAuthority>,
    device: Arc<dyn HardwareIdSource>,
    clock: Arc<dyn Clock>,
    cache: Arc<ActivationCache>,
    config: ControllerConfig,
    state: Mutex<ControllerState>,
}

impl ActivationController {
    pub fn new(
        authority: Arc<dyn ActivationAuthority>,
        device: Arc<dyn HardwareIdSource>,
        clock: Arc<dyn Clock>,
        cache: Arc<ActivationCache>,
    ) -> Self {
        Self::with_config(authority, device, clock, cache, ControllerConfig::default())
    }

    pub fn with_config(
        authority: Arc<dyn ActivationAuthority>,
        device: Arc<dyn HardwareIdSource>,
        clock: Arc<dyn Clock>,
        cache: Arc<ActivationCache>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            authority,
            device,
            clock,
            cache,
            config,
            state: Mutex::new(ControllerState::Unchecked),
        }
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ActivationCache> {
        &self.cache
    }

    fn transition(&self, next: ControllerState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            debug!(from = ?*state, to = ?next, "controller transition");
            *state = next;
        }
    }

    fn grace_deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.config.grace_period
    }

    /// Decides how to start: online lookup by hardware id, then the cache.
    ///
    /// A failed lookup counts as "nothing found".
    pub async fn startup(&self) -> ActivationResult<StartupDecision> {
        self.transition(ControllerState::Unchecked);
        let hardware_id = self.device.hardware_id()?;
        let now = self.clock.now();

        match self.authority.subscription_by_hardware(&hardware_id).await {
            Ok(Some(summary)) if summary.is_active => {
                let mut record = ActivationRecord::from_summary(&summary, hardware_id);
                record.last_synced_at = Some(now);
                self.cache.set(record.clone(), self.grace_deadline(now));
                info!(
                    account = %record.account.masked(),
                    tier = %record.tier,
                    "subscription found for this machine"
                );
                self.transition(ControllerState::DbHit);
                return Ok(StartupDecision::DbHit(record));
            }
            Ok(_) => debug!(hw = hardware_id.short(), "no active subscription for this machine"),
            Err(err) => warn!(error = %err, "hardware lookup failed, treating as not found"),
        }

        if let Some(cached) = self.cache.get() {
            if cached.is_within_grace(now) && !cached.record.is_expired(now) {
                info!(
                    account = %cached.record.account.masked(),
                    remaining_secs = cached.remaining_grace(now).num_seconds(),
                    "using cached activation"
                );
                self.transition(ControllerState::CacheHit);
                return Ok(StartupDecision::CacheHit(cached.record));
            }
            debug!("cached activation no longer trusted");
        }

        self.transition(ControllerState::NoRecord);
        Ok(StartupDecision::NoRecord)
    }

    /// Confirms `account` against the authority and decides what to show.
    pub async fn verify(&self, account: &AccountId) -> Outcome {
        self.transition(ControllerState::Verifying);

        let hardware_id = match self.device.hardware_id() {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "cannot compute hardware id");
                return self.prompt(Some(Notice::VerificationFailed(err.to_string())));
            }
        };

        let mut record = match self.authority.check_status(account).await {
            Ok(record) => record,
            Err(err) => return self.on_verification_failure(account, &err),
        };
        let now = self.clock.now();

        if !record.is_bound_to(&hardware_id) {
            warn!(
                account = %account.masked(),
                local = hardware_id.short(),
                bound = record.hardware_id.short(),
                "hardware id mismatch"
            );
            self.cache.clear();
            self.transition(ControllerState::LicensePrompt);
            return Outcome::ShowWarningThenPrompt(Warning::HardwareMismatch);
        }

        if !record.is_active || record.is_expired(now) {
            info!(account = %account.masked(), "subscription no longer active");
            self.cache.clear();
            return self.prompt(Some(Notice::SubscriptionExpired));
        }

        record.last_synced_at = Some(now);
        self.cache.set(record.clone(), self.grace_deadline(now));
        info!(
            account = %account.masked(),
            days_left = record.days_until_expiry(now),
            "activation confirmed"
        );
        self.transition(ControllerState::MainApp);
        Outcome::ShowMain(record)
    }

    fn on_verification_failure(&self, account: &AccountId, err: &AuthorityError) -> Outcome {
        match err.reason() {
            Reason::Expired => {
                info!(account = %account.masked(), "subscription expired");
                self.cache.clear();
                self.prompt(Some(Notice::SubscriptionExpired))
            }
            Reason::NotFound => {
                info!(account = %account.masked(), "no activation on record");
                self.cache.clear();
                self.prompt(None)
            }
            Reason::DeviceMismatch => {
                warn!(account = %account.masked(), "authority reports hardware mismatch");
                self.cache.clear();
                self.transition(ControllerState::LicensePrompt);
                Outcome::ShowWarningThenPrompt(Warning::HardwareMismatch)
            }
            Reason::HostNotRunning => self.terminate(TerminateReason::HostNotRunning),
            Reason::NoInternet => {
                warn!(error = %err, "authority unreachable");
                self.terminate(TerminateReason::NoInternet)
            }
            _ => {
                warn!(error = %err, "verification failed");
                self.prompt(Some(Notice::VerificationFailed(err.message())))
            }
        }
    }

    fn prompt(&self, notice: Option<Notice>) -> Outcome {
        self.transition(ControllerState::LicensePrompt);
        Outcome::ShowLicensePrompt { notice }
    }

    fn terminate(&self, reason: TerminateReason) -> Outcome {
        self.transition(ControllerState::Shutdown);
        Outcome::Terminate(reason)
    }

    /// Drives the whole lifecycle, publishing every outcome on `outcomes`.
    ///
    /// Returns the last outcome: `Terminate`, or `ShowMain` when periodic
    /// revalidation is off.
    pub async fn run(
        &self,
        prompt: &dyn LicensePrompt,
        outcomes: &UnboundedSender<Outcome>,
    ) -> Outcome {
        let decision = self.startup().await.unwrap_or_else(|err| {
            warn!(error = %err, "startup failed, falling back to license prompt");
            StartupDecision::NoRecord
        });

        let mut pending = match decision {
            StartupDecision::DbHit(record) | StartupDecision::CacheHit(record) => {
                let account = record.account.clone();
                publish(outcomes, Outcome::ShowMain(record));
                Some(account)
            }
            StartupDecision::NoRecord => {
                publish(outcomes, self.prompt(None));
                None
            }
        };
        let mut notice = None;
        let mut revalidating = false;
        let mut offline_since: Option<DateTime<Utc>> = None;

        loop {
            let account = match pending.take() {
                Some(account) => account,
                None => match prompt.request_activation(notice.as_ref()).await {
                    Some(record) => {
                        let account = record.account.clone();
                        self.cache.set(record, self.grace_deadline(self.clock.now()));
                        account
                    }
                    None => {
                        info!("license prompt closed without activation");
                        let outcome = self.terminate(TerminateReason::ActivationAbandoned);
                        publish(outcomes, outcome.clone());
                        return outcome;
                    }
                },
            };

            let outcome = self.verify(&account).await;

            if revalidating && outcome == Outcome::Terminate(TerminateReason::NoInternet) {
                let now = self.clock.now();
                let since = *offline_since.get_or_insert(now);
                let remaining = self.config.grace_period - (now - since);
                if remaining > Duration::zero() {
                    warn!(
                        remaining_secs = remaining.num_seconds(),
                        "authority unreachable, running on grace"
                    );
                    let wait = remaining.to_std().unwrap_or_default();
                    let wait = self.config.revalidate_interval.map_or(wait, |i| i.min(wait));
                    tokio::time::sleep(wait).await;
                    self.transition(ControllerState::MainApp);
                    pending = Some(account);
                    continue;
                }
            }

            publish(outcomes, outcome.clone());
            match outcome {
                Outcome::ShowMain(_) => {
                    offline_since = None;
                    let Some(interval) = self.config.revalidate_interval else {
                        return outcome;
                    };
                    revalidating = true;
                    tokio::time::sleep(interval).await;
                    pending = Some(account);
                }
                Outcome::ShowLicensePrompt { notice: shown } => {
                    notice = shown;
                    revalidating = false;
                }
                Outcome::ShowWarningThenPrompt(_) => {
                    notice = None;
                    revalidating = false;
                }
                Outcome::Terminate(_) => return outcome,
            }
        }
    }

    /// Runs the controller on the tokio runtime.
    pub fn spawn(
        self: Arc<Self>,
        prompt: Arc<dyn LicensePrompt>,
    ) -> (JoinHandle<Outcome>, UnboundedReceiver<Outcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move { self.run(prompt.as_ref(), &tx).await });
        (handle, rx)
    }
}

fn publish(outcomes: &UnboundedSender<Outcome>, outcome: Outcome) {
    if outcomes.send(outcome).is_err() {
        debug!("outcome receiver dropped");
    }
}
