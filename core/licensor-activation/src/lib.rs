//! License activation and device binding.
//!
//! This crate decides whether a running instance is entitled to operate:
//! - Startup lookup of the subscription bound to this machine
//! - A short-lived activation cache that bridges authority outages
//! - Background verification that evicts mismatched or expired sessions
//! - Rate-limited email verification and device transfer
//!
//! # Design Principles
//!
//! - **Authority decides**: durable state lives with the
//!   [`ActivationAuthority`]; this crate keeps only an in-memory cache
//! - **No UI**: the [`ActivationController`] emits [`Outcome`]s and a thin
//!   adapter turns them into windows
//! - **Closed failures**: callers match on [`Reason`](licensor_types::Reason)
//!   tags, never on messages
//! - **Injected time**: every rule reads a [`Clock`]

mod authority;
mod cache;
mod clock;
pub mod config;
mod controller;
mod device;
mod entry;
mod error;
#[cfg(feature = "online")]
mod http;
mod rate_limit;
mod transfer;
mod transfer_flow;
mod verification;

pub use authority::{ActivationAuthority, AuthorityError, AuthorityResult};
pub use cache::{ActivationCache, CachedActivation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{
    ActivationController, ControllerState, LicensePrompt, Notice, Outcome, StartupDecision,
    TerminateReason, Warning,
};
pub use device::{DeviceFingerprint, DeviceInfo, FixedHardwareId, HardwareIdSource, LocalDevice};
pub use entry::{LicenseEntry, PendingCodeActivation, PendingCodeRebind, PendingTrial};
pub use error::{ActivationError, ActivationResult};
pub use rate_limit::{RateDecision, RateLimitDenial, RateLimiter};
pub use transfer::{CodeKind, CodeRejection, TransferDenial, TransferLedger};
pub use transfer_flow::DeviceTransferFlow;
pub use verification::OtpFlow;

#[cfg(feature = "online")]
pub use http::{AuthorityConfig, HttpAuthority};
