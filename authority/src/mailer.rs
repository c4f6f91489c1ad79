//! Out-of-band delivery of one-time passcodes.

use async_trait::async_trait;
use licensor_types::AccountId;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// Delivery failure reported by a [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Sends passcodes to account holders.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(&self, account: &AccountId, code: &str) -> Result<(), MailError>;
}

/// Writes passcodes to the log instead of sending mail.
///
/// The code itself only appears at `debug` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_otp(&self, account: &AccountId, code: &str) -> Result<(), MailError> {
        info!(account = %account.masked(), "verification code issued");
        debug!(account = %account.masked(), %code, "verification code");
        Ok(())
    }
}

/// Keeps every sent passcode in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<(AccountId, String)>>,
    failing: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    /// Most recent code sent to `account`.
    pub fn last_code(&self, account: &AccountId) -> Option<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(to, _)| to == account)
            .map(|(_, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send_otp(&self, account: &AccountId, code: &str) -> Result<(), MailError> {
        if self.failing {
            return Err(MailError("mailbox unavailable".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((account.clone(), code.to_string()));
        Ok(())
    }
}
