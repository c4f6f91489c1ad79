//! Process-local memo of the last known-good activation.
//!
//! The cache bridges short authority outages: a record confirmed online is
//! kept together with an absolute grace deadline. Nothing is evicted
//! automatically; readers compare the deadline with their own clock.

use chrono::{DateTime, Duration, Utc};
use licensor_types::ActivationRecord;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// A cached record and the moment it stops being trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedActivation {
    pub record: ActivationRecord,
    pub grace_until: DateTime<Utc>,
}

impl CachedActivation {
    /// Returns true while `now` has not passed the grace deadline.
    #[must_use]
    pub fn is_within_grace(&self, now: DateTime<Utc>) -> bool {
        now <= self.grace_until
    }

    /// Time left before the grace deadline, zero once it has passed.
    #[must_use]
    pub fn remaining_grace(&self, now: DateTime<Utc>) -> Duration {
        (self.grace_until - now).max(Duration::zero())
    }
}

/// Single-slot activation cache, shared by reference and written only by
/// the controller.
#[derive(Debug, Default)]
pub struct ActivationCache {
    slot: RwLock<Option<CachedActivation>>,
}

impl ActivationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever is cached.
    pub fn set(&self, record: ActivationRecord, grace_until: DateTime<Utc>) {
        debug!(account = %record.account.masked(), %grace_until, "activation cached");
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(CachedActivation {
            record,
            grace_until,
        });
    }

    #[must_use]
    pub fn get(&self) -> Option<CachedActivation> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        let previous = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            debug!("activation cache cleared");
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
