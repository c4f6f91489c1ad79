//! Initial subscriptions and codes, loaded from JSON.
//!
//! ```json
//! {
//!   "subscriptions": [{
//!     "email": "a@x.com",
//!     "hardware_id": "H1",
//!     "subscription_type": "pro",
//!     "expiry_date": "2031-01-01T00:00:00Z",
//!     "is_active": true,
//!     "recent_transfers": ["2030-12-20T10:00:00Z"]
//!   }],
//!   "codes": [{ "code": "PROMO-30", "subscription_type": "pro", "duration_days": 30 }]
//! }
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use licensor_types::{AccountId, ActivationRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionSeed>,
    #[serde(default)]
    pub codes: Vec<CodeSeed>,
}

/// A subscription plus the transfers it already made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSeed {
    #[serde(flatten)]
    pub record: ActivationRecord,
    /// Completed transfers counted against the rolling quota.
    #[serde(default)]
    pub recent_transfers: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSeed {
    pub code: String,
    #[serde(rename = "subscription_type")]
    pub tier: String,
    pub duration_days: u32,
    /// Last moment the code can be redeemed.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub redeemed_by: Option<AccountId>,
}

impl Seed {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Reads a seed file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("failed to parse seed file {}", path.display()))
    }
}
