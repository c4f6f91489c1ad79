//! Identifier types used throughout Licensor.
//!
//! Accounts are identified by their (normalized) email address, machines by an
//! opaque hardware identifier, and device transfers by a one-time token.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a licensed account: a trimmed, lowercased email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Normalizes and validates an email address.
    pub fn new(email: &str) -> crate::Result<Self> {
        let normalized = email.trim().to_lowercase();

        let Some((local, domain)) = normalized.split_once('@') else {
            return Err(Error::InvalidAccount(format!("missing '@' in {email:?}")));
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(Error::InvalidAccount(format!("malformed address {email:?}")));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(Error::InvalidAccount("address contains whitespace".to_string()));
        }

        Ok(Self(normalized))
    }

    /// Returns the normalized email.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a masked form safe for logs, e.g. `a***e@e******.com`.
    #[must_use]
    pub fn masked(&self) -> String {
        let (local, domain) = self.0.split_once('@').unwrap_or((self.0.as_str(), ""));

        let masked_local = mask_middle(local);
        let masked_domain = match domain.split_once('.') {
            Some((head, tail)) => format!("{}.{tail}", mask_tail(head)),
            None => mask_tail(domain),
        };

        format!("{masked_local}@{masked_domain}")
    }
}

fn mask_middle(part: &str) -> String {
    let chars: Vec<char> = part.chars().collect();
    if chars.len() <= 2 {
        return part.to_string();
    }
    let mut out = String::with_capacity(chars.len());
    out.push(chars[0]);
    out.extend(std::iter::repeat_n('*', chars.len() - 2));
    out.push(chars[chars.len() - 1]);
    out
}

fn mask_tail(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => {
            let rest = chars.count();
            let mut out = String::with_capacity(rest + 1);
            out.push(first);
            out.extend(std::iter::repeat_n('*', rest));
            out
        }
        None => String::new(),
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

/// Opaque fingerprint of one physical machine installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareId(String);

impl HardwareId {
    /// Wraps a fingerprint string. Surrounding whitespace is ignored.
    pub fn new(id: &str) -> crate::Result<Self> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidHardwareId("empty identifier".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short prefix for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HardwareId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for HardwareId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<HardwareId> for String {
    fn from(id: HardwareId) -> Self {
        id.0
    }
}

/// One-time code authorizing a rebind of a subscription to a new machine.
///
/// `Debug` never prints the code itself.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransferToken(String);

impl TransferToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string().to_uppercase())
    }

    /// Parses a token typed or pasted by the user.
    pub fn parse(input: &str) -> crate::Result<Self> {
        let normalized = input.trim().to_uppercase();
        if normalized.is_empty() || normalized.chars().any(char::is_whitespace) {
            return Err(Error::InvalidTransferToken);
        }
        Ok(Self(normalized))
    }

    /// Returns the token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TransferToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransferToken(****)")
    }
}

impl fmt::Display for TransferToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TransferToken {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TransferToken> for String {
    fn from(token: TransferToken) -> Self {
        token.0
    }
}
