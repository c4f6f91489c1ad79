//! Error types for the activation module.

use crate::authority::AuthorityError;
use licensor_types::RateLimitReason;
use thiserror::Error;

/// Activation-specific errors.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// The local hardware id could not be computed.
    #[error("hardware id unavailable: {0}")]
    HardwareId(String),

    /// The authority refused or could not be reached.
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// A local rate limiter refused the request before it left the process.
    #[error("rate limited ({reason}), retry in {retry_after_secs}s")]
    RateLimited {
        reason: RateLimitReason,
        retry_after_secs: u64,
    },

    /// Transfer token is unknown, expired or already used.
    #[error("invalid or expired transfer token")]
    InvalidTransferToken,

    /// Caller supplied malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Identifier validation error.
    #[error(transparent)]
    Types(#[from] licensor_types::Error),
}

impl ActivationError {
    /// Returns true when retrying later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Authority(err) => err.is_connectivity() || err.rate_limit().is_some(),
            _ => false,
        }
    }
}

/// Result type for activation operations.
pub type ActivationResult<T> = Result<T, ActivationError>;
