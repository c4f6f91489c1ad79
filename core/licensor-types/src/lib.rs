//! Core type definitions for Licensor.
//!
//! This crate defines the records and wire messages shared by the client-side
//! activation engine and the authority server:
//! - Account, hardware and transfer-token identifiers
//! - Activation records and subscription summaries
//! - The request/response envelope of every authority operation
//! - The closed set of machine-readable failure reasons
//!
//! Nothing here performs I/O or reads the clock; timestamps are always passed in.

mod ids;
pub mod protocol;
mod reason;
mod record;

pub use ids::{AccountId, HardwareId, TransferToken};
pub use reason::{RateLimitReason, Reason};
pub use record::{
    ActivationRecord, CodeBinding, CodeValidation, SubscriptionSummary, TransferReceipt,
    TransferTicket, TransferUsage, TrialOffer,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid account identifier: {0}")]
    InvalidAccount(String),

    #[error("invalid hardware identifier: {0}")]
    InvalidHardwareId(String),

    #[error("invalid transfer token")]
    InvalidTransferToken,
}
