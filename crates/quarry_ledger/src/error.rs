//! # Ledger Error Types
//!
//! Errors surfaced at the ledger's boundaries: configuration, snapshot
//! storage and invariant audits.
//!
//! Gameplay operations (credit, debit, buff activation, ...) never return
//! these. Expected failures there are reported as `false`.

use thiserror::Error;

use crate::currency::Currency;

/// Errors that can occur at the ledger boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Currency name not recognised.
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    /// Enchantment identifier or permission string failed validation.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Snapshot storage could not be read or written.
    #[error("snapshot storage failed for {path}: {reason}")]
    Storage {
        /// File or key being accessed.
        path: String,
        /// Underlying cause.
        reason: String,
    },

    /// Snapshot could not be serialized.
    #[error("snapshot encoding failed: {0}")]
    Encode(String),

    /// Snapshot is malformed or failed its integrity check.
    #[error("snapshot decoding failed: {0}")]
    Decode(String),

    /// Window driver thread could not be started.
    #[error("window driver failed: {0}")]
    Driver(String),

    /// Attributed credits exceed the lifetime credits of the total balance.
    #[error("attribution exceeds lifetime credits for {currency}: attributed {attributed}, credited {credited}")]
    AttributionOverflow {
        /// Currency whose invariant broke.
        currency: Currency,
        /// Sum of attributed credits.
        attributed: u64,
        /// Lifetime credits to the total.
        credited: u64,
    },
}

/// Result type for ledger boundary operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
