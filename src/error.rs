//! Domain errors callers may want to match on.
//!
//! Everything else (SQLite, filesystem) travels as plain [`anyhow::Error`]
//! with context attached. These variants are raised through `anyhow` too;
//! use `err.downcast_ref::<MemoryError>()` to inspect them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// `remember` (or a diary append) was given empty or whitespace-only text.
    #[error("empty content")]
    EmptyContent,

    #[error("unknown memory kind: {0}")]
    UnknownKind(String),

    /// A salience sub-score or confidence that is not a finite number in `[0, 1]`.
    #[error("invalid salience {field}: {value}")]
    InvalidSalience { field: &'static str, value: f64 },

    #[error("unknown core memory section: {0}")]
    UnknownCoreSection(String),

    /// A rollup period that is not `YYYY-MM`.
    #[error("invalid period (expected YYYY-MM): {0}")]
    InvalidPeriod(String),

    /// Encrypted data was found but the store has no secret configured.
    #[error("encrypted data present but no secret token is configured")]
    Locked,

    /// Authentication or decryption failed (usually a wrong token).
    #[error("decryption failed: {0}")]
    Crypto(String),

    /// A stored value could not be decoded.
    #[error("malformed stored field: {0}")]
    MalformedField(String),
}
