//! Error types shared by the trustee crates
//!
//! All errors are explicit; remote failures are never swallowed into defaults.

use thiserror::Error;

use crate::exchange::DataExchangeState;

/// Result type for trustee operations
pub type Result<T> = std::result::Result<T, TrusteeError>;

/// Trustee error types
#[derive(Debug, Clone, Error)]
pub enum TrusteeError {
    // ========================================================================
    // Lookup Errors
    // ========================================================================

    /// Entity not found
    #[error("{0}")]
    NotFound(String),

    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Malformed or missing input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Participant list does not match its hash
    #[error("Hash mismatch: possible data tampering detected.")]
    HashMismatch,

    /// State change not allowed from the current state
    #[error("Cannot change data exchange entry {entry_id} from {from} to {to}")]
    InvalidTransition {
        entry_id: String,
        from: DataExchangeState,
        to: DataExchangeState,
    },

    // ========================================================================
    // Infrastructure Errors
    // ========================================================================

    /// Local storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A remote connector failed or answered unexpectedly
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An anonymisation service or merge step failed on the payload
    #[error("{0}")]
    Processing(String),
}

impl From<std::io::Error> for TrusteeError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TrusteeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
