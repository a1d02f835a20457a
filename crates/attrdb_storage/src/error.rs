//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another transaction committed a conflicting write first.
    #[error("transaction conflict: object modified since snapshot")]
    Conflict,

    /// The transaction is no longer active.
    #[error("transaction is not active: {state}")]
    TransactionClosed {
        /// The state the transaction was found in.
        state: &'static str,
    },
}
