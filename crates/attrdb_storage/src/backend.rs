//! Storage backend trait definition.

use crate::error::StorageResult;
use crate::txn::Transaction;

/// A transactional storage backend for AttrDB.
///
/// Storage backends are **opaque object stores**: they map byte-string
/// keys to byte payloads and know nothing about models, attributes, or
/// index tables. AttrDB owns all state interpretation.
///
/// # Invariants
///
/// - `begin` returns a transaction reading from a consistent snapshot
/// - `commit` applies every pending write atomically, or none on conflict
/// - `abort` discards all pending writes
/// - Concurrent readers observe either fully-old or fully-new state,
///   never a partially committed transaction
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - snapshot-isolated in-memory store
pub trait StorageBackend: Send + Sync {
    /// Begins a new transaction over a snapshot of the committed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot produce a snapshot.
    fn begin(&self) -> StorageResult<Transaction>;

    /// Commits a transaction, applying its pending writes atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Conflict`] if another transaction
    /// committed a write to any of this transaction's written keys after
    /// its snapshot was taken. The transaction is aborted in that case.
    fn commit(&self, txn: &mut Transaction) -> StorageResult<()>;

    /// Aborts a transaction, discarding its pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is no longer active.
    fn abort(&self, txn: &mut Transaction) -> StorageResult<()>;
}
