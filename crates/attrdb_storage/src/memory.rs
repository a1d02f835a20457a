//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::txn::{ObjectKey, PendingWrite, Transaction};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// One committed object slot.
///
/// Deleted objects stay in the map as tombstones (`value: None`) so that
/// a later commit writing the same key can still be conflict-checked
/// against the delete.
#[derive(Debug, Clone)]
struct Slot {
    /// Version of the commit that last touched this key.
    version: u64,
    /// Payload, or `None` for a tombstone.
    value: Option<Vec<u8>>,
}

/// Committed state guarded by one lock.
#[derive(Debug, Default)]
struct Committed {
    objects: BTreeMap<ObjectKey, Slot>,
    version: u64,
}

/// An in-memory transactional storage backend.
///
/// This backend keeps all committed state in memory and is suitable for:
/// - Unit and integration tests
/// - Ephemeral databases that don't need durability
///
/// # Isolation
///
/// `begin` snapshots the committed state; readers never observe writes
/// from transactions that commit later. Commits use first-committer-wins
/// conflict detection: if any key written by this transaction was
/// committed by another transaction after this one's snapshot, the commit
/// fails with [`StorageError::Conflict`] and the transaction is aborted.
///
/// # Thread Safety
///
/// The backend is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    committed: RwLock<Committed>,
    next_txn_id: AtomicU64,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live (non-tombstone) objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.committed
            .read()
            .objects
            .values()
            .filter(|slot| slot.value.is_some())
            .count()
    }

    /// Returns the current committed version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.committed.read().version
    }
}

impl StorageBackend for MemoryBackend {
    fn begin(&self) -> StorageResult<Transaction> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst) + 1;
        let committed = self.committed.read();
        let snapshot = committed
            .objects
            .iter()
            .filter_map(|(key, slot)| {
                slot.value
                    .as_ref()
                    .map(|value| (key.clone(), (slot.version, value.clone())))
            })
            .collect();
        Ok(Transaction::new(id, committed.version, snapshot))
    }

    fn commit(&self, txn: &mut Transaction) -> StorageResult<()> {
        if !txn.is_active() {
            return Err(StorageError::TransactionClosed {
                state: match txn.state() {
                    crate::TransactionState::Committed => "committed",
                    _ => "aborted",
                },
            });
        }

        let mut committed = self.committed.write();

        // First-committer-wins: any written key touched by a later commit
        // than our snapshot aborts this transaction.
        let snapshot_version = txn.snapshot_version();
        let conflicted = txn.pending_writes().any(|(key, _)| {
            committed
                .objects
                .get(key)
                .is_some_and(|slot| slot.version > snapshot_version)
        });
        if conflicted {
            txn.mark_aborted();
            return Err(StorageError::Conflict);
        }

        committed.version += 1;
        let commit_version = committed.version;
        let writes: Vec<(ObjectKey, Option<Vec<u8>>)> = txn
            .pending_writes()
            .map(|(key, write)| match write {
                PendingWrite::Put(payload) => (key.clone(), Some(payload.clone())),
                PendingWrite::Delete => (key.clone(), None),
            })
            .collect();
        for (key, value) in writes {
            committed.objects.insert(
                key,
                Slot {
                    version: commit_version,
                    value,
                },
            );
        }

        txn.mark_committed();
        Ok(())
    }

    fn abort(&self, txn: &mut Transaction) -> StorageResult<()> {
        if !txn.is_active() {
            return Err(StorageError::TransactionClosed {
                state: match txn.state() {
                    crate::TransactionState::Committed => "committed",
                    _ => "aborted",
                },
            });
        }
        txn.mark_aborted();
        Ok(())
    }
}
