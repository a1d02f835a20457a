//! Transaction state and pending write tracking.

use crate::error::{StorageError, StorageResult};
use std::collections::BTreeMap;
use std::fmt;

/// Key identifying one stored object.
///
/// Object keys are opaque byte strings. Callers compose them however they
/// like; the backend only relies on their total ordering, which makes
/// prefix scans possible.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(Vec<u8>);

impl ObjectKey {
    /// Creates an object key from raw bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if the key starts with the given prefix.
    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", String::from_utf8_lossy(&self.0))
    }
}

impl From<&[u8]> for ObjectKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for ObjectKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// Represents a pending write in a transaction.
#[derive(Debug, Clone)]
pub(crate) enum PendingWrite {
    /// Insert or replace an object.
    Put(Vec<u8>),
    /// Delete an object.
    Delete,
}

/// An active transaction over a storage backend.
///
/// A transaction carries a snapshot of the committed state taken at
/// begin, plus its own pending writes. Reads see pending writes first
/// (read-your-writes), then the snapshot. Nothing is visible to other
/// transactions until [`crate::StorageBackend::commit`] succeeds.
#[derive(Debug)]
pub struct Transaction {
    /// Transaction ID, for diagnostics.
    id: u64,
    /// Version of the committed state this transaction reads from.
    snapshot_version: u64,
    /// Snapshot of committed objects: key -> (version, payload).
    snapshot: BTreeMap<ObjectKey, (u64, Vec<u8>)>,
    /// Pending writes, applied atomically at commit.
    writes: BTreeMap<ObjectKey, PendingWrite>,
    /// Current state.
    state: TransactionState,
}

impl Transaction {
    /// Creates a new transaction over a snapshot.
    pub(crate) fn new(
        id: u64,
        snapshot_version: u64,
        snapshot: BTreeMap<ObjectKey, (u64, Vec<u8>)>,
    ) -> Self {
        Self {
            id,
            snapshot_version,
            snapshot,
            writes: BTreeMap::new(),
            state: TransactionState::Active,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the snapshot version this transaction reads from.
    #[must_use]
    pub fn snapshot_version(&self) -> u64 {
        self.snapshot_version
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Reads an object, seeing this transaction's own pending writes first.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is no longer active.
    pub fn read(&self, key: &ObjectKey) -> StorageResult<Option<Vec<u8>>> {
        self.ensure_active()?;
        match self.writes.get(key) {
            Some(PendingWrite::Put(payload)) => Ok(Some(payload.clone())),
            Some(PendingWrite::Delete) => Ok(None),
            None => Ok(self.snapshot.get(key).map(|(_, payload)| payload.clone())),
        }
    }

    /// Records an insert or replace of an object.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is no longer active.
    pub fn write(&mut self, key: ObjectKey, payload: Vec<u8>) -> StorageResult<()> {
        self.ensure_active()?;
        self.writes.insert(key, PendingWrite::Put(payload));
        Ok(())
    }

    /// Records a delete of an object.
    ///
    /// Returns true if the object was visible to this transaction.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is no longer active.
    pub fn delete(&mut self, key: ObjectKey) -> StorageResult<bool> {
        self.ensure_active()?;
        let existed = match self.writes.get(&key) {
            Some(PendingWrite::Put(_)) => true,
            Some(PendingWrite::Delete) => false,
            None => self.snapshot.contains_key(&key),
        };
        self.writes.insert(key, PendingWrite::Delete);
        Ok(existed)
    }

    /// Returns all visible objects whose key starts with the given prefix,
    /// in key order. Pending writes shadow snapshot state.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is no longer active.
    pub fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(ObjectKey, Vec<u8>)>> {
        self.ensure_active()?;
        let mut merged: BTreeMap<&ObjectKey, Option<&Vec<u8>>> = BTreeMap::new();
        for (key, (_, payload)) in &self.snapshot {
            if key.starts_with(prefix) {
                merged.insert(key, Some(payload));
            }
        }
        for (key, write) in &self.writes {
            if key.starts_with(prefix) {
                match write {
                    PendingWrite::Put(payload) => {
                        merged.insert(key, Some(payload));
                    }
                    PendingWrite::Delete => {
                        merged.insert(key, None);
                    }
                }
            }
        }
        Ok(merged
            .into_iter()
            .filter_map(|(key, payload)| payload.map(|p| (key.clone(), p.clone())))
            .collect())
    }

    /// Returns the number of pending writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Returns the pending writes, for the backend to apply at commit.
    pub(crate) fn pending_writes(&self) -> impl Iterator<Item = (&ObjectKey, &PendingWrite)> {
        self.writes.iter()
    }

    /// Marks the transaction as committed.
    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    /// Marks the transaction as aborted and discards pending writes.
    pub(crate) fn mark_aborted(&mut self) {
        self.writes.clear();
        self.state = TransactionState::Aborted;
    }

    /// Ensures the transaction is active.
    fn ensure_active(&self) -> StorageResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(StorageError::TransactionClosed {
                state: "committed",
            }),
            TransactionState::Aborted => Err(StorageError::TransactionClosed { state: "aborted" }),
        }
    }
}
