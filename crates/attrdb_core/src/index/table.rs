//! Persistent index table.

use crate::error::{CoreError, CoreResult};
use crate::key::IndexKey;
use crate::types::InstanceId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Lifecycle state of an index table.
///
/// Transitions: `Unbuilt -> Consistent` on first full build;
/// `Consistent -> Inconsistent` when the integrity checker finds
/// discrepancies; `Inconsistent -> Rebuilding -> Consistent` through
/// [`crate::store::ModelStore::rebuild_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    /// Declared but never populated; not queryable.
    Unbuilt,
    /// Maintained and queryable.
    Consistent,
    /// Discrepancies detected; queryable only with an explicit stale-read
    /// opt-in.
    Inconsistent,
    /// A rebuild started and has not committed its result yet.
    Rebuilding,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexState::Unbuilt => write!(f, "unbuilt"),
            IndexState::Consistent => write!(f, "consistent"),
            IndexState::Inconsistent => write!(f, "inconsistent"),
            IndexState::Rebuilding => write!(f, "rebuilding"),
        }
    }
}

/// A uniqueness-constrained key was already occupied by another instance.
///
/// Raised by [`IndexTable::insert`]; callers map it to
/// [`crate::CoreError::UniqueIndexViolation`] with the attribute name
/// attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConflict {
    /// The contested key.
    pub key: IndexKey,
    /// The instance already occupying the key.
    pub occupant: InstanceId,
}

/// Persistent mapping from derived index key to the set of instance
/// identifiers whose attribute value produced that key.
///
/// Buckets are ordered by key, which supplies the natural ordering used
/// by `order_by` queries. Empty buckets are pruned on removal.
///
/// # Invariant
///
/// For every live instance whose attribute is indexed, every key derived
/// from its current value maps to the instance's identifier, and no key
/// from a superseded value still does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexTable {
    /// Lifecycle state.
    state: IndexState,
    /// Whether at most one instance may occupy a key.
    unique: bool,
    /// Key -> identifiers.
    buckets: BTreeMap<IndexKey, BTreeSet<InstanceId>>,
    /// Total (key, id) entry count.
    count: usize,
}

impl IndexTable {
    /// Creates an empty, immediately consistent table.
    ///
    /// Use this when the index is declared together with its model, so
    /// the empty table trivially covers the empty instance set.
    #[must_use]
    pub fn new(unique: bool) -> Self {
        Self {
            state: IndexState::Consistent,
            unique,
            buckets: BTreeMap::new(),
            count: 0,
        }
    }

    /// Creates an empty table in the `Unbuilt` state.
    ///
    /// Use this when the index is declared over a table that already
    /// holds instances; it refuses queries until rebuilt.
    #[must_use]
    pub fn unbuilt(unique: bool) -> Self {
        Self {
            state: IndexState::Unbuilt,
            unique,
            buckets: BTreeMap::new(),
            count: 0,
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> IndexState {
        self.state
    }

    /// Sets the lifecycle state.
    pub fn set_state(&mut self, state: IndexState) {
        self.state = state;
    }

    /// Returns true if the table enforces uniqueness.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Inserts a key-identifier mapping.
    ///
    /// # Errors
    ///
    /// For unique tables, fails with [`UniqueConflict`] if the key is
    /// already occupied by a different instance. The table is unchanged
    /// on failure.
    pub fn insert(&mut self, key: IndexKey, id: InstanceId) -> Result<(), UniqueConflict> {
        if self.unique {
            if let Some(occupant) = self.occupant(&key) {
                if occupant != id {
                    return Err(UniqueConflict { key, occupant });
                }
            }
        }
        let bucket = self.buckets.entry(key).or_default();
        if bucket.insert(id) {
            self.count += 1;
        }
        Ok(())
    }

    /// Removes a key-identifier mapping, pruning the bucket if it
    /// becomes empty. Returns true if the mapping existed.
    pub fn remove(&mut self, key: &IndexKey, id: InstanceId) -> bool {
        if let Some(bucket) = self.buckets.get_mut(key) {
            if bucket.remove(&id) {
                self.count -= 1;
                if bucket.is_empty() {
                    self.buckets.remove(key);
                }
                return true;
            }
        }
        false
    }

    /// Returns the identifiers in a key's bucket.
    #[must_use]
    pub fn lookup(&self, key: &IndexKey) -> Vec<InstanceId> {
        match self.buckets.get(key) {
            Some(bucket) => bucket.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Returns true if the key has a bucket.
    #[must_use]
    pub fn contains(&self, key: &IndexKey) -> bool {
        self.buckets.contains_key(key)
    }

    /// Returns the single occupant of a key, if any.
    ///
    /// Meaningful for unique tables; for non-unique tables it returns an
    /// arbitrary bucket member.
    #[must_use]
    pub fn occupant(&self, key: &IndexKey) -> Option<InstanceId> {
        self.buckets
            .get(key)
            .and_then(|bucket| bucket.iter().next().copied())
    }

    /// Iterates over buckets in key order.
    pub fn buckets(&self) -> impl Iterator<Item = (&IndexKey, &BTreeSet<InstanceId>)> {
        self.buckets.iter()
    }

    /// Returns the number of (key, identifier) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Discards all entries. The lifecycle state is untouched.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.count = 0;
    }

    /// Encodes the table to its persisted CBOR form.
    ///
    /// # Errors
    ///
    /// Fails if serialization fails.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(CoreError::codec)?;
        Ok(buf)
    }

    /// Decodes a table from its persisted CBOR form.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not a valid encoded table.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(bytes).map_err(CoreError::codec)
    }
}
