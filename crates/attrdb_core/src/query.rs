//! Index-backed searches over model instances.
//!
//! A [`SearchQuery`] is a description of a search, not its result:
//! nothing touches the backend until one of the terminal methods
//! ([`ids`](SearchQuery::ids), [`iter`](SearchQuery::iter),
//! [`count`](SearchQuery::count), [`first`](SearchQuery::first),
//! [`one`](SearchQuery::one)) runs. Each terminal call executes against
//! a fresh snapshot, so a query value can be kept around and re-run.

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexState, IndexTable};
use crate::model::ModelInstance;
use crate::store::ModelStore;
use crate::types::InstanceId;
use crate::value::AttributeValue;
use attrdb_storage::Transaction;
use std::collections::BTreeSet;

/// Result ordering direction for [`SearchQuery::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Smallest index key first.
    Ascending,
    /// Largest index key first.
    Descending,
}

/// A lazily executed search over one model's instances.
///
/// Filters combine conjunctively: an instance matches when every
/// filtered attribute's index maps one of the query's derived search
/// keys to it. A query with no filters matches every live instance in
/// primary-key order. Matching no instance at all is an ordinary
/// outcome, not an error.
///
/// Every filtered or ordering attribute must be indexed and its index
/// queryable: an index that is unbuilt, rebuilding, or flagged
/// inconsistent fails the query with [`CoreError::InconsistentIndex`].
/// An inconsistent (but not unbuilt or rebuilding) index can be read
/// anyway through [`allow_stale`](Self::allow_stale).
#[derive(Clone)]
pub struct SearchQuery<'a> {
    store: &'a ModelStore,
    table: String,
    filters: Vec<(String, AttributeValue)>,
    order: Option<(String, Order)>,
    allow_stale: bool,
}

impl<'a> SearchQuery<'a> {
    pub(crate) fn new(store: &'a ModelStore, table: &str) -> Self {
        Self {
            store,
            table: table.to_string(),
            filters: Vec::new(),
            order: None,
            allow_stale: false,
        }
    }

    /// Adds a filter on an indexed attribute.
    ///
    /// The value is passed through the attribute's search-key function;
    /// an instance matches the filter if any derived key maps to it.
    #[must_use]
    pub fn filter(mut self, attribute: &str, value: AttributeValue) -> Self {
        self.filters.push((attribute.to_string(), value));
        self
    }

    /// Orders results by an indexed attribute's key order.
    ///
    /// Instances whose value produces several keys appear at their first
    /// position only. Matches absent from the ordering index (their
    /// value derived no key) come last, in primary-key order.
    #[must_use]
    pub fn order_by(mut self, attribute: &str, order: Order) -> Self {
        self.order = Some((attribute.to_string(), order));
        self
    }

    /// Lets the query read indexes flagged inconsistent.
    ///
    /// Results may then miss matching instances or contain stale ones.
    /// Unbuilt and rebuilding indexes still refuse queries: they have no
    /// content worth a stale read.
    #[must_use]
    pub fn allow_stale(mut self) -> Self {
        self.allow_stale = true;
        self
    }

    /// Executes the query and returns the matching identifiers.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotIndexed`] if a filtered or ordering attribute
    ///   carries no index
    /// - [`CoreError::InconsistentIndex`] if an involved index is not
    ///   queryable
    pub fn ids(&self) -> CoreResult<Vec<InstanceId>> {
        let txn = self.store.begin()?;
        self.execute(&txn)
    }

    /// Executes the query and returns a lazy sequence of instances.
    ///
    /// Matching identifiers are resolved up front; the instances
    /// themselves load one by one from the iterator's snapshot as it is
    /// consumed. Calling `iter` again re-executes against a fresh
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ids`](Self::ids).
    pub fn iter(&self) -> CoreResult<SearchIter> {
        let txn = self.store.begin()?;
        let ids = self.execute(&txn)?;
        Ok(SearchIter {
            txn,
            table: self.table.clone(),
            ids: ids.into_iter(),
        })
    }

    /// Returns the number of matching instances without loading them.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ids`](Self::ids).
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.ids()?.len())
    }

    /// Returns the first matching instance, if any.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ids`](Self::ids).
    pub fn first(&self) -> CoreResult<Option<ModelInstance>> {
        let txn = self.store.begin()?;
        match self.execute(&txn)?.first() {
            Some(id) => Ok(Some(ModelStore::read_in(&txn, &self.table, *id)?)),
            None => Ok(None),
        }
    }

    /// Returns the single matching instance.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EmptyResult`] if nothing matches
    /// - [`CoreError::MultipleResults`] if more than one instance matches
    /// - otherwise the same conditions as [`ids`](Self::ids)
    pub fn one(&self) -> CoreResult<ModelInstance> {
        let txn = self.store.begin()?;
        let ids = self.execute(&txn)?;
        match ids.as_slice() {
            [] => Err(CoreError::EmptyResult),
            [id] => ModelStore::read_in(&txn, &self.table, *id),
            _ => Err(CoreError::MultipleResults { count: ids.len() }),
        }
    }

    fn execute(&self, txn: &Transaction) -> CoreResult<Vec<InstanceId>> {
        let schema = self.store.schema(&self.table)?;

        // Every filtered index is resolved and state-checked up front,
        // so a filter that matches nothing cannot mask an unusable index
        // later in the chain.
        let mut stages = Vec::with_capacity(self.filters.len());
        for (attribute, value) in &self.filters {
            let descriptor = schema
                .descriptor(attribute)
                .ok_or_else(|| CoreError::unknown_attribute(&self.table, attribute))?;
            if !descriptor.is_indexed() {
                return Err(CoreError::NotIndexed {
                    attribute: attribute.clone(),
                });
            }

            let index = self.store.load_index(txn, &self.table, attribute)?;
            self.ensure_queryable(attribute, &index)?;
            stages.push((descriptor, value, index));
        }

        let mut matched: Option<BTreeSet<InstanceId>> = None;
        for (descriptor, value, index) in stages {
            let mut candidates = BTreeSet::new();
            for key in descriptor.search_keys(value) {
                candidates.extend(index.lookup(&key));
            }

            matched = Some(match matched {
                None => candidates,
                Some(previous) => previous.intersection(&candidates).copied().collect(),
            });
            if matched.as_ref().is_some_and(BTreeSet::is_empty) {
                break;
            }
        }

        let matched = match matched {
            Some(set) => set,
            // No filters: every live instance, already in primary-key order.
            None => ModelStore::scan_ids(txn, &self.table)?.into_iter().collect(),
        };

        match &self.order {
            None => Ok(matched.into_iter().collect()),
            Some((attribute, order)) => self.sort(txn, &schema, matched, attribute, *order),
        }
    }

    /// Arranges matched identifiers by walking the ordering index's
    /// buckets in key order.
    fn sort(
        &self,
        txn: &Transaction,
        schema: &crate::schema::ModelSchema,
        matched: BTreeSet<InstanceId>,
        attribute: &str,
        order: Order,
    ) -> CoreResult<Vec<InstanceId>> {
        let descriptor = schema
            .descriptor(attribute)
            .ok_or_else(|| CoreError::unknown_attribute(&self.table, attribute))?;
        if !descriptor.is_indexed() {
            return Err(CoreError::NotIndexed {
                attribute: attribute.to_string(),
            });
        }

        let index = self.store.load_index(txn, &self.table, attribute)?;
        self.ensure_queryable(attribute, &index)?;

        let mut placed = BTreeSet::new();
        let mut ordered = Vec::with_capacity(matched.len());
        let buckets: Vec<&BTreeSet<InstanceId>> = match order {
            Order::Ascending => index.buckets().map(|(_, bucket)| bucket).collect(),
            Order::Descending => {
                let mut buckets: Vec<_> = index.buckets().map(|(_, bucket)| bucket).collect();
                buckets.reverse();
                buckets
            }
        };
        for bucket in buckets {
            for id in bucket {
                if matched.contains(id) && placed.insert(*id) {
                    ordered.push(*id);
                }
            }
        }
        // Matches the ordering index doesn't know about trail in
        // primary-key order.
        ordered.extend(matched.iter().filter(|id| !placed.contains(*id)));
        Ok(ordered)
    }

    fn ensure_queryable(&self, attribute: &str, index: &IndexTable) -> CoreResult<()> {
        match index.state() {
            IndexState::Consistent => Ok(()),
            IndexState::Inconsistent if self.allow_stale => Ok(()),
            state => Err(CoreError::InconsistentIndex {
                attribute: attribute.to_string(),
                state,
            }),
        }
    }
}

impl std::fmt::Debug for SearchQuery<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchQuery")
            .field("table", &self.table)
            .field("filters", &self.filters)
            .field("order", &self.order)
            .field("allow_stale", &self.allow_stale)
            .finish_non_exhaustive()
    }
}

/// Iterator over a query's matching instances.
///
/// Holds its own read snapshot, so the sequence is unaffected by writes
/// committed after the query executed.
pub struct SearchIter {
    txn: Transaction,
    table: String,
    ids: std::vec::IntoIter<InstanceId>,
}

impl Iterator for SearchIter {
    type Item = CoreResult<ModelInstance>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(ModelStore::read_in(&self.txn, &self.table, id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for SearchIter {}

impl std::fmt::Debug for SearchIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIter")
            .field("table", &self.table)
            .field("remaining", &self.ids.len())
            .finish_non_exhaustive()
    }
}
