//! Model store: the facade tying schemas, instances, and indexes together.

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexMaintainer, IndexState, IndexTable};
use crate::integrity::{self, Inconsistency};
use crate::model::ModelInstance;
use crate::query::SearchQuery;
use crate::schema::ModelSchema;
use crate::types::InstanceId;
use crate::value::AttributeValue;
use attrdb_storage::{ObjectKey, StorageBackend, Transaction};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Separator between key components. Table and attribute names must not
/// contain it, which [`ModelStore::register`] enforces; otherwise
/// distinct names could alias each other's key spaces.
const KEY_SEPARATOR: char = '/';

/// Key prefix for all instances of a table, in the backend's key space.
fn instance_prefix(table: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(table.len() + 3);
    prefix.extend_from_slice(b"o/");
    prefix.extend_from_slice(table.as_bytes());
    prefix.push(b'/');
    prefix
}

/// Object key of one instance. Instance keys sort by identifier within
/// a table, which makes the unfiltered scan order the primary-key order.
fn instance_key(table: &str, id: InstanceId) -> ObjectKey {
    let mut key = instance_prefix(table);
    key.extend_from_slice(id.as_bytes());
    ObjectKey::new(key)
}

/// Object key of one attribute's index table.
fn index_object_key(table: &str, attribute: &str) -> ObjectKey {
    ObjectKey::new(format!("i/{table}/{attribute}").into_bytes())
}

/// Persistent store for model instances with maintained attribute
/// indexes.
///
/// All operations run inside one backend transaction: the instance write
/// and every affected index table commit together or not at all. A
/// transaction abort rolls every bucket mutation back with it.
///
/// The store holds no index state of its own; every index table is an
/// object in the backend, reachable only through it.
///
/// # Example
///
/// ```rust
/// use attrdb_core::schema::{AttributeDescriptor, ModelSchema};
/// use attrdb_core::store::ModelStore;
/// use attrdb_storage::MemoryBackend;
/// use std::sync::Arc;
///
/// let store = ModelStore::new(Arc::new(MemoryBackend::new()));
/// store
///     .register(ModelSchema::new("cowboy").attribute(AttributeDescriptor::new("name").indexed()))
///     .unwrap();
///
/// let george = store
///     .create("cowboy", vec![("name", "George Abitbol".into())])
///     .unwrap();
/// let found = store
///     .search("cowboy")
///     .filter("name", "George Abitbol".into())
///     .one()
///     .unwrap();
/// assert_eq!(found.id(), george.id());
/// ```
pub struct ModelStore {
    /// Storage backend. Owns persistence, isolation, and durability.
    backend: Arc<dyn StorageBackend>,
    /// Registered schemas by table name.
    schemas: RwLock<BTreeMap<String, ModelSchema>>,
}

impl ModelStore {
    /// Creates a store over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            schemas: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a model schema.
    ///
    /// Index tables for the schema's indexed attributes are created if
    /// they don't exist yet. A table created over pre-existing instances
    /// starts [`IndexState::Unbuilt`] and refuses queries until
    /// [`rebuild_index`](Self::rebuild_index) populates it; a table
    /// created alongside an empty model is immediately consistent.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DuplicateTable`] if a schema with the same table
    ///   name is already registered
    /// - [`CoreError::InvalidOperation`] if the table name or an
    ///   attribute name contains `/`, the key separator
    pub fn register(&self, schema: ModelSchema) -> CoreResult<()> {
        if schema.table().contains(KEY_SEPARATOR) {
            return Err(CoreError::invalid_operation(format!(
                "table name '{}' must not contain '{KEY_SEPARATOR}'",
                schema.table()
            )));
        }
        for descriptor in schema.attributes() {
            if descriptor.name().contains(KEY_SEPARATOR) {
                return Err(CoreError::invalid_operation(format!(
                    "attribute name '{}' must not contain '{KEY_SEPARATOR}'",
                    descriptor.name()
                )));
            }
        }

        // Held across the backend transaction so two registrations of
        // the same name cannot both pass the duplicate check.
        let mut schemas = self.schemas.write();
        if schemas.contains_key(schema.table()) {
            return Err(CoreError::DuplicateTable {
                table: schema.table().to_string(),
            });
        }

        self.transaction(|txn| {
            let has_instances = !txn.scan_prefix(&instance_prefix(schema.table()))?.is_empty();
            for descriptor in schema.indexed_attributes() {
                let key = index_object_key(schema.table(), descriptor.name());
                if txn.read(&key)?.is_none() {
                    let table = if has_instances {
                        debug!(
                            table = schema.table(),
                            attribute = descriptor.name(),
                            "index declared over existing instances; starts unbuilt"
                        );
                        IndexTable::unbuilt(descriptor.is_unique())
                    } else {
                        IndexTable::new(descriptor.is_unique())
                    };
                    txn.write(key, table.encode()?)?;
                }
            }
            Ok(())
        })?;

        schemas.insert(schema.table().to_string(), schema);
        Ok(())
    }

    /// Returns a clone of a registered schema.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::UnknownTable`] if no schema is registered
    /// under the name.
    pub fn schema(&self, table: &str) -> CoreResult<ModelSchema> {
        self.schemas
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| CoreError::UnknownTable {
                table: table.to_string(),
            })
    }

    /// Creates a model instance with the given attribute values.
    ///
    /// Every index on the model is maintained within the same
    /// transaction as the instance write.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnknownAttribute`] for a value naming an attribute
    ///   the schema doesn't declare
    /// - [`CoreError::UniqueIndexViolation`] if a unique index rejects a
    ///   derived key; nothing is persisted in that case
    pub fn create(
        &self,
        table: &str,
        values: Vec<(&str, AttributeValue)>,
    ) -> CoreResult<ModelInstance> {
        let schema = self.schema(table)?;

        let mut instance = ModelInstance::new(InstanceId::new());
        for (attribute, value) in values {
            if !schema.has_attribute(attribute) {
                return Err(CoreError::unknown_attribute(table, attribute));
            }
            instance.set(attribute, value);
        }

        self.transaction(|txn| {
            txn.write(instance_key(table, instance.id()), instance.encode()?)?;

            for descriptor in schema.indexed_attributes() {
                let key = index_object_key(table, descriptor.name());
                let mut index = Self::load_index_at(txn, &key, table, descriptor.name())?;
                IndexMaintainer::new(descriptor, &mut index)
                    .on_create(instance.id(), instance.get(descriptor.name()))?;
                txn.write(key, index.encode()?)?;
            }
            Ok(())
        })?;

        debug!(table, instance = %instance.id(), "instance created");
        Ok(instance)
    }

    /// Reads an instance by identifier.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InstanceNotFound`] for unknown identifiers.
    pub fn read(&self, table: &str, id: InstanceId) -> CoreResult<ModelInstance> {
        self.schema(table)?;
        let txn = self.begin()?;
        Self::read_in(&txn, table, id)
    }

    /// Reads several instances by identifier, in the given order.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InstanceNotFound`] on the first unknown
    /// identifier.
    pub fn read_many(&self, table: &str, ids: &[InstanceId]) -> CoreResult<Vec<ModelInstance>> {
        self.schema(table)?;
        let txn = self.begin()?;
        ids.iter()
            .map(|id| Self::read_in(&txn, table, *id))
            .collect()
    }

    /// Sets one attribute value on an instance.
    ///
    /// Old index keys no longer derived from the new value are removed
    /// and new keys inserted, atomically with the instance write.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InstanceNotFound`] for unknown identifiers
    /// - [`CoreError::UnknownAttribute`] for undeclared attributes
    /// - [`CoreError::UniqueIndexViolation`] if the new value's key is
    ///   taken; the instance and index are left untouched
    pub fn update(
        &self,
        table: &str,
        id: InstanceId,
        attribute: &str,
        value: AttributeValue,
    ) -> CoreResult<()> {
        let schema = self.schema(table)?;
        let descriptor = schema
            .descriptor(attribute)
            .ok_or_else(|| CoreError::unknown_attribute(table, attribute))?;

        self.transaction(|txn| {
            let mut instance = Self::read_in(txn, table, id)?;
            let old_value = instance.set(attribute, value.clone());
            txn.write(instance_key(table, id), instance.encode()?)?;

            if descriptor.is_indexed() {
                let key = index_object_key(table, attribute);
                let mut index = Self::load_index_at(txn, &key, table, attribute)?;
                IndexMaintainer::new(descriptor, &mut index).on_update(id, &old_value, &value)?;
                txn.write(key, index.encode()?)?;
            }
            Ok(())
        })
    }

    /// Deletes an instance, removing all of its keys from every index
    /// table it participates in.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InstanceNotFound`] for unknown identifiers.
    pub fn delete(&self, table: &str, id: InstanceId) -> CoreResult<()> {
        let schema = self.schema(table)?;

        self.transaction(|txn| {
            let instance = Self::read_in(txn, table, id)?;

            for descriptor in schema.indexed_attributes() {
                let key = index_object_key(table, descriptor.name());
                let mut index = Self::load_index_at(txn, &key, table, descriptor.name())?;
                IndexMaintainer::new(descriptor, &mut index)
                    .on_delete(id, instance.get(descriptor.name()))?;
                txn.write(key, index.encode()?)?;
            }

            txn.delete(instance_key(table, id))?;
            Ok(())
        })?;

        debug!(table, instance = %id, "instance deleted");
        Ok(())
    }

    /// Returns the number of live instances, without materializing them.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::UnknownTable`] for unregistered tables.
    pub fn count(&self, table: &str) -> CoreResult<usize> {
        self.schema(table)?;
        let txn = self.begin()?;
        Ok(txn.scan_prefix(&instance_prefix(table))?.len())
    }

    /// Starts a search over a model. With no filters the query matches
    /// every live instance in primary-key order.
    #[must_use]
    pub fn search<'a>(&'a self, table: &str) -> SearchQuery<'a> {
        SearchQuery::new(self, table)
    }

    /// Returns a lazy sequence over every live instance.
    ///
    /// Equivalent to [`search`](Self::search) with no filters.
    #[must_use]
    pub fn all<'a>(&'a self, table: &str) -> SearchQuery<'a> {
        self.search(table)
    }

    /// Scans an attribute's index for discrepancies against the live
    /// instance set.
    ///
    /// Findings are reported, never fixed; repair goes through
    /// [`rebuild_index`](Self::rebuild_index). A consistent index found
    /// with discrepancies is flagged [`IndexState::Inconsistent`], which
    /// makes subsequent queries fail until rebuilt.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::NotIndexed`] if the attribute carries no
    /// index.
    pub fn check_index(&self, table: &str, attribute: &str) -> CoreResult<Vec<Inconsistency>> {
        let schema = self.schema(table)?;
        let descriptor = schema
            .descriptor(attribute)
            .ok_or_else(|| CoreError::unknown_attribute(table, attribute))?;
        if !descriptor.is_indexed() {
            return Err(CoreError::NotIndexed {
                attribute: attribute.to_string(),
            });
        }

        self.transaction(|txn| {
            let key = index_object_key(table, attribute);
            let mut index = Self::load_index_at(txn, &key, table, attribute)?;
            let live = Self::live_instances(txn, table)?;
            let findings = integrity::check_table(descriptor, &index, &live);

            if !findings.is_empty() {
                for finding in &findings {
                    warn!(table, attribute, %finding, "index inconsistency");
                }
                if index.state() == IndexState::Consistent {
                    index.set_state(IndexState::Inconsistent);
                    txn.write(key, index.encode()?)?;
                }
            }
            Ok(findings)
        })
    }

    /// Discards an attribute's index table and recomputes it from every
    /// live instance.
    ///
    /// This is the authoritative repair path; it is O(instances) and not
    /// meant for the hot path. The index passes through
    /// [`IndexState::Rebuilding`] (committed separately) so a crash
    /// mid-rebuild leaves it refusing queries rather than serving a
    /// half-built table. Rebuilding a consistent index is idempotent.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotIndexed`] if the attribute carries no index
    /// - [`CoreError::UniqueIndexViolation`] if live instances violate a
    ///   unique constraint; the index is left in the rebuilding state
    pub fn rebuild_index(&self, table: &str, attribute: &str) -> CoreResult<()> {
        let schema = self.schema(table)?;
        let descriptor = schema
            .descriptor(attribute)
            .ok_or_else(|| CoreError::unknown_attribute(table, attribute))?;
        if !descriptor.is_indexed() {
            return Err(CoreError::NotIndexed {
                attribute: attribute.to_string(),
            });
        }

        let key = index_object_key(table, attribute);

        // Committed separately so the in-progress state survives a crash.
        self.transaction(|txn| {
            let mut index = Self::load_index_at(txn, &key, table, attribute)?;
            index.set_state(IndexState::Rebuilding);
            txn.write(key.clone(), index.encode()?)?;
            Ok(())
        })?;

        self.transaction(|txn| {
            let live = Self::live_instances(txn, table)?;
            let mut index = IndexTable::new(descriptor.is_unique());
            for (id, instance) in &live {
                IndexMaintainer::new(descriptor, &mut index)
                    .on_create(*id, instance.get(attribute))?;
            }
            debug!(
                table,
                attribute,
                instances = live.len(),
                entries = index.len(),
                "index rebuilt"
            );
            txn.write(key.clone(), index.encode()?)?;
            Ok(())
        })
    }

    /// Returns the lifecycle state of an attribute's index.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::NotIndexed`] if the attribute carries no
    /// index.
    pub fn index_state(&self, table: &str, attribute: &str) -> CoreResult<IndexState> {
        self.schema(table)?;
        let txn = self.begin()?;
        let index = Self::load_index_at(&txn, &index_object_key(table, attribute), table, attribute)?;
        Ok(index.state())
    }

    // ------------------------------------------------------------------
    // Internals shared with the query engine
    // ------------------------------------------------------------------

    /// Begins a read transaction on the backend.
    pub(crate) fn begin(&self) -> CoreResult<Transaction> {
        Ok(self.backend.begin()?)
    }

    /// Reads and decodes an instance inside a transaction.
    pub(crate) fn read_in(
        txn: &Transaction,
        table: &str,
        id: InstanceId,
    ) -> CoreResult<ModelInstance> {
        match txn.read(&instance_key(table, id))? {
            Some(bytes) => ModelInstance::decode(&bytes),
            None => Err(CoreError::InstanceNotFound {
                table: table.to_string(),
                id,
            }),
        }
    }

    /// Loads an attribute's index table inside a transaction.
    pub(crate) fn load_index(
        &self,
        txn: &Transaction,
        table: &str,
        attribute: &str,
    ) -> CoreResult<IndexTable> {
        Self::load_index_at(txn, &index_object_key(table, attribute), table, attribute)
    }

    /// Returns every live instance identifier of a table, in primary-key
    /// order.
    pub(crate) fn scan_ids(txn: &Transaction, table: &str) -> CoreResult<Vec<InstanceId>> {
        let prefix = instance_prefix(table);
        let objects = txn.scan_prefix(&prefix)?;
        objects
            .iter()
            .map(|(key, _)| {
                InstanceId::from_slice(&key.as_bytes()[prefix.len()..]).ok_or_else(|| {
                    CoreError::invalid_operation(format!(
                        "malformed instance key in table '{table}'"
                    ))
                })
            })
            .collect()
    }

    fn load_index_at(
        txn: &Transaction,
        key: &ObjectKey,
        table: &str,
        attribute: &str,
    ) -> CoreResult<IndexTable> {
        match txn.read(key)? {
            Some(bytes) => IndexTable::decode(&bytes),
            None => Err(CoreError::NotIndexed {
                attribute: format!("{table}.{attribute}"),
            }),
        }
    }

    /// Loads every live instance of a table, keyed by identifier.
    fn live_instances(
        txn: &Transaction,
        table: &str,
    ) -> CoreResult<BTreeMap<InstanceId, ModelInstance>> {
        let prefix = instance_prefix(table);
        let mut live = BTreeMap::new();
        for (_, bytes) in txn.scan_prefix(&prefix)? {
            let instance = ModelInstance::decode(&bytes)?;
            live.insert(instance.id(), instance);
        }
        Ok(live)
    }

    /// Runs a closure inside one backend transaction, committing on `Ok`
    /// and aborting on `Err`.
    fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<T>,
    {
        let mut txn = self.backend.begin()?;
        match f(&mut txn) {
            Ok(result) => {
                self.backend.commit(&mut txn)?;
                Ok(result)
            }
            Err(err) => {
                // Don't mask the original error with an abort failure.
                let _ = self.backend.abort(&mut txn);
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("tables", &self.schemas.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeDescriptor;
    use attrdb_storage::MemoryBackend;

    fn store_with_cowboys() -> ModelStore {
        let store = ModelStore::new(Arc::new(MemoryBackend::new()));
        store
            .register(
                ModelSchema::new("cowboy")
                    .attribute(AttributeDescriptor::new("name").indexed())
                    .attribute(AttributeDescriptor::new("email").unique())
                    .attribute(AttributeDescriptor::new("age")),
            )
            .unwrap();
        store
    }

    #[test]
    fn create_and_read() {
        let store = store_with_cowboys();
        let george = store
            .create("cowboy", vec![("name", "George Abitbol".into())])
            .unwrap();

        let read = store.read("cowboy", george.id()).unwrap();
        assert_eq!(read, george);
    }

    #[test]
    fn read_unknown_id_fails() {
        let store = store_with_cowboys();
        let err = store.read("cowboy", InstanceId::new()).unwrap_err();
        assert!(matches!(err, CoreError::InstanceNotFound { .. }));
    }

    #[test]
    fn read_many_in_order() {
        let store = store_with_cowboys();
        let a = store.create("cowboy", vec![("name", "A".into())]).unwrap();
        let b = store.create("cowboy", vec![("name", "B".into())]).unwrap();

        let found = store.read_many("cowboy", &[b.id(), a.id()]).unwrap();
        assert_eq!(found[0].id(), b.id());
        assert_eq!(found[1].id(), a.id());
    }

    #[test]
    fn read_many_fails_on_unknown() {
        let store = store_with_cowboys();
        let a = store.create("cowboy", vec![]).unwrap();
        let err = store
            .read_many("cowboy", &[a.id(), InstanceId::new()])
            .unwrap_err();
        assert!(matches!(err, CoreError::InstanceNotFound { .. }));
    }

    #[test]
    fn create_unknown_attribute_fails() {
        let store = store_with_cowboys();
        let err = store
            .create("cowboy", vec![("height", AttributeValue::Int(180))])
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownAttribute { .. }));
    }

    #[test]
    fn create_unknown_table_fails() {
        let store = store_with_cowboys();
        let err = store.create("horse", vec![]).unwrap_err();
        assert!(matches!(err, CoreError::UnknownTable { .. }));
    }

    #[test]
    fn duplicate_table_rejected() {
        let store = store_with_cowboys();
        let err = store.register(ModelSchema::new("cowboy")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTable { .. }));
    }

    #[test]
    fn concurrent_registration_admits_one() {
        let store = Arc::new(ModelStore::new(Arc::new(MemoryBackend::new())));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.register(ModelSchema::new("cowboy")))
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(CoreError::DuplicateTable { .. }))));
    }

    #[test]
    fn names_containing_the_separator_are_rejected() {
        let store = ModelStore::new(Arc::new(MemoryBackend::new()));

        // A table named "a/b" would alias the key space of a table "a".
        let err = store.register(ModelSchema::new("a/b")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        let err = store
            .register(ModelSchema::new("cowboy").attribute(AttributeDescriptor::new("na/me")))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        // Neither registration stuck.
        assert!(matches!(
            store.count("a/b").unwrap_err(),
            CoreError::UnknownTable { .. }
        ));
        assert!(matches!(
            store.count("cowboy").unwrap_err(),
            CoreError::UnknownTable { .. }
        ));
    }

    #[test]
    fn count_tracks_creates_and_deletes() {
        let store = store_with_cowboys();
        assert_eq!(store.count("cowboy").unwrap(), 0);

        let a = store.create("cowboy", vec![]).unwrap();
        store.create("cowboy", vec![]).unwrap();
        assert_eq!(store.count("cowboy").unwrap(), 2);

        store.delete("cowboy", a.id()).unwrap();
        assert_eq!(store.count("cowboy").unwrap(), 1);
    }

    #[test]
    fn unique_violation_persists_nothing() {
        let store = store_with_cowboys();
        store
            .create("cowboy", vec![("email", "g@example.com".into())])
            .unwrap();

        let err = store
            .create(
                "cowboy",
                vec![("name", "Copy".into()), ("email", "g@example.com".into())],
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::UniqueIndexViolation { .. }));

        // The rejected instance is not visible anywhere.
        assert_eq!(store.count("cowboy").unwrap(), 1);
        assert_eq!(
            store
                .search("cowboy")
                .filter("name", "Copy".into())
                .count()
                .unwrap(),
            0
        );
    }

    #[test]
    fn unique_update_conflict_rolls_back() {
        let store = store_with_cowboys();
        store
            .create("cowboy", vec![("email", "a@example.com".into())])
            .unwrap();
        let b = store
            .create("cowboy", vec![("email", "b@example.com".into())])
            .unwrap();

        let err = store
            .update("cowboy", b.id(), "email", "a@example.com".into())
            .unwrap_err();
        assert!(matches!(err, CoreError::UniqueIndexViolation { .. }));

        // b keeps its old value and index entry.
        let read = store.read("cowboy", b.id()).unwrap();
        assert_eq!(read.get("email").as_text(), Some("b@example.com"));
        assert_eq!(
            store
                .search("cowboy")
                .filter("email", "b@example.com".into())
                .count()
                .unwrap(),
            1
        );
    }

    #[test]
    fn delete_clears_index_entries() {
        let store = store_with_cowboys();
        let george = store
            .create(
                "cowboy",
                vec![
                    ("name", "George".into()),
                    ("email", "g@example.com".into()),
                ],
            )
            .unwrap();

        store.delete("cowboy", george.id()).unwrap();

        assert_eq!(
            store
                .search("cowboy")
                .filter("name", "George".into())
                .count()
                .unwrap(),
            0
        );
        assert!(store.check_index("cowboy", "name").unwrap().is_empty());
        assert!(store.check_index("cowboy", "email").unwrap().is_empty());
    }

    #[test]
    fn update_moves_index_entry() {
        let store = store_with_cowboys();
        let m = store
            .create("cowboy", vec![("name", "Peter".into())])
            .unwrap();

        store
            .update("cowboy", m.id(), "name", "Steven".into())
            .unwrap();

        assert_eq!(
            store
                .search("cowboy")
                .filter("name", "Peter".into())
                .count()
                .unwrap(),
            0
        );
        let found = store
            .search("cowboy")
            .filter("name", "Steven".into())
            .one()
            .unwrap();
        assert_eq!(found.id(), m.id());
    }

    #[test]
    fn check_index_clean_store() {
        let store = store_with_cowboys();
        store.create("cowboy", vec![("name", "A".into())]).unwrap();
        store.create("cowboy", vec![("name", "B".into())]).unwrap();

        assert!(store.check_index("cowboy", "name").unwrap().is_empty());
        assert_eq!(
            store.index_state("cowboy", "name").unwrap(),
            IndexState::Consistent
        );
    }

    #[test]
    fn check_unindexed_attribute_fails() {
        let store = store_with_cowboys();
        let err = store.check_index("cowboy", "age").unwrap_err();
        assert!(matches!(err, CoreError::NotIndexed { .. }));
    }

    #[test]
    fn rebuild_is_idempotent() {
        let store = store_with_cowboys();
        store.create("cowboy", vec![("name", "A".into())]).unwrap();
        store.create("cowboy", vec![("name", "B".into())]).unwrap();

        store.rebuild_index("cowboy", "name").unwrap();
        let first = store
            .search("cowboy")
            .order_by("name", crate::query::Order::Ascending)
            .ids()
            .unwrap();

        store.rebuild_index("cowboy", "name").unwrap();
        let second = store
            .search("cowboy")
            .order_by("name", crate::query::Order::Ascending)
            .ids()
            .unwrap();

        assert_eq!(first, second);
        assert!(store.check_index("cowboy", "name").unwrap().is_empty());
    }

    #[test]
    fn late_index_declaration_starts_unbuilt() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let store = ModelStore::new(Arc::clone(&backend));
        store
            .register(ModelSchema::new("cowboy").attribute(AttributeDescriptor::new("name")))
            .unwrap();
        store
            .create("cowboy", vec![("name", "George".into())])
            .unwrap();
        drop(store);

        // Reopen with the attribute now indexed.
        let store = ModelStore::new(backend);
        store
            .register(
                ModelSchema::new("cowboy").attribute(AttributeDescriptor::new("name").indexed()),
            )
            .unwrap();

        assert_eq!(
            store.index_state("cowboy", "name").unwrap(),
            IndexState::Unbuilt
        );
        let err = store
            .search("cowboy")
            .filter("name", "George".into())
            .count()
            .unwrap_err();
        assert!(matches!(err, CoreError::InconsistentIndex { .. }));

        store.rebuild_index("cowboy", "name").unwrap();
        assert_eq!(
            store
                .search("cowboy")
                .filter("name", "George".into())
                .count()
                .unwrap(),
            1
        );
    }
}
