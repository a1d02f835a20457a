//! Index integrity checking.
//!
//! The checker scans every live instance, recomputes the keys its
//! current value should produce, and compares against the actual index
//! table contents. Discrepancies are reported, never silently fixed;
//! the authoritative repair path is
//! [`crate::store::ModelStore::rebuild_index`].

use crate::index::IndexTable;
use crate::key::IndexKey;
use crate::model::ModelInstance;
use crate::schema::AttributeDescriptor;
use crate::types::InstanceId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One discrepancy between an index table and the live instance set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// A live instance's current value derives this key, but the key's
    /// bucket does not contain the instance.
    MissingEntry {
        /// The instance that should occupy the bucket.
        id: InstanceId,
        /// The key whose bucket is incomplete.
        key: IndexKey,
    },
    /// A bucket maps this instance under a key its current value no
    /// longer produces.
    StaleEntry {
        /// The instance wrongly present in the bucket.
        id: InstanceId,
        /// The superseded key.
        key: IndexKey,
    },
    /// A bucket references an instance that no longer exists.
    OrphanedEntry {
        /// The deleted instance's identifier.
        id: InstanceId,
        /// The key whose bucket references it.
        key: IndexKey,
    },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::MissingEntry { id, key } => {
                write!(f, "instance {id} missing from bucket for key {key}")
            }
            Inconsistency::StaleEntry { id, key } => {
                write!(f, "instance {id} stale in bucket for key {key}")
            }
            Inconsistency::OrphanedEntry { id, key } => {
                write!(f, "bucket for key {key} references deleted instance {id}")
            }
        }
    }
}

/// Compares an index table against the live instances it should cover.
///
/// `live` must contain every live instance of the model, keyed by
/// identifier. Findings are returned in scan order: stale and orphaned
/// entries first (bucket walk), then missing entries (instance walk).
#[must_use]
pub fn check_table(
    descriptor: &AttributeDescriptor,
    table: &IndexTable,
    live: &BTreeMap<InstanceId, ModelInstance>,
) -> Vec<Inconsistency> {
    let mut findings = Vec::new();

    let expected: BTreeMap<InstanceId, BTreeSet<IndexKey>> = live
        .iter()
        .map(|(id, instance)| (*id, descriptor.value_keys(instance.get(descriptor.name()))))
        .collect();

    for (key, bucket) in table.buckets() {
        for id in bucket {
            match expected.get(id) {
                None => findings.push(Inconsistency::OrphanedEntry {
                    id: *id,
                    key: key.clone(),
                }),
                Some(keys) if !keys.contains(key) => findings.push(Inconsistency::StaleEntry {
                    id: *id,
                    key: key.clone(),
                }),
                Some(_) => {}
            }
        }
    }

    for (id, keys) in &expected {
        for key in keys {
            if !table.lookup(key).contains(id) {
                findings.push(Inconsistency::MissingEntry {
                    id: *id,
                    key: key.clone(),
                });
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeValue;

    fn descriptor() -> AttributeDescriptor {
        AttributeDescriptor::new("name").indexed()
    }

    fn live_instance(name: &str) -> (InstanceId, ModelInstance) {
        let id = InstanceId::new();
        let mut instance = ModelInstance::new(id);
        instance.set("name", name.into());
        (id, instance)
    }

    #[test]
    fn consistent_table_has_no_findings() {
        let desc = descriptor();
        let (id, instance) = live_instance("Peter");
        let mut table = IndexTable::new(false);
        table.insert(IndexKey::text("Peter"), id).unwrap();

        let live = BTreeMap::from([(id, instance)]);
        assert!(check_table(&desc, &table, &live).is_empty());
    }

    #[test]
    fn missing_entry_detected() {
        let desc = descriptor();
        let (id, instance) = live_instance("Peter");
        let table = IndexTable::new(false);

        let live = BTreeMap::from([(id, instance)]);
        let findings = check_table(&desc, &table, &live);
        assert_eq!(
            findings,
            vec![Inconsistency::MissingEntry {
                id,
                key: IndexKey::text("Peter"),
            }]
        );
    }

    #[test]
    fn stale_entry_detected() {
        let desc = descriptor();
        let (id, instance) = live_instance("Steven");
        let mut table = IndexTable::new(false);
        // Table still carries the key of a superseded value.
        table.insert(IndexKey::text("Peter"), id).unwrap();
        table.insert(IndexKey::text("Steven"), id).unwrap();

        let live = BTreeMap::from([(id, instance)]);
        let findings = check_table(&desc, &table, &live);
        assert_eq!(
            findings,
            vec![Inconsistency::StaleEntry {
                id,
                key: IndexKey::text("Peter"),
            }]
        );
    }

    #[test]
    fn orphaned_entry_detected() {
        let desc = descriptor();
        let ghost = InstanceId::new();
        let mut table = IndexTable::new(false);
        table.insert(IndexKey::text("Peter"), ghost).unwrap();

        let live = BTreeMap::new();
        let findings = check_table(&desc, &table, &live);
        assert_eq!(
            findings,
            vec![Inconsistency::OrphanedEntry {
                id: ghost,
                key: IndexKey::text("Peter"),
            }]
        );
    }

    #[test]
    fn none_value_expects_no_keys() {
        let desc = descriptor();
        let id = InstanceId::new();
        let instance = ModelInstance::new(id);
        let table = IndexTable::new(false);

        let live = BTreeMap::from([(id, instance)]);
        assert!(check_table(&desc, &table, &live).is_empty());
    }

    #[test]
    fn noneok_missing_null_key_detected() {
        let desc = AttributeDescriptor::new("name").indexed().noneok();
        let id = InstanceId::new();
        let instance = ModelInstance::new(id);
        let table = IndexTable::new(false);

        let live = BTreeMap::from([(id, instance)]);
        let findings = check_table(&desc, &table, &live);
        assert_eq!(
            findings,
            vec![Inconsistency::MissingEntry {
                id,
                key: IndexKey::Null,
            }]
        );
    }

    #[test]
    fn mixed_findings() {
        let desc = descriptor();
        let (live_id, instance) = live_instance("Peter");
        let ghost = InstanceId::new();

        let mut table = IndexTable::new(false);
        table.insert(IndexKey::text("Steven"), ghost).unwrap();

        let live = BTreeMap::from([(live_id, instance)]);
        let findings = check_table(&desc, &table, &live);
        assert_eq!(findings.len(), 2);
        assert!(findings.contains(&Inconsistency::OrphanedEntry {
            id: ghost,
            key: IndexKey::text("Steven"),
        }));
        assert!(findings.contains(&Inconsistency::MissingEntry {
            id: live_id,
            key: IndexKey::text("Peter"),
        }));
    }

    #[test]
    fn value_check_ignores_irrelevant_attribute() {
        let desc = descriptor();
        let id = InstanceId::new();
        let mut instance = ModelInstance::new(id);
        instance.set("age", AttributeValue::Int(30));
        let table = IndexTable::new(false);

        let live = BTreeMap::from([(id, instance)]);
        assert!(check_table(&desc, &table, &live).is_empty());
    }
}
