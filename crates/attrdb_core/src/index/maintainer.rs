//! Index maintenance on attribute writes.

use crate::error::{CoreError, CoreResult};
use crate::index::table::IndexTable;
use crate::schema::AttributeDescriptor;
use crate::types::InstanceId;
use crate::value::AttributeValue;
use tracing::debug;

/// Applies the key-diff of one attribute write to its index table.
///
/// On an update, keys derived from the old value but not the new one are
/// removed, and keys derived from the new value but not the old one are
/// inserted. Keys produced by both values are left alone, so an update
/// that doesn't change the derived keys doesn't touch the table.
///
/// Uniqueness is checked for every key to be inserted *before* any
/// mutation, so a rejected write leaves the table exactly as it was.
/// Callers persist the table within the same storage transaction as the
/// instance write, which makes the whole maintenance atomic.
pub struct IndexMaintainer<'a> {
    descriptor: &'a AttributeDescriptor,
    table: &'a mut IndexTable,
}

impl<'a> IndexMaintainer<'a> {
    /// Creates a maintainer for one attribute's table.
    pub fn new(descriptor: &'a AttributeDescriptor, table: &'a mut IndexTable) -> Self {
        Self { descriptor, table }
    }

    /// Indexes a freshly created instance's value.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::UniqueIndexViolation`] if a derived key is
    /// already occupied by another instance.
    pub fn on_create(&mut self, id: InstanceId, value: &AttributeValue) -> CoreResult<()> {
        self.on_update(id, &AttributeValue::None, value)
    }

    /// Applies an attribute value change.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::UniqueIndexViolation`] if a key to be
    /// inserted is already occupied by another instance. No mutation is
    /// applied in that case.
    pub fn on_update(
        &mut self,
        id: InstanceId,
        old_value: &AttributeValue,
        new_value: &AttributeValue,
    ) -> CoreResult<()> {
        let old_keys = self.descriptor.value_keys(old_value);
        let new_keys = self.descriptor.value_keys(new_value);

        let removals: Vec<_> = old_keys.difference(&new_keys).cloned().collect();
        let additions: Vec<_> = new_keys.difference(&old_keys).cloned().collect();

        // Uniqueness is checked per derived key against occupants other
        // than the writing instance, after extraction. An instance can
        // never self-conflict: extraction yields a key set.
        if self.table.is_unique() {
            for key in &additions {
                if let Some(occupant) = self.table.occupant(key) {
                    if occupant != id {
                        return Err(CoreError::unique_violation(self.descriptor.name()));
                    }
                }
            }
        }

        for key in &removals {
            self.table.remove(key, id);
        }
        for key in additions.iter().cloned() {
            self.table
                .insert(key, id)
                .map_err(|_| CoreError::unique_violation(self.descriptor.name()))?;
        }

        if !removals.is_empty() || !additions.is_empty() {
            debug!(
                attribute = self.descriptor.name(),
                instance = %id,
                removed = removals.len(),
                added = additions.len(),
                "index maintenance applied"
            );
        }
        Ok(())
    }

    /// Removes every key the deleted instance's value produced.
    pub fn on_delete(&mut self, id: InstanceId, value: &AttributeValue) -> CoreResult<()> {
        self.on_update(id, value, &AttributeValue::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::table::IndexState;
    use crate::key::IndexKey;
    use crate::schema::extract;

    fn plain_descriptor() -> AttributeDescriptor {
        AttributeDescriptor::new("name").indexed()
    }

    #[test]
    fn create_indexes_value() {
        let desc = plain_descriptor();
        let mut table = IndexTable::new(false);
        let id = InstanceId::new();

        IndexMaintainer::new(&desc, &mut table)
            .on_create(id, &"Peter".into())
            .unwrap();

        assert_eq!(table.lookup(&IndexKey::text("Peter")), vec![id]);
    }

    #[test]
    fn update_swaps_keys() {
        let desc = plain_descriptor();
        let mut table = IndexTable::new(false);
        let id = InstanceId::new();

        let mut maintainer = IndexMaintainer::new(&desc, &mut table);
        maintainer.on_create(id, &"Peter".into()).unwrap();
        maintainer
            .on_update(id, &"Peter".into(), &"Steven".into())
            .unwrap();

        assert!(!table.contains(&IndexKey::text("Peter")));
        assert_eq!(table.lookup(&IndexKey::text("Steven")), vec![id]);
    }

    #[test]
    fn update_with_same_keys_is_noop() {
        let desc = AttributeDescriptor::new("name")
            .indexed()
            .extract_with(extract::lowercase_words());
        let mut table = IndexTable::new(false);
        let id = InstanceId::new();

        let mut maintainer = IndexMaintainer::new(&desc, &mut table);
        maintainer.on_create(id, &"George Abitbol".into()).unwrap();
        // Different raw text, same derived keys.
        maintainer
            .on_update(id, &"George Abitbol".into(), &"george ABITBOL".into())
            .unwrap();

        assert_eq!(table.lookup(&IndexKey::text("george")), vec![id]);
        assert_eq!(table.lookup(&IndexKey::text("abitbol")), vec![id]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn delete_removes_all_keys() {
        let desc = AttributeDescriptor::new("name")
            .indexed()
            .extract_with(extract::lowercase_words());
        let mut table = IndexTable::new(false);
        let id = InstanceId::new();

        let mut maintainer = IndexMaintainer::new(&desc, &mut table);
        maintainer.on_create(id, &"George Abitbol".into()).unwrap();
        maintainer.on_delete(id, &"George Abitbol".into()).unwrap();

        assert!(table.is_empty());
    }

    #[test]
    fn unique_violation_leaves_table_unchanged() {
        let desc = AttributeDescriptor::new("email").unique();
        let mut table = IndexTable::new(true);
        let id1 = InstanceId::new();
        let id2 = InstanceId::new();

        IndexMaintainer::new(&desc, &mut table)
            .on_create(id1, &"a@example.com".into())
            .unwrap();

        let before = table.clone();
        let err = IndexMaintainer::new(&desc, &mut table)
            .on_create(id2, &"a@example.com".into())
            .unwrap_err();

        assert!(matches!(err, CoreError::UniqueIndexViolation { .. }));
        assert_eq!(table.len(), before.len());
        assert_eq!(
            table.lookup(&IndexKey::text("a@example.com")),
            vec![id1]
        );
    }

    #[test]
    fn unique_update_to_own_key_is_allowed() {
        let desc = AttributeDescriptor::new("email").unique();
        let mut table = IndexTable::new(true);
        let id = InstanceId::new();

        let mut maintainer = IndexMaintainer::new(&desc, &mut table);
        maintainer.on_create(id, &"a@example.com".into()).unwrap();
        maintainer
            .on_update(id, &"a@example.com".into(), &"a@example.com".into())
            .unwrap();

        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unique_check_precedes_removals() {
        // A rejected update must not have removed the old keys either.
        let desc = AttributeDescriptor::new("email").unique();
        let mut table = IndexTable::new(true);
        let id1 = InstanceId::new();
        let id2 = InstanceId::new();

        let mut maintainer = IndexMaintainer::new(&desc, &mut table);
        maintainer.on_create(id1, &"a@example.com".into()).unwrap();
        maintainer.on_create(id2, &"b@example.com".into()).unwrap();

        let err = IndexMaintainer::new(&desc, &mut table)
            .on_update(id2, &"b@example.com".into(), &"a@example.com".into())
            .unwrap_err();

        assert!(matches!(err, CoreError::UniqueIndexViolation { .. }));
        assert_eq!(
            table.lookup(&IndexKey::text("b@example.com")),
            vec![id2]
        );
    }

    #[test]
    fn noneok_indexes_null_key() {
        let desc = AttributeDescriptor::new("nickname").indexed().noneok();
        let mut table = IndexTable::new(false);
        let id = InstanceId::new();

        IndexMaintainer::new(&desc, &mut table)
            .on_create(id, &AttributeValue::None)
            .unwrap();

        assert_eq!(table.lookup(&IndexKey::Null), vec![id]);
        assert_eq!(table.state(), IndexState::Consistent);
    }

    #[test]
    fn none_excluded_by_default() {
        let desc = plain_descriptor();
        let mut table = IndexTable::new(false);

        IndexMaintainer::new(&desc, &mut table)
            .on_create(InstanceId::new(), &AttributeValue::None)
            .unwrap();

        assert!(table.is_empty());
    }
}
