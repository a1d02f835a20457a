//! Stock key extraction functions.
//!
//! An extraction function maps an attribute value to the set of keys it
//! is indexed (or searched) under. All functions here are pure; the same
//! value always produces the same keys.

use crate::key::IndexKey;
use crate::schema::KeyExtractor;
use crate::value::AttributeValue;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Identity extraction: one key per scalar value.
///
/// Lists are flattened one level, so a list attribute is multi-valued by
/// default. Floats produce no keys; index them through a custom
/// extractor if an ordering is acceptable for the use case.
#[must_use]
pub fn identity() -> KeyExtractor {
    Arc::new(|value| match value {
        AttributeValue::List(items) => items
            .iter()
            .filter_map(IndexKey::from_scalar)
            .collect(),
        other => IndexKey::from_scalar(other).into_iter().collect(),
    })
}

/// Case-folding word extraction: splits text on whitespace and
/// punctuation, lowercases each word, and indexes every word separately.
///
/// With this as the write-time extractor and the default search function,
/// `search(name = "george")` matches an instance stored with
/// `name = "George Abitbol"` while `"gerge"` does not.
#[must_use]
pub fn lowercase_words() -> KeyExtractor {
    Arc::new(|value| {
        let mut keys = BTreeSet::new();
        collect_words(value, &mut keys);
        keys
    })
}

fn collect_words(value: &AttributeValue, keys: &mut BTreeSet<IndexKey>) {
    match value {
        AttributeValue::Text(text) => {
            for word in text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation()) {
                if !word.is_empty() {
                    keys.insert(IndexKey::Text(word.to_lowercase()));
                }
            }
        }
        AttributeValue::List(items) => {
            for item in items {
                collect_words(item, keys);
            }
        }
        other => {
            if let Some(key) = IndexKey::from_scalar(other) {
                keys.insert(key);
            }
        }
    }
}

/// Lowercased whole-value extraction: one key per text value, case
/// folded. Useful as a search function paired with [`lowercase_words`]
/// when queries are single words.
#[must_use]
pub fn lowercase() -> KeyExtractor {
    Arc::new(|value| match value {
        AttributeValue::Text(text) => BTreeSet::from([IndexKey::Text(text.to_lowercase())]),
        other => IndexKey::from_scalar(other).into_iter().collect(),
    })
}
