//! Model schemas and attribute descriptors.

pub mod extract;

use crate::key::IndexKey;
use crate::value::AttributeValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A pure function deriving zero or more index keys from a value.
///
/// Used both at write time (value extraction) and at read time (search
/// key derivation). The two slots are independently configurable, which
/// enables asymmetric indexation such as word-splitting at write time
/// with whole-word lookup at read time.
pub type KeyExtractor = Arc<dyn Fn(&AttributeValue) -> BTreeSet<IndexKey> + Send + Sync>;

/// Declares a named attribute on a model, optionally indexed.
///
/// A plain attribute just stores values. Calling [`indexed`](Self::indexed)
/// attaches an index table maintained on every write, with:
///
/// - `extract_with`: write-time key derivation (default: identity)
/// - `search_with`: read-time key derivation (default: identity)
/// - `unique`: at most one instance per key
/// - `noneok`: whether `None` values are indexed under [`IndexKey::Null`]
///
/// # Example
///
/// ```rust
/// use attrdb_core::schema::{extract, AttributeDescriptor};
///
/// let name = AttributeDescriptor::new("name")
///     .indexed()
///     .extract_with(extract::lowercase_words());
/// assert!(name.is_indexed());
/// ```
#[derive(Clone)]
pub struct AttributeDescriptor {
    /// Attribute name, unique within a schema.
    name: String,
    /// Whether this attribute carries an index table.
    indexed: bool,
    /// Whether the index enforces uniqueness.
    unique: bool,
    /// Whether `None` values are indexed under the distinguished null key.
    noneok: bool,
    /// Write-time key extraction.
    extract: KeyExtractor,
    /// Read-time search key derivation.
    search: KeyExtractor,
}

impl AttributeDescriptor {
    /// Creates a plain, unindexed attribute.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexed: false,
            unique: false,
            noneok: false,
            extract: extract::identity(),
            search: extract::identity(),
        }
    }

    /// Attaches an index to this attribute.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Makes the index enforce uniqueness.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.indexed = true;
        self.unique = true;
        self
    }

    /// Indexes `None` values under the distinguished [`IndexKey::Null`] key.
    #[must_use]
    pub fn noneok(mut self) -> Self {
        self.noneok = true;
        self
    }

    /// Sets the write-time extraction function.
    ///
    /// Also sets the search function if it is still the default, so a
    /// symmetric custom indexation needs only one call.
    #[must_use]
    pub fn extract_with(mut self, f: KeyExtractor) -> Self {
        self.extract = f.clone();
        self.search = f;
        self
    }

    /// Sets the read-time search key function, making the indexation
    /// asymmetric.
    #[must_use]
    pub fn search_with(mut self, f: KeyExtractor) -> Self {
        self.search = f;
        self
    }

    /// Returns the attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if this attribute carries an index.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Returns true if the index enforces uniqueness.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns true if `None` values are indexed.
    #[must_use]
    pub fn is_noneok(&self) -> bool {
        self.noneok
    }

    /// Derives the index keys for a stored value.
    ///
    /// `None` handling happens here, before the extraction function runs:
    /// with `noneok` the distinguished null key is produced, otherwise no
    /// keys at all. Custom extractors therefore never see `None`.
    #[must_use]
    pub fn value_keys(&self, value: &AttributeValue) -> BTreeSet<IndexKey> {
        if value.is_none() {
            if self.noneok {
                return BTreeSet::from([IndexKey::Null]);
            }
            return BTreeSet::new();
        }
        (self.extract)(value)
    }

    /// Derives the keys looked up for a query value.
    #[must_use]
    pub fn search_keys(&self, value: &AttributeValue) -> BTreeSet<IndexKey> {
        if value.is_none() {
            if self.noneok {
                return BTreeSet::from([IndexKey::Null]);
            }
            return BTreeSet::new();
        }
        (self.search)(value)
    }
}

impl fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("name", &self.name)
            .field("indexed", &self.indexed)
            .field("unique", &self.unique)
            .field("noneok", &self.noneok)
            .finish_non_exhaustive()
    }
}

/// Declares a model: a table name plus its attribute descriptors.
///
/// Schemas are registered on a [`crate::store::ModelStore`]; the table
/// name keys the persistent objects belonging to the model and must be
/// unique per store.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    /// Table name, unique per store.
    table: String,
    /// Attribute descriptors by name.
    attributes: BTreeMap<String, AttributeDescriptor>,
}

impl ModelSchema {
    /// Creates a schema with no attributes.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute descriptor. Replaces any previous descriptor
    /// with the same name.
    #[must_use]
    pub fn attribute(mut self, descriptor: AttributeDescriptor) -> Self {
        self.attributes
            .insert(descriptor.name().to_string(), descriptor);
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the descriptor for an attribute, if declared.
    #[must_use]
    pub fn descriptor(&self, attribute: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(attribute)
    }

    /// Returns true if the attribute is declared on this schema.
    #[must_use]
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Iterates over all attribute descriptors.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.values()
    }

    /// Iterates over the descriptors of indexed attributes.
    pub fn indexed_attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.values().filter(|d| d.is_indexed())
    }
}
