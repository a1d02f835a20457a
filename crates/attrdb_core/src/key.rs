//! Index keys.

use crate::value::AttributeValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A key derived from an attribute value and stored in an index table.
///
/// Keys carry a total order (variant rank first, then payload), which
/// gives every index table a natural key ordering. That ordering is what
/// `order_by` queries walk, so results can be produced without loading
/// and comparing instances.
///
/// `Null` is the distinguished key used for absent values when an
/// attribute is declared `noneok`; it can never collide with a key
/// derived from a real value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    /// Distinguished key for indexed `None` values.
    Null,
    /// Boolean key.
    Bool(bool),
    /// Integer key.
    Int(i64),
    /// Text key.
    Text(String),
    /// Byte-string key.
    Bytes(Vec<u8>),
}

impl IndexKey {
    /// Derives a key from a scalar value.
    ///
    /// Returns `None` for values the identity extraction cannot index:
    /// `None` (handled by the `noneok` flag upstream), floats (no total
    /// order), and lists (flattened by the caller).
    #[must_use]
    pub fn from_scalar(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Bool(b) => Some(IndexKey::Bool(*b)),
            AttributeValue::Int(i) => Some(IndexKey::Int(*i)),
            AttributeValue::Text(s) => Some(IndexKey::Text(s.clone())),
            AttributeValue::Bytes(b) => Some(IndexKey::Bytes(b.clone())),
            AttributeValue::None | AttributeValue::Float(_) | AttributeValue::List(_) => None,
        }
    }

    /// Creates a text key.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        IndexKey::Text(s.into())
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Null => write!(f, "null"),
            IndexKey::Bool(b) => write!(f, "{b}"),
            IndexKey::Int(i) => write!(f, "{i}"),
            IndexKey::Text(s) => write!(f, "{s:?}"),
            IndexKey::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        IndexKey::Int(value)
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey::Text(value.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        IndexKey::Text(value)
    }
}
