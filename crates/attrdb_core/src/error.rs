//! Error types for AttrDB core.

use crate::index::IndexState;
use crate::types::InstanceId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in AttrDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error. Propagated unchanged; retry policy belongs
    /// to the caller owning the transaction boundary.
    #[error("storage error: {0}")]
    Storage(#[from] attrdb_storage::StorageError),

    /// Serialization or deserialization failure.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// A uniqueness-constrained key is already occupied by another instance.
    #[error("unique index violation on attribute '{attribute}'")]
    UniqueIndexViolation {
        /// The attribute whose index rejected the write.
        attribute: String,
    },

    /// The index cannot serve queries in its current state.
    #[error("index on attribute '{attribute}' is {state}; rebuild it before querying")]
    InconsistentIndex {
        /// The attribute whose index is unusable.
        attribute: String,
        /// The state the index was found in.
        state: IndexState,
    },

    /// The attribute exists but carries no index.
    #[error("attribute '{attribute}' is not indexed")]
    NotIndexed {
        /// The attribute name.
        attribute: String,
    },

    /// The attribute is not declared on the schema.
    #[error("unknown attribute '{attribute}' on table '{table}'")]
    UnknownAttribute {
        /// The table searched.
        table: String,
        /// The attribute name.
        attribute: String,
    },

    /// No schema is registered under the given table name.
    #[error("unknown table '{table}'")]
    UnknownTable {
        /// The table name.
        table: String,
    },

    /// A schema with this table name is already registered.
    #[error("table '{table}' is already registered")]
    DuplicateTable {
        /// The table name.
        table: String,
    },

    /// Instance not found.
    #[error("instance {id} not found in table '{table}'")]
    InstanceNotFound {
        /// The table searched.
        table: String,
        /// The identifier that was not found.
        id: InstanceId,
    },

    /// A query expected to match exactly one instance matched none.
    #[error("expected exactly one result, found none")]
    EmptyResult,

    /// A query expected to match exactly one instance matched several.
    #[error("expected exactly one result, found {count}")]
    MultipleResults {
        /// Number of instances matched.
        count: usize,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a codec error from any serialization failure.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec {
            message: err.to_string(),
        }
    }

    /// Creates a unique index violation error.
    pub fn unique_violation(attribute: impl Into<String>) -> Self {
        Self::UniqueIndexViolation {
            attribute: attribute.into(),
        }
    }

    /// Creates an unknown attribute error.
    pub fn unknown_attribute(table: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            table: table.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
