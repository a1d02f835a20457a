//! # AttrDB Storage
//!
//! Storage backend trait and implementations for AttrDB.
//!
//! This crate provides the lowest-level storage abstraction for AttrDB.
//! Storage backends are **opaque object stores** keyed by byte strings -
//! they do not interpret the state they store. All reads and writes go
//! through a [`Transaction`], and the backend decides when a transaction's
//! writes become visible to others.
//!
//! ## Design Principles
//!
//! - Backends map opaque keys to opaque byte payloads
//! - No knowledge of AttrDB models, attributes, or index tables
//! - Transactions are atomic: commit applies every pending write or none
//! - Readers observe a snapshot taken at transaction begin
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - snapshot-isolated in-memory store
//!
//! ## Example
//!
//! ```rust
//! use attrdb_storage::{MemoryBackend, ObjectKey, StorageBackend};
//!
//! let backend = MemoryBackend::new();
//! let key = ObjectKey::new(b"greeting".to_vec());
//!
//! let mut txn = backend.begin().unwrap();
//! txn.write(key.clone(), b"hello".to_vec()).unwrap();
//! backend.commit(&mut txn).unwrap();
//!
//! let mut txn = backend.begin().unwrap();
//! assert_eq!(txn.read(&key).unwrap(), Some(b"hello".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod txn;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use txn::{ObjectKey, Transaction, TransactionState};
