//! AttrDB core: indexed attribute storage and querying for model
//! instances.
//!
//! A [`store::ModelStore`] persists instances of registered
//! [`schema::ModelSchema`]s through a pluggable storage backend. Schema
//! attributes may carry indexes, declared per attribute on an
//! [`schema::AttributeDescriptor`]: derived keys are maintained on every
//! write, in the same storage transaction as the instance itself, and
//! serve equality searches without scanning the instance set.
//!
//! # Architecture
//!
//! - [`schema`]: model and attribute declarations, key derivation
//! - [`index`]: persistent index tables and their write-time maintenance
//! - [`query`]: lazy index-backed searches
//! - [`integrity`]: index verification against the live instance set
//! - [`store`]: the facade tying everything to a storage backend
//!
//! # Example
//!
//! ```rust
//! use attrdb_core::schema::{extract, AttributeDescriptor, ModelSchema};
//! use attrdb_core::store::ModelStore;
//! use attrdb_storage::MemoryBackend;
//! use std::sync::Arc;
//!
//! let store = ModelStore::new(Arc::new(MemoryBackend::new()));
//! store.register(
//!     ModelSchema::new("cowboy")
//!         .attribute(
//!             AttributeDescriptor::new("name")
//!                 .indexed()
//!                 .extract_with(extract::lowercase_words()),
//!         )
//!         .attribute(AttributeDescriptor::new("email").unique()),
//! )?;
//!
//! store.create(
//!     "cowboy",
//!     vec![
//!         ("name", "George Abitbol".into()),
//!         ("email", "george@abitbol.example".into()),
//!     ],
//! )?;
//!
//! let george = store.search("cowboy").filter("name", "george".into()).one()?;
//! assert_eq!(george.get("name").as_text(), Some("George Abitbol"));
//! # Ok::<(), attrdb_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod index;
pub mod integrity;
pub mod key;
pub mod model;
pub mod query;
pub mod schema;
pub mod store;
pub mod types;
pub mod value;

pub use error::{CoreError, CoreResult};
pub use index::{IndexState, IndexTable};
pub use integrity::Inconsistency;
pub use key::IndexKey;
pub use model::ModelInstance;
pub use query::{Order, SearchQuery};
pub use schema::{AttributeDescriptor, ModelSchema};
pub use store::ModelStore;
pub use types::InstanceId;
pub use value::AttributeValue;
