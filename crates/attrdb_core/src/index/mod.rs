//! Index tables and their maintenance.
//!
//! An index table maps derived keys to the set of instances whose
//! attribute value produced that key. Tables are persisted through the
//! storage backend alongside the instances they index, so table updates
//! commit atomically with the instance writes that caused them.

mod maintainer;
mod table;

pub use maintainer::IndexMaintainer;
pub use table::{IndexState, IndexTable, UniqueConflict};
