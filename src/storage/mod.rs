//! Storage backends for the vector index
//!
//! The index keeps its working set in memory and writes every mutation
//! through an `IndexStore`. The primary implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{IndexStore, OpenStore, StorageError, StorageResult};
