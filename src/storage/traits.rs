//! Storage trait definitions

use crate::index::IndexEntry;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt vector for '{id}': {reason}")]
    CorruptVector { id: String, reason: String },

    #[error("Invalid stored value for '{key}': {value}")]
    InvalidValue { key: String, value: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for durable index storage
///
/// Implementations must be thread-safe (Send + Sync). Each `save_entry` and
/// `delete_entry` call is atomic: a crash mid-call leaves previously
/// committed entries intact.
pub trait IndexStore: Send + Sync {
    /// Vector width recorded for this store, if any entry was ever written.
    fn dimensions(&self) -> StorageResult<Option<usize>>;

    /// Record the vector width of this store.
    fn set_dimensions(&self, dimensions: usize) -> StorageResult<()>;

    /// Identifier of the embedding model whose vectors this store holds.
    fn model_id(&self) -> StorageResult<Option<String>>;

    /// Record the embedding model of this store.
    fn set_model_id(&self, model_id: &str) -> StorageResult<()>;

    /// Insert or replace an entry
    fn save_entry(&self, entry: &IndexEntry) -> StorageResult<()>;

    /// Delete an entry; `false` if it did not exist
    fn delete_entry(&self, id: &str) -> StorageResult<bool>;

    /// Load all committed entries, in insertion order
    fn load_entries(&self) -> StorageResult<Vec<IndexEntry>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: IndexStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
