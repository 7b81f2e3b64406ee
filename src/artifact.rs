//! Source artifacts: the unit of ingestion

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Metadata attached to an artifact, stored with its index entry and
/// returned alongside every match.
pub type Metadata = BTreeMap<String, String>;

/// Well-known metadata keys written by corpus discovery
pub mod meta_keys {
    /// Path of the file relative to the corpus root
    pub const PATH: &str = "path";
    /// Repository the file was found in
    pub const REPOSITORY: &str = "repository";
    /// Lowercased file extension without the dot
    pub const EXTENSION: &str = "extension";
}

/// A piece of source text to be embedded and indexed.
///
/// The identifier is stable across runs (a corpus-relative path), which is
/// what makes re-ingestion an upsert rather than a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArtifact {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl SourceArtifact {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// SHA-256 of the text, hex encoded.
    pub fn content_hash(&self) -> String {
        content_hash(&self.text)
    }
}

/// SHA-256 of `text`, hex encoded.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
