//! Vector index: committed `(identifier, vector, metadata)` entries with
//! k-nearest-neighbour queries by cosine similarity.
//!
//! Entries live in a sharded concurrent map, each behind its own `Arc`, so a
//! reader always sees a whole entry from either before or after an upsert of
//! the same identifier. Writers are serialized among themselves and, when a
//! backing store is attached, write through to it before the new entry
//! becomes visible. Queries never wait on storage I/O.
//!
//! Vectors are L2-normalized on insert; a query normalizes its probe and
//! scores with a dot product, which is cosine similarity. A zero vector is
//! stored as-is and scores 0.0 against everything.

pub mod vector;

use crate::artifact::Metadata;
use crate::storage::{IndexStore, StorageError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};
use vector::{dot, l2_normalize};

/// Errors raised by index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index holds vectors from model '{stored}', embedder is '{expected}'")]
    ModelMismatch { expected: String, stored: String },

    #[error("vector for '{0}' contains non-finite values")]
    NonFiniteVector(String),

    #[error("index storage error: {0}")]
    Storage(#[from] StorageError),
}

/// A committed index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    /// L2-normalized vector
    pub vector: Vec<f32>,
    pub metadata: Metadata,
    /// Hash of the text the vector was computed from, if known
    pub content_hash: Option<String>,
    /// Insertion sequence; kept when the entry is replaced
    pub seq: u64,
}

/// One ranked match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// Matches ordered by non-increasing score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryResult {
    matches: Vec<QueryMatch>,
}

impl QueryResult {
    /// Build a result from arbitrary matches. Sorting is stable, so matches
    /// with equal scores keep their given order.
    pub fn new(mut matches: Vec<QueryMatch>) -> Self {
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Self { matches }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn matches(&self) -> &[QueryMatch] {
        &self.matches
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryMatch> {
        self.matches.iter()
    }

    pub fn top(&self) -> Option<&QueryMatch> {
        self.matches.first()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.id.as_str()).collect()
    }

    /// Metadata of every match, in rank order.
    pub fn metadata(&self) -> Vec<Metadata> {
        self.matches.iter().map(|m| m.metadata.clone()).collect()
    }

    /// Drop matches scoring below `min_score`. Order is preserved.
    pub fn retain_min_score(&mut self, min_score: f32) {
        self.matches.retain(|m| m.score >= min_score);
    }

    pub fn into_matches(self) -> Vec<QueryMatch> {
        self.matches
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a QueryMatch;
    type IntoIter = std::slice::Iter<'a, QueryMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.iter()
    }
}

/// The vector index.
pub struct VectorIndex {
    dimensions: usize,
    entries: DashMap<String, Arc<IndexEntry>>,
    next_seq: AtomicU64,
    /// Serializes writers so the store and the map agree on the last write.
    write_lock: Mutex<()>,
    store: Option<Arc<dyn IndexStore>>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimensions", &self.dimensions)
            .field("entries", &self.entries.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl VectorIndex {
    /// Create an index that lives only in memory.
    pub fn in_memory(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            store: None,
        }
    }

    /// Create an index backed by a durable store and load its committed
    /// entries.
    ///
    /// A store holds the vectors of exactly one embedding model. Reopening
    /// it with another width or another `model_id` is a configuration
    /// error; a fresh store records both.
    pub fn with_store(
        model_id: &str,
        dimensions: usize,
        store: Arc<dyn IndexStore>,
    ) -> Result<Self, IndexError> {
        match store.dimensions()? {
            Some(stored) if stored != dimensions => {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    actual: stored,
                });
            }
            Some(_) => {}
            None => store.set_dimensions(dimensions)?,
        }
        match store.model_id()? {
            Some(stored) if stored != model_id => {
                return Err(IndexError::ModelMismatch {
                    expected: model_id.to_string(),
                    stored,
                });
            }
            Some(_) => {}
            None => store.set_model_id(model_id)?,
        }

        let mut index = Self::in_memory(dimensions);
        index.store = Some(store);
        let loaded = index.load_all()?;
        info!(entries = loaded, dimensions, model_id, "vector index loaded");
        Ok(index)
    }

    fn load_all(&self) -> Result<usize, IndexError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let entries = store.load_entries()?;
        let mut max_seq = None;
        for entry in entries {
            if entry.vector.len() != self.dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: entry.vector.len(),
                });
            }
            max_seq = max_seq.max(Some(entry.seq));
            self.entries.insert(entry.id.clone(), Arc::new(entry));
        }
        self.next_seq
            .store(max_seq.map_or(0, |s| s + 1), Ordering::SeqCst);
        Ok(self.entries.len())
    }

    /// Width of every vector in this index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Snapshot of a committed entry.
    pub fn get(&self, id: &str) -> Option<IndexEntry> {
        self.entries.get(id).map(|e| e.value().as_ref().clone())
    }

    /// Content hash recorded for `id`, if the entry exists and has one.
    pub fn content_hash(&self, id: &str) -> Option<String> {
        self.entries
            .get(id)
            .and_then(|e| e.value().content_hash.clone())
    }

    /// All identifiers, in insertion order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|e| (e.value().seq, e.key().clone()))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Insert or replace an entry.
    pub fn upsert(&self, id: &str, vector: Vec<f32>, metadata: Metadata) -> Result<(), IndexError> {
        self.upsert_entry(id, vector, metadata, None)
    }

    /// Insert or replace an entry, recording the hash of its source text.
    pub fn upsert_with_hash(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: Metadata,
        content_hash: String,
    ) -> Result<(), IndexError> {
        self.upsert_entry(id, vector, metadata, Some(content_hash))
    }

    fn upsert_entry(
        &self,
        id: &str,
        mut vector: Vec<f32>,
        metadata: Metadata,
        content_hash: Option<String>,
    ) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(IndexError::NonFiniteVector(id.to_string()));
        }
        l2_normalize(&mut vector);

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = match self.entries.get(id) {
            Some(existing) => existing.seq,
            None => self.next_seq.fetch_add(1, Ordering::SeqCst),
        };
        let entry = IndexEntry {
            id: id.to_string(),
            vector,
            metadata,
            content_hash,
            seq,
        };

        if let Some(store) = &self.store {
            store.save_entry(&entry)?;
        }
        self.entries.insert(entry.id.clone(), Arc::new(entry));
        debug!(id, seq, "index entry committed");
        Ok(())
    }

    /// Remove an entry. Removing an unknown identifier is a no-op; the
    /// return value says whether anything was removed.
    pub fn remove(&self, id: &str) -> Result<bool, IndexError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = &self.store {
            store.delete_entry(id)?;
        }
        let removed = self.entries.remove(id).is_some();
        if removed {
            debug!(id, "index entry removed");
        }
        Ok(removed)
    }

    /// The `k` entries most similar to `probe`, best first.
    ///
    /// Equal scores rank by insertion order, earliest first. An empty index
    /// yields an empty result.
    pub fn query(&self, probe: &[f32], k: usize) -> Result<QueryResult, IndexError> {
        if probe.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: probe.len(),
            });
        }
        if probe.iter().any(|x| !x.is_finite()) {
            return Err(IndexError::NonFiniteVector("<probe>".to_string()));
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(QueryResult::empty());
        }

        let mut normalized = probe.to_vec();
        l2_normalize(&mut normalized);

        let mut scored: Vec<(f32, Arc<IndexEntry>)> = self
            .entries
            .iter()
            .map(|e| {
                let entry = Arc::clone(e.value());
                (dot(&normalized, &entry.vector), entry)
            })
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        scored.truncate(k);

        Ok(QueryResult {
            matches: scored
                .into_iter()
                .map(|(score, entry)| QueryMatch {
                    id: entry.id.clone(),
                    score,
                    metadata: entry.metadata.clone(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenStore, SqliteStore};

    const MODEL: &str = "test-model";

    fn meta(path: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("path".to_string(), path.to_string());
        m
    }

    // Vectors chosen so that "travel" and "journey" are close (~0.99) and
    // "democracy" is far from both (~0.3).
    fn populated() -> VectorIndex {
        let index = VectorIndex::in_memory(3);
        index
            .upsert("travel", vec![0.9, 0.3, 0.1], meta("travel"))
            .unwrap();
        index
            .upsert("journey", vec![0.85, 0.35, 0.15], meta("journey"))
            .unwrap();
        index
            .upsert("democracy", vec![0.1, 0.2, 0.95], meta("democracy"))
            .unwrap();
        index
    }

    #[test]
    fn empty_index_returns_empty_result() {
        let index = VectorIndex::in_memory(3);
        let result = index.query(&[1.0, 0.0, 0.0], 3).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn self_similarity_ranks_first() {
        let index = populated();
        let result = index.query(&[0.9, 0.3, 0.1], 1).unwrap();
        assert_eq!(result.len(), 1);
        let top = result.top().unwrap();
        assert_eq!(top.id, "travel");
        assert!((top.score - 1.0).abs() < 1e-5);
        assert_eq!(top.metadata, meta("travel"));
    }

    #[test]
    fn results_are_bounded_by_k_and_ordered() {
        let index = populated();
        for k in 0..5 {
            let result = index.query(&[0.5, 0.5, 0.5], k).unwrap();
            assert!(result.len() <= k);
            assert!(result.len() <= index.len());
            for pair in result.matches().windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
        }
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let index = VectorIndex::in_memory(2);
        index.upsert("second", vec![1.0, 0.0], meta("b")).unwrap();
        index.upsert("first", vec![2.0, 0.0], meta("a")).unwrap();
        index.upsert("third", vec![0.5, 0.0], meta("c")).unwrap();

        let result = index.query(&[1.0, 0.0], 3).unwrap();
        assert_eq!(result.ids(), vec!["second", "first", "third"]);
    }

    #[test]
    fn replacement_keeps_insertion_rank() {
        let index = VectorIndex::in_memory(2);
        index.upsert("a", vec![1.0, 0.0], meta("a")).unwrap();
        index.upsert("b", vec![1.0, 0.0], meta("b")).unwrap();
        // replace "a" with an equal-scoring vector: it must still rank first
        index.upsert("a", vec![3.0, 0.0], meta("a2")).unwrap();

        let result = index.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(result.ids(), vec!["a", "b"]);
        assert_eq!(result.top().unwrap().metadata, meta("a2"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn dimension_mismatch_leaves_index_unchanged() {
        let index = populated();
        let before = index.query(&[0.9, 0.3, 0.1], 3).unwrap();

        let err = index
            .upsert("travel", vec![1.0, 0.0], meta("bad"))
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        assert_eq!(index.len(), 3);
        assert_eq!(index.query(&[0.9, 0.3, 0.1], 3).unwrap(), before);
    }

    #[test]
    fn query_with_wrong_dimension_fails() {
        let index = populated();
        assert!(matches!(
            index.query(&[1.0, 0.0], 1),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn non_finite_vectors_are_rejected() {
        let index = VectorIndex::in_memory(2);
        assert!(matches!(
            index.upsert("nan", vec![f32::NAN, 0.0], meta("nan")),
            Err(IndexError::NonFiniteVector(_))
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn non_finite_probe_is_rejected() {
        let index = populated();
        for probe in [[f32::NAN, 0.0, 0.0], [f32::INFINITY, 1.0, 0.0]] {
            assert!(matches!(
                index.query(&probe, 3),
                Err(IndexError::NonFiniteVector(_))
            ));
        }
    }

    #[test]
    fn large_components_keep_self_similarity() {
        let index = populated();
        index.upsert("big", vec![3e19, 4e19, 0.0], meta("big")).unwrap();

        let stored = index.get("big").unwrap().vector;
        assert!((stored[0] - 0.6).abs() < 1e-6 && (stored[1] - 0.8).abs() < 1e-6);

        let result = index.query(&[3e19, 4e19, 0.0], 1).unwrap();
        let top = result.top().unwrap();
        assert_eq!(top.id, "big");
        assert!((top.score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_scores_zero() {
        let index = populated();
        index.upsert("zero", vec![0.0, 0.0, 0.0], meta("zero")).unwrap();
        let result = index.query(&[0.0, 0.0, 1.0], 4).unwrap();
        let zero = result.iter().find(|m| m.id == "zero").unwrap();
        assert_eq!(zero.score, 0.0);
    }

    #[test]
    fn remove_is_idempotent() {
        let index = populated();
        assert!(index.remove("travel").unwrap());
        assert!(!index.remove("travel").unwrap());
        assert!(!index.remove("never-existed").unwrap());
        assert_eq!(index.len(), 2);
        assert!(!index.contains("travel"));
    }

    #[test]
    fn persistent_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        {
            let store = Arc::new(SqliteStore::open(&path).unwrap());
            let index = VectorIndex::with_store(MODEL, 3, store).unwrap();
            index.upsert("b", vec![1.0, 0.0, 0.0], meta("b")).unwrap();
            index.upsert("a", vec![1.0, 0.0, 0.0], meta("a")).unwrap();
            index.upsert("gone", vec![0.0, 1.0, 0.0], meta("gone")).unwrap();
            index.remove("gone").unwrap();
        }

        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let index = VectorIndex::with_store(MODEL, 3, store).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.ids(), vec!["b", "a"]);

        // tie order survives the restart, and new entries rank after it
        index.upsert("c", vec![1.0, 0.0, 0.0], meta("c")).unwrap();
        let result = index.query(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(result.ids(), vec!["b", "a", "c"]);
    }

    #[test]
    fn reopening_with_other_dimensions_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        {
            let store = Arc::new(SqliteStore::open(&path).unwrap());
            VectorIndex::with_store(MODEL, 3, store).unwrap();
        }
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        assert!(matches!(
            VectorIndex::with_store(MODEL, 4, store),
            Err(IndexError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn reopening_with_other_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        {
            let store = Arc::new(SqliteStore::open(&path).unwrap());
            let index = VectorIndex::with_store(MODEL, 3, store).unwrap();
            index.upsert("a", vec![1.0, 0.0, 0.0], meta("a")).unwrap();
        }
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        match VectorIndex::with_store("other-model", 3, store) {
            Err(IndexError::ModelMismatch { expected, stored }) => {
                assert_eq!(expected, "other-model");
                assert_eq!(stored, MODEL);
            }
            other => panic!("expected a model mismatch, got {:?}", other),
        }
    }

    #[test]
    fn query_result_new_sorts_stably() {
        let m = |id: &str, score: f32| QueryMatch {
            id: id.to_string(),
            score,
            metadata: Metadata::new(),
        };
        let result = QueryResult::new(vec![m("low", 0.1), m("x", 0.5), m("y", 0.5), m("high", 0.9)]);
        assert_eq!(result.ids(), vec!["high", "x", "y", "low"]);

        let mut filtered = result.clone();
        filtered.retain_min_score(0.5);
        assert_eq!(filtered.ids(), vec!["high", "x", "y"]);
    }
}
