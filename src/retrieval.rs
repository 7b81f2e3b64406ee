//! Retrieval stage — embeds a snippet and fetches its nearest corpus entries

use crate::embedding::{check_input, Embedder, EmbeddingError};
use crate::index::{IndexError, QueryResult, VectorIndex};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Outcome of a retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// Nothing in the index qualified; verification is skipped.
    NoMatch,
    /// Ranked, non-empty candidates.
    Candidates(QueryResult),
}

impl Retrieval {
    pub fn is_no_match(&self) -> bool {
        matches!(self, Retrieval::NoMatch)
    }
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    min_similarity: Option<f32>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            min_similarity: None,
        }
    }

    /// Drop candidates scoring below `threshold`.
    pub fn with_min_similarity(mut self, threshold: Option<f32>) -> Self {
        self.min_similarity = threshold;
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Longest snippet, in chars, the embedder accepts.
    pub fn max_input_chars(&self) -> usize {
        self.embedder.max_input_chars()
    }

    /// Embed `snippet` and return its top `k` matches.
    ///
    /// Blank or oversized snippets and `k == 0` are the caller's fault and
    /// fail with `InvalidInput` before any embedding work. Inference runs on
    /// the blocking pool; the in-memory query runs inline.
    pub async fn retrieve(&self, snippet: &str, k: usize) -> Result<Retrieval, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::InvalidInput("k must be at least 1".to_string()));
        }
        check_input(snippet, self.embedder.max_input_chars()).map_err(|e| match e {
            EmbeddingError::EmptyInput => {
                RetrievalError::InvalidInput("code snippet is empty".to_string())
            }
            EmbeddingError::InputTooLong { len, max } => RetrievalError::InvalidInput(format!(
                "code snippet has {} chars, limit is {}",
                len, max
            )),
            other => RetrievalError::Embedding(other),
        })?;

        let embedder = self.embedder.clone();
        let text = snippet.to_string();
        let probe = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| EmbeddingError::ModelError(format!("embedding task failed: {}", e)))??;

        let mut result = self.index.query(&probe, k)?;
        if let Some(threshold) = self.min_similarity {
            result.retain_min_score(threshold);
        }
        debug!(k, candidates = result.len(), "retrieval complete");

        if result.is_empty() {
            Ok(Retrieval::NoMatch)
        } else {
            Ok(Retrieval::Candidates(result))
        }
    }
}
