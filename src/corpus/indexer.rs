//! CorpusIndexer — embeds source artifacts and upserts them into the index
//!
//! Best effort: a file that cannot be read, embedded or stored is recorded
//! in the report and the batch carries on. Idempotent: an artifact whose
//! identifier already holds the same content hash is not re-embedded.

use super::discovery::DiscoveryError;
use crate::artifact::SourceArtifact;
use crate::embedding::{Embedder, EmbeddingError};
use crate::index::{IndexError, VectorIndex};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

const DEFAULT_BATCH_SIZE: usize = 16;

/// Why one artifact failed to ingest.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// A single failed artifact.
#[derive(Debug)]
pub struct IndexFailure {
    pub id: String,
    pub error: IngestError,
}

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IndexReport {
    /// Artifacts embedded and committed in this run
    pub indexed: usize,
    /// Artifacts skipped because their content was already indexed
    pub unchanged: usize,
    pub failed: Vec<IndexFailure>,
}

impl IndexReport {
    pub fn seen(&self) -> usize {
        self.indexed + self.unchanged + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Pending {
    artifact: SourceArtifact,
    hash: String,
}

/// Drives ingestion of a corpus into a `VectorIndex`.
pub struct CorpusIndexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    batch_size: usize,
}

impl CorpusIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Number of artifacts embedded per `embed_batch` call (at least 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Ingest artifacts that are already in memory.
    pub fn index_all<I>(&self, artifacts: I) -> IndexReport
    where
        I: IntoIterator<Item = SourceArtifact>,
    {
        self.index_artifacts(artifacts.into_iter().map(Ok))
    }

    /// Ingest a (possibly lazy, possibly failing) sequence of artifacts.
    pub fn index_artifacts<I>(&self, artifacts: I) -> IndexReport
    where
        I: IntoIterator<Item = Result<SourceArtifact, DiscoveryError>>,
    {
        let mut report = IndexReport::default();
        let mut pending: Vec<Pending> = Vec::with_capacity(self.batch_size);

        for item in artifacts {
            let artifact = match item {
                Ok(artifact) => artifact,
                Err(e) => {
                    let id = e.path().display().to_string();
                    warn!(id = %id, error = %e, "skipping unreadable file");
                    report.failed.push(IndexFailure {
                        id,
                        error: e.into(),
                    });
                    continue;
                }
            };

            let hash = artifact.content_hash();
            if self.index.content_hash(&artifact.id).as_deref() == Some(hash.as_str()) {
                debug!(id = %artifact.id, "unchanged, skipping");
                report.unchanged += 1;
                continue;
            }

            pending.push(Pending { artifact, hash });
            if pending.len() >= self.batch_size {
                self.flush(&mut pending, &mut report);
            }
        }
        self.flush(&mut pending, &mut report);

        info!(
            indexed = report.indexed,
            unchanged = report.unchanged,
            failed = report.failed.len(),
            entries = self.index.len(),
            "corpus ingestion finished"
        );
        report
    }

    fn flush(&self, pending: &mut Vec<Pending>, report: &mut IndexReport) {
        if pending.is_empty() {
            return;
        }
        let batch = std::mem::take(pending);
        let texts: Vec<&str> = batch.iter().map(|p| p.artifact.text.as_str()).collect();

        match self.embedder.embed_batch(&texts) {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (item, vector) in batch.into_iter().zip(vectors) {
                    self.commit(item, vector, report);
                }
            }
            result => {
                // isolate the offending file(s) by embedding one at a time
                if let Err(e) = result {
                    debug!(size = batch.len(), error = %e, "batch embedding failed, retrying per file");
                }
                for item in batch {
                    match self.embedder.embed(&item.artifact.text) {
                        Ok(vector) => self.commit(item, vector, report),
                        Err(e) => {
                            warn!(id = %item.artifact.id, error = %e, "embedding failed");
                            report.failed.push(IndexFailure {
                                id: item.artifact.id,
                                error: e.into(),
                            });
                        }
                    }
                }
            }
        }
    }

    fn commit(&self, item: Pending, vector: Vec<f32>, report: &mut IndexReport) {
        let Pending { artifact, hash } = item;
        match self
            .index
            .upsert_with_hash(&artifact.id, vector, artifact.metadata, hash)
        {
            Ok(()) => report.indexed += 1,
            Err(e) => {
                warn!(id = %artifact.id, error = %e, "index upsert failed");
                report.failed.push(IndexFailure {
                    id: artifact.id,
                    error: e.into(),
                });
            }
        }
    }

    /// Remove every entry whose identifier is not in `keep`. Returns the
    /// removed identifiers.
    pub fn prune(&self, keep: &HashSet<String>) -> Result<Vec<String>, IndexError> {
        let mut removed = Vec::new();
        for id in self.index.ids() {
            if !keep.contains(&id) && self.index.remove(&id)? {
                removed.push(id);
            }
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), "pruned stale index entries");
        }
        Ok(removed)
    }
}
