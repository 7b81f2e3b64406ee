//! codematch: embedding-based source plagiarism detection
//!
//! Reference repositories are split into source artifacts, embedded into
//! fixed-width vectors and kept in a durable vector index. A submitted
//! snippet is embedded the same way; its nearest corpus entries are handed
//! to a language-model oracle that gives the final yes/no verdict.
//!
//! # Core Concepts
//!
//! - **Embedder**: deterministic text → vector function
//! - **VectorIndex**: `(id, vector, metadata)` entries with cosine k-NN queries
//! - **CorpusIndexer**: idempotent, best-effort ingestion of a corpus
//! - **Retriever** / **Verifier**: the two stages of a check
//! - **PlagiarismPipeline**: composes both; one `handle` call per request
//!
//! # Example
//!
//! ```
//! use codematch::{Embedder, HashingEmbedder, Metadata, VectorIndex};
//!
//! let embedder = HashingEmbedder::new(64);
//! let index = VectorIndex::in_memory(64);
//! let vector = embedder.embed("def add(a, b): return a + b").unwrap();
//! index.upsert("repoA/math.py", vector.clone(), Metadata::new()).unwrap();
//!
//! let result = index.query(&vector, 1).unwrap();
//! assert_eq!(result.top().unwrap().id, "repoA/math.py");
//! ```

pub mod artifact;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod evaluation;
pub mod index;
pub mod oracle;
pub mod pipeline;
pub mod retrieval;
pub mod server;
pub mod storage;

pub use artifact::{content_hash, meta_keys, Metadata, SourceArtifact};
pub use config::{Config, ConfigError, EmbeddingBackend};
pub use corpus::{CorpusIndexer, CorpusSource, DiscoveryError, IndexReport};
pub use embedding::{build_embedder, Embedder, EmbeddingError, HashingEmbedder};
#[cfg(feature = "embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use index::{IndexEntry, IndexError, QueryMatch, QueryResult, VectorIndex};
pub use oracle::{OpenAiOracle, Oracle, OracleError, ScriptedOracle, Verdict, Verifier};
pub use pipeline::{
    CheckOutcome, CheckRequest, CheckResponse, ErrorKind, PipelineError, PlagiarismPipeline,
    VerdictRecord,
};
pub use retrieval::{Retrieval, RetrievalError, Retriever};
pub use storage::{IndexStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
