//! Reference corpus: acquisition, discovery and ingestion into the index
//!
//! - `fetch`: shallow-clones configured repositories into the data directory
//! - `discovery`: lazily walks the data directory for source files
//! - `indexer`: embeds discovered artifacts and upserts them, best effort

pub mod discovery;
pub mod fetch;
mod indexer;

pub use discovery::{CorpusSource, DiscoveryError, DEFAULT_EXTENSIONS};
pub use fetch::{fetch_repositories, fetch_repository, repo_name, FetchError, FetchOutcome};
pub use indexer::{CorpusIndexer, IndexFailure, IndexReport, IngestError};
