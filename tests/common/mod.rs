//! Common test utilities for codematch integration tests
//!
//! Builds small in-memory or on-disk corpora and pipelines wired to the
//! deterministic hashing embedder and a scripted oracle.

#![allow(dead_code)]

use codematch::{
    meta_keys, Embedder, HashingEmbedder, Metadata, PlagiarismPipeline, Retriever,
    ScriptedOracle, VectorIndex, Verifier,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DIMENSIONS: usize = 256;

pub const ADD_SNIPPET: &str = "def add(a, b): return a + b";
pub const MULTIPLY_SNIPPET: &str = "def multiply(a, b): return a * b";

/// Reference files unrelated to the two scenario snippets.
pub const UNRELATED_SOURCES: &[(&str, &str)] = &[
    (
        "repoB/io.py",
        "with open('data.txt') as fh:\n    for line in fh:\n        print(line.strip())\n",
    ),
    (
        "repoC/Server.java",
        "public class Server { void listen(int port) { socket.bind(port); } }",
    ),
    (
        "repoD/style.css",
        "body { margin: 0; font-family: sans-serif; }",
    ),
];

pub fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::new(DIMENSIONS))
}

pub fn metadata_for(id: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(meta_keys::PATH.to_string(), id.to_string());
    if let Some((repo, _)) = id.split_once('/') {
        metadata.insert(meta_keys::REPOSITORY.to_string(), repo.to_string());
    }
    metadata
}

/// In-memory index holding the given `(id, source)` pairs.
pub fn index_with(embedder: &Arc<dyn Embedder>, sources: &[(&str, &str)]) -> Arc<VectorIndex> {
    let index = Arc::new(VectorIndex::in_memory(DIMENSIONS));
    for (id, text) in sources {
        let vector = embedder.embed(text).expect("fixture embeds");
        index.upsert(id, vector, metadata_for(id)).expect("fixture upserts");
    }
    index
}

pub fn pipeline(
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    oracle: Arc<ScriptedOracle>,
    timeout: Duration,
) -> PlagiarismPipeline {
    PlagiarismPipeline::new(Retriever::new(embedder, index), Verifier::new(oracle, timeout))
}

/// Write `(relative path, contents)` pairs under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        std::fs::write(&path, contents).expect("write fixture file");
    }
}
