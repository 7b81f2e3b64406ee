//! Embedding backends
//!
//! An `Embedder` maps source text to a vector of a fixed dimension. The
//! same text always yields the same vector for a given model, so an index
//! built with one embedder must be queried with the same embedder.
//!
//! Two backends:
//! - `HashingEmbedder`: deterministic feature hashing, no model download (default)
//! - `FastEmbedEmbedder`: ONNX sentence-transformer, behind the `embeddings` feature

mod hashing;
#[cfg(feature = "embeddings")]
mod onnx;

pub use hashing::HashingEmbedder;
#[cfg(feature = "embeddings")]
pub use onnx::FastEmbedEmbedder;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use std::sync::Arc;
use thiserror::Error;

/// Vector width of all-MiniLM-L6-v2, also the hashing embedder's default.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Longest input (in chars) accepted unless a backend says otherwise.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 100_000;

/// Error type for embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Empty or whitespace-only text
    #[error("cannot embed empty text")]
    EmptyInput,
    /// Text longer than the backend accepts
    #[error("input of {len} chars exceeds the {max} char limit")]
    InputTooLong { len: usize, max: usize },
    /// The embedding model returned no results
    #[error("embedding returned no results")]
    EmptyResult,
    /// Model loading or inference failed
    #[error("embedding model error: {0}")]
    ModelError(String),
}

/// Trait for embedding text into vectors.
///
/// Implementations handle model loading and inference. Every vector an
/// embedder produces has exactly `dimensions()` components.
pub trait Embedder: Send + Sync {
    /// Identifies the model (and its version) that produced a vector.
    fn model_id(&self) -> &str;

    /// Width of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Longest accepted input, in chars.
    fn max_input_chars(&self) -> usize {
        DEFAULT_MAX_INPUT_CHARS
    }

    /// Embed a batch of texts, returning one vector per text.
    ///
    /// Fails as a whole if any text is rejected.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        check_input(text, self.max_input_chars())?;
        let mut vectors = self.embed_batch(&[text])?;
        vectors.pop().ok_or(EmbeddingError::EmptyResult)
    }
}

/// Reject empty and oversized inputs.
pub fn check_input(text: &str, max_chars: usize) -> Result<(), EmbeddingError> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::EmptyInput);
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(EmbeddingError::InputTooLong {
            len,
            max: max_chars,
        });
    }
    Ok(())
}

/// Construct the embedder selected by configuration.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.backend {
        EmbeddingBackend::Hashing => Ok(Arc::new(
            HashingEmbedder::new(config.dimensions).with_max_input_chars(config.max_input_chars),
        )),
        #[cfg(feature = "embeddings")]
        EmbeddingBackend::Fastembed => {
            let embedder =
                FastEmbedEmbedder::default_model()?.with_max_input_chars(config.max_input_chars);
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "embeddings"))]
        EmbeddingBackend::Fastembed => Err(EmbeddingError::ModelError(
            "fastembed backend requires building with the `embeddings` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_input_rejects_blank_text() {
        assert!(matches!(check_input("", 10), Err(EmbeddingError::EmptyInput)));
        assert!(matches!(
            check_input("  \n\t ", 10),
            Err(EmbeddingError::EmptyInput)
        ));
    }

    #[test]
    fn check_input_counts_chars_not_bytes() {
        assert!(check_input("ééééé", 5).is_ok());
        assert!(matches!(
            check_input("éééééé", 5),
            Err(EmbeddingError::InputTooLong { len: 6, max: 5 })
        ));
    }

    #[test]
    fn build_embedder_honours_configured_dimensions() {
        let config = EmbeddingConfig {
            dimensions: 64,
            ..EmbeddingConfig::default()
        };
        let embedder = build_embedder(&config).expect("hashing backend always builds");
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.embed("fn main() {}").unwrap().len(), 64);
    }

    #[cfg(not(feature = "embeddings"))]
    #[test]
    fn fastembed_backend_without_feature_is_a_model_error() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Fastembed,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            build_embedder(&config),
            Err(EmbeddingError::ModelError(_))
        ));
    }
}
