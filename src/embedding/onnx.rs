//! FastEmbedEmbedder — sentence-transformer embeddings via fastembed (ONNX Runtime)

use super::{check_input, Embedder, EmbeddingError, DEFAULT_MAX_INPUT_CHARS};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;

/// Dimensions produced by all-MiniLM-L6-v2.
const MINILM_DIMENSIONS: usize = 384;

/// Production embedder backed by fastembed.
///
/// Wraps `fastembed::TextEmbedding` in a `Mutex` because its `embed`
/// method requires `&mut self`, while the `Embedder` trait uses `&self`.
pub struct FastEmbedEmbedder {
    model: Mutex<TextEmbedding>,
    model_id: String,
    dimensions: usize,
    max_input_chars: usize,
}

impl FastEmbedEmbedder {
    /// Create a new FastEmbedEmbedder with a specific model.
    pub fn new(
        model: EmbeddingModel,
        model_id: &str,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        let options = InitOptions::new(model).with_show_download_progress(false);
        let embedding = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
        Ok(Self {
            model: Mutex::new(embedding),
            model_id: model_id.to_string(),
            dimensions,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        })
    }

    /// all-MiniLM-L6-v2, 384 dimensions.
    pub fn default_model() -> Result<Self, EmbeddingError> {
        Self::new(
            EmbeddingModel::AllMiniLML6V2,
            "sentence-transformers/all-MiniLM-L6-v2",
            MINILM_DIMENSIONS,
        )
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }
}

impl Embedder for FastEmbedEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            check_input(text, self.max_input_chars)?;
        }
        let mut model = self
            .model
            .lock()
            .map_err(|_| EmbeddingError::ModelError("embedding model lock poisoned".to_string()))?;
        let embeddings = model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::EmptyResult);
        }
        Ok(embeddings)
    }
}
