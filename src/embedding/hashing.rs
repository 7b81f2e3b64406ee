//! Deterministic feature-hashing embedder
//!
//! Splits source text into lowercase identifier/number runs and single
//! punctuation characters, hashes every token and every adjacent token pair
//! into a fixed number of signed buckets (FNV-1a), and L2-normalizes the
//! result. There is no model and no state, so identical text always gives an
//! identical vector and formatting-only changes barely move it.

use super::{check_input, Embedder, EmbeddingError, DEFAULT_MAX_INPUT_CHARS};
use crate::index::vector::l2_normalize;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

/// Feature-hashing embedder over code tokens.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    max_input_chars: usize,
    model_id: String,
}

impl HashingEmbedder {
    /// Create an embedder producing `dimensions`-wide vectors (at least 1).
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            model_id: format!("hashing-fnv1a-{}", dimensions),
        }
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dimensions];

        for token in &tokens {
            self.accumulate(&mut vector, fnv1a(&[token.as_str()]), UNIGRAM_WEIGHT);
        }
        for pair in tokens.windows(2) {
            self.accumulate(
                &mut vector,
                fnv1a(&[pair[0].as_str(), pair[1].as_str()]),
                BIGRAM_WEIGHT,
            );
        }

        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], hash: u64, weight: f32) {
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
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
        texts
            .iter()
            .map(|text| {
                check_input(text, self.max_input_chars)?;
                Ok(self.embed_one(text))
            })
            .collect()
    }
}

/// Lowercased identifier/number runs; every other non-whitespace char is
/// its own token.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            current.extend(ch.to_lowercase());
            continue;
        }
        if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        if !ch.is_whitespace() {
            tokens.push(ch.to_string());
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn fnv1a(parts: &[&str]) -> u64 {
    let mut hash = FNV_OFFSET;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            // unit separator so ("ab","c") and ("a","bc") differ
            hash ^= 0x1f;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        for byte in part.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}
