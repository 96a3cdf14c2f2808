//! Embedding boundary. Model invocation is explicitly out of scope; this
//! crate only defines the trait object every pipeline holds, so no
//! concrete model backend needs to live in this workspace.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::error::CoreError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError>;

    /// Batch form; order of the result must match `texts`. Default
    /// implementation embeds sequentially, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

/// Deterministic, dependency-free stand-in for a real model backend.
/// Tokenizes on non-alphanumeric boundaries, hashes each token into a
/// bucket, and L2-normalizes the bucket-count vector — the only
/// `EmbeddingProvider` impl this workspace ships, since invoking a real
/// embedding model is out of scope here.
pub struct HashedEmbeddingProvider {
    dimension: usize,
}

impl HashedEmbeddingProvider {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        HashedEmbeddingProvider {
            dimension: dimension.max(1),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        Ok(hashed_embedding(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0_f32; dimension];
    let mut token_count = 0.0_f32;
    for token in tokenize(text) {
        token_count += 1.0;
        vector[bucket(&token, dimension)] += 1.0;
    }
    if token_count == 0.0 {
        return vector;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_lowercase)
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn is_deterministic_for_identical_input() {
        let provider = HashedEmbeddingProvider::new(16);
        let a = provider.embed("same text here").await.expect("embed");
        let b = provider.embed("same text here").await.expect("embed");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn empty_text_yields_zero_vector() {
        let provider = HashedEmbeddingProvider::new(8);
        let vector = provider.embed("").await.expect("embed");
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn non_empty_text_is_unit_normalized() {
        let provider = HashedEmbeddingProvider::new(8);
        let vector = provider.embed("hello world").await.expect("embed");
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
