#![cfg(test)]

use std::sync::Arc;

use async_trait::async_trait;
use common::adapters::memory::{InMemoryCacheAdapter, InMemoryGraphAdapter, InMemoryVectorAdapter};
use common::adapters::transactional::SurrealTransactionalAdapter;
use common::embedding::EmbeddingProvider;
use common::error::CoreError;
use coordinator::{AdapterSet, AtomicCoordinator};
use uuid::Uuid;

pub const DIMENSION: usize = 3;

/// Deterministic stand-in for a real embedding model: hashes the input
/// into a fixed-dimension vector so identical text always embeds
/// identically, without pulling in a model backend.
pub struct StubEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let mut vector = vec![0.0_f32; DIMENSION];
        for (i, byte) in text.bytes().enumerate() {
            let slot = i % DIMENSION;
            vector[slot] += f32::from(byte);
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        } else {
            vector[0] = 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }
}

pub async fn test_adapters() -> Arc<AdapterSet> {
    let database = Uuid::new_v4().to_string();
    Arc::new(AdapterSet {
        transactional: Arc::new(
            SurrealTransactionalAdapter::memory("test_ns", &database)
                .await
                .expect("transactional adapter"),
        ),
        vector: Arc::new(InMemoryVectorAdapter::new(DIMENSION)),
        graph: Arc::new(InMemoryGraphAdapter::new()),
        cache: Arc::new(InMemoryCacheAdapter::new()),
    })
}

pub fn test_coordinator(adapters: Arc<AdapterSet>) -> Arc<AtomicCoordinator> {
    Arc::new(AtomicCoordinator::new(adapters))
}
