//! Ingestion Pipeline: chunk → embed → allocate vector ids →
//! batch-insert chunk rows → upsert vectors → optionally cache.

use std::sync::Arc;
use std::time::Instant;

use common::adapters::{BackendAdapter, CacheAdapter, TransactionalAdapter, VectorAdapter};
use common::embedding::EmbeddingProvider;
use common::error::CoreError;
use common::types::chunk::Chunk;
use common::types::resource::{Resource, ResourceType};
use common::types::validate_identifier;
use uuid::Uuid;

use crate::chunking::split_into_chunks;
use crate::config::IngestionConfig;

#[derive(Debug, Clone)]
pub struct IngestResult {
    pub resource_id: String,
    pub chunk_count: usize,
}

/// Holds the three adapters ingestion touches directly (transactional,
/// vector, cache — ingestion never writes the graph store) plus the
/// embedding boundary. No `AtomicCoordinator` dependency: Resource/Chunk
/// persistence follows its own stage order, distinct from the document
/// composer's four-store transaction.
pub struct IngestionPipeline {
    transactional: Arc<dyn TransactionalAdapter>,
    vector: Arc<dyn VectorAdapter>,
    cache: Arc<dyn CacheAdapter>,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: IngestionConfig,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        transactional: Arc<dyn TransactionalAdapter>,
        vector: Arc<dyn VectorAdapter>,
        cache: Arc<dyn CacheAdapter>,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: IngestionConfig,
    ) -> Self {
        IngestionPipeline {
            transactional,
            vector,
            cache,
            embeddings,
            config,
        }
    }

    /// Ingests one Resource: chunks its content, embeds each chunk,
    /// allocates sequential vector ids, persists rows and vectors, and
    /// (best-effort) caches the resource. On any failure after the
    /// transactional batch, the ingest is unwound: chunk rows, the
    /// resource row, and any vectors that reached the index are all
    /// removed.
    #[tracing::instrument(skip(self, content), fields(file_name, resource_type = %resource_type))]
    pub async fn add_resource(
        &self,
        file_name: &str,
        content: &str,
        resource_type: ResourceType,
    ) -> Result<IngestResult, CoreError> {
        validate_identifier_ish(file_name)?;
        let started = Instant::now();

        let resource_id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        let resource = Resource {
            id: resource_id.clone(),
            created_at: now,
            updated_at: now,
            file_name: file_name.to_string(),
            resource_type,
            content: content.to_string(),
        };
        self.transactional.store_resource(&resource).await?;

        let chunk_texts = split_into_chunks(content, &self.config.chunking);
        if chunk_texts.is_empty() {
            tracing::info!(resource_id = %resource_id, chunk_count = 0, "ingested resource with no chunks");
            return Ok(IngestResult {
                resource_id,
                chunk_count: 0,
            });
        }

        match self.persist_chunks(&resource_id, &chunk_texts).await {
            Ok(chunk_count) => {
                if self.config.cache_on_ingest {
                    let payload = serde_json::to_value(&resource)?;
                    if let Err(err) = self
                        .cache
                        .store_with_ttl(&resource_id, payload, self.config.cache_ttl_seconds)
                        .await
                    {
                        // Cache is advisory; a failed cache write
                        // never fails the ingest.
                        tracing::warn!(resource_id = %resource_id, error = %err, "failed to cache ingested resource");
                    }
                }
                tracing::info!(
                    resource_id = %resource_id,
                    chunk_count,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "ingestion pipeline finished"
                );
                Ok(IngestResult { resource_id, chunk_count })
            }
            Err(err) => {
                tracing::warn!(resource_id = %resource_id, error = %err, "ingest failed after resource row written; unwinding");
                self.unwind(&resource_id).await;
                Err(err)
            }
        }
    }

    /// Batch-inserts chunk rows, then embeds and upserts vectors for each.
    /// Returns the number of chunks persisted, or the first error
    /// encountered; the caller unwinds on error.
    async fn persist_chunks(&self, resource_id: &str, chunk_texts: &[String]) -> Result<usize, CoreError> {
        let mut chunks = Vec::with_capacity(chunk_texts.len());
        for text in chunk_texts {
            let vector_id = self.transactional.allocate_next_vector_id().await?;
            chunks.push(Chunk::sequential(Uuid::new_v4().to_string(), resource_id.to_string(), text.clone(), vector_id));
        }

        self.transactional.store_chunks_batch(&chunks).await?;

        let embeddings = self.embeddings.embed_batch(chunk_texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(CoreError::Internal(format!(
                "embedding provider returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut upserted_vector_ids = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(embeddings.into_iter()) {
            let metadata = serde_json::json!({
                "entity_id": resource_id,
                "chunk_id": chunk.id,
                "resource_id": resource_id,
            });
            if let Err(err) = self.vector.upsert(chunk.vector_id, vector, metadata).await {
                for vector_id in &upserted_vector_ids {
                    let _ = self.vector.remove(*vector_id).await;
                }
                return Err(err);
            }
            upserted_vector_ids.push(chunk.vector_id);
        }

        Ok(chunks.len())
    }

    /// Removes everything an aborted ingest may have written: chunk rows,
    /// their vectors, and the resource row, preserving chunk-resource
    /// containment when a later step of the ingest fails.
    async fn unwind(&self, resource_id: &str) {
        match self.transactional.delete_chunks_by_resource(resource_id).await {
            Ok(chunks) => {
                for chunk in chunks {
                    if let Err(err) = self.vector.remove(chunk.vector_id).await {
                        tracing::error!(chunk_id = %chunk.id, error = %err, "failed to remove vector during unwind");
                    }
                }
            }
            Err(err) => tracing::error!(resource_id, error = %err, "failed to delete chunks during unwind"),
        }
        if let Err(err) = self.transactional.delete_resource(resource_id).await {
            tracing::error!(resource_id, error = %err, "failed to delete resource during unwind");
        }
    }

    /// Deletes a Resource and its Chunks (cascade-owned) plus their
    /// vectors and any cache copy.
    pub async fn delete_resource(&self, resource_id: &str) -> Result<(), CoreError> {
        validate_identifier(resource_id)?;
        let chunks = self.transactional.delete_chunks_by_resource(resource_id).await?;
        for chunk in &chunks {
            self.vector.remove(chunk.vector_id).await?;
            self.transactional.delete_context_links_for_chunk(&chunk.id).await?;
        }
        self.cache.delete(resource_id).await?;
        self.transactional.delete_resource(resource_id).await
    }
}

fn validate_identifier_ish(file_name: &str) -> Result<(), CoreError> {
    if file_name.is_empty() || file_name.len() > 1024 {
        return Err(CoreError::Validation(format!(
            "file_name length must be in 1..=1024, got {}",
            file_name.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::adapters::memory::{InMemoryCacheAdapter, InMemoryGraphAdapter, InMemoryVectorAdapter};
    use common::adapters::transactional::SurrealTransactionalAdapter;
    use uuid::Uuid as TestUuid;

    const DIMENSION: usize = 3;

    struct StubEmbeddingProvider;

    #[async_trait]
    impl EmbeddingProvider for StubEmbeddingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
            let mut vector = vec![0.0_f32; DIMENSION];
            for (i, byte) in text.bytes().enumerate() {
                vector[i % DIMENSION] += f32::from(byte);
            }
            Ok(vector)
        }

        fn dimension(&self) -> usize {
            DIMENSION
        }
    }

    struct FailingEmbeddingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbeddingProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, CoreError> {
            Err(CoreError::Internal("embedding backend down".to_string()))
        }

        fn dimension(&self) -> usize {
            DIMENSION
        }
    }

    async fn test_pipeline(embeddings: Arc<dyn EmbeddingProvider>) -> (IngestionPipeline, Arc<dyn TransactionalAdapter>) {
        let database = TestUuid::new_v4().to_string();
        let transactional: Arc<dyn TransactionalAdapter> = Arc::new(
            SurrealTransactionalAdapter::memory("test_ns", &database)
                .await
                .expect("transactional adapter"),
        );
        let vector: Arc<dyn VectorAdapter> = Arc::new(InMemoryVectorAdapter::new(DIMENSION));
        let cache: Arc<dyn CacheAdapter> = Arc::new(InMemoryCacheAdapter::new());
        let _graph: Arc<dyn common::adapters::GraphAdapter> = Arc::new(InMemoryGraphAdapter::new());
        let pipeline = IngestionPipeline::new(transactional.clone(), vector, cache, embeddings, IngestionConfig::default());
        (pipeline, transactional)
    }

    #[tokio::test]
    async fn ingest_two_sentence_resource_yields_two_chunks() {
        let (pipeline, _) = test_pipeline(Arc::new(StubEmbeddingProvider)).await;
        let result = pipeline
            .add_resource(
                "notes.txt",
                "Machine learning is a subset of AI. It trains models on data.",
                ResourceType::Note,
            )
            .await
            .expect("ingest");
        assert_eq!(result.chunk_count, 2);
    }

    #[tokio::test]
    async fn empty_content_yields_zero_chunks_and_success() {
        let (pipeline, _) = test_pipeline(Arc::new(StubEmbeddingProvider)).await;
        let result = pipeline
            .add_resource("empty.txt", "", ResourceType::Note)
            .await
            .expect("ingest");
        assert_eq!(result.chunk_count, 0);
    }

    #[tokio::test]
    async fn sequential_vector_ids_are_strictly_increasing_across_ingests() {
        let (pipeline, transactional) = test_pipeline(Arc::new(StubEmbeddingProvider)).await;
        let mut ids = Vec::new();
        for _ in 0..3 {
            let result = pipeline.add_resource("x.txt", "One sentence only.", ResourceType::Note).await.expect("ingest");
            let chunks = transactional.get_chunks_by_resource(&result.resource_id).await.expect("chunks");
            ids.push(chunks[0].vector_id);
        }
        assert!(ids.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn failed_embedding_unwinds_resource_and_chunks() {
        let (pipeline, transactional) = test_pipeline(Arc::new(FailingEmbeddingProvider)).await;
        let err = pipeline
            .add_resource("doomed.txt", "One sentence only.", ResourceType::Note)
            .await
            .expect_err("should fail");
        assert!(matches!(err, CoreError::Internal(_)));

        // Drive a fresh ingest through the same pipeline: if the failed
        // attempt's resource row were not deleted, nothing here breaks, but
        // if its chunk rows leaked they would still be attached to a
        // now-orphaned resource id with no corresponding Resource row,
        // violating containment. Assert the
        // follow-up ingest is unaffected and starts clean.
        let result = pipeline
            .add_resource("retry.txt", "One sentence only.", ResourceType::Note)
            .await
            .expect("retry should succeed");
        assert_eq!(result.chunk_count, 1);
        let resource = transactional.get_resource(&result.resource_id).await.expect("lookup");
        assert!(resource.is_some());
    }
}
