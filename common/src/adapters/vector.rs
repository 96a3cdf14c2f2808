//! Vector adapter: dense-embedding nearest-neighbour search, backed by a
//! SurrealDB HNSW index in its own namespace/database so it is an
//! independently-failable participant for the coordinator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::{connect, Any};
use surrealdb::Surreal;

use crate::error::{Backend, CoreError};

use super::{BackendAdapter, VectorAdapter};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingRow {
    vector_id: i64,
    embedding: Vec<f32>,
    metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScoredRow {
    vector_id: i64,
    score: f32,
    metadata: serde_json::Value,
}

#[derive(Clone)]
pub struct SurrealVectorAdapter {
    client: Surreal<Any>,
    dimension: usize,
}

impl SurrealVectorAdapter {
    pub async fn connect(address: &str, namespace: &str, database: &str, dimension: usize) -> Result<Self, CoreError> {
        let client = connect(address).await?;
        client.use_ns(namespace).use_db(database).await?;
        let adapter = SurrealVectorAdapter { client, dimension };
        adapter.ensure_index().await?;
        Ok(adapter)
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub async fn memory(namespace: &str, database: &str, dimension: usize) -> Result<Self, CoreError> {
        let client = connect("mem://").await?;
        client.use_ns(namespace).use_db(database).await?;
        let adapter = SurrealVectorAdapter { client, dimension };
        adapter.ensure_index().await?;
        Ok(adapter)
    }

    async fn ensure_index(&self) -> Result<(), CoreError> {
        let stmt = format!(
            "DEFINE INDEX IF NOT EXISTS idx_embedding_hnsw ON embeddings FIELDS embedding HNSW DIMENSION {} DIST COSINE",
            self.dimension
        );
        self.client.query(stmt).await?;
        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), CoreError> {
        if vector.len() != self.dimension {
            return Err(CoreError::Validation(format!(
                "expected a {}-dimensional vector, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendAdapter for SurrealVectorAdapter {
    fn backend(&self) -> Backend {
        Backend::Vector
    }

    async fn store(&self, entity_id: &str, payload: serde_json::Value) -> Result<(), CoreError> {
        self.client
            .query("UPSERT documents SET id = $id, payload = $payload")
            .bind(("id", entity_id.to_string()))
            .bind(("payload", payload))
            .await?;
        Ok(())
    }

    async fn delete(&self, entity_id: &str) -> Result<(), CoreError> {
        let _: Option<serde_json::Value> = self.client.delete(("documents", entity_id)).await?;
        Ok(())
    }

    async fn retrieve(&self, entity_id: &str) -> Result<Option<serde_json::Value>, CoreError> {
        let value: Option<serde_json::Value> = self.client.select(("documents", entity_id)).await?;
        Ok(value)
    }

    async fn is_available(&self) -> bool {
        self.client.query("RETURN 1").await.is_ok()
    }
}

#[async_trait]
impl VectorAdapter for SurrealVectorAdapter {
    async fn upsert(
        &self,
        vector_id: i64,
        vector: Vec<f32>,
        metadata: serde_json::Value,
    ) -> Result<(), CoreError> {
        self.check_dimension(&vector)?;
        let row = EmbeddingRow {
            vector_id,
            embedding: vector,
            metadata,
        };
        let _: Option<EmbeddingRow> = self
            .client
            .upsert(("embeddings", vector_id.to_string()))
            .content(row)
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&serde_json::Value>,
    ) -> Result<Vec<(i64, f32, serde_json::Value)>, CoreError> {
        self.check_dimension(query_vector)?;
        let _ = filter; // filtering-by-metadata is applied by the caller after hydration
        let mut response = self
            .client
            .query(
                "SELECT vector_id, metadata, vector::similarity::cosine(embedding, $query) AS score
                 FROM embeddings
                 WHERE embedding <|$k,100|> $query
                 ORDER BY score DESC",
            )
            .bind(("query", query_vector.to_vec()))
            .bind(("k", k as i64))
            .await?;
        let rows: Vec<ScoredRow> = response.take(0)?;
        Ok(rows.into_iter().map(|r| (r.vector_id, r.score, r.metadata)).collect())
    }

    async fn remove(&self, vector_id: i64) -> Result<(), CoreError> {
        let _: Option<EmbeddingRow> = self.client.delete(("embeddings", vector_id.to_string())).await?;
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn memory_adapter(dimension: usize) -> SurrealVectorAdapter {
        let database = Uuid::new_v4().to_string();
        SurrealVectorAdapter::memory("test_ns", &database, dimension)
            .await
            .expect("failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn rejects_mismatched_dimension() {
        let adapter = memory_adapter(4).await;
        let err = adapter
            .upsert(1, vec![0.1, 0.2], serde_json::json!({}))
            .await
            .expect_err("should reject");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn upsert_then_search_finds_the_vector() {
        let adapter = memory_adapter(3).await;
        adapter
            .upsert(1, vec![1.0, 0.0, 0.0], serde_json::json!({}))
            .await
            .expect("upsert");
        let results = adapter
            .search(&[1.0, 0.0, 0.0], 1, None)
            .await
            .expect("search");
        assert_eq!(results.first().map(|(id, ..)| *id), Some(1));
    }
}
