use std::sync::Arc;

use common::adapters::{BackendAdapter, CacheAdapter, GraphAdapter, TransactionalAdapter, VectorAdapter};
use common::embedding::EmbeddingProvider;
use common::error::{Backend, CoreError};
use common::types::document::Document;
use common::types::{validate_identifier, validate_metadata};
use coordinator::{
    AdapterSet, AtomicCoordinator, ConsistencyLevel, Operation, Transaction, TransactionOutcome,
};

/// One typed edge to create alongside a document, via
/// `store_document`'s `relationships?` parameter.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub target_id: String,
    pub edge_type: String,
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub document: Document,
    pub related: Vec<common::adapters::GraphPath>,
}

/// Document-shaped composer. Holds the coordinator and the four live
/// adapters, plus the embedding boundary needed to turn a document's
/// content into a vector at store time.
pub struct DocumentStore {
    coordinator: Arc<AtomicCoordinator>,
    adapters: Arc<AdapterSet>,
    embeddings: Arc<dyn EmbeddingProvider>,
    max_metadata_bytes: usize,
}

impl DocumentStore {
    #[must_use]
    pub fn new(
        coordinator: Arc<AtomicCoordinator>,
        adapters: Arc<AdapterSet>,
        embeddings: Arc<dyn EmbeddingProvider>,
        max_metadata_bytes: usize,
    ) -> Self {
        DocumentStore {
            coordinator,
            adapters,
            embeddings,
            max_metadata_bytes,
        }
    }

    #[must_use]
    pub fn adapters(&self) -> &Arc<AdapterSet> {
        &self.adapters
    }

    #[must_use]
    pub fn embeddings(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embeddings
    }

    /// Assembles and executes a Strong transaction writing the
    /// transactional row, the embedding vector, the graph node plus any
    /// relationships, and the TTL cache copy.
    pub async fn store_document(
        &self,
        id: &str,
        content: impl Into<String>,
        tags: Vec<String>,
        metadata: serde_json::Value,
        relationships: Vec<Relationship>,
        cache_ttl_seconds: u64,
    ) -> Result<TransactionOutcome, CoreError> {
        validate_identifier(id)?;
        validate_metadata(&metadata, self.max_metadata_bytes)?;

        let content = content.into();
        let embedding = self.embeddings.embed(&content).await?;
        let vector_id = self.adapters.transactional.allocate_next_vector_id().await?;
        let document = Document::new(content, tags, metadata, cache_ttl_seconds);
        let payload = serde_json::to_value(&document)?;

        let id = id.to_string();
        let transactional_op = {
            let id = id.clone();
            let payload = payload.clone();
            Operation::new(
                Backend::Transactional,
                id.clone(),
                Arc::new(move |adapters: &AdapterSet| {
                    let id = id.clone();
                    let payload = payload.clone();
                    Box::pin(async move { adapters.transactional.store(&id, payload).await })
                }),
                {
                    let id = id.clone();
                    Arc::new(move |adapters: &AdapterSet| {
                        let id = id.clone();
                        Box::pin(async move { adapters.transactional.delete(&id).await })
                    })
                },
            )
        };

        let vector_op = {
            let id = id.clone();
            let payload = payload.clone();
            let embedding = embedding.clone();
            Operation::new(
                Backend::Vector,
                id.clone(),
                Arc::new(move |adapters: &AdapterSet| {
                    let id = id.clone();
                    let payload = payload.clone();
                    let embedding = embedding.clone();
                    Box::pin(async move {
                        adapters.vector.store(&id, payload).await?;
                        adapters
                            .vector
                            .upsert(vector_id, embedding, serde_json::json!({ "entity_id": id }))
                            .await
                    })
                }),
                {
                    let id = id.clone();
                    Arc::new(move |adapters: &AdapterSet| {
                        let id = id.clone();
                        Box::pin(async move {
                            adapters.vector.delete(&id).await?;
                            adapters.vector.remove(vector_id).await
                        })
                    })
                },
            )
        };

        let graph_op = {
            let id = id.clone();
            let payload = payload.clone();
            let relationships = relationships.clone();
            Operation::new(
                Backend::Graph,
                id.clone(),
                Arc::new(move |adapters: &AdapterSet| {
                    let id = id.clone();
                    let payload = payload.clone();
                    let relationships = relationships.clone();
                    Box::pin(async move {
                        adapters.graph.upsert_node(&id, &[], payload).await?;
                        for relationship in &relationships {
                            adapters
                                .graph
                                .upsert_edge(&id, &relationship.target_id, &relationship.edge_type, relationship.properties.clone())
                                .await?;
                        }
                        Ok(())
                    })
                }),
                {
                    let id = id.clone();
                    Arc::new(move |adapters: &AdapterSet| {
                        let id = id.clone();
                        Box::pin(async move { adapters.graph.delete(&id).await })
                    })
                },
            )
        };

        let cache_op = {
            let id = id.clone();
            let payload = payload.clone();
            Operation::new(
                Backend::Cache,
                id.clone(),
                Arc::new(move |adapters: &AdapterSet| {
                    let id = id.clone();
                    let payload = payload.clone();
                    Box::pin(async move { adapters.cache.store_with_ttl(&id, payload, cache_ttl_seconds).await })
                }),
                {
                    let id = id.clone();
                    Arc::new(move |adapters: &AdapterSet| {
                        let id = id.clone();
                        Box::pin(async move { adapters.cache.delete(&id).await })
                    })
                },
            )
        };

        let tx = Transaction::new(format!("store-document-{id}"), ConsistencyLevel::Strong)
            .with_op(transactional_op)
            .with_op(vector_op)
            .with_op(graph_op)
            .with_op(cache_op);

        self.coordinator.execute(tx).await.into_result()
    }

    /// Reads cache first (if allowed), falls back to the transactional
    /// store, re-caching under the stored TTL on a miss. The cache is
    /// advisory: losing an entry never changes the result, only the cost.
    pub async fn retrieve_document(
        &self,
        id: &str,
        use_cache: bool,
        include_relationships: bool,
    ) -> Result<Option<RetrievedDocument>, CoreError> {
        validate_identifier(id)?;

        let payload = if use_cache {
            match self.adapters.cache.retrieve(id).await? {
                Some(payload) => Some(payload),
                None => self.refresh_cache_from_transactional(id).await?,
            }
        } else {
            self.adapters.transactional.retrieve(id).await?
        };

        let Some(payload) = payload else {
            return Ok(None);
        };
        let document: Document = serde_json::from_value(payload)?;

        let related = if include_relationships {
            self.adapters
                .graph
                .traverse(id, None, common::adapters::Direction::Out, 1)
                .await?
        } else {
            Vec::new()
        };

        Ok(Some(RetrievedDocument { document, related }))
    }

    async fn refresh_cache_from_transactional(&self, id: &str) -> Result<Option<serde_json::Value>, CoreError> {
        let Some(payload) = self.adapters.transactional.retrieve(id).await? else {
            return Ok(None);
        };
        let document: Document = serde_json::from_value(payload.clone())?;
        self.adapters.cache.store_with_ttl(id, payload.clone(), document.cache_ttl_seconds).await?;
        Ok(Some(payload))
    }

    /// Strong transaction deleting in reverse commit order (cache → graph
    /// → vector → transactional, ).
    pub async fn delete_document(&self, id: &str) -> Result<TransactionOutcome, CoreError> {
        validate_identifier(id)?;
        let id = id.to_string();

        let noop_forward: Arc<
            dyn for<'a> Fn(&'a AdapterSet) -> coordinator::transaction::BoxFuture<'a, Result<(), CoreError>>
                + Send
                + Sync,
        > = Arc::new(|_: &AdapterSet| Box::pin(async { Ok(()) }));

        let transactional_op = {
            let id = id.clone();
            Operation::new(
                Backend::Transactional,
                id.clone(),
                Arc::new(move |adapters: &AdapterSet| {
                    let id = id.clone();
                    Box::pin(async move { adapters.transactional.delete(&id).await })
                }),
                noop_forward.clone(),
            )
        };
        let vector_op = {
            let id = id.clone();
            Operation::new(
                Backend::Vector,
                id.clone(),
                Arc::new(move |adapters: &AdapterSet| {
                    let id = id.clone();
                    Box::pin(async move { adapters.vector.delete(&id).await })
                }),
                noop_forward.clone(),
            )
        };
        let graph_op = {
            let id = id.clone();
            Operation::new(
                Backend::Graph,
                id.clone(),
                Arc::new(move |adapters: &AdapterSet| {
                    let id = id.clone();
                    Box::pin(async move { adapters.graph.delete(&id).await })
                }),
                noop_forward.clone(),
            )
        };
        let cache_op = {
            let id = id.clone();
            Operation::new(
                Backend::Cache,
                id.clone(),
                Arc::new(move |adapters: &AdapterSet| {
                    let id = id.clone();
                    Box::pin(async move { adapters.cache.delete(&id).await })
                }),
                noop_forward,
            )
        };

        // Deletion has nothing meaningful to compensate with (reverse
        // order is about blast-radius, not undoability); a failed Strong
        // delete surfaces as PartialFailure and consistency reconciliation
        // cleans up the rest.
        let tx = Transaction::new(format!("delete-document-{id}"), ConsistencyLevel::Strong)
            .with_op(transactional_op)
            .with_op(vector_op)
            .with_op(graph_op)
            .with_op(cache_op)
            .reversed();

        self.coordinator.execute(tx).await.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_adapters, test_coordinator, StubEmbeddingProvider};

    async fn test_store() -> DocumentStore {
        let adapters = test_adapters().await;
        let coordinator = test_coordinator(adapters.clone());
        DocumentStore::new(coordinator, adapters, Arc::new(StubEmbeddingProvider), 10 * 1024)
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trips_content() {
        let store = test_store().await;
        store
            .store_document(
                "doc1",
                "hello world",
                vec!["note".to_string()],
                serde_json::json!({"author": "a"}),
                Vec::new(),
                60,
            )
            .await
            .expect("store");

        let retrieved = store
            .retrieve_document("doc1", true, false)
            .await
            .expect("retrieve")
            .expect("present");
        assert_eq!(retrieved.document.content, "hello world");
    }

    #[tokio::test]
    async fn delete_then_retrieve_reports_absent() {
        let store = test_store().await;
        store
            .store_document("doc2", "x", vec![], serde_json::json!({}), Vec::new(), 60)
            .await
            .expect("store");
        store.delete_document("doc2").await.expect("delete");
        let retrieved = store.retrieve_document("doc2", true, false).await.expect("retrieve");
        assert!(retrieved.is_none());
    }

    #[tokio::test]
    async fn cache_miss_is_transparently_repopulated() {
        let store = test_store().await;
        store
            .store_document("doc3", "cached content", vec![], serde_json::json!({}), Vec::new(), 60)
            .await
            .expect("store");
        store.adapters().cache.delete("doc3").await.expect("evict cache");

        let retrieved = store
            .retrieve_document("doc3", true, false)
            .await
            .expect("retrieve")
            .expect("present");
        assert_eq!(retrieved.document.content, "cached content");
    }

    #[tokio::test]
    async fn rejects_oversized_metadata() {
        let store = test_store().await;
        let oversized = serde_json::json!({"blob": "x".repeat(20 * 1024)});
        let err = store
            .store_document("doc4", "x", vec![], oversized, Vec::new(), 60)
            .await
            .expect_err("should reject");
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
