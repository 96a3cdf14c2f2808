//! Thought-Chain Engine: writes a Thought the same way
//! `composite_ops::document::DocumentStore::store_document` writes a
//! Document (one transaction spanning all four adapters under
//! `ConsistencyLevel::Strong`), narrowed to a Thought's own fields instead
//! of the generic `Document` envelope, plus a `FOLLOWS` graph edge and a
//! `session:<sid>:head` cache pointer.

use std::collections::HashSet;
use std::sync::Arc;

use common::embedding::EmbeddingProvider;
use common::error::{Backend, CoreError};
use common::types::thought::{Thought, ThoughtType};
use common::types::{validate_identifier, validate_metadata};
use coordinator::{AdapterSet, AtomicCoordinator, ConsistencyLevel, Operation, Transaction};

use crate::safety_guard::{AdmitRequest, SafetyGuard};

const MAX_METADATA_BYTES: usize = 10 * 1024;

/// Outcome of [`ThoughtChainEngine::thought_create`]: `{ulid,
/// databases_affected, timings}`.
#[derive(Debug, Clone)]
pub struct ThoughtCreateOutcome {
    pub ulid: String,
    pub databases_affected: Vec<Backend>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ChainAnalysis {
    pub thoughts: Vec<Thought>,
    pub length: usize,
    /// Set when the walk revisited an already-seen thought id; the chain
    /// returned is truncated at the point of detection. The traversal
    /// keeps a visited-set specifically to guard against this.
    pub has_cycle: bool,
}

pub struct ThoughtChainEngine {
    coordinator: Arc<AtomicCoordinator>,
    adapters: Arc<AdapterSet>,
    embeddings: Arc<dyn EmbeddingProvider>,
    guard: Arc<SafetyGuard>,
    head_ttl_seconds: u64,
}

impl ThoughtChainEngine {
    #[must_use]
    pub fn new(
        coordinator: Arc<AtomicCoordinator>,
        adapters: Arc<AdapterSet>,
        embeddings: Arc<dyn EmbeddingProvider>,
        guard: Arc<SafetyGuard>,
        head_ttl_seconds: u64,
    ) -> Self {
        ThoughtChainEngine {
            coordinator,
            adapters,
            embeddings,
            guard,
            head_ttl_seconds,
        }
    }

    #[must_use]
    pub fn head_key(session_id: &str) -> String {
        format!("session:{session_id}:head")
    }

    /// Writes a new Thought as a composite document under Strong
    /// consistency: transactional row, a search embedding in the vector
    /// store, a `FOLLOWS` edge when `previous_thought_id` is given, and a
    /// refreshed cache head pointer for the session.
    #[tracing::instrument(skip(self, content, metadata), fields(session_id, step_number))]
    #[allow(clippy::too_many_arguments)]
    pub async fn thought_create(
        &self,
        session_id: &str,
        content: &str,
        previous_thought_id: Option<String>,
        thought_type: ThoughtType,
        step_number: u32,
        metadata: serde_json::Value,
    ) -> Result<ThoughtCreateOutcome, CoreError> {
        validate_identifier(session_id)?;
        validate_metadata(&metadata, MAX_METADATA_BYTES)?;
        if content.is_empty() {
            return Err(CoreError::Validation("thought content must not be empty".to_string()));
        }
        if step_number == 0 {
            return Err(CoreError::Validation("step_number must be >= 1".to_string()));
        }

        if step_number > 1 {
            if let Some(prev_id) = &previous_thought_id {
                if self.adapters.transactional.get_thought(prev_id).await?.is_none() {
                    return Err(CoreError::Validation(format!(
                        "previous_thought_id '{prev_id}' does not reference an existing thought"
                    )));
                }
            } else {
                tracing::warn!(session_id, step_number, "chain continuity unverified: no previous_thought_id given");
            }
        }

        let content_hash = Thought::hash_content(content);
        let decision = self
            .guard
            .admit(AdmitRequest {
                session_id: session_id.to_string(),
                parent_thought_id: previous_thought_id.clone(),
                content: content.to_string(),
                content_hash: content_hash.clone(),
                metadata: metadata.clone(),
                estimated_bytes: u64::try_from(content.len()).unwrap_or(u64::MAX),
            })
            .await?;

        let ulid = ulid::Ulid::new().to_string();
        let now = chrono::Utc::now();
        let thought = Thought {
            id: ulid.clone(),
            created_at: now,
            updated_at: now,
            session_id: session_id.to_string(),
            content: content.to_string(),
            content_hash,
            previous_thought_id: previous_thought_id.clone(),
            step_number,
            thought_type,
            metadata,
        };

        let embedding = match self.embeddings.embed(content).await {
            Ok(embedding) => embedding,
            Err(err) => {
                self.guard.end_operation(session_id).await;
                return Err(err);
            }
        };
        let vector_id = match self.adapters.transactional.allocate_next_vector_id().await {
            Ok(id) => id,
            Err(err) => {
                self.guard.end_operation(session_id).await;
                return Err(err);
            }
        };

        let tx = self.build_transaction(&thought, vector_id, embedding);
        let outcome = self.coordinator.execute(tx).await.into_result();
        self.guard.end_operation(session_id).await;
        let outcome = outcome?;

        self.guard.record_commit(session_id, &ulid, decision.depth).await;

        let databases_affected: Vec<Backend> = outcome
            .participants
            .iter()
            .filter(|(_, status)| matches!(status, coordinator::ParticipantStatus::Committed))
            .map(|(backend, _)| *backend)
            .collect();

        Ok(ThoughtCreateOutcome {
            ulid,
            databases_affected,
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn build_transaction(&self, thought: &Thought, vector_id: i64, embedding: Vec<f32>) -> Transaction {
        let thought_id = thought.id.clone();

        // Thoughts are immutable once written and the
        // transactional adapter exposes no `delete_thought`; a Strong
        // failure after this step commits leaves the row in place and
        // surfaces as `PartialFailure` (a reported partial state) rather
        // than being rolled back.
        let transactional_op = {
            let thought = thought.clone();
            let id = thought_id.clone();
            Operation::new(
                Backend::Transactional,
                id,
                Arc::new(move |adapters: &AdapterSet| {
                    let thought = thought.clone();
                    Box::pin(async move { adapters.transactional.store_thought(&thought).await })
                }),
                Operation::noop_compensation(),
            )
        };

        let vector_op = {
            let id = thought_id.clone();
            let metadata = serde_json::json!({
                "kind": "thought",
                "thought_id": thought_id,
                "session_id": thought.session_id,
            });
            Operation::new(
                Backend::Vector,
                id,
                Arc::new(move |adapters: &AdapterSet| {
                    let embedding = embedding.clone();
                    let metadata = metadata.clone();
                    Box::pin(async move { adapters.vector.upsert(vector_id, embedding, metadata).await })
                }),
                Arc::new(move |adapters: &AdapterSet| Box::pin(async move { adapters.vector.remove(vector_id).await })),
            )
        };

        // Edge creation has no corresponding removal in `GraphAdapter`
        // (no `remove_edge`); rollback of this step is a noop, same
        // treatment `DocumentStore::delete_document` gives deletions with
        // nothing meaningful to compensate.
        let graph_op = {
            let id = thought_id.clone();
            let previous_thought_id = thought.previous_thought_id.clone();
            let properties = serde_json::json!({
                "session_id": thought.session_id,
                "step_from": thought.step_number,
                "step_to": thought.step_number.saturating_sub(1),
                "thought_type": thought.thought_type.to_string(),
                "created_at": thought.created_at,
            });
            Operation::new(
                Backend::Graph,
                id.clone(),
                Arc::new(move |adapters: &AdapterSet| {
                    let id = id.clone();
                    let previous_thought_id = previous_thought_id.clone();
                    let properties = properties.clone();
                    Box::pin(async move {
                        match previous_thought_id {
                            Some(prev) => adapters.graph.upsert_edge(&id, &prev, "FOLLOWS", properties).await,
                            None => Ok(()),
                        }
                    })
                }),
                Operation::noop_compensation(),
            )
        };

        let cache_op = {
            let id = thought_id.clone();
            let session_id = thought.session_id.clone();
            let ttl = self.head_ttl_seconds;
            Operation::new(
                Backend::Cache,
                id.clone(),
                Arc::new(move |adapters: &AdapterSet| {
                    let id = id.clone();
                    let key = Self::head_key(&session_id);
                    Box::pin(async move { adapters.cache.set(&key, &id, ttl).await })
                }),
                Operation::noop_compensation(),
            )
        };

        Transaction::new(format!("thought-create-{}", thought.id), ConsistencyLevel::Strong)
            .with_op(transactional_op)
            .with_op(vector_op)
            .with_op(graph_op)
            .with_op(cache_op)
    }

    /// Walks the chain back from the session's head (cache, falling back
    /// to the transactional store's latest thought) via
    /// `previous_thought_id` links, then reverses to chronological order.
    #[tracing::instrument(skip(self))]
    pub async fn thought_analyze_chain(&self, session_id: &str) -> Result<ChainAnalysis, CoreError> {
        validate_identifier(session_id)?;

        let head = match self.adapters.cache.get_value(&Self::head_key(session_id)).await? {
            Some(id) => Some(id),
            None => self
                .adapters
                .transactional
                .get_latest_thought(session_id)
                .await?
                .map(|thought| thought.id),
        };

        let Some(mut current_id) = head else {
            return Ok(ChainAnalysis { thoughts: Vec::new(), length: 0, has_cycle: false });
        };

        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut has_cycle = false;
        loop {
            if !visited.insert(current_id.clone()) {
                has_cycle = true;
                break;
            }
            let Some(thought) = self.adapters.transactional.get_thought(&current_id).await? else {
                break;
            };
            let next = thought.previous_thought_id.clone();
            chain.push(thought);
            match next {
                Some(prev) => current_id = prev,
                None => break,
            }
        }
        chain.reverse();

        Ok(ChainAnalysis {
            length: chain.len(),
            thoughts: chain,
            has_cycle,
        })
    }

    /// Delegates to the shared vector index with a `kind = "thought"`
    /// filter; the index is shared across
    /// chunk, document, and thought embeddings, so matches are filtered
    /// client-side after the nearest-neighbour search the same way
    /// `VectorAdapter::search`'s doc comment already assumes for other
    /// entity kinds.
    #[tracing::instrument(skip(self, query))]
    pub async fn thought_find_similar(
        &self,
        query: &str,
        k: usize,
        session_id: Option<&str>,
    ) -> Result<Vec<Thought>, CoreError> {
        let query_vector = self.embeddings.embed(query).await?;
        // Over-fetch since the index is shared; k*4 leaves headroom for
        // non-thought neighbours to be filtered out before truncating.
        let hits = self.adapters.vector.search(&query_vector, k.saturating_mul(4).max(k), None).await?;

        let mut similar = Vec::with_capacity(k);
        for (_vector_id, _score, metadata) in hits {
            if similar.len() >= k {
                break;
            }
            if metadata.get("kind").and_then(|v| v.as_str()) != Some("thought") {
                continue;
            }
            let Some(thought_id) = metadata.get("thought_id").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(thought) = self.adapters.transactional.get_thought(thought_id).await? else {
                continue;
            };
            if let Some(session_id) = session_id {
                if thought.session_id != session_id {
                    continue;
                }
            }
            if !thought.verify_integrity() {
                tracing::error!(thought_id = %thought.id, "content hash mismatch on read");
                return Err(CoreError::IntegrityFailure(format!("thought '{thought_id}' failed content hash verification")));
            }
            similar.push(thought);
        }
        Ok(similar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::adapters::memory::{InMemoryCacheAdapter, InMemoryGraphAdapter, InMemoryVectorAdapter};
    use common::adapters::transactional::SurrealTransactionalAdapter;
    use common::adapters::{CacheAdapter, GraphAdapter, TransactionalAdapter, VectorAdapter};
    use uuid::Uuid;

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

    async fn test_engine() -> ThoughtChainEngine {
        let database = Uuid::new_v4().to_string();
        let adapters = Arc::new(AdapterSet {
            transactional: Arc::new(
                SurrealTransactionalAdapter::memory("test_ns", &database)
                    .await
                    .expect("transactional adapter"),
            ),
            vector: Arc::new(InMemoryVectorAdapter::new(DIMENSION)) as Arc<dyn VectorAdapter>,
            graph: Arc::new(InMemoryGraphAdapter::new()) as Arc<dyn GraphAdapter>,
            cache: Arc::new(InMemoryCacheAdapter::new()) as Arc<dyn CacheAdapter>,
        });
        let coordinator = Arc::new(AtomicCoordinator::new(adapters.clone()));
        let guard = Arc::new(crate::safety_guard::SafetyGuard::new(&common::config::AppConfig::default()));
        ThoughtChainEngine::new(coordinator, adapters, Arc::new(StubEmbeddingProvider), guard, 300)
    }

    #[tokio::test]
    async fn thought_create_returns_a_ulid_and_commits_all_four_backends() {
        let engine = test_engine().await;
        let outcome = engine
            .thought_create("s1", "first thought", None, ThoughtType::Problem, 1, serde_json::json!({}))
            .await
            .expect("create");
        assert_eq!(outcome.ulid.len(), 26, "ULIDs are 26 characters");
        assert_eq!(outcome.databases_affected.len(), 4);
    }

    #[tokio::test]
    async fn chain_build_and_traverse_returns_chronological_order() {
        let engine = test_engine().await;
        let t1 = engine
            .thought_create("s", "step one", None, ThoughtType::Problem, 1, serde_json::json!({}))
            .await
            .expect("t1");
        let t2 = engine
            .thought_create("s", "step two", Some(t1.ulid.clone()), ThoughtType::Intermediate, 2, serde_json::json!({}))
            .await
            .expect("t2");
        let t3 = engine
            .thought_create("s", "step three", Some(t2.ulid.clone()), ThoughtType::Conclusion, 3, serde_json::json!({}))
            .await
            .expect("t3");

        let analysis = engine.thought_analyze_chain("s").await.expect("analyze");
        assert_eq!(analysis.length, 3);
        assert!(!analysis.has_cycle);
        let ids: Vec<String> = analysis.thoughts.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![t1.ulid, t2.ulid, t3.ulid]);
    }

    #[tokio::test]
    async fn rejects_previous_thought_id_that_does_not_exist() {
        let engine = test_engine().await;
        let err = engine
            .thought_create("s", "orphan step", Some("nonexistent".to_string()), ThoughtType::Intermediate, 2, serde_json::json!({}))
            .await
            .expect_err("should reject");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn safety_guard_blocks_repeated_content_on_the_second_write() {
        let engine = test_engine().await;
        engine
            .thought_create("s1", "same content", None, ThoughtType::Problem, 1, serde_json::json!({}))
            .await
            .expect("first write is fine");
        let err = engine
            .thought_create("s1", "same content", None, ThoughtType::Problem, 1, serde_json::json!({}))
            .await
            .expect_err("second identical write should be blocked as a loop");
        assert!(matches!(err, CoreError::RecursionBlocked(_)));
    }

    #[tokio::test]
    async fn empty_session_chain_analysis_is_empty_not_an_error() {
        let engine = test_engine().await;
        let analysis = engine.thought_analyze_chain("never-used").await.expect("analyze");
        assert_eq!(analysis.length, 0);
        assert!(analysis.thoughts.is_empty());
    }

    #[tokio::test]
    async fn thought_find_similar_filters_to_requested_session() {
        let engine = test_engine().await;
        engine
            .thought_create("s1", "machine learning basics", None, ThoughtType::Problem, 1, serde_json::json!({}))
            .await
            .expect("t1");
        engine
            .thought_create("s2", "machine learning basics", None, ThoughtType::Problem, 1, serde_json::json!({}))
            .await
            .expect("t2");

        let similar = engine
            .thought_find_similar("machine learning basics", 5, Some("s1"))
            .await
            .expect("find similar");
        assert!(similar.iter().all(|t| t.session_id == "s1"));
        assert!(!similar.is_empty());
    }
}
