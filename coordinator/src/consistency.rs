//! Consistency Manager. Detects divergence between the
//! four backends for a document entity id and repairs it by replaying a
//! Strong transaction through the coordinator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use common::error::{Backend, CoreError};

use crate::coordinator::AtomicCoordinator;
use crate::transaction::{AdapterSet, ConsistencyLevel, Operation, Transaction};

/// `(content_hash, updated_at_unix_seconds)` pair for one entity. Two
/// backends agree on an entity iff their content hashes match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataVersion {
    pub content_hash: String,
    pub updated_at_unix_seconds: i64,
}

impl DataVersion {
    #[must_use]
    pub fn of(payload: &serde_json::Value, updated_at_unix_seconds: i64) -> Self {
        let canonical = payload.to_string();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        DataVersion {
            content_hash: format!("{:x}", hasher.finalize()),
            updated_at_unix_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    /// Present and matches the transactional store's content hash.
    InSync,
    /// Present but content hash differs.
    Diverged,
    /// Absent where the transactional store has the entity (or vice
    /// versa).
    Missing,
}

#[derive(Debug, Clone)]
pub struct ConsistencyReport {
    pub entity_id: String,
    pub statuses: HashMap<Backend, BackendStatus>,
    pub conflicts: Vec<Backend>,
}

impl ConsistencyReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPolicy {
    LastWriteWins,
    FirstWriteWins,
    PrimaryAuthoritative,
    Merge,
    Manual,
}

/// Running counters exposed by batch reconciliation.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationStats {
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
    pub sync_failures: u64,
    total_sync_time: Duration,
    synced_count: u64,
}

impl ReconciliationStats {
    fn record_sync(&mut self, elapsed: Duration) {
        self.total_sync_time += elapsed;
        self.synced_count += 1;
    }

    #[must_use]
    pub fn average_sync_time(&self) -> Duration {
        if self.synced_count == 0 {
            Duration::ZERO
        } else {
            self.total_sync_time / u32::try_from(self.synced_count).unwrap_or(1)
        }
    }
}

pub struct ConsistencyManager {
    adapters: Arc<AdapterSet>,
    coordinator: Arc<AtomicCoordinator>,
}

impl ConsistencyManager {
    #[must_use]
    pub fn new(adapters: Arc<AdapterSet>, coordinator: Arc<AtomicCoordinator>) -> Self {
        ConsistencyManager {
            adapters,
            coordinator,
        }
    }

    /// Reconciliation check for a single entity id.
    pub async fn check_consistency(&self, entity_id: &str) -> Result<ConsistencyReport, CoreError> {
        let canonical = self.adapters.transactional.retrieve(entity_id).await?;
        let mut statuses = HashMap::new();
        let mut conflicts = Vec::new();

        let canonical_hash = canonical.as_ref().map(|p| DataVersion::of(p, 0).content_hash);

        for (backend, present) in [
            (Backend::Vector, self.adapters.vector.retrieve(entity_id).await?),
            (Backend::Graph, self.adapters.graph.retrieve(entity_id).await?),
            (Backend::Cache, self.adapters.cache.retrieve(entity_id).await?),
        ] {
            let status = match (&canonical_hash, present) {
                (None, None) => BackendStatus::InSync,
                (None, Some(_)) | (Some(_), None) => BackendStatus::Missing,
                (Some(expected), Some(payload)) => {
                    let actual = DataVersion::of(&payload, 0).content_hash;
                    if *expected == actual {
                        BackendStatus::InSync
                    } else {
                        BackendStatus::Diverged
                    }
                }
            };
            if status != BackendStatus::InSync {
                conflicts.push(backend);
            }
            statuses.insert(backend, status);
        }

        Ok(ConsistencyReport {
            entity_id: entity_id.to_string(),
            statuses,
            conflicts,
        })
    }

    /// Repairs a single entity by replaying its canonical (or, under
    /// `Manual`, recorded-only) state through a Strong transaction.
    pub async fn synchronize_document(
        &self,
        entity_id: &str,
        policy: ResolutionPolicy,
    ) -> Result<ConsistencyReport, CoreError> {
        let report = self.check_consistency(entity_id).await?;
        if report.is_consistent() {
            return Ok(report);
        }
        if policy == ResolutionPolicy::Manual {
            return Ok(report);
        }

        // LastWriteWins/FirstWriteWins/PrimaryAuthoritative all resolve to
        // the same repair here: the transactional store is canonical for
        // document-shaped entities. `Merge` is reserved and not
        // implemented; it falls through to the same canonical-propagation
        // path rather than attempting a field-level merge.
        let canonical = self.adapters.transactional.retrieve(entity_id).await?;
        let tx = match canonical {
            Some(payload) => Transaction::new(format!("reconcile-{entity_id}"), ConsistencyLevel::Strong)
                .with_op(propagate_op(Backend::Vector, entity_id, payload.clone()))
                .with_op(propagate_op(Backend::Graph, entity_id, payload.clone()))
                .with_op(propagate_op(Backend::Cache, entity_id, payload)),
            None => Transaction::new(format!("reconcile-delete-{entity_id}"), ConsistencyLevel::Strong)
                .with_op(delete_op(Backend::Vector, entity_id))
                .with_op(delete_op(Backend::Graph, entity_id))
                .with_op(delete_op(Backend::Cache, entity_id)),
        };

        self.coordinator.execute(tx).await.into_result()?;
        self.check_consistency(entity_id).await
    }

    /// Bounded scan over a batch of entity ids;
    /// caller supplies the ids (e.g. an id-range or recency page read
    /// from the transactional store).
    pub async fn reconcile_batch(
        &self,
        entity_ids: &[String],
        policy: ResolutionPolicy,
    ) -> ReconciliationStats {
        let mut stats = ReconciliationStats::default();
        for entity_id in entity_ids {
            let started = std::time::Instant::now();
            match self.check_consistency(entity_id).await {
                Ok(report) if report.is_consistent() => {}
                Ok(_) => {
                    stats.conflicts_detected += 1;
                    match self.synchronize_document(entity_id, policy).await {
                        Ok(report) if report.is_consistent() => {
                            stats.conflicts_resolved += 1;
                            stats.record_sync(started.elapsed());
                        }
                        _ => stats.sync_failures += 1,
                    }
                }
                Err(_) => stats.sync_failures += 1,
            }
        }
        stats
    }
}

fn propagate_op(backend: Backend, entity_id: &str, payload: serde_json::Value) -> Operation {
    let id = entity_id.to_string();
    Operation::new(
        backend,
        entity_id,
        std::sync::Arc::new(move |adapters: &AdapterSet| {
            let id = id.clone();
            let payload = payload.clone();
            Box::pin(async move {
                match backend {
                    Backend::Vector => adapters.vector.store(&id, payload).await,
                    Backend::Graph => adapters.graph.store(&id, payload).await,
                    Backend::Cache => adapters.cache.store(&id, payload).await,
                    Backend::Transactional => Ok(()),
                }
            })
        }),
        Operation::noop_compensation(),
    )
}

fn delete_op(backend: Backend, entity_id: &str) -> Operation {
    let id = entity_id.to_string();
    Operation::new(
        backend,
        entity_id,
        std::sync::Arc::new(move |adapters: &AdapterSet| {
            let id = id.clone();
            Box::pin(async move {
                match backend {
                    Backend::Vector => adapters.vector.delete(&id).await,
                    Backend::Graph => adapters.graph.delete(&id).await,
                    Backend::Cache => adapters.cache.delete(&id).await,
                    Backend::Transactional => Ok(()),
                }
            })
        }),
        Operation::noop_compensation(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::adapters::memory::{InMemoryCacheAdapter, InMemoryGraphAdapter, InMemoryVectorAdapter};
    use common::adapters::transactional::SurrealTransactionalAdapter;
    use uuid::Uuid;

    async fn test_manager() -> (Arc<AdapterSet>, ConsistencyManager) {
        let database = Uuid::new_v4().to_string();
        let adapters = Arc::new(AdapterSet {
            transactional: Arc::new(
                SurrealTransactionalAdapter::memory("test_ns", &database)
                    .await
                    .expect("transactional adapter"),
            ),
            vector: Arc::new(InMemoryVectorAdapter::new(3)),
            graph: Arc::new(InMemoryGraphAdapter::new()),
            cache: Arc::new(InMemoryCacheAdapter::new()),
        });
        let coordinator = Arc::new(AtomicCoordinator::new(adapters.clone()));
        let manager = ConsistencyManager::new(adapters.clone(), coordinator);
        (adapters, manager)
    }

    #[tokio::test]
    async fn detects_missing_participant_and_repairs_it() {
        let (adapters, manager) = test_manager().await;
        adapters
            .transactional
            .store("doc1", serde_json::json!({"title": "hi"}))
            .await
            .expect("seed transactional");

        let report = manager.check_consistency("doc1").await.expect("check");
        assert!(!report.is_consistent());
        assert!(report.conflicts.contains(&Backend::Cache));

        let repaired = manager
            .synchronize_document("doc1", ResolutionPolicy::PrimaryAuthoritative)
            .await
            .expect("synchronize");
        assert!(repaired.is_consistent());
    }

    #[tokio::test]
    async fn manual_policy_reports_without_repairing() {
        let (adapters, manager) = test_manager().await;
        adapters
            .transactional
            .store("doc2", serde_json::json!({"title": "hi"}))
            .await
            .expect("seed transactional");

        let report = manager
            .synchronize_document("doc2", ResolutionPolicy::Manual)
            .await
            .expect("synchronize");
        assert!(!report.is_consistent());
    }
}
