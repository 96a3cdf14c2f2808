//! Atomic Coordinator. Sequences a caller-assembled
//! transaction across the four adapters with a defined commit order,
//! per-participant compensation on failure, and a classified outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::error::Backend;

use crate::lock_table::LockTable;
use crate::transaction::{
    AdapterSet, ConsistencyLevel, OverallStatus, ParticipantStatus, Transaction,
    TransactionOutcome,
};

pub struct AtomicCoordinator {
    adapters: Arc<AdapterSet>,
    locks: LockTable,
}

impl AtomicCoordinator {
    #[must_use]
    pub fn new(adapters: Arc<AdapterSet>) -> Self {
        AtomicCoordinator {
            adapters,
            locks: LockTable::new(),
        }
    }

    #[tracing::instrument(skip(self, transaction), fields(transaction_id = %transaction.id, level = ?transaction.level))]
    pub async fn execute(&self, transaction: Transaction) -> TransactionOutcome {
        let started = Instant::now();
        let entity_ids = transaction.entity_ids();
        let _guards = self.locks.acquire_all(&entity_ids).await;
        let ops = transaction.ordered_operations();

        let (overall, participants) = match transaction.level {
            ConsistencyLevel::Primary => self.execute_primary(&ops).await,
            ConsistencyLevel::Quorum => self.execute_quorum(&ops).await,
            ConsistencyLevel::Strong => self.execute_strong(&ops).await,
            ConsistencyLevel::Eventual => self.execute_eventual(&ops),
        };

        TransactionOutcome {
            transaction_id: transaction.id,
            overall,
            participants,
            elapsed: started.elapsed(),
        }
    }

    async fn execute_primary(
        &self,
        ops: &[crate::transaction::Operation],
    ) -> (OverallStatus, HashMap<Backend, ParticipantStatus>) {
        let mut participants = HashMap::new();
        let mut transactional_ok = true;
        for op in ops {
            if op.target == Backend::Transactional {
                match (op.forward)(&self.adapters).await {
                    Ok(()) => {
                        participants.insert(op.target, ParticipantStatus::Committed);
                    }
                    Err(err) => {
                        tracing::warn!(backend = %op.target, error = %err, "primary transactional write failed");
                        participants.insert(op.target, ParticipantStatus::Failed);
                        transactional_ok = false;
                    }
                }
            }
        }
        if !transactional_ok {
            for op in ops {
                if op.target != Backend::Transactional {
                    participants.entry(op.target).or_insert(ParticipantStatus::Skipped);
                }
            }
            return (OverallStatus::Error, participants);
        }
        // Fire-and-forget the rest; their result is logged, not awaited.
        for op in ops.iter().filter(|op| op.target != Backend::Transactional).cloned() {
            let adapters = self.adapters.clone();
            tokio::spawn(async move {
                if let Err(err) = (op.forward)(&adapters).await {
                    tracing::warn!(backend = %op.target, error = %err, "fire-and-forget participant failed under Primary");
                }
            });
            participants.insert(op.target, ParticipantStatus::Committed);
        }
        (OverallStatus::Success, participants)
    }

    async fn execute_quorum(
        &self,
        ops: &[crate::transaction::Operation],
    ) -> (OverallStatus, HashMap<Backend, ParticipantStatus>) {
        let mut participants = HashMap::new();
        let mut succeeded_ops = Vec::new();
        for op in ops {
            match (op.forward)(&self.adapters).await {
                Ok(()) => {
                    participants.insert(op.target, ParticipantStatus::Committed);
                    succeeded_ops.push(op.clone());
                }
                Err(err) => {
                    tracing::warn!(backend = %op.target, error = %err, "quorum participant failed");
                    participants.insert(op.target, ParticipantStatus::Failed);
                }
            }
        }
        let required = 3.min(ops.len());
        if succeeded_ops.len() >= required {
            return (OverallStatus::Success, participants);
        }
        self.rollback(&succeeded_ops, &mut participants).await;
        (OverallStatus::QuorumNotMet, participants)
    }

    async fn execute_strong(
        &self,
        ops: &[crate::transaction::Operation],
    ) -> (OverallStatus, HashMap<Backend, ParticipantStatus>) {
        let mut participants = HashMap::new();
        let mut succeeded_ops = Vec::new();
        let mut failed = false;
        for op in ops {
            if failed {
                participants.insert(op.target, ParticipantStatus::Skipped);
                continue;
            }
            match (op.forward)(&self.adapters).await {
                Ok(()) => {
                    participants.insert(op.target, ParticipantStatus::Committed);
                    succeeded_ops.push(op.clone());
                }
                Err(err) => {
                    tracing::warn!(backend = %op.target, error = %err, "strong transaction participant failed");
                    participants.insert(op.target, ParticipantStatus::Failed);
                    failed = true;
                }
            }
        }
        if !failed {
            return (OverallStatus::Success, participants);
        }
        self.rollback(&succeeded_ops, &mut participants).await;
        (OverallStatus::PartialFailure, participants)
    }

    fn execute_eventual(
        &self,
        ops: &[crate::transaction::Operation],
    ) -> (OverallStatus, HashMap<Backend, ParticipantStatus>) {
        let mut participants = HashMap::new();
        for op in ops.iter().cloned() {
            let adapters = self.adapters.clone();
            tokio::spawn(async move {
                if let Err(err) = (op.forward)(&adapters).await {
                    tracing::warn!(backend = %op.target, error = %err, "eventual participant failed; consistency reconciliation will catch it");
                }
            });
            participants.insert(op.target, ParticipantStatus::Committed);
        }
        (OverallStatus::Initiated, participants)
    }

    /// Runs compensations in reverse commit order over everything that
    /// committed. Best-effort: a compensation failure is recorded but does
    /// not stop the rest.
    async fn rollback(
        &self,
        succeeded_ops: &[crate::transaction::Operation],
        participants: &mut HashMap<Backend, ParticipantStatus>,
    ) {
        for op in succeeded_ops.iter().rev() {
            match (op.compensation)(&self.adapters).await {
                Ok(()) => {
                    participants.insert(op.target, ParticipantStatus::Compensated);
                }
                Err(err) => {
                    tracing::error!(backend = %op.target, error = %err, "compensation failed, requires reconciliation");
                    participants.insert(op.target, ParticipantStatus::CompensationFailed);
                }
            }
        }
    }
}

#[must_use]
pub fn deadline_for(level: ConsistencyLevel) -> Duration {
    match level {
        ConsistencyLevel::Strong => Duration::from_secs(5),
        ConsistencyLevel::Quorum => Duration::from_secs(8),
        ConsistencyLevel::Primary => Duration::from_secs(10),
        ConsistencyLevel::Eventual => Duration::from_secs(30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{AdapterOp, Operation};
    use common::adapters::memory::{InMemoryCacheAdapter, InMemoryGraphAdapter, InMemoryVectorAdapter};
    use common::adapters::transactional::SurrealTransactionalAdapter;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    async fn test_adapters() -> Arc<AdapterSet> {
        let database = Uuid::new_v4().to_string();
        Arc::new(AdapterSet {
            transactional: Arc::new(
                SurrealTransactionalAdapter::memory("test_ns", &database)
                    .await
                    .expect("transactional adapter"),
            ),
            vector: Arc::new(InMemoryVectorAdapter::new(3)),
            graph: Arc::new(InMemoryGraphAdapter::new()),
            cache: Arc::new(InMemoryCacheAdapter::new()),
        })
    }

    fn always_ok() -> AdapterOp {
        Arc::new(|_: &AdapterSet| Box::pin(async { Ok(()) }))
    }

    fn always_fails() -> AdapterOp {
        Arc::new(|_: &AdapterSet| {
            Box::pin(async { Err(common::error::CoreError::Internal("forced failure".into())) })
        })
    }

    #[tokio::test]
    async fn strong_transaction_succeeds_when_all_participants_succeed() {
        let adapters = test_adapters().await;
        let coordinator = AtomicCoordinator::new(adapters);
        let tx = Transaction::new("t1", ConsistencyLevel::Strong)
            .with_op(Operation::new(Backend::Transactional, "e1", always_ok(), always_ok()))
            .with_op(Operation::new(Backend::Vector, "e1", always_ok(), always_ok()))
            .with_op(Operation::new(Backend::Graph, "e1", always_ok(), always_ok()))
            .with_op(Operation::new(Backend::Cache, "e1", always_ok(), Operation::noop_compensation()));
        let outcome = coordinator.execute(tx).await;
        assert_eq!(outcome.overall, OverallStatus::Success);
        assert!(outcome.participants.values().all(|s| *s == ParticipantStatus::Committed));
    }

    #[tokio::test]
    async fn strong_transaction_rolls_back_on_failure() {
        let adapters = test_adapters().await;
        let coordinator = AtomicCoordinator::new(adapters);
        let compensated = Arc::new(AtomicBool::new(false));
        let compensated_clone = compensated.clone();
        let compensation: AdapterOp = Arc::new(move |_: &AdapterSet| {
            let flag = compensated_clone.clone();
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
        });
        let tx = Transaction::new("t2", ConsistencyLevel::Strong)
            .with_op(Operation::new(Backend::Transactional, "e2", always_ok(), compensation))
            .with_op(Operation::new(Backend::Vector, "e2", always_fails(), always_ok()));
        let outcome = coordinator.execute(tx).await;
        assert_eq!(outcome.overall, OverallStatus::PartialFailure);
        assert!(compensated.load(Ordering::SeqCst));
        assert_eq!(outcome.participants.get(&Backend::Transactional), Some(&ParticipantStatus::Compensated));
        assert_eq!(outcome.participants.get(&Backend::Vector), Some(&ParticipantStatus::Failed));
    }

    #[tokio::test]
    async fn quorum_succeeds_with_three_of_four() {
        let adapters = test_adapters().await;
        let coordinator = AtomicCoordinator::new(adapters);
        let tx = Transaction::new("t3", ConsistencyLevel::Quorum)
            .with_op(Operation::new(Backend::Transactional, "e3", always_ok(), always_ok()))
            .with_op(Operation::new(Backend::Vector, "e3", always_ok(), always_ok()))
            .with_op(Operation::new(Backend::Graph, "e3", always_ok(), always_ok()))
            .with_op(Operation::new(Backend::Cache, "e3", always_fails(), Operation::noop_compensation()));
        let outcome = coordinator.execute(tx).await;
        assert_eq!(outcome.overall, OverallStatus::Success);
    }

    #[tokio::test]
    async fn eventual_always_reports_initiated() {
        let adapters = test_adapters().await;
        let coordinator = AtomicCoordinator::new(adapters);
        let tx = Transaction::new("t4", ConsistencyLevel::Eventual)
            .with_op(Operation::new(Backend::Transactional, "e4", always_fails(), always_ok()));
        let outcome = coordinator.execute(tx).await;
        assert_eq!(outcome.overall, OverallStatus::Initiated);
    }
}
