//! Transaction object and outcome types: one ordered list of operations
//! across four adapters, each with a compensation to run if a later step
//! fails, in the spirit of a `BEGIN TRANSACTION; ...; COMMIT TRANSACTION;`
//! block but spanning independent backends instead of one database.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use common::adapters::{CacheAdapter, GraphAdapter, TransactionalAdapter, VectorAdapter};
use common::error::{Backend, CoreError};

/// The four live adapter handles a transaction is executed against.
pub struct AdapterSet {
    pub transactional: Arc<dyn TransactionalAdapter>,
    pub vector: Arc<dyn VectorAdapter>,
    pub graph: Arc<dyn GraphAdapter>,
    pub cache: Arc<dyn CacheAdapter>,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type AdapterOp =
    Arc<dyn for<'a> Fn(&'a AdapterSet) -> BoxFuture<'a, Result<(), CoreError>> + Send + Sync>;

/// One step of a transaction: a forward operation against `target`, and
/// the compensation to run if a later step fails under Strong/Quorum.
#[derive(Clone)]
pub struct Operation {
    pub target: Backend,
    pub entity_id: String,
    pub forward: AdapterOp,
    pub compensation: AdapterOp,
}

impl Operation {
    pub fn new(
        target: Backend,
        entity_id: impl Into<String>,
        forward: AdapterOp,
        compensation: AdapterOp,
    ) -> Self {
        Operation {
            target,
            entity_id: entity_id.into(),
            forward,
            compensation,
        }
    }

    /// A no-op compensation for operations with nothing meaningful to undo
    /// (e.g. a cache write, which is advisory per ).
    #[must_use]
    pub fn noop_compensation() -> AdapterOp {
        Arc::new(|_adapters: &AdapterSet| Box::pin(async { Ok(()) }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyLevel {
    Primary,
    Quorum,
    Strong,
    Eventual,
}

/// Canonical commit order: transactional → vector → graph →
/// cache. Rollback runs the reverse of whatever succeeded.
pub const COMMIT_ORDER: [Backend; 4] = [
    Backend::Transactional,
    Backend::Vector,
    Backend::Graph,
    Backend::Cache,
];

fn commit_rank(backend: Backend) -> usize {
    COMMIT_ORDER.iter().position(|b| *b == backend).unwrap_or(COMMIT_ORDER.len())
}

pub struct Transaction {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub level: ConsistencyLevel,
    pub operations: Vec<Operation>,
    reverse_commit_order: bool,
}

impl Transaction {
    #[must_use]
    pub fn new(id: impl Into<String>, level: ConsistencyLevel) -> Self {
        Transaction {
            id: id.into(),
            created_at: chrono::Utc::now(),
            level,
            operations: Vec::new(),
            reverse_commit_order: false,
        }
    }

    #[must_use]
    pub fn with_op(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    /// Runs operations in the reverse of canonical commit order (used by
    /// `delete_document`: cache → graph → vector → transactional).
    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.reverse_commit_order = true;
        self
    }

    /// Entity ids touched by this transaction, sorted for the keyed lock
    /// table's deadlock-avoidance acquisition order.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.operations.iter().map(|op| op.entity_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Operations in canonical commit order (stable within same backend),
    /// or its reverse when [`Transaction::reversed`] was set.
    #[must_use]
    pub fn ordered_operations(&self) -> Vec<Operation> {
        let mut ops = self.operations.clone();
        ops.sort_by_key(|op| commit_rank(op.target));
        if self.reverse_commit_order {
            ops.reverse();
        }
        ops
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ParticipantStatus {
    Committed,
    Failed,
    Compensated,
    CompensationFailed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OverallStatus {
    Success,
    PartialFailure,
    QuorumNotMet,
    Initiated,
    Error,
}

#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub transaction_id: String,
    pub overall: OverallStatus,
    pub participants: HashMap<Backend, ParticipantStatus>,
    pub elapsed: Duration,
}

impl TransactionOutcome {
    /// Folds the outcome into the universal error taxonomy for
    /// callers that need a `Result`. `Success`/`Initiated` fold to
    /// `Ok`.
    pub fn into_result(self) -> Result<TransactionOutcome, CoreError> {
        match self.overall {
            OverallStatus::Success | OverallStatus::Initiated => Ok(self),
            OverallStatus::QuorumNotMet => {
                let succeeded = self
                    .participants
                    .values()
                    .filter(|s| matches!(s, ParticipantStatus::Committed))
                    .count();
                Err(CoreError::QuorumNotMet { succeeded, required: 3 })
            }
            OverallStatus::PartialFailure => {
                if self
                    .participants
                    .values()
                    .any(|s| matches!(s, ParticipantStatus::CompensationFailed))
                {
                    let backend = self
                        .participants
                        .iter()
                        .find(|(_, s)| matches!(s, ParticipantStatus::CompensationFailed))
                        .map(|(b, _)| *b)
                        .unwrap_or(Backend::Transactional);
                    Err(CoreError::CompensationFailure {
                        backend,
                        message: format!("transaction {} left {backend} uncompensated", self.transaction_id),
                    })
                } else {
                    Err(CoreError::PartialFailure {
                        context: format!("transaction {} failed after partial commit", self.transaction_id),
                    })
                }
            }
            OverallStatus::Error => Err(CoreError::Internal(format!(
                "transaction {} failed",
                self.transaction_id
            ))),
        }
    }
}
