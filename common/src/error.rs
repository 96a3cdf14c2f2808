//! Error taxonomy shared by every crate in the workspace.
//!
//! `CoreError` is the single universal error type the coordination engine
//! speaks: adapters raise it, the coordinator folds per-participant
//! failures into it, and the public operation surface in `main` is the
//! only place it is ever translated into a transport-facing shape.

use thiserror::Error;

/// The backend a failing adapter call was directed at, attached to
/// adapter-origin errors so the coordinator can classify participant
/// outcomes without string-matching messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Backend {
    Transactional,
    Vector,
    Graph,
    Cache,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Backend::Transactional => "transactional",
            Backend::Vector => "vector",
            Backend::Graph => "graph",
            Backend::Cache => "cache",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{backend} is unavailable: {message}")]
    Unavailable { backend: Backend, message: String },

    #[error("operation timed out after {elapsed_ms}ms: {context}")]
    Timeout { elapsed_ms: u64, context: String },

    #[error("quorum not met: {succeeded}/{required} participants succeeded")]
    QuorumNotMet { succeeded: usize, required: usize },

    #[error("partial failure: {context}")]
    PartialFailure { context: String },

    #[error("compensation failed for {backend}: {message}")]
    CompensationFailure { backend: Backend, message: String },

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("recursion blocked: {0}")]
    RecursionBlocked(String),

    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Unavailable { .. } | CoreError::Timeout { .. }
        )
    }
}

impl From<surrealdb::Error> for CoreError {
    fn from(err: surrealdb::Error) -> Self {
        CoreError::Internal(err.to_string())
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_timeout() {
            CoreError::Unavailable {
                backend: Backend::Cache,
                message: err.to_string(),
            }
        } else {
            CoreError::Internal(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Validation(format!("metadata is not valid JSON: {err}"))
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Internal(format!("configuration error: {err}"))
    }
}
