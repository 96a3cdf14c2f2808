//! Reasoning Engine: Thought-Chain Engine, Autonomous Context Extractor,
//! and Recursion & Safety Guard. The extractor and the guard are kept
//! structurally separate from the chain engine's write path — neither
//! holds a coordinator or adapter handle — so the chain engine is free
//! to consult them in either order without either module reaching back
//! into it.

pub mod chain;
pub mod context_extractor;
pub mod safety_guard;

pub use chain::{ChainAnalysis, ThoughtChainEngine, ThoughtCreateOutcome};
pub use context_extractor::{extract, ContextLookup, ContextSource, ExtractionRequest, FilledContext, IntentCategory};
pub use safety_guard::{recovery_strategy, AdmitRequest, GuardDecision, GuardState, RecoveryStrategy, SafetyGuard};
