//! Unified Operations: a thin composer wrapping the coordinator with
//! document-shaped primitives — one logical write spanning the
//! transactional row, its vector twin, graph edges, and a cache TTL copy.

pub mod document;
pub mod search;
#[cfg(test)]
mod test_support;
pub mod todo;

pub use document::{DocumentStore, Relationship, RetrievedDocument};
pub use search::SearchResult;
pub use todo::TodoOps;
