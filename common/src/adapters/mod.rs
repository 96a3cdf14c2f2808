//! Backend Adapters. Each of the four stores is reached
//! only through one of these traits; the coordinator never talks to a
//! concrete backend directly.

pub mod cache;
pub mod graph;
pub mod memory;
pub mod transactional;
pub mod vector;

pub use cache::CacheAdapter;

use crate::error::{Backend, CoreError};
use crate::types::{
    chat_message::ChatMessage, chunk::Chunk, context_link::ContextLink, resource::Resource,
    scoring_weights::ScoringWeights, thought::Thought, todo::Todo,
};
use async_trait::async_trait;

/// Direction for [`GraphAdapter::traverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// A single hop sequence returned by [`GraphAdapter::traverse`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GraphPath {
    pub node_ids: Vec<String>,
    pub edge_types: Vec<String>,
}

/// Operation shapes shared by all four adapters.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn backend(&self) -> Backend;
    async fn store(&self, entity_id: &str, payload: serde_json::Value) -> Result<(), CoreError>;
    async fn delete(&self, entity_id: &str) -> Result<(), CoreError>;
    async fn retrieve(&self, entity_id: &str) -> Result<Option<serde_json::Value>, CoreError>;
    async fn is_available(&self) -> bool;
}

#[async_trait]
pub trait TransactionalAdapter: BackendAdapter {
    /// Atomic increment of the single-row vector-id sequence used to mint
    /// `vector_id`s: strictly increasing, never reused, never reassigned.
    async fn allocate_next_vector_id(&self) -> Result<i64, CoreError>;

    async fn store_resource(&self, resource: &Resource) -> Result<(), CoreError>;
    async fn get_resource(&self, id: &str) -> Result<Option<Resource>, CoreError>;
    async fn delete_resource(&self, id: &str) -> Result<(), CoreError>;

    /// Inserts all chunks for a resource in one local batch.
    async fn store_chunks_batch(&self, chunks: &[Chunk]) -> Result<(), CoreError>;
    async fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>, CoreError>;
    async fn get_chunks_by_resource(&self, resource_id: &str) -> Result<Vec<Chunk>, CoreError>;
    async fn delete_chunks_by_resource(&self, resource_id: &str) -> Result<Vec<Chunk>, CoreError>;

    async fn store_chat_message(&self, message: &ChatMessage) -> Result<(), CoreError>;
    async fn get_chats_by_tool(
        &self,
        source_tool: &str,
        limit: usize,
        conversation_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>, CoreError>;

    async fn store_context_link(&self, link: &ContextLink) -> Result<(), CoreError>;
    async fn get_context_links(&self, message_id: &str) -> Result<Vec<ContextLink>, CoreError>;
    async fn delete_context_links_for_chunk(&self, chunk_id: &str) -> Result<(), CoreError>;

    async fn store_thought(&self, thought: &Thought) -> Result<(), CoreError>;
    async fn get_thought(&self, id: &str) -> Result<Option<Thought>, CoreError>;
    async fn get_latest_thought(&self, session_id: &str) -> Result<Option<Thought>, CoreError>;
    async fn get_thought_by_step(
        &self,
        session_id: &str,
        step_number: u32,
    ) -> Result<Option<Thought>, CoreError>;
    async fn get_chain(&self, session_id: &str) -> Result<Vec<Thought>, CoreError>;

    /// The session id of the most recently created Thought within the last
    /// `within_seconds`, or `None` if no Thought was written in that window.
    /// Backs the autonomous context extractor's recent-state priority tier.
    async fn get_recent_session(&self, within_seconds: i64) -> Result<Option<String>, CoreError>;

    async fn get_scoring_weights(&self) -> Result<Option<ScoringWeights>, CoreError>;

    async fn store_todo(&self, todo: &Todo) -> Result<(), CoreError>;
    async fn get_todo(&self, id: &str) -> Result<Option<Todo>, CoreError>;
    async fn list_todos(&self) -> Result<Vec<Todo>, CoreError>;
    async fn update_todo(&self, todo: &Todo) -> Result<(), CoreError>;
    async fn search_todos(&self, query: &str) -> Result<Vec<Todo>, CoreError>;
}

#[async_trait]
pub trait VectorAdapter: BackendAdapter {
    async fn upsert(
        &self,
        vector_id: i64,
        vector: Vec<f32>,
        metadata: serde_json::Value,
    ) -> Result<(), CoreError>;
    /// Returns `(vector_id, score, metadata)` triples so callers can
    /// resolve the owning entity id without a second round trip.
    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&serde_json::Value>,
    ) -> Result<Vec<(i64, f32, serde_json::Value)>, CoreError>;
    async fn remove(&self, vector_id: i64) -> Result<(), CoreError>;
    fn dimension(&self) -> usize;
}

#[async_trait]
pub trait GraphAdapter: BackendAdapter {
    async fn upsert_node(
        &self,
        id: &str,
        labels: &[String],
        properties: serde_json::Value,
    ) -> Result<(), CoreError>;
    async fn upsert_edge(
        &self,
        src_id: &str,
        dst_id: &str,
        edge_type: &str,
        properties: serde_json::Value,
    ) -> Result<(), CoreError>;
    async fn traverse(
        &self,
        start_id: &str,
        edge_type: Option<&str>,
        direction: Direction,
        max_depth: u32,
    ) -> Result<Vec<GraphPath>, CoreError>;
    /// Rejects write expressions (`CREATE`, `DELETE`, `RELATE`, `UPDATE`,
    /// `UPSERT`, `MERGE`, `DEFINE`, `REMOVE`, `INSERT`, `SET`) before ever
    /// reaching the backend.
    async fn query_read_only(&self, expression: &str) -> Result<Vec<serde_json::Value>, CoreError>;
}

const WRITE_KEYWORDS: [&str; 10] = [
    "create", "delete", "relate", "update", "upsert", "merge", "define", "remove", "insert", "set",
];

/// Shared by every `GraphAdapter` implementor; kept free so both the
/// SurrealDB-backed and in-memory adapters enforce the identical rule.
pub fn reject_write_expression(expression: &str) -> Result<(), CoreError> {
    let lowered = expression.to_ascii_lowercase();
    for keyword in WRITE_KEYWORDS {
        if lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == keyword)
        {
            return Err(CoreError::Validation(format!(
                "query_graph expression contains write keyword '{keyword}'"
            )));
        }
    }
    Ok(())
}
