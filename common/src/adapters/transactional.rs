//! Transactional adapter: the source of truth for row-shaped entities plus
//! the vector-id sequence, backed by a `surrealdb::Surreal<Any>` client.

use async_trait::async_trait;
use surrealdb::engine::any::{connect, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

use crate::error::{Backend, CoreError};
use crate::types::{
    chat_message::ChatMessage,
    chunk::Chunk,
    context_link::ContextLink,
    resource::Resource,
    scoring_weights::{self, ScoringWeights},
    thought::Thought,
    todo::Todo,
    vector_id_sequence::{self, VectorIdSequence},
    StoredObject,
};

use super::{BackendAdapter, TransactionalAdapter};

#[derive(Clone)]
pub struct SurrealTransactionalAdapter {
    client: Surreal<Any>,
}

impl SurrealTransactionalAdapter {
    pub async fn connect(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, CoreError> {
        let client = connect(address).await?;
        if !username.is_empty() {
            client.signin(Root { username, password }).await?;
        }
        client.use_ns(namespace).use_db(database).await?;
        let adapter = SurrealTransactionalAdapter { client };
        adapter.ensure_initialized().await?;
        Ok(adapter)
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, CoreError> {
        let client = connect("mem://").await?;
        client.use_ns(namespace).use_db(database).await?;
        let adapter = SurrealTransactionalAdapter { client };
        adapter.ensure_initialized().await?;
        Ok(adapter)
    }

    async fn ensure_initialized(&self) -> Result<(), CoreError> {
        self.build_indexes().await?;
        // Seed the singleton rows; ignore conflict errors from a row that
        // already exists.
        let _: Result<Option<VectorIdSequence>, _> = self
            .client
            .create((
                VectorIdSequence::table_name(),
                vector_id_sequence::SINGLETON_ID,
            ))
            .content(VectorIdSequence {
                id: vector_id_sequence::SINGLETON_ID.to_string(),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
                last_vector_id: 0,
            })
            .await;
        let _: Result<Option<ScoringWeights>, _> = self
            .client
            .create((ScoringWeights::table_name(), scoring_weights::SINGLETON_ID))
            .content(ScoringWeights::defaults())
            .await;
        Ok(())
    }

    async fn build_indexes(&self) -> Result<(), CoreError> {
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_chunk_resource ON resource_chunks FIELDS resource_id")
            .query("DEFINE INDEX IF NOT EXISTS idx_chunk_vector_id ON resource_chunks FIELDS vector_id UNIQUE")
            .query("DEFINE INDEX IF NOT EXISTS idx_chat_conversation ON chat_history FIELDS conversation_id")
            .query("DEFINE INDEX IF NOT EXISTS idx_chat_source_tool ON chat_history FIELDS source_tool")
            .query("DEFINE INDEX IF NOT EXISTS idx_context_link_message ON context_links FIELDS message_id")
            .query("DEFINE INDEX IF NOT EXISTS idx_context_link_chunk ON context_links FIELDS chunk_id")
            .query("DEFINE INDEX IF NOT EXISTS idx_thought_session ON thoughts FIELDS session_id")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BackendAdapter for SurrealTransactionalAdapter {
    fn backend(&self) -> Backend {
        Backend::Transactional
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
impl TransactionalAdapter for SurrealTransactionalAdapter {
    async fn allocate_next_vector_id(&self) -> Result<i64, CoreError> {
        let mut response = self
            .client
            .query(
                "BEGIN TRANSACTION;
                 UPDATE vector_id_sequence:default SET last_vector_id += 1 RETURN AFTER;
                 COMMIT TRANSACTION;",
            )
            .await?;
        let seq: Option<VectorIdSequence> = response.take(0)?;
        seq.map(|s| s.last_vector_id)
            .ok_or_else(|| CoreError::Internal("vector id sequence row missing".to_string()))
    }

    async fn store_resource(&self, resource: &Resource) -> Result<(), CoreError> {
        let _: Option<Resource> = self
            .client
            .create((Resource::table_name(), resource.id.as_str()))
            .content(resource.clone())
            .await?;
        Ok(())
    }

    async fn get_resource(&self, id: &str) -> Result<Option<Resource>, CoreError> {
        let resource = self.client.select((Resource::table_name(), id)).await?;
        Ok(resource)
    }

    async fn delete_resource(&self, id: &str) -> Result<(), CoreError> {
        let _: Option<Resource> = self.client.delete((Resource::table_name(), id)).await?;
        Ok(())
    }

    async fn store_chunks_batch(&self, chunks: &[Chunk]) -> Result<(), CoreError> {
        for chunk in chunks {
            let _: Option<Chunk> = self
                .client
                .create((Chunk::table_name(), chunk.id.as_str()))
                .content(chunk.clone())
                .await?;
        }
        Ok(())
    }

    async fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>, CoreError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let chunk: Option<Chunk> = self.client.select((Chunk::table_name(), id.as_str())).await?;
            if let Some(chunk) = chunk {
                found.push(chunk);
            }
        }
        Ok(found)
    }

    async fn get_chunks_by_resource(&self, resource_id: &str) -> Result<Vec<Chunk>, CoreError> {
        let mut response = self
            .client
            .query("SELECT * FROM resource_chunks WHERE resource_id = $resource_id")
            .bind(("resource_id", resource_id.to_string()))
            .await?;
        let chunks: Vec<Chunk> = response.take(0)?;
        Ok(chunks)
    }

    async fn delete_chunks_by_resource(&self, resource_id: &str) -> Result<Vec<Chunk>, CoreError> {
        let chunks = self.get_chunks_by_resource(resource_id).await?;
        for chunk in &chunks {
            let _: Option<Chunk> = self.client.delete((Chunk::table_name(), chunk.id.as_str())).await?;
        }
        Ok(chunks)
    }

    async fn store_chat_message(&self, message: &ChatMessage) -> Result<(), CoreError> {
        let _: Option<ChatMessage> = self
            .client
            .create((ChatMessage::table_name(), message.id.as_str()))
            .content(message.clone())
            .await?;
        Ok(())
    }

    async fn get_chats_by_tool(
        &self,
        source_tool: &str,
        limit: usize,
        conversation_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>, CoreError> {
        let query = if conversation_id.is_some() {
            "SELECT * FROM chat_history WHERE source_tool = $source_tool AND conversation_id = $conversation_id ORDER BY created_at DESC LIMIT $limit"
        } else {
            "SELECT * FROM chat_history WHERE source_tool = $source_tool ORDER BY created_at DESC LIMIT $limit"
        };
        let mut built = self
            .client
            .query(query)
            .bind(("source_tool", source_tool.to_string()))
            .bind(("limit", limit as i64));
        if let Some(cid) = conversation_id {
            built = built.bind(("conversation_id", cid.to_string()));
        }
        let mut response = built.await?;
        let messages: Vec<ChatMessage> = response.take(0)?;
        Ok(messages)
    }

    async fn store_context_link(&self, link: &ContextLink) -> Result<(), CoreError> {
        let _: Option<ContextLink> = self
            .client
            .create((ContextLink::table_name(), link.id.as_str()))
            .content(link.clone())
            .await?;
        Ok(())
    }

    async fn get_context_links(&self, message_id: &str) -> Result<Vec<ContextLink>, CoreError> {
        let mut response = self
            .client
            .query("SELECT * FROM context_links WHERE message_id = $message_id")
            .bind(("message_id", message_id.to_string()))
            .await?;
        let links: Vec<ContextLink> = response.take(0)?;
        Ok(links)
    }

    async fn delete_context_links_for_chunk(&self, chunk_id: &str) -> Result<(), CoreError> {
        self.client
            .query("DELETE context_links WHERE chunk_id = $chunk_id")
            .bind(("chunk_id", chunk_id.to_string()))
            .await?;
        Ok(())
    }

    async fn store_thought(&self, thought: &Thought) -> Result<(), CoreError> {
        let _: Option<Thought> = self
            .client
            .create((Thought::table_name(), thought.id.as_str()))
            .content(thought.clone())
            .await?;
        Ok(())
    }

    async fn get_thought(&self, id: &str) -> Result<Option<Thought>, CoreError> {
        let thought = self.client.select((Thought::table_name(), id)).await?;
        Ok(thought)
    }

    async fn get_latest_thought(&self, session_id: &str) -> Result<Option<Thought>, CoreError> {
        let mut response = self
            .client
            .query("SELECT * FROM thoughts WHERE session_id = $session_id ORDER BY step_number DESC LIMIT 1")
            .bind(("session_id", session_id.to_string()))
            .await?;
        let thoughts: Vec<Thought> = response.take(0)?;
        Ok(thoughts.into_iter().next())
    }

    async fn get_thought_by_step(
        &self,
        session_id: &str,
        step_number: u32,
    ) -> Result<Option<Thought>, CoreError> {
        let mut response = self
            .client
            .query("SELECT * FROM thoughts WHERE session_id = $session_id AND step_number = $step_number LIMIT 1")
            .bind(("session_id", session_id.to_string()))
            .bind(("step_number", step_number))
            .await?;
        let thoughts: Vec<Thought> = response.take(0)?;
        Ok(thoughts.into_iter().next())
    }

    async fn get_chain(&self, session_id: &str) -> Result<Vec<Thought>, CoreError> {
        let mut response = self
            .client
            .query("SELECT * FROM thoughts WHERE session_id = $session_id ORDER BY step_number ASC")
            .bind(("session_id", session_id.to_string()))
            .await?;
        let thoughts: Vec<Thought> = response.take(0)?;
        Ok(thoughts)
    }

    async fn get_recent_session(&self, within_seconds: i64) -> Result<Option<String>, CoreError> {
        let threshold = chrono::Utc::now() - chrono::Duration::seconds(within_seconds);
        let mut response = self
            .client
            .query("SELECT * FROM thoughts WHERE created_at > $threshold ORDER BY created_at DESC LIMIT 1")
            .bind(("threshold", threshold))
            .await?;
        let thoughts: Vec<Thought> = response.take(0)?;
        Ok(thoughts.into_iter().next().map(|t| t.session_id))
    }

    async fn get_scoring_weights(&self) -> Result<Option<ScoringWeights>, CoreError> {
        let weights = self
            .client
            .select((ScoringWeights::table_name(), scoring_weights::SINGLETON_ID))
            .await?;
        Ok(weights)
    }

    async fn store_todo(&self, todo: &Todo) -> Result<(), CoreError> {
        let _: Option<Todo> = self
            .client
            .create((Todo::table_name(), todo.id.as_str()))
            .content(todo.clone())
            .await?;
        Ok(())
    }

    async fn get_todo(&self, id: &str) -> Result<Option<Todo>, CoreError> {
        let todo = self.client.select((Todo::table_name(), id)).await?;
        Ok(todo)
    }

    async fn list_todos(&self) -> Result<Vec<Todo>, CoreError> {
        let todos = self.client.select(Todo::table_name()).await?;
        Ok(todos)
    }

    async fn update_todo(&self, todo: &Todo) -> Result<(), CoreError> {
        let _: Option<Todo> = self
            .client
            .update((Todo::table_name(), todo.id.as_str()))
            .content(todo.clone())
            .await?;
        Ok(())
    }

    async fn search_todos(&self, query: &str) -> Result<Vec<Todo>, CoreError> {
        let mut response = self
            .client
            .query("SELECT * FROM todos WHERE title CONTAINS $query OR description CONTAINS $query")
            .bind(("query", query.to_string()))
            .await?;
        let todos: Vec<Todo> = response.take(0)?;
        Ok(todos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::resource::ResourceType;
    use uuid::Uuid;

    async fn memory_adapter() -> SurrealTransactionalAdapter {
        let database = Uuid::new_v4().to_string();
        SurrealTransactionalAdapter::memory("test_ns", &database)
            .await
            .expect("failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn vector_id_allocation_is_strictly_increasing() {
        let adapter = memory_adapter().await;
        let first = adapter.allocate_next_vector_id().await.expect("alloc 1");
        let second = adapter.allocate_next_vector_id().await.expect("alloc 2");
        assert_eq!(second, first + 1);
    }

    #[tokio::test]
    async fn resource_crud_round_trips() {
        let adapter = memory_adapter().await;
        let now = chrono::Utc::now();
        let resource = Resource {
            id: "r1".to_string(),
            created_at: now,
            updated_at: now,
            file_name: "notes.txt".to_string(),
            resource_type: ResourceType::Note,
            content: "hello world".to_string(),
        };
        adapter.store_resource(&resource).await.expect("store");
        let fetched = adapter.get_resource("r1").await.expect("get");
        assert_eq!(fetched, Some(resource));
        adapter.delete_resource("r1").await.expect("delete");
        assert_eq!(adapter.get_resource("r1").await.expect("get after delete"), None);
    }

    #[tokio::test]
    async fn recent_session_finds_a_thought_within_the_window() {
        let adapter = memory_adapter().await;
        assert_eq!(adapter.get_recent_session(300).await.expect("no recent session"), None);

        let now = chrono::Utc::now();
        let thought = Thought {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            created_at: now,
            updated_at: now,
            session_id: "s-recent".to_string(),
            content: "x".to_string(),
            content_hash: Thought::hash_content("x"),
            previous_thought_id: None,
            step_number: 1,
            thought_type: crate::types::thought::ThoughtType::Problem,
            metadata: serde_json::json!({}),
        };
        adapter.store_thought(&thought).await.expect("store thought");

        let recent = adapter.get_recent_session(300).await.expect("recent session");
        assert_eq!(recent, Some("s-recent".to_string()));

        let too_old_window = adapter.get_recent_session(-1).await.expect("negative window");
        assert_eq!(too_old_window, None);
    }

    #[tokio::test]
    async fn scoring_weights_default_row_is_seeded() {
        let adapter = memory_adapter().await;
        let weights = adapter
            .get_scoring_weights()
            .await
            .expect("read weights")
            .expect("row present");
        assert_eq!(weights.id, scoring_weights::SINGLETON_ID);
    }
}
