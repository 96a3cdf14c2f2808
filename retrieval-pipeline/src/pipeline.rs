//! Retrieval Pipeline: embed → k-NN → hydrate → score/fuse →
//! assemble context → log chat → context-link.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use common::adapters::{TransactionalAdapter, VectorAdapter};
use common::embedding::EmbeddingProvider;
use common::error::CoreError;
use common::types::chat_message::{ChatMessage, MessageRole};
use common::types::context_link::ContextLink;
use common::types::resource::Resource;
use common::types::scoring_weights::ScoringWeights;
use common::types::validate_identifier;
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::scoring::{self, Scored, Signals};

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub resource_id: String,
    pub file_name: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub context: String,
    pub chunks: Vec<RetrievedChunk>,
}

/// Holds the two adapters retrieval touches directly (vector,
/// transactional — retrieval never writes the graph or cache stores)
/// plus the embedding boundary. Like ingestion, this bypasses
/// `AtomicCoordinator`: query-time reads and the chat-log/context-link
/// side effect are not a single atomic unit, they are a best-effort
/// pipeline stage sequence.
pub struct RetrievalPipeline {
    transactional: Arc<dyn TransactionalAdapter>,
    vector: Arc<dyn VectorAdapter>,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl RetrievalPipeline {
    #[must_use]
    pub fn new(
        transactional: Arc<dyn TransactionalAdapter>,
        vector: Arc<dyn VectorAdapter>,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        RetrievalPipeline {
            transactional,
            vector,
            embeddings,
            config,
        }
    }

    /// Clones the pipeline with `k` overriding the configured candidate
    /// count, leaving every other tuning knob as-is (backs
    /// `retrieve_memory`'s per-call `top_k` parameter).
    #[must_use]
    pub fn with_k(&self, k: usize) -> Self {
        RetrievalPipeline {
            transactional: self.transactional.clone(),
            vector: self.vector.clone(),
            embeddings: self.embeddings.clone(),
            config: RetrievalConfig { k, ..self.config.clone() },
        }
    }

    /// Runs the full query path. `conversation_id` is `None` when the
    /// caller does not want conversation tracking: the chat message and
    /// context links are only written when it is `Some`. `source_tool`
    /// narrows the conversation-locality bias term to messages logged by
    /// the same tool; without it the term is always `0.0`.
    #[tracing::instrument(skip(self, query), fields(conversation_id))]
    pub async fn retrieve(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        source_tool: Option<&str>,
    ) -> Result<RetrievalResult, CoreError> {
        if let Some(cid) = conversation_id {
            validate_identifier(cid)?;
        }

        let query_vector = self.embeddings.embed(query).await?;
        let hits = self.vector.search(&query_vector, self.config.k, None).await?;

        let similarity_by_chunk: HashMap<String, f32> = hits
            .iter()
            .filter_map(|(_, score, metadata)| {
                metadata
                    .get("chunk_id")
                    .and_then(|v| v.as_str())
                    .map(|id| (id.to_string(), *score))
            })
            .collect();
        let chunk_ids: Vec<String> = similarity_by_chunk.keys().cloned().collect();

        let weights = self
            .transactional
            .get_scoring_weights()
            .await?
            .unwrap_or_else(ScoringWeights::defaults);
        let recent_chunk_ids = self.recent_conversation_chunk_ids(conversation_id, source_tool).await?;

        let chunks = self.transactional.get_chunks(&chunk_ids).await?;
        let resources = self.load_owning_resources(&chunks).await?;

        let now = chrono::Utc::now();
        let mut scored: Vec<Scored<common::types::chunk::Chunk>> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector_similarity = similarity_by_chunk.get(&chunk.id).copied().unwrap_or(0.0);
            let recency = scoring::recency_score(chunk.created_at, now, self.config.recency_half_life_seconds);
            let resource_type_bias = resources
                .get(&chunk.resource_id)
                .map(|resource| self.resource_type_bias(resource))
                .unwrap_or(0.0);
            let conversation_locality = if recent_chunk_ids.contains(&chunk.id) { 1.0 } else { 0.0 };

            let signals = Signals {
                vector: vector_similarity,
                recency,
                resource_type_bias,
                conversation_locality,
                reserved: 0.0,
            };
            let fused = scoring::fuse(&signals, &weights);
            scored.push(Scored { item: chunk, signals, fused });
        }
        scoring::sort_by_fused_desc(&mut scored);

        let (context, retrieved) = self.assemble_context(&scored, &resources);

        if let Some(cid) = conversation_id {
            self.log_query_and_links(cid, query, source_tool, &retrieved).await?;
        }

        Ok(RetrievalResult {
            context,
            chunks: retrieved,
        })
    }

    fn resource_type_bias(&self, resource: &Resource) -> f32 {
        match self.config.preferred_resource_type {
            Some(preferred) if preferred == resource.resource_type => 1.0,
            _ => 0.0,
        }
    }

    async fn load_owning_resources(
        &self,
        chunks: &[common::types::chunk::Chunk],
    ) -> Result<HashMap<String, Resource>, CoreError> {
        let mut resources = HashMap::new();
        for chunk in chunks {
            if resources.contains_key(&chunk.resource_id) {
                continue;
            }
            if let Some(resource) = self.transactional.get_resource(&chunk.resource_id).await? {
                resources.insert(chunk.resource_id.clone(), resource);
            }
        }
        Ok(resources)
    }

    /// Concatenates chunk texts in fused-score order, separated by a
    /// newline, stopping once the optional token budget would be
    /// exceeded. At least one chunk is always
    /// included even if it alone exceeds the budget.
    fn assemble_context(
        &self,
        scored: &[Scored<common::types::chunk::Chunk>],
        resources: &HashMap<String, Resource>,
    ) -> (String, Vec<RetrievedChunk>) {
        let mut parts = Vec::with_capacity(scored.len());
        let mut retrieved = Vec::with_capacity(scored.len());
        let mut tokens_so_far = 0usize;

        for entry in scored {
            let chunk = &entry.item;
            if let Some(budget) = self.config.token_budget {
                let chunk_tokens = chunk.chunk_text.split_whitespace().count();
                if tokens_so_far > 0 && tokens_so_far + chunk_tokens > budget {
                    break;
                }
                tokens_so_far += chunk_tokens;
            }

            let file_name = resources
                .get(&chunk.resource_id)
                .map(|r| r.file_name.clone())
                .unwrap_or_default();

            parts.push(chunk.chunk_text.clone());
            retrieved.push(RetrievedChunk {
                chunk_id: chunk.id.clone(),
                resource_id: chunk.resource_id.clone(),
                file_name,
                score: entry.fused,
            });
        }

        (parts.join("\n"), retrieved)
    }

    /// Chunk ids already surfaced as context earlier in this conversation,
    /// used for the conversation-locality bias term. Needs both a
    /// conversation id and a source tool since
    /// `TransactionalAdapter::get_chats_by_tool` indexes messages by tool
    /// first; without a tool hint the term stays neutral for every chunk.
    async fn recent_conversation_chunk_ids(
        &self,
        conversation_id: Option<&str>,
        source_tool: Option<&str>,
    ) -> Result<HashSet<String>, CoreError> {
        let (Some(conversation_id), Some(source_tool)) = (conversation_id, source_tool) else {
            return Ok(HashSet::new());
        };

        let messages = self
            .transactional
            .get_chats_by_tool(source_tool, self.config.conversation_window, Some(conversation_id))
            .await?;

        let mut chunk_ids = HashSet::new();
        for message in messages {
            let links = self.transactional.get_context_links(&message.id).await?;
            chunk_ids.extend(links.into_iter().map(|link| link.chunk_id));
        }
        Ok(chunk_ids)
    }

    async fn log_query_and_links(
        &self,
        conversation_id: &str,
        query: &str,
        source_tool: Option<&str>,
        retrieved: &[RetrievedChunk],
    ) -> Result<(), CoreError> {
        let now = chrono::Utc::now();
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            conversation_id: conversation_id.to_string(),
            role: MessageRole::User,
            content: query.to_string(),
            agent_name: None,
            source_tool: source_tool.map(str::to_string),
            metadata: None,
        };
        self.transactional.store_chat_message(&message).await?;

        for chunk in retrieved {
            let link = ContextLink {
                id: Uuid::new_v4().to_string(),
                created_at: now,
                updated_at: now,
                message_id: message.id.clone(),
                chunk_id: chunk.chunk_id.clone(),
            };
            self.transactional.store_context_link(&link).await?;
        }
        Ok(())
    }
}
