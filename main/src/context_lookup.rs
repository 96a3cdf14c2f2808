//! [`ContextLookup`] implementation for the autonomous context extractor
//! against the live adapter set.
//! Kept in `main` rather than `reasoning-engine` per that crate's own doc
//! comment: the extractor stays pure and takes this trait injected so it
//! never depends on `coordinator`/`common::adapters` for its one stateful
//! step.

use std::sync::Arc;

use async_trait::async_trait;
use common::adapters::TransactionalAdapter;
use common::error::CoreError;
use reasoning_engine::ContextLookup;

pub struct AdapterContextLookup {
    transactional: Arc<dyn TransactionalAdapter>,
}

impl AdapterContextLookup {
    #[must_use]
    pub fn new(transactional: Arc<dyn TransactionalAdapter>) -> Self {
        AdapterContextLookup { transactional }
    }
}

#[async_trait]
impl ContextLookup for AdapterContextLookup {
    /// The autonomous extractor's priority-4 lookup: the session id of the
    /// most recently written Thought within `within_seconds`.
    async fn recent_session_id(&self, within_seconds: i64) -> Result<Option<String>, CoreError> {
        self.transactional.get_recent_session(within_seconds).await
    }

    async fn latest_thought_id(&self, session_id: &str) -> Result<Option<String>, CoreError> {
        Ok(self
            .transactional
            .get_latest_thought(session_id)
            .await?
            .map(|thought| thought.id))
    }

    async fn thought_id_at_step(&self, session_id: &str, step_number: u32) -> Result<Option<String>, CoreError> {
        Ok(self
            .transactional
            .get_thought_by_step(session_id, step_number)
            .await?
            .map(|thought| thought.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::adapters::transactional::SurrealTransactionalAdapter;
    use common::types::thought::{Thought, ThoughtType};
    use uuid::Uuid;

    #[tokio::test]
    async fn recent_session_id_resolves_a_real_thought_from_the_adapter() {
        let database = Uuid::new_v4().to_string();
        let transactional: Arc<dyn TransactionalAdapter> = Arc::new(
            SurrealTransactionalAdapter::memory("test_ns", &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        let lookup = AdapterContextLookup::new(transactional.clone());

        assert_eq!(lookup.recent_session_id(300).await.expect("no hit yet"), None);

        let now = chrono::Utc::now();
        let thought = Thought {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            created_at: now,
            updated_at: now,
            session_id: "session-under-test".to_string(),
            content: "recent thought".to_string(),
            content_hash: Thought::hash_content("recent thought"),
            previous_thought_id: None,
            step_number: 1,
            thought_type: ThoughtType::Problem,
            metadata: serde_json::json!({}),
        };
        transactional.store_thought(&thought).await.expect("store thought");

        let hit = lookup.recent_session_id(300).await.expect("recent hit");
        assert_eq!(hit, Some("session-under-test".to_string()));
    }
}
