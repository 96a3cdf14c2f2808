use common::adapters::{Direction, GraphAdapter, GraphPath, VectorAdapter};
use common::error::CoreError;
use common::types::document::Document;

use crate::document::{DocumentStore, RetrievedDocument};

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub entity_id: String,
    pub score: f32,
    pub document: Document,
}

impl DocumentStore {
    /// Embeds `query`, asks the vector adapter for `2k` candidates,
    /// hydrates each through [`DocumentStore::retrieve_document`], applies
    /// the tag filter, and trims to `k`.
    pub async fn semantic_search(
        &self,
        query: &str,
        k: usize,
        filter_tags: Option<&[String]>,
    ) -> Result<Vec<SearchResult>, CoreError> {
        let query_vector = self.embeddings().embed(query).await?;
        let candidates = self
            .adapters()
            .vector
            .search(&query_vector, k.saturating_mul(2), None)
            .await?;

        let mut results = Vec::with_capacity(k);
        for (_, score, metadata) in candidates {
            let Some(entity_id) = metadata.get("entity_id").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(retrieved) = self.retrieve_document(entity_id, true, false).await? else {
                continue;
            };
            if let Some(tags) = filter_tags {
                if !tags.is_empty() && !retrieved.document.has_any_tag(tags) {
                    continue;
                }
            }
            results.push(SearchResult {
                entity_id: entity_id.to_string(),
                score,
                document: retrieved.document,
            });
            if results.len() >= k {
                break;
            }
        }
        Ok(results)
    }

    /// Delegates to the graph adapter; re-hydrates referenced documents
    /// through [`DocumentStore::retrieve_document`] when `hydrate` is set.
    pub async fn graph_traversal(
        &self,
        start_id: &str,
        edge_type: Option<&str>,
        max_depth: u32,
        hydrate: bool,
    ) -> Result<Vec<(GraphPath, Vec<RetrievedDocument>)>, CoreError> {
        let paths = self
            .adapters()
            .graph
            .traverse(start_id, edge_type, Direction::Out, max_depth)
            .await?;

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let mut hydrated = Vec::new();
            if hydrate {
                for node_id in &path.node_ids {
                    if let Some(doc) = self.retrieve_document(node_id, true, false).await? {
                        hydrated.push(doc);
                    }
                }
            }
            out.push((path, hydrated));
        }
        Ok(out)
    }
}
