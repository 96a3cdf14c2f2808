//! Graph adapter: typed relationships between entity ids, backed by
//! SurrealDB `RELATE` edges in its own namespace/database so it is an
//! independently-failable participant for the coordinator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::{connect, Any};
use surrealdb::Surreal;

use crate::error::{Backend, CoreError};

use super::{reject_write_expression, BackendAdapter, Direction, GraphAdapter, GraphPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntityRow {
    id: String,
    labels: Vec<String>,
    properties: serde_json::Value,
}

#[derive(Clone)]
pub struct SurrealGraphAdapter {
    client: Surreal<Any>,
}

impl SurrealGraphAdapter {
    pub async fn connect(address: &str, namespace: &str, database: &str) -> Result<Self, CoreError> {
        let client = connect(address).await?;
        client.use_ns(namespace).use_db(database).await?;
        Ok(SurrealGraphAdapter { client })
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, CoreError> {
        let client = connect("mem://").await?;
        client.use_ns(namespace).use_db(database).await?;
        Ok(SurrealGraphAdapter { client })
    }

    fn validate_edge_type(edge_type: &str) -> Result<(), CoreError> {
        if edge_type.is_empty()
            || !edge_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(CoreError::Validation(format!(
                "edge type '{edge_type}' must be alphanumeric/underscore"
            )));
        }
        Ok(())
    }

    /// Runs one directional graph-path selection (`arrow`/`field` are one of
    /// `("->", ".out")` for outbound or `("<-", ".in")` for inbound) and
    /// falls back to an empty result when the deep-path form is unsupported
    /// by the connected engine, rather than surfacing a query error.
    async fn traverse_one_way(
        &self,
        start_id: &str,
        edge: &str,
        max_depth: u32,
        arrow: &str,
        field: &str,
    ) -> Vec<GraphPath> {
        let statement = format!("SELECT {arrow}{{1,{max_depth}}}{edge}{field} AS node_ids FROM entities:⟨{start_id}⟩",);
        let response = self.client.query(statement).await;
        let rows: Vec<serde_json::Value> = match response {
            Ok(mut r) => r.take(0).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        let mut paths = Vec::new();
        for row in rows {
            if let Some(ids) = row.get("node_ids").and_then(|v| v.as_array()) {
                let node_ids: Vec<String> = ids
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                if !node_ids.is_empty() {
                    paths.push(GraphPath {
                        node_ids,
                        edge_types: vec![edge.to_string()],
                    });
                }
            }
        }
        paths
    }
}

#[async_trait]
impl BackendAdapter for SurrealGraphAdapter {
    fn backend(&self) -> Backend {
        Backend::Graph
    }

    async fn store(&self, entity_id: &str, payload: serde_json::Value) -> Result<(), CoreError> {
        self.upsert_node(entity_id, &[], payload).await
    }

    async fn delete(&self, entity_id: &str) -> Result<(), CoreError> {
        let _: Option<EntityRow> = self.client.delete(("entities", entity_id)).await?;
        Ok(())
    }

    async fn retrieve(&self, entity_id: &str) -> Result<Option<serde_json::Value>, CoreError> {
        let row: Option<EntityRow> = self.client.select(("entities", entity_id)).await?;
        Ok(row.map(|r| r.properties))
    }

    async fn is_available(&self) -> bool {
        self.client.query("RETURN 1").await.is_ok()
    }
}

#[async_trait]
impl GraphAdapter for SurrealGraphAdapter {
    async fn upsert_node(
        &self,
        id: &str,
        labels: &[String],
        properties: serde_json::Value,
    ) -> Result<(), CoreError> {
        let row = EntityRow {
            id: id.to_string(),
            labels: labels.to_vec(),
            properties,
        };
        let _: Option<EntityRow> = self.client.upsert(("entities", id)).content(row).await?;
        Ok(())
    }

    async fn upsert_edge(
        &self,
        src_id: &str,
        dst_id: &str,
        edge_type: &str,
        properties: serde_json::Value,
    ) -> Result<(), CoreError> {
        Self::validate_edge_type(edge_type)?;
        // Idempotent upsert: drop any prior edge of this type between the
        // same pair, then RELATE fresh, inside one local transaction.
        let statement = format!(
            "BEGIN TRANSACTION;
             LET $src = type::thing('entities', $src_id);
             LET $dst = type::thing('entities', $dst_id);
             DELETE FROM {edge_type} WHERE in = $src AND out = $dst;
             RELATE $src->{edge_type}->$dst SET properties = $properties;
             COMMIT TRANSACTION;"
        );
        self.client
            .query(statement)
            .bind(("src_id", src_id.to_string()))
            .bind(("dst_id", dst_id.to_string()))
            .bind(("properties", properties))
            .await?;
        Ok(())
    }

    async fn traverse(
        &self,
        start_id: &str,
        edge_type: Option<&str>,
        direction: Direction,
        max_depth: u32,
    ) -> Result<Vec<GraphPath>, CoreError> {
        let edge = edge_type.unwrap_or("?");
        if let Some(et) = edge_type {
            Self::validate_edge_type(et)?;
        }
        let paths = match direction {
            Direction::Out => self.traverse_one_way(start_id, edge, max_depth, "->", ".out").await,
            Direction::In => self.traverse_one_way(start_id, edge, max_depth, "<-", ".in").await,
            Direction::Both => {
                let mut paths = self.traverse_one_way(start_id, edge, max_depth, "->", ".out").await;
                paths.extend(self.traverse_one_way(start_id, edge, max_depth, "<-", ".in").await);
                paths
            }
        };
        Ok(paths)
    }

    async fn query_read_only(&self, expression: &str) -> Result<Vec<serde_json::Value>, CoreError> {
        reject_write_expression(expression)?;
        let mut response = self.client.query(expression).await?;
        let rows: Vec<serde_json::Value> = response.take(0)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn memory_adapter() -> SurrealGraphAdapter {
        let database = Uuid::new_v4().to_string();
        SurrealGraphAdapter::memory("test_ns", &database)
            .await
            .expect("failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn upsert_and_retrieve_node() {
        let adapter = memory_adapter().await;
        adapter
            .upsert_node("e1", &["document".to_string()], serde_json::json!({"title": "x"}))
            .await
            .expect("upsert node");
        let retrieved = adapter.retrieve("e1").await.expect("retrieve");
        assert!(retrieved.is_some());
    }

    #[tokio::test]
    async fn traverse_honors_direction() {
        let adapter = memory_adapter().await;
        adapter.upsert_node("a", &[], serde_json::json!({})).await.expect("node a");
        adapter.upsert_node("b", &[], serde_json::json!({})).await.expect("node b");
        adapter
            .upsert_edge("a", "b", "FOLLOWS", serde_json::json!({}))
            .await
            .expect("edge a->b");

        let out = adapter
            .traverse("a", Some("FOLLOWS"), Direction::Out, 1)
            .await
            .expect("out traversal");
        assert!(out.iter().any(|p| p.node_ids.iter().any(|id| id == "b")));

        let inbound = adapter
            .traverse("b", Some("FOLLOWS"), Direction::In, 1)
            .await
            .expect("in traversal");
        assert!(inbound.iter().any(|p| p.node_ids.iter().any(|id| id == "a")));

        let both = adapter
            .traverse("b", Some("FOLLOWS"), Direction::Both, 1)
            .await
            .expect("both traversal");
        assert!(both.iter().any(|p| p.node_ids.iter().any(|id| id == "a")));
    }

    #[tokio::test]
    async fn query_read_only_rejects_write_expression() {
        let adapter = memory_adapter().await;
        let err = adapter
            .query_read_only("CREATE entities SET id = 'x'")
            .await
            .expect_err("should reject");
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
