//! In-memory stand-ins for all four adapters, gated by the `test-utils`
//! feature, giving every storage layer a fast, isolated,
//! no-external-service test double.
#![cfg(any(test, feature = "test-utils"))]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Backend, CoreError};

use super::{reject_write_expression, BackendAdapter, CacheAdapter, Direction, GraphAdapter, GraphPath, VectorAdapter};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    rows: Mutex<HashMap<String, serde_json::Value>>,
    available: std::sync::atomic::AtomicBool,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        InMemoryDocumentStore {
            rows: Mutex::new(HashMap::new()),
            available: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, std::sync::atomic::Ordering::SeqCst);
    }
}

macro_rules! impl_document_backend {
    ($ty:ty, $backend:expr) => {
        #[async_trait]
        impl BackendAdapter for $ty {
            fn backend(&self) -> Backend {
                $backend
            }

            async fn store(&self, entity_id: &str, payload: serde_json::Value) -> Result<(), CoreError> {
                if !self.document_store.available.load(std::sync::atomic::Ordering::SeqCst) {
                    return Err(CoreError::Unavailable {
                        backend: $backend,
                        message: "forced unavailable for test".to_string(),
                    });
                }
                self.document_store
                    .rows
                    .lock()
                    .expect("lock poisoned")
                    .insert(entity_id.to_string(), payload);
                Ok(())
            }

            async fn delete(&self, entity_id: &str) -> Result<(), CoreError> {
                if !self.document_store.available.load(std::sync::atomic::Ordering::SeqCst) {
                    return Err(CoreError::Unavailable {
                        backend: $backend,
                        message: "forced unavailable for test".to_string(),
                    });
                }
                self.document_store.rows.lock().expect("lock poisoned").remove(entity_id);
                Ok(())
            }

            async fn retrieve(&self, entity_id: &str) -> Result<Option<serde_json::Value>, CoreError> {
                if !self.document_store.available.load(std::sync::atomic::Ordering::SeqCst) {
                    return Err(CoreError::Unavailable {
                        backend: $backend,
                        message: "forced unavailable for test".to_string(),
                    });
                }
                Ok(self.document_store.rows.lock().expect("lock poisoned").get(entity_id).cloned())
            }

            async fn is_available(&self) -> bool {
                self.document_store.available.load(std::sync::atomic::Ordering::SeqCst)
            }
        }
    };
}

pub struct InMemoryVectorAdapter {
    document_store: InMemoryDocumentStore,
    vectors: Mutex<HashMap<i64, (Vec<f32>, serde_json::Value)>>,
    dimension: usize,
}

impl InMemoryVectorAdapter {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        InMemoryVectorAdapter {
            document_store: InMemoryDocumentStore::new(),
            vectors: Mutex::new(HashMap::new()),
            dimension,
        }
    }

    pub fn set_available(&self, available: bool) {
        self.document_store.set_available(available);
    }
}

impl_document_backend!(InMemoryVectorAdapter, Backend::Vector);

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorAdapter for InMemoryVectorAdapter {
    async fn upsert(&self, vector_id: i64, vector: Vec<f32>, metadata: serde_json::Value) -> Result<(), CoreError> {
        if vector.len() != self.dimension {
            return Err(CoreError::Validation(format!(
                "expected a {}-dimensional vector, got {}",
                self.dimension,
                vector.len()
            )));
        }
        self.vectors.lock().expect("lock poisoned").insert(vector_id, (vector, metadata));
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        _filter: Option<&serde_json::Value>,
    ) -> Result<Vec<(i64, f32, serde_json::Value)>, CoreError> {
        if query_vector.len() != self.dimension {
            return Err(CoreError::Validation(format!(
                "expected a {}-dimensional vector, got {}",
                self.dimension,
                query_vector.len()
            )));
        }
        let vectors = self.vectors.lock().expect("lock poisoned");
        let mut scored: Vec<(i64, f32, serde_json::Value)> = vectors
            .iter()
            .map(|(id, (vec, metadata))| (*id, cosine_similarity(query_vector, vec), metadata.clone()))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn remove(&self, vector_id: i64) -> Result<(), CoreError> {
        self.vectors.lock().expect("lock poisoned").remove(&vector_id);
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub struct InMemoryGraphAdapter {
    document_store: InMemoryDocumentStore,
    edges: Mutex<Vec<(String, String, String)>>,
}

impl InMemoryGraphAdapter {
    #[must_use]
    pub fn new() -> Self {
        InMemoryGraphAdapter {
            document_store: InMemoryDocumentStore::new(),
            edges: Mutex::new(Vec::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.document_store.set_available(available);
    }
}

impl Default for InMemoryGraphAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl_document_backend!(InMemoryGraphAdapter, Backend::Graph);

#[async_trait]
impl GraphAdapter for InMemoryGraphAdapter {
    async fn upsert_node(&self, id: &str, labels: &[String], properties: serde_json::Value) -> Result<(), CoreError> {
        let _ = labels;
        self.store(id, properties).await
    }

    async fn upsert_edge(
        &self,
        src_id: &str,
        dst_id: &str,
        edge_type: &str,
        _properties: serde_json::Value,
    ) -> Result<(), CoreError> {
        let mut edges = self.edges.lock().expect("lock poisoned");
        edges.retain(|(s, d, t)| !(s == src_id && d == dst_id && t == edge_type));
        edges.push((src_id.to_string(), dst_id.to_string(), edge_type.to_string()));
        Ok(())
    }

    async fn traverse(
        &self,
        start_id: &str,
        edge_type: Option<&str>,
        direction: Direction,
        max_depth: u32,
    ) -> Result<Vec<GraphPath>, CoreError> {
        let edges = self.edges.lock().expect("lock poisoned");
        let mut paths = Vec::new();
        let mut frontier = vec![start_id.to_string()];
        let mut visited = std::collections::HashSet::new();
        visited.insert(start_id.to_string());
        for _ in 0..max_depth {
            let mut next = Vec::new();
            for node in &frontier {
                for (s, d, t) in edges.iter() {
                    if let Some(et) = edge_type {
                        if t != et {
                            continue;
                        }
                    }
                    let neighbor = match direction {
                        Direction::Out if s == node => Some(d.clone()),
                        Direction::In if d == node => Some(s.clone()),
                        Direction::Both if s == node => Some(d.clone()),
                        Direction::Both if d == node => Some(s.clone()),
                        _ => None,
                    };
                    if let Some(n) = neighbor {
                        if visited.insert(n.clone()) {
                            paths.push(GraphPath {
                                node_ids: vec![node.clone(), n.clone()],
                                edge_types: vec![t.clone()],
                            });
                            next.push(n);
                        }
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        Ok(paths)
    }

    async fn query_read_only(&self, expression: &str) -> Result<Vec<serde_json::Value>, CoreError> {
        reject_write_expression(expression)?;
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct InMemoryCacheAdapter {
    entries: Mutex<HashMap<String, String>>,
    available: std::sync::atomic::AtomicBool,
}

impl InMemoryCacheAdapter {
    #[must_use]
    pub fn new() -> Self {
        InMemoryCacheAdapter {
            entries: Mutex::new(HashMap::new()),
            available: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendAdapter for InMemoryCacheAdapter {
    fn backend(&self) -> Backend {
        Backend::Cache
    }

    async fn store(&self, entity_id: &str, payload: serde_json::Value) -> Result<(), CoreError> {
        self.set(entity_id, &payload.to_string(), 3600).await
    }

    async fn delete(&self, entity_id: &str) -> Result<(), CoreError> {
        self.entries.lock().expect("lock poisoned").remove(entity_id);
        Ok(())
    }

    async fn retrieve(&self, entity_id: &str) -> Result<Option<serde_json::Value>, CoreError> {
        let raw = self.get_value(entity_id).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(CoreError::from)).transpose()
    }

    async fn is_available(&self) -> bool {
        self.available.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheAdapter for InMemoryCacheAdapter {
    async fn set(&self, key: &str, value: &str, _ttl_seconds: u64) -> Result<(), CoreError> {
        // TTL expiry is not modeled in-memory; the cache is advisory, so
        // tests only need presence/absence, not real expiry.
        self.entries
            .lock()
            .expect("lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.entries.lock().expect("lock poisoned").get(key).cloned())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CoreError> {
        self.entries.lock().expect("lock poisoned").retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }

    async fn publish(&self, _channel: &str, _message: &str) -> Result<(), CoreError> {
        Ok(())
    }

    async fn store_with_ttl(
        &self,
        entity_id: &str,
        payload: serde_json::Value,
        ttl_seconds: u64,
    ) -> Result<(), CoreError> {
        self.set(entity_id, &payload.to_string(), ttl_seconds).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vector_search_ranks_by_cosine_similarity() {
        let adapter = InMemoryVectorAdapter::new(2);
        adapter.upsert(1, vec![1.0, 0.0], serde_json::json!({})).await.unwrap();
        adapter.upsert(2, vec![0.0, 1.0], serde_json::json!({})).await.unwrap();
        let results = adapter.search(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(results.first().map(|(id, ..)| *id), Some(1));
    }

    #[tokio::test]
    async fn graph_traverse_follows_out_edges() {
        let adapter = InMemoryGraphAdapter::new();
        adapter.upsert_edge("a", "b", "FOLLOWS", serde_json::json!({})).await.unwrap();
        adapter.upsert_edge("b", "c", "FOLLOWS", serde_json::json!({})).await.unwrap();
        let paths = adapter
            .traverse("a", Some("FOLLOWS"), Direction::Out, 5)
            .await
            .unwrap();
        let reached: Vec<String> = paths.iter().map(|p| p.node_ids[1].clone()).collect();
        assert!(reached.contains(&"b".to_string()));
        assert!(reached.contains(&"c".to_string()));
    }

    #[tokio::test]
    async fn unavailable_document_store_fails_fast() {
        let adapter = InMemoryVectorAdapter::new(2);
        adapter.set_available(false);
        let err = adapter.store("x", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, CoreError::Unavailable { .. }));
    }
}
