use serde::{Deserialize, Serialize};

/// The payload shape stored under a single entity id across the
/// transactional, vector (as metadata) and graph (as node properties)
/// stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "serde_json::Value::default")]
    pub metadata: serde_json::Value,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Document {
    #[must_use]
    pub fn new(content: impl Into<String>, tags: Vec<String>, metadata: serde_json::Value, cache_ttl_seconds: u64) -> Self {
        Document {
            content: content.into(),
            tags,
            metadata,
            cache_ttl_seconds,
        }
    }

    pub fn has_any_tag(&self, filter_tags: &[String]) -> bool {
        filter_tags.iter().any(|t| self.tags.contains(t))
    }
}
