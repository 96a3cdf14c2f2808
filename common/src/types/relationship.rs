use serde::{Deserialize, Serialize};

/// A typed, directed edge between two entity ids in the graph store. Lives
/// natively in the graph adapter; it is not a transactional row, so it does
/// not implement [`crate::types::StoredObject`] the way the row-shaped
/// entities do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    #[serde(rename = "in")]
    pub source_id: String,
    pub out: String,
    pub relationship_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl Relationship {
    #[must_use]
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: impl Into<String>,
        properties: serde_json::Value,
    ) -> Self {
        Relationship {
            source_id: source_id.into(),
            out: target_id.into(),
            relationship_type: relationship_type.into(),
            properties,
        }
    }
}
