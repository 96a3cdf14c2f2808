//! Pipeline tuning knobs: chunk sizing and cache-on-ingest behavior.
//! There are no retry/backoff knobs here, since an ingestion failure's
//! recovery is "delete everything written so far", not a retryable
//! sub-step.

use crate::chunking::ChunkingTuning;

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub chunking: ChunkingTuning,
    /// Whether `add_resource` also writes a cache copy of the resource.
    pub cache_on_ingest: bool,
    pub cache_ttl_seconds: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        IngestionConfig {
            chunking: ChunkingTuning::default(),
            cache_on_ingest: true,
            cache_ttl_seconds: 3600,
        }
    }
}
