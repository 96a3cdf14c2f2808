//! Tunable parameters for the retrieval query path: candidate count, an
//! optional context token budget, and the recency half-life and
//! preferred-type bias terms that feed the weight record's additive
//! terms.

use common::types::resource::ResourceType;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest neighbours requested from the vector adapter.
    pub k: usize,
    /// Soft cap on assembled context size, measured in whitespace-split
    /// words as a token proxy ( step 4 "up to an optional token
    /// budget"). `None` means unbounded.
    pub token_budget: Option<usize>,
    /// Half-life, in seconds, of the recency bias term: a chunk created
    /// this long ago scores 0.5 on that term, decaying to 0.0 beyond
    /// `2 * recency_half_life_seconds`.
    pub recency_half_life_seconds: f64,
    /// Resource type favoured by the resource-type bias term, if any.
    pub preferred_resource_type: Option<ResourceType>,
    /// How many recent chat messages (same conversation, same source
    /// tool) to inspect when computing the conversation-locality term.
    pub conversation_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            k: 10,
            token_budget: None,
            recency_half_life_seconds: 7.0 * 24.0 * 3600.0,
            preferred_resource_type: None,
            conversation_window: 20,
        }
    }
}
