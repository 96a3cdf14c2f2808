use crate::stored_object;

/// The retrieval scoring weight record `(α,β,γ,δ,ε)`, stored as a single
/// well-known row, read at query time with defaults applied when absent.
stored_object!(ScoringWeights, "scoring_weights", {
    alpha: f32,
    beta: f32,
    gamma: f32,
    delta: f32,
    epsilon: f32,
});

pub const SINGLETON_ID: &str = "default";

impl ScoringWeights {
    #[must_use]
    pub fn defaults() -> Self {
        let now = chrono::Utc::now();
        ScoringWeights {
            id: SINGLETON_ID.to_string(),
            created_at: now,
            updated_at: now,
            alpha: 1.0,
            beta: 0.2,
            gamma: 0.1,
            delta: 0.05,
            epsilon: 0.1,
        }
    }
}
