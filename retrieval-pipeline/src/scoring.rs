//! Scoring and weighting. A weighted fusion (`Scores`/`Scored<T>`/
//! `fuse_scores`) over a 5-term weight record `(α,β,γ,δ,ε)` read from a
//! `ScoringWeights` row at query time.

use common::types::scoring_weights::ScoringWeights;

/// The bounded `[0,1]` signals combined into a chunk's final score.
/// `vector` is raw cosine similarity from the index; the rest are
/// implementation-defined additive bias terms. `reserved` is the weight
/// record's fifth term (ε), carried through but not wired to any signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Signals {
    pub vector: f32,
    pub recency: f32,
    pub resource_type_bias: f32,
    pub conversation_locality: f32,
    pub reserved: f32,
}

#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub item: T,
    pub signals: Signals,
    pub fused: f32,
}

#[must_use]
pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// `fused = α·vector + β·recency + γ·resource_type_bias + δ·conversation_locality + ε·reserved`,
/// clamped to `[0,1]`.
#[must_use]
pub fn fuse(signals: &Signals, weights: &ScoringWeights) -> f32 {
    let fused = weights.alpha * signals.vector
        + weights.beta * signals.recency
        + weights.gamma * signals.resource_type_bias
        + weights.delta * signals.conversation_locality
        + weights.epsilon * signals.reserved;
    clamp_unit(fused)
}

/// Linear recency decay: `1.0` for a chunk created `now`, `0.5` at one
/// half-life old, approaching `0.0` beyond two half-lives.
#[must_use]
pub fn recency_score(
    created_at: chrono::DateTime<chrono::Utc>,
    now: chrono::DateTime<chrono::Utc>,
    half_life_seconds: f64,
) -> f32 {
    if half_life_seconds <= 0.0 {
        return 0.0;
    }
    let elapsed_seconds = f64::from(u32::try_from((now - created_at).num_seconds().max(0)).unwrap_or(u32::MAX));
    let half_lives_elapsed = elapsed_seconds / half_life_seconds;
    clamp_unit(0.5_f32.powf(half_lives_elapsed as f32))
}

pub fn sort_by_fused_desc<T>(items: &mut [Scored<T>]) {
    items.sort_by(|a, b| b.fused.partial_cmp(&a.fused).unwrap_or(std::cmp::Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> ScoringWeights {
        ScoringWeights::defaults()
    }

    #[test]
    fn fuse_matches_default_weight_record() {
        let signals = Signals {
            vector: 0.9,
            recency: 1.0,
            resource_type_bias: 1.0,
            conversation_locality: 1.0,
            reserved: 0.0,
        };
        let w = weights();
        let expected = w.alpha * 0.9 + w.beta + w.gamma + w.delta;
        assert!((fuse(&signals, &w) - expected).abs() < 1e-6);
    }

    #[test]
    fn fuse_is_clamped_to_unit_range() {
        let signals = Signals {
            vector: 1.0,
            recency: 1.0,
            resource_type_bias: 1.0,
            conversation_locality: 1.0,
            reserved: 1.0,
        };
        let w = weights();
        assert!(fuse(&signals, &w) <= 1.0);
    }

    #[test]
    fn recency_score_decays_to_half_at_one_half_life() {
        let now = chrono::Utc::now();
        let created = now - chrono::Duration::seconds(3600);
        let score = recency_score(created, now, 3600.0);
        assert!((score - 0.5).abs() < 0.01);
    }

    #[test]
    fn recency_score_is_one_for_a_fresh_chunk() {
        let now = chrono::Utc::now();
        assert!((recency_score(now, now, 3600.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sort_by_fused_desc_orders_highest_first() {
        let mut items = vec![
            Scored { item: "a", signals: Signals::default(), fused: 0.2 },
            Scored { item: "b", signals: Signals::default(), fused: 0.9 },
            Scored { item: "c", signals: Signals::default(), fused: 0.5 },
        ];
        sort_by_fused_desc(&mut items);
        assert_eq!(items.iter().map(|s| s.item).collect::<Vec<_>>(), vec!["b", "c", "a"]);
    }
}
