//! Autonomous Context Extractor. Kept deliberately separate from
//! [`crate::chain::ThoughtChainEngine`]'s write path: `extract` never
//! opens a transaction or writes anything, it only resolves identifiers
//! a caller omitted and records where each one came from, so the write
//! path stays a thin consumer of whatever this function hands back.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use common::error::CoreError;
use common::types::validate_identifier;

/// Where a filled field's value came from, in priority order (used both
/// for diagnostics and for confidence weighting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    Explicit,
    TransportMetadata,
    HostState,
    RecentState,
    ContentInference,
    FreshSynthesis,
}

impl ContextSource {
    /// Per-field confidence increment. Transport metadata carries the same
    /// medium trust as host-provided state and sits directly above it in
    /// the priority list, so it is priced identically here.
    fn weight(self) -> f32 {
        match self {
            ContextSource::Explicit => 0.2,
            ContextSource::TransportMetadata | ContextSource::HostState => 0.15,
            ContextSource::RecentState => 0.10,
            ContextSource::FreshSynthesis => 0.05,
            ContextSource::ContentInference => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilledField<T> {
    pub value: T,
    pub source: ContextSource,
}

/// Keyword-classified intent category, attached to
/// extracted context as a hint rather than used to resolve identifiers
/// directly — none of the closed-set categories name a usable session or
/// conversation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentCategory {
    Analytical,
    ProblemSolving,
    Creative,
    Explanatory,
    Comparative,
    Exploratory,
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntentCategory::Analytical => "analytical",
            IntentCategory::ProblemSolving => "problem-solving",
            IntentCategory::Creative => "creative",
            IntentCategory::Explanatory => "explanatory",
            IntentCategory::Comparative => "comparative",
            IntentCategory::Exploratory => "exploratory",
        };
        f.write_str(s)
    }
}

/// Caller-supplied inputs at every priority level above content inference
/// and fresh synthesis. Every field is optional; `extract` fills whatever
/// is missing.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRequest {
    pub explicit_session_id: Option<String>,
    pub explicit_conversation_id: Option<String>,
    pub explicit_agent_name: Option<String>,
    pub explicit_previous_thought_id: Option<String>,
    pub explicit_step_number: Option<u32>,

    pub transport_correlation_id: Option<String>,
    pub transport_client_session_id: Option<String>,
    pub transport_request_id: Option<String>,

    pub host_session_id: Option<String>,
    pub host_conversation_id: Option<String>,
    pub host_agent_name: Option<String>,

    pub content: String,
}

/// Injected lookups for priority 4 ("recent-state") and chain recovery.
/// Implemented in `main` against the transactional/cache adapters; kept as
/// a trait here so this module never depends on `coordinator` or holds an
/// `AdapterSet` of its own.
#[async_trait]
pub trait ContextLookup: Send + Sync {
    /// Most recently active session within `within_seconds` (e.g. "most
    /// recent session in the last 5 minutes").
    async fn recent_session_id(&self, within_seconds: i64) -> Result<Option<String>, CoreError>;

    /// Latest thought id recorded for `session_id`, for chain recovery's
    /// fallback step and priority-4 "latest thought for the chosen session".
    async fn latest_thought_id(&self, session_id: &str) -> Result<Option<String>, CoreError>;

    /// Thought id at `session_id, step_number`, for chain recovery's
    /// primary lookup (`previous_thought_id` unknown, `step_number - 1`).
    async fn thought_id_at_step(&self, session_id: &str, step_number: u32) -> Result<Option<String>, CoreError>;
}

#[derive(Debug, Clone)]
pub struct FilledContext {
    pub session_id: FilledField<String>,
    pub conversation_id: FilledField<String>,
    pub agent_name: Option<FilledField<String>>,
    pub previous_thought_id: Option<FilledField<String>>,
    pub step_number: FilledField<u32>,
    pub inferred_intent: IntentCategory,
    /// Set when `previous_thought_id` came from chain recovery's fallback
    /// (latest thought in session, not the exact `step_number - 1` match).
    pub chain_recovery_approximate: bool,
}

const MAX_METADATA_BYTES: usize = 10 * 1024;
const RECENT_STATE_WINDOW_SECONDS: i64 = 5 * 60;

fn hash8(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

fn classify_intent(content: &str) -> (IntentCategory, f32) {
    const KEYWORDS: &[(IntentCategory, &[&str])] = &[
        (IntentCategory::ProblemSolving, &["fix", "bug", "solve", "debug", "error"]),
        (IntentCategory::Analytical, &["analyze", "why", "cause", "evaluate", "assess"]),
        (IntentCategory::Creative, &["design", "brainstorm", "idea", "imagine", "invent"]),
        (IntentCategory::Explanatory, &["explain", "clarify", "how does", "walk through"]),
        (IntentCategory::Comparative, &["versus", "compare", " vs ", "better than"]),
        (IntentCategory::Exploratory, &["explore", "investigate", "what if", "consider"]),
    ];
    let lowered = content.to_ascii_lowercase();
    let mut best = (IntentCategory::Exploratory, 0usize);
    for (category, keywords) in KEYWORDS {
        let hits = keywords.iter().filter(|kw| lowered.contains(*kw)).count();
        if hits > best.1 {
            best = (*category, hits);
        }
    }
    let confidence = if best.1 == 0 { 0.3 } else { (best.1 as f32 / 3.0).min(1.0) };
    (best.0, confidence)
}

fn resolve_session_id(
    request: &ExtractionRequest,
    recent: Option<String>,
) -> FilledField<String> {
    if let Some(value) = &request.explicit_session_id {
        return FilledField { value: value.clone(), source: ContextSource::Explicit };
    }
    if let Some(value) = &request.transport_client_session_id {
        return FilledField { value: value.clone(), source: ContextSource::TransportMetadata };
    }
    if let Some(value) = &request.host_session_id {
        return FilledField { value: value.clone(), source: ContextSource::HostState };
    }
    if let Some(value) = recent {
        return FilledField { value, source: ContextSource::RecentState };
    }
    let now = chrono::Utc::now().timestamp();
    FilledField {
        value: format!("session_{now}_{}", hash8(&format!("{now}{}", request.content))),
        source: ContextSource::FreshSynthesis,
    }
}

fn resolve_conversation_id(request: &ExtractionRequest, session: &FilledField<String>) -> FilledField<String> {
    if let Some(value) = &request.explicit_conversation_id {
        return FilledField { value: value.clone(), source: ContextSource::Explicit };
    }
    if let Some(value) = request.transport_correlation_id.as_ref().or(request.transport_request_id.as_ref()) {
        return FilledField { value: value.clone(), source: ContextSource::TransportMetadata };
    }
    if let Some(value) = &request.host_conversation_id {
        return FilledField { value: value.clone(), source: ContextSource::HostState };
    }
    let now = chrono::Utc::now().timestamp();
    let base36_now = to_base36(u64::try_from(now).unwrap_or(0));
    let session_hash = hash8(&session.value);
    let seq = u32::try_from(now.unsigned_abs() % 1000).unwrap_or(0);
    FilledField {
        value: format!("conv_{base36_now}_{session_hash}_{seq:03}"),
        source: ContextSource::FreshSynthesis,
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[usize::try_from(n % 36).unwrap_or(0)]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_else(|_| "0".to_string())
}

fn resolve_agent_name(request: &ExtractionRequest) -> Option<FilledField<String>> {
    if let Some(value) = &request.explicit_agent_name {
        return Some(FilledField { value: value.clone(), source: ContextSource::Explicit });
    }
    request
        .host_agent_name
        .as_ref()
        .map(|value| FilledField { value: value.clone(), source: ContextSource::HostState })
}

/// Resolves `previous_thought_id`/`step_number` and, when `step_number > 1`
/// and no `previous_thought_id` is known, performs chain recovery.
async fn resolve_chain_position(
    request: &ExtractionRequest,
    session_id: &str,
    lookup: &dyn ContextLookup,
) -> Result<(FilledField<u32>, Option<FilledField<String>>, bool), CoreError> {
    let step_number = match request.explicit_step_number {
        Some(value) => FilledField { value, source: ContextSource::Explicit },
        None => FilledField { value: 1, source: ContextSource::FreshSynthesis },
    };

    if let Some(value) = &request.explicit_previous_thought_id {
        return Ok((step_number, Some(FilledField { value: value.clone(), source: ContextSource::Explicit }), false));
    }

    if step_number.value <= 1 {
        return Ok((step_number, None, false));
    }

    if let Some(id) = lookup.thought_id_at_step(session_id, step_number.value.saturating_sub(1)).await? {
        return Ok((step_number, Some(FilledField { value: id, source: ContextSource::RecentState }), false));
    }
    if let Some(id) = lookup.latest_thought_id(session_id).await? {
        return Ok((step_number, Some(FilledField { value: id, source: ContextSource::RecentState }), true));
    }
    Ok((step_number, None, false))
}

/// Fills every identifier the caller omitted and returns the filled
/// context alongside its confidence.
#[tracing::instrument(skip(request, lookup), fields(has_explicit_session = request.explicit_session_id.is_some()))]
pub async fn extract(request: &ExtractionRequest, lookup: &dyn ContextLookup) -> Result<(FilledContext, f32), CoreError> {
    let recent_session = if request.explicit_session_id.is_none()
        && request.transport_client_session_id.is_none()
        && request.host_session_id.is_none()
    {
        lookup.recent_session_id(RECENT_STATE_WINDOW_SECONDS).await?
    } else {
        None
    };

    let session_id = resolve_session_id(request, recent_session);
    validate_identifier(&session_id.value)?;

    let conversation_id = resolve_conversation_id(request, &session_id);
    validate_identifier(&conversation_id.value)?;

    let agent_name = resolve_agent_name(request);
    if let Some(field) = &agent_name {
        validate_identifier(&field.value)?;
    }

    let (step_number, previous_thought_id, chain_recovery_approximate) =
        resolve_chain_position(request, &session_id.value, lookup).await?;
    if let Some(field) = &previous_thought_id {
        validate_identifier(&field.value)?;
    }

    let (inferred_intent, content_confidence) = classify_intent(&request.content);

    let mut weight_sum = session_id.source.weight() + conversation_id.source.weight() + step_number.source.weight();
    if let Some(field) = &agent_name {
        weight_sum += field.source.weight();
    }
    if let Some(field) = &previous_thought_id {
        weight_sum += field.source.weight();
        weight_sum += 0.1; // a recovered chain link adds a fixed bonus
    }

    let has_required = !session_id.value.is_empty()
        && !conversation_id.value.is_empty()
        && (step_number.value <= 1 || previous_thought_id.is_some());
    if has_required {
        weight_sum += 0.2; // a context complete enough to write with gets a further bonus
    }

    let structural_confidence = weight_sum.clamp(0.0, 1.0);
    let confidence = ((structural_confidence + content_confidence) / 2.0).clamp(0.0, 1.0);

    let metadata_probe = serde_json::json!({
        "session_source": format!("{session_id:?}"),
        "intent": inferred_intent.to_string(),
    });
    common::types::validate_metadata(&metadata_probe, MAX_METADATA_BYTES)?;

    Ok((
        FilledContext {
            session_id,
            conversation_id,
            agent_name,
            previous_thought_id,
            step_number,
            inferred_intent,
            chain_recovery_approximate,
        },
        confidence,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct StubLookup {
        recent_session: Option<String>,
        thoughts_by_step: Mutex<HashMap<(String, u32), String>>,
        latest: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl ContextLookup for StubLookup {
        async fn recent_session_id(&self, _within_seconds: i64) -> Result<Option<String>, CoreError> {
            Ok(self.recent_session.clone())
        }

        async fn latest_thought_id(&self, session_id: &str) -> Result<Option<String>, CoreError> {
            Ok(self.latest.lock().await.get(session_id).cloned())
        }

        async fn thought_id_at_step(&self, session_id: &str, step_number: u32) -> Result<Option<String>, CoreError> {
            Ok(self.thoughts_by_step.lock().await.get(&(session_id.to_string(), step_number)).cloned())
        }
    }

    fn request(content: &str) -> ExtractionRequest {
        ExtractionRequest { content: content.to_string(), ..Default::default() }
    }

    #[tokio::test]
    async fn explicit_session_id_wins_over_everything_else() {
        let lookup = StubLookup { recent_session: Some("recent-session".to_string()), ..Default::default() };
        let mut req = request("analyze the failure");
        req.explicit_session_id = Some("explicit-session".to_string());
        let (filled, _confidence) = extract(&req, &lookup).await.expect("extract");
        assert_eq!(filled.session_id.value, "explicit-session");
        assert_eq!(filled.session_id.source, ContextSource::Explicit);
    }

    #[tokio::test]
    async fn falls_back_to_recent_state_then_fresh_synthesis() {
        let with_recent = StubLookup { recent_session: Some("recent-session".to_string()), ..Default::default() };
        let (filled, _) = extract(&request("hello"), &with_recent).await.expect("extract");
        assert_eq!(filled.session_id.source, ContextSource::RecentState);

        let without_recent = StubLookup::default();
        let (filled, _) = extract(&request("hello"), &without_recent).await.expect("extract");
        assert_eq!(filled.session_id.source, ContextSource::FreshSynthesis);
        assert!(filled.session_id.value.starts_with("session_"));
        assert!(filled.conversation_id.value.starts_with("conv_"));
    }

    #[tokio::test]
    async fn chain_recovery_finds_exact_predecessor_first() {
        let lookup = StubLookup::default();
        lookup.thoughts_by_step.lock().await.insert(("s1".to_string(), 2), "t-prev".to_string());

        let mut req = request("continue the plan");
        req.explicit_session_id = Some("s1".to_string());
        req.explicit_step_number = Some(3);
        let (filled, _) = extract(&req, &lookup).await.expect("extract");
        let previous = filled.previous_thought_id.expect("recovered link");
        assert_eq!(previous.value, "t-prev");
        assert!(!filled.chain_recovery_approximate);
    }

    #[tokio::test]
    async fn chain_recovery_falls_back_to_latest_thought_and_marks_approximate() {
        let lookup = StubLookup::default();
        lookup.latest.lock().await.insert("s1".to_string(), "t-latest".to_string());

        let mut req = request("continue the plan");
        req.explicit_session_id = Some("s1".to_string());
        req.explicit_step_number = Some(3);
        let (filled, _) = extract(&req, &lookup).await.expect("extract");
        let previous = filled.previous_thought_id.expect("recovered link");
        assert_eq!(previous.value, "t-latest");
        assert!(filled.chain_recovery_approximate);
    }

    #[tokio::test]
    async fn complete_explicit_context_yields_high_confidence() {
        let lookup = StubLookup::default();
        let mut req = request("explain the root cause of this outage");
        req.explicit_session_id = Some("s1".to_string());
        req.explicit_conversation_id = Some("c1".to_string());
        req.explicit_step_number = Some(1);
        let (_filled, confidence) = extract(&req, &lookup).await.expect("extract");
        assert!(confidence > 0.3, "confidence was {confidence}");
    }

    #[tokio::test]
    async fn rejects_identifiers_outside_the_safe_character_class() {
        let lookup = StubLookup::default();
        let mut req = request("hi");
        req.explicit_session_id = Some("bad; drop table".to_string());
        let err = extract(&req, &lookup).await.expect_err("should reject");
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
