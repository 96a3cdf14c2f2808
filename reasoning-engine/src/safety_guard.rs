//! Recursion & Safety Guard. Holds no adapter handles of
//! its own; [`crate::chain::ThoughtChainEngine`] consults it immediately
//! before building a write transaction and reports the outcome back after.
//! Per-session state lives in a plain `tokio::sync::Mutex<HashMap<..>>`,
//! kept deliberately free of extra concurrent-map dependencies.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use common::config::AppConfig;
use common::error::CoreError;
use common::types::validate_metadata;

const DENY_LIST: [&str; 5] = ["<script", "javascript:", "eval(", "exec(", "__import__"];

/// Safe/Warning/Critical/Blocked/Recovering, in order of increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Safe,
    Warning,
    Critical,
    Blocked,
    Recovering,
}

#[derive(Debug, Clone, Copy)]
pub struct GuardDecision {
    pub state: GuardState,
    pub depth: u32,
}

/// Advisory recovery strategy returned alongside a failed write. The
/// caller decides whether and how to act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    RetryWithBackoff,
    ReduceComplexity,
    ResetChain,
    Sanitize,
    Degrade,
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoveryStrategy::RetryWithBackoff => "retry-with-backoff",
            RecoveryStrategy::ReduceComplexity => "reduce-complexity",
            RecoveryStrategy::ResetChain => "reset-chain",
            RecoveryStrategy::Sanitize => "sanitize",
            RecoveryStrategy::Degrade => "degrade",
        };
        f.write_str(s)
    }
}

/// Selects a recovery strategy by scanning the error's message for a small
/// set of known keywords. Pure and static: it never touches guard state.
#[must_use]
pub fn recovery_strategy(error: &CoreError) -> RecoveryStrategy {
    let message = error.to_string().to_ascii_lowercase();
    if message.contains("timeout") {
        RecoveryStrategy::RetryWithBackoff
    } else if message.contains("memory") {
        RecoveryStrategy::ReduceComplexity
    } else if message.contains("recursion") {
        RecoveryStrategy::ResetChain
    } else if message.contains("valueerror") || message.contains("typeerror") {
        RecoveryStrategy::Sanitize
    } else {
        RecoveryStrategy::Degrade
    }
}

#[derive(Debug, Clone)]
pub struct AdmitRequest {
    pub session_id: String,
    pub parent_thought_id: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub metadata: serde_json::Value,
    pub estimated_bytes: u64,
}

#[derive(Debug, Default)]
struct SessionGuardState {
    depths: HashMap<String, u32>,
    recent_hashes: VecDeque<String>,
    loop_violations: u32,
    circuit_open_until: Option<Instant>,
    recovering: bool,
    concurrent_ops: u32,
    memory_estimate_bytes: u64,
}

pub struct SafetyGuard {
    sessions: Mutex<HashMap<String, SessionGuardState>>,
    warning_threshold: u32,
    max_depth: u32,
    loop_window: usize,
    circuit_breaker_timeout: Duration,
    max_content_bytes: usize,
    max_metadata_bytes: usize,
    max_concurrent_ops: u32,
    max_memory_bytes: u64,
}

impl SafetyGuard {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        SafetyGuard {
            sessions: Mutex::new(HashMap::new()),
            warning_threshold: config.warning_depth,
            max_depth: config.max_depth,
            loop_window: config.loop_window,
            circuit_breaker_timeout: Duration::from_secs(config.circuit_breaker_timeout_secs),
            max_content_bytes: config.max_content_bytes,
            max_metadata_bytes: config.max_metadata_bytes,
            max_concurrent_ops: config.max_concurrent_ops,
            max_memory_bytes: config.max_memory_mb.saturating_mul(1024 * 1024),
        }
    }

    fn validate_content(content: &str, max_bytes: usize) -> Result<(), CoreError> {
        if content.is_empty() {
            return Err(CoreError::Validation("content must not be empty".to_string()));
        }
        if content.len() > max_bytes {
            return Err(CoreError::Validation(format!(
                "content is {} bytes, exceeds limit of {max_bytes}",
                content.len()
            )));
        }
        let lowered = content.to_ascii_lowercase();
        if let Some(marker) = DENY_LIST.iter().find(|needle| lowered.contains(**needle)) {
            return Err(CoreError::Validation(format!("content contains disallowed marker '{marker}'")));
        }
        Ok(())
    }

    /// Exact hash repetition, or the last N hashes matching the N hashes
    /// before them for N in {2, 3}.
    fn detects_loop(window: &VecDeque<String>, new_hash: &str) -> bool {
        if window.iter().any(|h| h == new_hash) {
            return true;
        }
        let mut extended: Vec<&str> = window.iter().map(String::as_str).collect();
        extended.push(new_hash);
        for n in [2usize, 3usize] {
            if extended.len() >= 2 * n {
                let tail = &extended[extended.len() - n..];
                let before = &extended[extended.len() - 2 * n..extended.len() - n];
                if tail == before {
                    return true;
                }
            }
        }
        false
    }

    /// Runs every pre-write check in order and, on success, reserves
    /// a concurrency slot and the memory estimate for the caller. The
    /// caller must call [`SafetyGuard::end_operation`] once the write
    /// finishes (success or failure) to release the concurrency slot.
    #[tracing::instrument(skip(self, request), fields(session_id = %request.session_id))]
    pub async fn admit(&self, request: AdmitRequest) -> Result<GuardDecision, CoreError> {
        Self::validate_content(&request.content, self.max_content_bytes)?;
        validate_metadata(&request.metadata, self.max_metadata_bytes)?;

        let mut sessions = self.sessions.lock().await;
        let state = sessions.entry(request.session_id.clone()).or_default();

        if state.recovering {
            return Err(CoreError::RecursionBlocked(format!(
                "session '{}' is in emergency recovery",
                request.session_id
            )));
        }

        if let Some(until) = state.circuit_open_until {
            if Instant::now() < until {
                return Err(CoreError::RecursionBlocked(format!(
                    "circuit breaker open for session '{}'",
                    request.session_id
                )));
            }
            state.circuit_open_until = None;
            state.loop_violations = 0;
            state.recent_hashes.clear();
        }

        let depth = request
            .parent_thought_id
            .as_deref()
            .map_or(0, |parent| state.depths.get(parent).copied().unwrap_or(0) + 1);

        if depth >= self.max_depth {
            return Err(CoreError::RecursionBlocked(format!(
                "depth {depth} reached max_depth {} for session '{}'",
                self.max_depth, request.session_id
            )));
        }

        if Self::detects_loop(&state.recent_hashes, &request.content_hash) {
            state.loop_violations = state.loop_violations.saturating_add(1);
            state.circuit_open_until = Some(Instant::now() + self.circuit_breaker_timeout);
            return Err(CoreError::RecursionBlocked(format!(
                "loop detected in session '{}' ({} prior violations)",
                request.session_id, state.loop_violations
            )));
        }

        if state.concurrent_ops >= self.max_concurrent_ops {
            return Err(CoreError::ResourceExhausted(format!(
                "session '{}' has {} concurrent operations, limit is {}",
                request.session_id, state.concurrent_ops, self.max_concurrent_ops
            )));
        }

        let projected_memory = state.memory_estimate_bytes.saturating_add(request.estimated_bytes);
        if projected_memory > self.max_memory_bytes {
            return Err(CoreError::ResourceExhausted(format!(
                "session '{}' memory estimate {projected_memory}B exceeds limit of {}B",
                request.session_id, self.max_memory_bytes
            )));
        }

        state.recent_hashes.push_back(request.content_hash.clone());
        while state.recent_hashes.len() > self.loop_window {
            state.recent_hashes.pop_front();
        }
        state.concurrent_ops = state.concurrent_ops.saturating_add(1);
        state.memory_estimate_bytes = projected_memory;

        let guard_state = if depth >= self.warning_threshold { GuardState::Warning } else { GuardState::Safe };
        if guard_state == GuardState::Warning {
            tracing::warn!(session_id = %request.session_id, depth, "session approaching max_depth");
        }

        Ok(GuardDecision { state: guard_state, depth })
    }

    /// Records the depth of a thought that was actually committed, so a
    /// later child can look its parent's depth up by id.
    pub async fn record_commit(&self, session_id: &str, thought_id: &str, depth: u32) {
        let mut sessions = self.sessions.lock().await;
        let state = sessions.entry(session_id.to_string()).or_default();
        state.depths.insert(thought_id.to_string(), depth);
    }

    /// Releases the concurrency slot [`SafetyGuard::admit`] reserved.
    pub async fn end_operation(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(state) = sessions.get_mut(session_id) {
            state.concurrent_ops = state.concurrent_ops.saturating_sub(1);
        }
    }

    /// Enters `Recovering`: all further writes are rejected until
    /// [`SafetyGuard::clear_recovery`] is called.
    pub async fn begin_emergency_recovery(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(session_id.to_string()).or_default().recovering = true;
    }

    pub async fn clear_recovery(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(state) = sessions.get_mut(session_id) {
            state.recovering = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SafetyGuard {
        SafetyGuard::new(&AppConfig {
            warning_depth: 7,
            max_depth: 10,
            loop_window: 5,
            circuit_breaker_timeout_secs: 30,
            max_content_bytes: 1024,
            max_metadata_bytes: 1024,
            max_concurrent_ops: 2,
            max_memory_mb: 1,
            ..AppConfig::default()
        })
    }

    fn request(session_id: &str, content: &str) -> AdmitRequest {
        AdmitRequest {
            session_id: session_id.to_string(),
            parent_thought_id: None,
            content: content.to_string(),
            content_hash: format!("hash-of-{content}"),
            metadata: serde_json::json!({}),
            estimated_bytes: 10,
        }
    }

    #[tokio::test]
    async fn first_write_is_safe_at_depth_zero() {
        let guard = guard();
        let decision = guard.admit(request("s1", "first thought")).await.expect("admit");
        assert_eq!(decision.depth, 0);
        assert_eq!(decision.state, GuardState::Safe);
    }

    #[tokio::test]
    async fn depth_tracks_parent_chain_and_blocks_at_max_depth() {
        let guard = guard();
        let mut parent: Option<String> = None;
        for step in 0..10 {
            let mut req = request("s1", &format!("thought {step}"));
            req.parent_thought_id = parent.clone();
            let decision = guard.admit(req).await.expect("admit");
            let thought_id = format!("t{step}");
            guard.record_commit("s1", &thought_id, decision.depth).await;
            guard.end_operation("s1").await;
            parent = Some(thought_id);
        }
        let mut req = request("s1", "eleventh thought");
        req.parent_thought_id = parent;
        let err = guard.admit(req).await.expect_err("should block at max depth");
        assert!(matches!(err, CoreError::RecursionBlocked(_)));
    }

    #[tokio::test]
    async fn repeating_content_is_blocked_as_a_loop() {
        let guard = guard();
        guard.admit(request("s1", "same content")).await.expect("first is fine");
        guard.end_operation("s1").await;
        let err = guard.admit(request("s1", "same content")).await.expect_err("second should loop");
        assert!(matches!(err, CoreError::RecursionBlocked(_)));
    }

    #[tokio::test]
    async fn circuit_breaker_clears_once_reset() {
        let mut config = AppConfig { circuit_breaker_timeout_secs: 0, ..AppConfig::default() };
        config.max_concurrent_ops = 10;
        let guard = SafetyGuard::new(&config);
        guard.admit(request("s1", "x")).await.expect("first ok");
        guard.end_operation("s1").await;
        guard.admit(request("s1", "x")).await.expect_err("loop trips breaker");
        // timeout is zero seconds, so the next admit should find it already expired.
        guard.admit(request("s1", "y")).await.expect("breaker reset");
    }

    #[tokio::test]
    async fn concurrent_operation_limit_is_enforced() {
        let guard = guard();
        guard.admit(request("s1", "one")).await.expect("first");
        guard.admit(request("s1", "two")).await.expect("second");
        let err = guard.admit(request("s1", "three")).await.expect_err("third should exhaust");
        assert!(matches!(err, CoreError::ResourceExhausted(_)));
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let guard = guard();
        let err = guard.admit(request("s1", "")).await.expect_err("empty content rejected");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn deny_listed_content_is_rejected() {
        let guard = guard();
        let err = guard
            .admit(request("s1", "please run <script>alert(1)</script>"))
            .await
            .expect_err("script marker rejected");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn recovery_strategy_selects_by_keyword() {
        assert_eq!(
            recovery_strategy(&CoreError::Timeout { elapsed_ms: 10, context: "x".to_string() }),
            RecoveryStrategy::RetryWithBackoff
        );
        assert_eq!(
            recovery_strategy(&CoreError::ResourceExhausted("memory budget exceeded".to_string())),
            RecoveryStrategy::ReduceComplexity
        );
        assert_eq!(
            recovery_strategy(&CoreError::RecursionBlocked("depth exceeded".to_string())),
            RecoveryStrategy::ResetChain
        );
        assert_eq!(recovery_strategy(&CoreError::Validation("unexpected state".to_string())), RecoveryStrategy::Degrade);
    }
}
