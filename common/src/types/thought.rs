use crate::stored_object;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtType {
    Problem,
    Intermediate,
    Conclusion,
}

impl std::fmt::Display for ThoughtType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThoughtType::Problem => "problem",
            ThoughtType::Intermediate => "intermediate",
            ThoughtType::Conclusion => "conclusion",
        };
        f.write_str(s)
    }
}

stored_object!(Thought, "thoughts", {
    session_id: String,
    content: String,
    content_hash: String,
    previous_thought_id: Option<String>,
    step_number: u32,
    thought_type: ThoughtType,
    metadata: serde_json::Value,
});

impl Thought {
    /// SHA-256 hex digest of `content`, computed at insert time and
    /// re-checked on every read to detect silent corruption.
    #[must_use]
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    #[must_use]
    pub fn verify_integrity(&self) -> bool {
        Self::hash_content(&self.content) == self.content_hash
    }
}
