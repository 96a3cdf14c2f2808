use crate::stored_object;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
            MessageRole::System => "system",
        };
        f.write_str(s)
    }
}

stored_object!(ChatMessage, "chat_history", {
    conversation_id: String,
    role: MessageRole,
    content: String,
    agent_name: Option<String>,
    source_tool: Option<String>,
    metadata: Option<serde_json::Value>,
});
