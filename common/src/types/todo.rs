use crate::stored_object;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Done,
}

stored_object!(Todo, "todos", {
    title: String,
    description: String,
    priority: u8,
    status: TodoStatus,
    completed: bool,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
});
