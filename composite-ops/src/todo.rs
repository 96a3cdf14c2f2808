//! Todo convenience family. A document-shaped
//! record exactly like `Resource`, single-backend, so it skips the
//! coordinator entirely and talks straight to the transactional adapter.

use std::sync::Arc;

use common::adapters::TransactionalAdapter;
use common::error::CoreError;
use common::types::todo::{Todo, TodoStatus};
use common::types::validate_identifier;
use uuid::Uuid;

pub struct TodoOps {
    transactional: Arc<dyn TransactionalAdapter>,
}

impl TodoOps {
    #[must_use]
    pub fn new(transactional: Arc<dyn TransactionalAdapter>) -> Self {
        TodoOps { transactional }
    }

    pub async fn add_todo(&self, title: &str, description: &str, priority: u8) -> Result<Todo, CoreError> {
        let now = chrono::Utc::now();
        let todo = Todo {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title: title.to_string(),
            description: description.to_string(),
            priority,
            status: TodoStatus::Pending,
            completed: false,
            completed_at: None,
        };
        self.transactional.store_todo(&todo).await?;
        Ok(todo)
    }

    pub async fn list_todos(&self) -> Result<Vec<Todo>, CoreError> {
        self.transactional.list_todos().await
    }

    pub async fn complete_todo(&self, id: &str) -> Result<Todo, CoreError> {
        validate_identifier(id)?;
        let mut todo = self
            .transactional
            .get_todo(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("todo {id} not found")))?;
        todo.status = TodoStatus::Done;
        todo.completed = true;
        todo.completed_at = Some(chrono::Utc::now());
        todo.updated_at = chrono::Utc::now();
        self.transactional.update_todo(&todo).await?;
        Ok(todo)
    }

    pub async fn search_todo(&self, query: &str) -> Result<Vec<Todo>, CoreError> {
        self.transactional.search_todos(query).await
    }
}
