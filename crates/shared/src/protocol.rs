use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{TodoId, UserId};

/// A single todo record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub owner: UserId,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    pub owner: UserId,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

/// Partial update. `completed` is the only mutable field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TodoPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_none()
    }
}

/// Change notification pushed to subscribers of an owner's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TodoChange {
    Upserted(Todo),
    Deleted { id: TodoId, owner: UserId },
}

impl TodoChange {
    pub fn owner(&self) -> UserId {
        match self {
            TodoChange::Upserted(todo) => todo.owner,
            TodoChange::Deleted { owner, .. } => *owner,
        }
    }

    pub fn todo_id(&self) -> TodoId {
        match self {
            TodoChange::Upserted(todo) => todo.id,
            TodoChange::Deleted { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
