use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Status, Task, TaskDraft, TaskId, TaskPatch};
use crate::session::UserId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Failed to create store directory: {0}")]
    DirectoryError(String),
    #[error("Task {0} not found for this user")]
    NotFound(TaskId),
    #[error("Store rejected the request: {0}")]
    Rejected(String),
}

/// Which partition a `list` call asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPredicate {
    Is(Status),
    IsNot(Status),
}

impl StatusPredicate {
    pub fn matches(self, status: Status) -> bool {
        match self {
            StatusPredicate::Is(s) => status == s,
            StatusPredicate::IsNot(s) => status != s,
        }
    }
}

/// Per-user task persistence. Implementations must scope every call by `user`
/// and never touch another user's rows.
pub trait TaskStore {
    /// Tasks of `user` matching `predicate`, in store order.
    fn list(&mut self, user: &UserId, predicate: StatusPredicate) -> Result<Vec<Task>, StoreError>;

    /// Persist a new task and return it with its store-assigned id.
    fn insert(&mut self, user: &UserId, draft: &TaskDraft) -> Result<Task, StoreError>;

    fn update(&mut self, id: &TaskId, user: &UserId, patch: &TaskPatch) -> Result<(), StoreError>;

    fn delete(&mut self, id: &TaskId, user: &UserId) -> Result<(), StoreError>;

    /// Cooldown expiries recorded for `user`'s tasks. Expired entries may be included.
    fn cooldowns(&mut self, user: &UserId) -> Result<Vec<(TaskId, DateTime<Utc>)>, StoreError>;

    /// Record that actions on task `id` are ignored until `until`.
    fn set_cooldown(&mut self, id: &TaskId, user: &UserId, until: DateTime<Utc>) -> Result<(), StoreError>;
}

impl<S: TaskStore + ?Sized> TaskStore for Box<S> {
    fn list(&mut self, user: &UserId, predicate: StatusPredicate) -> Result<Vec<Task>, StoreError> {
        (**self).list(user, predicate)
    }

    fn insert(&mut self, user: &UserId, draft: &TaskDraft) -> Result<Task, StoreError> {
        (**self).insert(user, draft)
    }

    fn update(&mut self, id: &TaskId, user: &UserId, patch: &TaskPatch) -> Result<(), StoreError> {
        (**self).update(id, user, patch)
    }

    fn delete(&mut self, id: &TaskId, user: &UserId) -> Result<(), StoreError> {
        (**self).delete(id, user)
    }

    fn cooldowns(&mut self, user: &UserId) -> Result<Vec<(TaskId, DateTime<Utc>)>, StoreError> {
        (**self).cooldowns(user)
    }

    fn set_cooldown(&mut self, id: &TaskId, user: &UserId, until: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).set_cooldown(id, user, until)
    }
}
