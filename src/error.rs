use thiserror::Error;

use crate::models::TaskId;
use crate::store::StoreError;

/// Everything the task collection can report back to the presentation layer.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to load tasks: {0}")]
    Load(#[source] StoreError),

    #[error("Failed to add task: {0}")]
    Insert(#[source] StoreError),

    #[error("Failed to update task: {0}")]
    Update(#[source] StoreError),

    #[error("Failed to delete task: {0}")]
    Delete(#[source] StoreError),

    #[error("Ignored: task {0} was changed moments ago, try again shortly")]
    Ignored(TaskId),

    #[error("Task {0} is not in the expected list")]
    InvalidState(TaskId),

    #[error("Not signed in")]
    Unauthenticated,
}

impl TaskError {
    /// Suppressed actions are notices, not failures.
    pub fn is_advisory(&self) -> bool {
        matches!(self, TaskError::Ignored(_))
    }
}
