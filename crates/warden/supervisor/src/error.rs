//! Error types for the task supervisor

use crate::task::TaskId;
use thiserror::Error;

/// Submission and control errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// A single-slot operation is already active
    #[error("{0} is already running")]
    AlreadyRunning(String),

    /// Conflicting tasks have not finished yet
    #[error("There are {count} pending task(s)")]
    PendingTasks { count: usize },

    /// The supervisor no longer accepts work
    #[error("Supervisor is shut down")]
    ShutDown,

    /// No tokio runtime to run tasks on
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// Task id is not (or no longer) tracked
    #[error("Task {0} not found")]
    TaskNotFound(TaskId),
}

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Terminal error of a task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The operation reported a failure
    #[error("{0}")]
    Failed(String),

    /// The operation stopped after a cancellation request
    #[error("Task was cancelled")]
    Cancelled,

    /// The operation panicked
    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        TaskError::Failed(reason.to_string())
    }
}
