//! Error types for task store operations.
//!
//! Provides [`TaskError`], the typed failure returned by every
//! [`TaskStore`](crate::store::TaskStore) operation, with JSON-RPC error code
//! mapping so the protocol layer can turn each variant into a distinct
//! client-facing response.

use thiserror::Error;

use crate::types::task::TaskStatus;

/// Errors that can occur during task store operations.
///
/// `NotFound` is returned uniformly for missing, expired, session-mismatched,
/// and unreadable records so callers cannot tell "never existed" apart from
/// "belongs to someone else".
///
/// # Examples
///
/// ```
/// use pmcp_tasks_fs::TaskError;
///
/// let err = TaskError::NotFound {
///     task_id: "missing-task".to_string(),
/// };
/// assert_eq!(err.error_code(), -32602);
/// assert!(err.to_string().contains("missing-task"));
/// assert!(!err.is_retryable());
/// ```
#[derive(Error, Debug)]
pub enum TaskError {
    /// No visible task with the given ID.
    #[error("task not found: {task_id}")]
    NotFound {
        /// The task ID that was looked up.
        task_id: String,
    },

    /// A terminal write was rejected, either because the requested status is
    /// not terminal or because the task already finished.
    #[error("invalid transition from {from} to {to} for task {task_id}")]
    InvalidTransition {
        /// The task that was being transitioned.
        task_id: String,
        /// The effective status at the time of the attempt.
        from: TaskStatus,
        /// The rejected target status.
        to: TaskStatus,
        /// Optional hint for the caller.
        suggested_action: Option<String>,
    },

    /// The task has not reached a terminal state, so no result is available.
    #[error("task not in terminal state: {task_id} (status: {current_status})")]
    NotReady {
        /// The task ID.
        task_id: String,
        /// The task's effective (non-terminal) status.
        current_status: TaskStatus,
    },

    /// The task file stayed locked by another writer for the whole retry budget.
    #[error("task {task_id} is locked by another writer (gave up after {attempts} attempts)")]
    LockContention {
        /// The contended task.
        task_id: String,
        /// How many acquisition attempts were made.
        attempts: u32,
    },

    /// Filesystem failure (permissions, disk full, ...).
    #[error("task store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller's cancellation token fired mid-operation.
    #[error("task operation cancelled")]
    Cancelled,

    /// Serialization or internal executor failure.
    #[error("store error: {0}")]
    StoreError(String),
}

impl TaskError {
    /// Maps this error to a JSON-RPC error code.
    ///
    /// - `-32602` (Invalid params): `NotFound`, `InvalidTransition`, `NotReady`
    /// - `-32800` (Request cancelled): `Cancelled`
    /// - `-32603` (Internal error): `LockContention`, `Io`, `StoreError`
    ///
    /// # Examples
    ///
    /// ```
    /// use pmcp_tasks_fs::{TaskError, TaskStatus};
    ///
    /// let err = TaskError::InvalidTransition {
    ///     task_id: "t1".to_string(),
    ///     from: TaskStatus::Completed,
    ///     to: TaskStatus::Failed,
    ///     suggested_action: None,
    /// };
    /// assert_eq!(err.error_code(), -32602);
    ///
    /// let err = TaskError::StoreError("join failed".to_string());
    /// assert_eq!(err.error_code(), -32603);
    /// ```
    pub fn error_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } | Self::InvalidTransition { .. } | Self::NotReady { .. } => {
                -32602
            },
            Self::Cancelled => -32800,
            Self::LockContention { .. } | Self::Io(_) | Self::StoreError(_) => -32603,
        }
    }

    /// Returns `true` for the storage-level failures a client may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockContention { .. } | Self::Io(_))
    }

    pub(crate) fn not_found(task_id: &str) -> Self {
        Self::NotFound {
            task_id: task_id.to_string(),
        }
    }
}
