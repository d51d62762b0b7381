//! Task status and the MCP wire projection of a task.
//!
//! [`TaskStatus`] is shared by the on-disk record and the wire type.
//! [`Task`] is what the protocol layer returns from `tasks/get`,
//! `tasks/list` and `tasks/cancel`; it is produced from a
//! [`TaskRecord`](crate::domain::TaskRecord) at the serialization boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle status.
///
/// `Working` and `InputRequired` are non-terminal. `Completed`, `Failed` and
/// `Cancelled` are terminal: once a task's effective status is terminal,
/// [`store_result`](crate::store::TaskStore::store_result) rejects and
/// [`cancel`](crate::store::TaskStore::cancel) is a no-op.
///
/// # Examples
///
/// ```
/// use pmcp_tasks_fs::TaskStatus;
///
/// assert!(!TaskStatus::Working.is_terminal());
/// assert!(TaskStatus::Cancelled.is_terminal());
/// assert_eq!(serde_json::to_value(TaskStatus::InputRequired).unwrap(), "input_required");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is actively being processed.
    Working,
    /// Task is waiting for input from the client.
    InputRequired,
    /// Task completed successfully (terminal).
    Completed,
    /// Task failed (terminal).
    Failed,
    /// Task was cancelled (terminal).
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Working => write!(f, "working"),
            Self::InputRequired => write!(f, "input_required"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl TaskStatus {
    /// Returns `true` if this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` if this status may be written together with a result.
    ///
    /// Only `Completed` and `Failed` carry a result; cancellation goes
    /// through [`cancel`](crate::store::TaskStore::cancel).
    ///
    /// # Examples
    ///
    /// ```
    /// use pmcp_tasks_fs::TaskStatus;
    ///
    /// assert!(TaskStatus::Completed.is_result_status());
    /// assert!(TaskStatus::Failed.is_result_status());
    /// assert!(!TaskStatus::Cancelled.is_result_status());
    /// assert!(!TaskStatus::Working.is_result_status());
    /// ```
    pub fn is_result_status(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A task as it appears on the MCP wire.
///
/// Timestamps are RFC 3339 strings with millisecond precision. `ttl` is
/// required but nullable: `None` serializes as `null`. `status` is always
/// the *effective* status at projection time.
///
/// # Examples
///
/// ```
/// use pmcp_tasks_fs::{Task, TaskStatus};
///
/// let task = Task {
///     task_id: "abc-123".to_string(),
///     status: TaskStatus::Working,
///     status_message: None,
///     created_at: "2025-11-25T10:30:00.000Z".to_string(),
///     last_updated_at: "2025-11-25T10:30:00.000Z".to_string(),
///     ttl: None,
///     poll_interval: Some(1000),
/// };
///
/// let json = serde_json::to_value(&task).unwrap();
/// assert_eq!(json["taskId"], "abc-123");
/// assert!(json["ttl"].is_null());
/// assert!(json.get("statusMessage").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier for this task.
    pub task_id: String,

    /// Effective lifecycle status.
    pub status: TaskStatus,

    /// Optional human-readable status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    /// RFC 3339 timestamp when the task was created.
    pub created_at: String,

    /// RFC 3339 timestamp of the last stored mutation.
    pub last_updated_at: String,

    /// Time-to-live in milliseconds, `null` for unlimited.
    pub ttl: Option<u64>,

    /// Suggested polling interval in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_value(TaskStatus::Working).unwrap(), "working");
        assert_eq!(
            serde_json::to_value(TaskStatus::Cancelled).unwrap(),
            "cancelled"
        );
        let back: TaskStatus = serde_json::from_value(json!("failed")).unwrap();
        assert_eq!(back, TaskStatus::Failed);
    }

    #[test]
    fn display_matches_serde_names() {
        for status in [
            TaskStatus::Working,
            TaskStatus::InputRequired,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            let serialized = serde_json::to_value(status).unwrap();
            assert_eq!(serialized, status.to_string());
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Working.is_terminal());
        assert!(!TaskStatus::InputRequired.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result: Result<TaskStatus, _> = serde_json::from_value(json!("paused"));
        assert!(result.is_err());
    }

    #[test]
    fn wire_task_keeps_null_ttl_and_omits_empty_options() {
        let task = Task {
            task_id: "t-1".to_string(),
            status: TaskStatus::Completed,
            status_message: Some("done".to_string()),
            created_at: "2025-11-25T10:30:00.000Z".to_string(),
            last_updated_at: "2025-11-25T10:31:00.000Z".to_string(),
            ttl: None,
            poll_interval: None,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["statusMessage"], "done");
        assert!(json.as_object().unwrap().contains_key("ttl"));
        assert!(json.get("pollInterval").is_none());
    }
}
