//! Execution policy supplied by the hosting layer when a task is created.

use serde::{Deserialize, Serialize};

/// Per-task execution policy.
///
/// `execution_time_ms` is the elapsed time after which a task that never
/// received an explicit terminal write is reported as `Completed`.
/// `ttl_ms` bounds how long the record stays visible; `None` falls back to
/// the store's [`default_ttl_ms`](crate::store::StoreConfig::default_ttl_ms).
///
/// # Examples
///
/// ```
/// use pmcp_tasks_fs::TaskExecutionPolicy;
///
/// let policy = TaskExecutionPolicy::new(30_000)
///     .with_ttl_ms(600_000)
///     .with_poll_interval_ms(1_000);
/// assert_eq!(policy.execution_time_ms, 30_000);
/// assert_eq!(policy.ttl_ms, Some(600_000));
/// assert_eq!(policy.poll_interval_ms, Some(1_000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionPolicy {
    /// Milliseconds after creation at which the task counts as done.
    pub execution_time_ms: u64,

    /// Time-to-live in milliseconds. `None` uses the store default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,

    /// Suggested polling interval for clients, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
}

impl TaskExecutionPolicy {
    /// Creates a policy with the given execution time and no explicit TTL.
    pub fn new(execution_time_ms: u64) -> Self {
        Self {
            execution_time_ms,
            ttl_ms: None,
            poll_interval_ms: None,
        }
    }

    /// Sets an explicit TTL.
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    /// Sets the suggested polling interval.
    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = Some(poll_interval_ms);
        self
    }
}
