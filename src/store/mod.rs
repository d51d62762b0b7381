//! Task store trait, implementations, and supporting types.
//!
//! # Architecture
//!
//! - **[`TaskStore`]** -- the abstract capability used by the protocol
//!   layer, typically as `Arc<dyn TaskStore>`.
//! - **[`FileTaskStore`](file::FileTaskStore)** -- durable store keeping one
//!   JSON file per task. Mutations run under an exclusive per-file lock,
//!   reads under a shared one, with bounded retry on contention.
//! - **[`InMemoryTaskStore`](memory::InMemoryTaskStore)** -- non-durable
//!   drop-in with the same lifecycle semantics, backed by `DashMap`.
//!
//! Lifecycle rules (TTL, session visibility, effective status, terminal
//! protection) live on [`TaskRecord`] so both stores share them.
//!
//! # Supporting Types
//!
//! - [`StoreConfig`] - Default TTL, session isolation, file naming, lock retry.
//! - [`ListTasksOptions`] / [`TaskPage`] - Listing parameters and results.
//! - [`RetryPolicy`] / [`retry_with_delay`] - Bounded retry helper.

pub mod file;
pub mod lock;
pub mod memory;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use file::FileTaskStore;
pub use memory::InMemoryTaskStore;
pub use retry::{retry_with_delay, RetryError, RetryPolicy};

use crate::constants::{DEFAULT_FILE_EXTENSION, DEFAULT_TTL_MS};
use crate::domain::TaskRecord;
use crate::error::TaskError;
use crate::security::session_can_access;
use crate::types::execution::TaskExecutionPolicy;
use crate::types::task::TaskStatus;

/// Construction-time configuration, immutable for the life of a store.
///
/// # Defaults
///
/// | Setting             | Default      | Description                                  |
/// |---------------------|--------------|----------------------------------------------|
/// | `default_ttl_ms`    | 3,600,000    | 1 hour, used when a policy has no TTL        |
/// | `session_isolation` | `true`       | Hide tasks from other sessions               |
/// | `file_extension`    | `".json"`    | Suffix of record files (file store only)     |
/// | `lock_retry`        | 10 × 50 ms   | Lock acquisition budget (file store only)    |
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pmcp_tasks_fs::store::{RetryPolicy, StoreConfig};
///
/// let config = StoreConfig::default();
/// assert_eq!(config.default_ttl_ms, Some(3_600_000));
/// assert!(config.session_isolation);
/// assert_eq!(config.file_extension, ".json");
///
/// let custom = StoreConfig {
///     default_ttl_ms: None,
///     session_isolation: false,
///     lock_retry: RetryPolicy::new(3, Duration::from_millis(10)),
///     ..StoreConfig::default()
/// };
/// assert!(custom.default_ttl_ms.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// TTL in milliseconds applied when an execution policy omits one.
    /// `None` means such tasks never expire.
    pub default_ttl_ms: Option<u64>,

    /// When `true`, tasks created under a session are only visible to that
    /// session. Tasks created without a session stay visible to everyone.
    pub session_isolation: bool,

    /// File name suffix for record files, including the leading dot.
    pub file_extension: String,

    /// Retry budget for acquiring a task file lock.
    pub lock_retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: Some(DEFAULT_TTL_MS),
            session_isolation: true,
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            lock_retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Fills in the store default TTL when the policy has none.
    pub(crate) fn resolve_policy(&self, policy: TaskExecutionPolicy) -> TaskExecutionPolicy {
        TaskExecutionPolicy {
            ttl_ms: policy.ttl_ms.or(self.default_ttl_ms),
            ..policy
        }
    }
}

/// Options for listing tasks.
///
/// The cursor is accepted for forward compatibility; listing currently
/// returns a full snapshot and ignores it.
///
/// # Examples
///
/// ```
/// use pmcp_tasks_fs::store::ListTasksOptions;
///
/// let options = ListTasksOptions::for_session("session-abc");
/// assert_eq!(options.session_id.as_deref(), Some("session-abc"));
/// assert!(options.cursor.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ListTasksOptions {
    /// Caller's session. `None` sees only tasks created without a session
    /// while isolation is enabled.
    pub session_id: Option<String>,

    /// Opaque pagination cursor.
    pub cursor: Option<String>,
}

impl ListTasksOptions {
    /// Lists the tasks visible to `session_id`.
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            cursor: None,
        }
    }
}

/// A snapshot of tasks, newest first.
#[derive(Debug, Clone)]
pub struct TaskPage {
    /// Visible, unexpired tasks with effective statuses.
    pub tasks: Vec<TaskRecord>,

    /// Cursor for the next page. Always `None` for full snapshots.
    pub next_cursor: Option<String>,
}

/// Task lifecycle storage.
///
/// Every operation addresses a task by `(task_id, session_id)` and accepts a
/// [`CancellationToken`]; a fired token aborts any wait with
/// [`TaskError::Cancelled`].
///
/// Records returned by `get`, `update_status`, `store_result`, `cancel` and
/// `list` carry the *effective* status.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Operations on the same task are
/// serialized; operations on different tasks are independent.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Creates a new `Working` task whose result is seeded with
    /// `request_payload`.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Io`] if the record cannot be written.
    /// - [`TaskError::Cancelled`] if `cancel` has already fired.
    async fn create(
        &self,
        policy: TaskExecutionPolicy,
        request_id: Value,
        request_payload: Value,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError>;

    /// Retrieves a task.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task is absent, expired, owned by
    ///   another session, or unreadable.
    /// - [`TaskError::LockContention`] / [`TaskError::Io`] on storage failures.
    async fn get(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError>;

    /// Retrieves the stored result of a finished task.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] under the same conditions as [`get`](Self::get).
    /// - [`TaskError::NotReady`] if the effective status is not terminal.
    async fn get_result(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, TaskError>;

    /// Writes a terminal status (`Completed` or `Failed`) and result.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task is not visible.
    /// - [`TaskError::InvalidTransition`] if `status` is not `Completed` or
    ///   `Failed`, or the task is already terminal.
    async fn store_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError>;

    /// Overwrites status and status message unconditionally.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task is not visible.
    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError>;

    /// Cancels a live task. Already-terminal tasks are returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task is not visible.
    async fn cancel(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError>;

    /// Lists visible, unexpired tasks, newest first.
    async fn list(
        &self,
        options: ListTasksOptions,
        cancel: &CancellationToken,
    ) -> Result<TaskPage, TaskError>;

    /// Returns the store's configuration.
    fn config(&self) -> &StoreConfig;
}

/// Fails with `NotFound` unless `record` is visible to the caller at `now`.
pub(crate) fn ensure_visible(
    record: &TaskRecord,
    caller_session: Option<&str>,
    config: &StoreConfig,
    now: DateTime<Utc>,
) -> Result<(), TaskError> {
    if !session_can_access(
        record.session_id.as_deref(),
        caller_session,
        config.session_isolation,
    ) {
        tracing::warn!(
            task_id = %record.task_id,
            caller_session = ?caller_session,
            "session mismatch on task access (returning NotFound)"
        );
        return Err(TaskError::not_found(&record.task_id));
    }
    if record.is_expired_at(now) {
        tracing::debug!(task_id = %record.task_id, "task past its TTL (returning NotFound)");
        return Err(TaskError::not_found(&record.task_id));
    }
    Ok(())
}

/// Shared by both stores: the result of a visible, terminal task.
pub(crate) fn result_of(record: TaskRecord, now: DateTime<Utc>) -> Result<Value, TaskError> {
    let status = record.effective_status_at(now);
    if !status.is_terminal() {
        return Err(TaskError::NotReady {
            task_id: record.task_id,
            current_status: status,
        });
    }
    Ok(record.result.unwrap_or(Value::Null))
}

/// Sorts newest first.
pub(crate) fn sort_newest_first(tasks: &mut [TaskRecord]) {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
