//! Task record -- the durable unit persisted once per task.
//!
//! [`TaskRecord`] is what the stores write and read. Besides the stored
//! fields it owns the lifecycle rules every store shares: TTL expiry,
//! session visibility, the effective-status computation, and the pure
//! transforms applied under the per-task lock by `store_result`,
//! `update_status` and `cancel`.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::TaskError;
use crate::security::session_can_access;
use crate::types::execution::TaskExecutionPolicy;
use crate::types::task::{Task, TaskStatus};

/// Durable representation of a task.
///
/// `status` is the status as last written. Callers usually want
/// [`effective_status_at`](Self::effective_status_at) instead, which
/// reports a non-terminal task as `Completed` once its execution time has
/// elapsed.
///
/// # Examples
///
/// ```
/// use pmcp_tasks_fs::{TaskExecutionPolicy, TaskRecord, TaskStatus};
/// use serde_json::json;
///
/// let record = TaskRecord::new(
///     Some("session-abc".to_string()),
///     json!(7),
///     json!({"name": "render"}),
///     &TaskExecutionPolicy::new(60_000).with_ttl_ms(3_600_000),
/// );
/// assert_eq!(record.status, TaskStatus::Working);
/// assert_eq!(record.session_id.as_deref(), Some("session-abc"));
/// assert_eq!(record.result, Some(json!({"name": "render"})));
/// assert!(!record.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Unique, filename-safe identifier (UUIDv4).
    pub task_id: String,

    /// Session that owns the task. `None` disables isolation for this record.
    #[serde(default)]
    pub session_id: Option<String>,

    /// Status as last written.
    pub status: TaskStatus,

    /// Free-text progress annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    /// Creation time. Never mutated.
    pub created_at: DateTime<Utc>,

    /// Time of the last stored mutation.
    pub last_updated_at: DateTime<Utc>,

    /// Elapsed milliseconds after which the task counts as completed.
    pub execution_time_ms: u64,

    /// Time-to-live in milliseconds. `None` means the record never expires.
    #[serde(default)]
    pub ttl_ms: Option<u64>,

    /// Suggested polling interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    /// JSON-RPC id of the request that created the task.
    #[serde(default)]
    pub request_id: Value,

    /// Seeded with the originating request payload, replaced by the real
    /// result on `store_result`. A stored `null` stays `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
}

/// Outcome of a transform applied under the task lock.
#[derive(Debug)]
pub(crate) enum RecordUpdate {
    /// The record changed and must be written back.
    Changed(TaskRecord),
    /// Nothing to persist; the record is returned as-is.
    Unchanged(TaskRecord),
}

/// Reads a present key as `Some`, including an explicit `null`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Converts milliseconds to a chrono duration, `None` on overflow.
fn millis(ms: u64) -> Option<Duration> {
    Duration::try_milliseconds(i64::try_from(ms).ok()?)
}

impl TaskRecord {
    /// Creates a new record in the `Working` state.
    ///
    /// Generates a UUIDv4 task ID and stamps both timestamps with the current
    /// UTC time. `policy.ttl_ms` is taken as-is; stores resolve their default
    /// TTL before calling this.
    pub fn new(
        session_id: Option<String>,
        request_id: Value,
        request_payload: Value,
        policy: &TaskExecutionPolicy,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            session_id,
            status: TaskStatus::Working,
            status_message: None,
            created_at: now,
            last_updated_at: now,
            execution_time_ms: policy.execution_time_ms,
            ttl_ms: policy.ttl_ms,
            poll_interval_ms: policy.poll_interval_ms,
            request_id,
            result: Some(request_payload),
        }
    }

    /// Returns `true` if the TTL window has closed at `now`.
    ///
    /// A record is expired once strictly more than `ttl_ms` has elapsed since
    /// creation. TTLs too large to represent never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.ttl_ms
            .and_then(millis)
            .is_some_and(|ttl| now.signed_duration_since(self.created_at) > ttl)
    }

    /// Returns `true` if the record has expired as of now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Computes the status reported to callers at `now`.
    ///
    /// Terminal stored statuses are returned unchanged. Otherwise, once the
    /// execution time has elapsed the task is reported as `Completed` even
    /// though the stored status may still read `Working`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use pmcp_tasks_fs::{TaskExecutionPolicy, TaskRecord, TaskStatus};
    /// use serde_json::Value;
    ///
    /// let record = TaskRecord::new(None, Value::Null, Value::Null, &TaskExecutionPolicy::new(1_000));
    /// let now = record.created_at;
    /// assert_eq!(record.effective_status_at(now), TaskStatus::Working);
    /// assert_eq!(
    ///     record.effective_status_at(now + Duration::seconds(1)),
    ///     TaskStatus::Completed
    /// );
    /// ```
    pub fn effective_status_at(&self, now: DateTime<Utc>) -> TaskStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        let elapsed = now.signed_duration_since(self.created_at);
        match millis(self.execution_time_ms) {
            Some(limit) if elapsed >= limit => TaskStatus::Completed,
            _ => self.status,
        }
    }

    /// Computes the effective status as of now.
    pub fn effective_status(&self) -> TaskStatus {
        self.effective_status_at(Utc::now())
    }

    /// Returns `true` if the record is unexpired at `now` and visible to the
    /// caller's session.
    pub fn is_visible_to(
        &self,
        caller_session: Option<&str>,
        session_isolation: bool,
        now: DateTime<Utc>,
    ) -> bool {
        session_can_access(
            self.session_id.as_deref(),
            caller_session,
            session_isolation,
        ) && !self.is_expired_at(now)
    }

    /// Replaces the stored status with the effective status at `now`.
    pub fn with_effective_status(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status_at(now);
        self
    }

    /// Projects this record onto the MCP wire [`Task`] as seen at `now`.
    pub fn to_wire_task(&self, now: DateTime<Utc>) -> Task {
        Task {
            task_id: self.task_id.clone(),
            status: self.effective_status_at(now),
            status_message: self.status_message.clone(),
            created_at: self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            last_updated_at: self
                .last_updated_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            ttl: self.ttl_ms,
            poll_interval: self.poll_interval_ms,
        }
    }

    /// Writes a terminal status and result, rejecting finished tasks.
    pub(crate) fn apply_result(
        mut self,
        status: TaskStatus,
        result: Value,
        now: DateTime<Utc>,
    ) -> Result<Self, TaskError> {
        let current = self.effective_status_at(now);
        if !status.is_result_status() {
            return Err(TaskError::InvalidTransition {
                task_id: self.task_id,
                from: current,
                to: status,
                suggested_action: Some(
                    "results can only be stored with completed or failed status".to_string(),
                ),
            });
        }
        if current.is_terminal() {
            return Err(TaskError::InvalidTransition {
                task_id: self.task_id,
                from: current,
                to: status,
                suggested_action: Some(
                    "task is in a terminal state and its result cannot be replaced".to_string(),
                ),
            });
        }
        self.status = status;
        self.result = Some(result);
        self.last_updated_at = now;
        Ok(self)
    }

    /// Overwrites status and message unconditionally.
    pub(crate) fn apply_status(
        mut self,
        status: TaskStatus,
        status_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        self.status = status;
        self.status_message = status_message;
        self.last_updated_at = now;
        self
    }

    /// Moves a live task to `Cancelled`; finished tasks are left untouched.
    pub(crate) fn apply_cancel(mut self, now: DateTime<Utc>) -> RecordUpdate {
        if self.effective_status_at(now).is_terminal() {
            return RecordUpdate::Unchanged(self);
        }
        self.status = TaskStatus::Cancelled;
        self.last_updated_at = now;
        RecordUpdate::Changed(self)
    }
}
