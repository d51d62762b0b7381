//! Durable, file-backed task store.
//!
//! [`FileTaskStore`] keeps one JSON file per task under a root directory,
//! named `{task_id}{extension}`. There is no in-process cache: every
//! operation re-reads storage, so several stores (or processes) sharing one
//! root observe each other's writes.
//!
//! # Concurrency
//!
//! - Reads take a shared lock on the task file.
//! - Mutations (`store_result`, `update_status`, `cancel`) hold an exclusive
//!   lock for the whole read, transform, rewrite and sync cycle.
//! - Lock acquisition is non-blocking and retried per
//!   [`StoreConfig::lock_retry`]; running out of attempts yields
//!   [`TaskError::LockContention`].
//! - Blocking file I/O runs on the tokio blocking pool.
//!
//! Creation writes to a dot-prefixed staging file and renames it into place,
//! so listings never observe a half-written record.
//!
//! # Examples
//!
//! ```no_run
//! use pmcp_tasks_fs::store::{FileTaskStore, StoreConfig};
//! use pmcp_tasks_fs::TaskExecutionPolicy;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), pmcp_tasks_fs::TaskError> {
//! let store = FileTaskStore::new("/var/lib/my-server/tasks", StoreConfig::default())?;
//! let cancel = CancellationToken::new();
//!
//! let task = store
//!     .create(
//!         TaskExecutionPolicy::new(30_000),
//!         json!(1),
//!         json!({"name": "render"}),
//!         Some("session-abc"),
//!         &cancel,
//!     )
//!     .await?;
//! let polled = store.get(&task.task_id, Some("session-abc"), &cancel).await?;
//! assert_eq!(polled.task_id, task.task_id);
//! # Ok(())
//! # }
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::domain::{RecordUpdate, TaskRecord};
use crate::error::TaskError;
use crate::types::execution::TaskExecutionPolicy;
use crate::types::task::TaskStatus;

use super::lock::{LockMode, TaskFileGuard};
use super::retry::{retry_with_delay, RetryError};
use super::{
    ensure_visible, result_of, sort_newest_first, ListTasksOptions, StoreConfig, TaskPage,
    TaskStore,
};

/// Task IDs longer than this are rejected before touching the filesystem.
const MAX_TASK_ID_LEN: usize = 128;

/// Durable task store keeping one JSON file per task.
#[derive(Debug, Clone)]
pub struct FileTaskStore {
    root: PathBuf,
    config: StoreConfig,
}

impl FileTaskStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Io`] if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, TaskError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, config })
    }

    /// Opens a store rooted at `root` with [`StoreConfig::default()`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Io`] if the directory cannot be created.
    pub fn with_defaults(root: impl Into<PathBuf>) -> Result<Self, TaskError> {
        Self::new(root, StoreConfig::default())
    }

    /// The directory holding the task files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `task_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if `task_id` is not filename-safe.
    pub fn record_path(&self, task_id: &str) -> Result<PathBuf, TaskError> {
        if !is_valid_task_id(task_id) {
            tracing::debug!(task_id, "rejecting malformed task id");
            return Err(TaskError::not_found(task_id));
        }
        Ok(self
            .root
            .join(format!("{task_id}{}", self.config.file_extension)))
    }

    /// Creates a new `Working` task and persists it.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Cancelled`] if `cancel` has already fired.
    /// - [`TaskError::Io`] if the record cannot be written.
    pub async fn create(
        &self,
        policy: TaskExecutionPolicy,
        request_id: Value,
        request_payload: Value,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let policy = self.config.resolve_policy(policy);
        let record = TaskRecord::new(
            session_id.map(str::to_string),
            request_id,
            request_payload,
            &policy,
        );
        let bytes = encode(&record)?;
        let path = self.record_path(&record.task_id)?;
        let staging = self.root.join(format!(".{}.partial", record.task_id));

        blocking(move || write_new_file(&staging, &path, &bytes).map_err(TaskError::from)).await?;

        tracing::debug!(
            task_id = %record.task_id,
            session_id = ?record.session_id,
            execution_time_ms = record.execution_time_ms,
            ttl_ms = ?record.ttl_ms,
            "task created"
        );
        Ok(record)
    }

    /// Retrieves a task with its effective status.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task is absent, expired, owned by
    ///   another session, or unreadable.
    /// - [`TaskError::LockContention`], [`TaskError::Io`] or
    ///   [`TaskError::Cancelled`] while reading.
    pub async fn get(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        let record = self
            .read_record(task_id, cancel)
            .await?
            .ok_or_else(|| TaskError::not_found(task_id))?;
        let now = Utc::now();
        ensure_visible(&record, session_id, &self.config, now)?;
        Ok(record.with_effective_status(now))
    }

    /// Retrieves the stored result of a finished task.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] under the same conditions as [`get`](Self::get).
    /// - [`TaskError::NotReady`] if the effective status is not terminal.
    pub async fn get_result(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, TaskError> {
        let record = self
            .read_record(task_id, cancel)
            .await?
            .ok_or_else(|| TaskError::not_found(task_id))?;
        let now = Utc::now();
        ensure_visible(&record, session_id, &self.config, now)?;
        result_of(record, now)
    }

    /// Writes a terminal status and result.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task is not visible.
    /// - [`TaskError::InvalidTransition`] if `status` is not `Completed` or
    ///   `Failed`, or the task is already terminal.
    pub async fn store_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        let record = self
            .update_locked(task_id, session_id, cancel, move |record, now| {
                record
                    .apply_result(status, result, now)
                    .map(RecordUpdate::Changed)
            })
            .await?;
        tracing::debug!(task_id, status = %status, "task result stored");
        Ok(record)
    }

    /// Overwrites status and status message.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task is not visible.
    pub async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        let record = self
            .update_locked(task_id, session_id, cancel, move |record, now| {
                Ok(RecordUpdate::Changed(
                    record.apply_status(status, status_message, now),
                ))
            })
            .await?;
        tracing::debug!(task_id, status = %status, "task status updated");
        Ok(record)
    }

    /// Cancels a live task. Finished tasks are returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task is not visible.
    pub async fn cancel(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        let record = self
            .update_locked(task_id, session_id, cancel, |record, now| {
                Ok(record.apply_cancel(now))
            })
            .await?;
        tracing::debug!(task_id, status = %record.status, "task cancel requested");
        Ok(record)
    }

    /// Lists visible, unexpired tasks, newest first.
    ///
    /// Corrupt files and files removed mid-scan are skipped.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Io`] if the root directory cannot be read.
    /// - [`TaskError::LockContention`] if a task file stays locked.
    /// - [`TaskError::Cancelled`] if `cancel` fires.
    pub async fn list(
        &self,
        options: ListTasksOptions,
        cancel: &CancellationToken,
    ) -> Result<TaskPage, TaskError> {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let root = self.root.clone();
        let extension = self.config.file_extension.clone();
        let task_ids = blocking(move || scan_task_ids(&root, &extension).map_err(TaskError::from))
            .await?;

        let now = Utc::now();
        let caller = options.session_id.as_deref();
        let mut tasks = Vec::with_capacity(task_ids.len());
        for task_id in task_ids {
            match self.read_record(&task_id, cancel).await {
                Ok(Some(record)) => {
                    if record.is_visible_to(caller, self.config.session_isolation, now) {
                        tasks.push(record.with_effective_status(now));
                    }
                },
                Ok(None) | Err(TaskError::NotFound { .. }) => {},
                Err(err) => return Err(err),
            }
        }
        sort_newest_first(&mut tasks);

        Ok(TaskPage {
            tasks,
            next_cursor: None,
        })
    }

    /// Reads and parses a record under a shared lock.
    ///
    /// `Ok(None)` means the file exists but does not hold a valid record.
    async fn read_record(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TaskRecord>, TaskError> {
        let mut guard = self.acquire(task_id, LockMode::Shared, cancel).await?;
        let bytes = blocking(move || guard.read_all().map_err(TaskError::from)).await?;
        Ok(parse_record(task_id, &bytes))
    }

    /// Applies `transform` to a record under an exclusive lock and writes the
    /// result back when it changed.
    async fn update_locked<F>(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
        transform: F,
    ) -> Result<TaskRecord, TaskError>
    where
        F: FnOnce(TaskRecord, DateTime<Utc>) -> Result<RecordUpdate, TaskError> + Send + 'static,
    {
        let mut guard = self.acquire(task_id, LockMode::Exclusive, cancel).await?;
        let task_id = task_id.to_string();
        let caller = session_id.map(str::to_string);
        let config = self.config.clone();

        blocking(move || {
            let bytes = guard.read_all()?;
            let record =
                parse_record(&task_id, &bytes).ok_or_else(|| TaskError::not_found(&task_id))?;
            let now = Utc::now();
            ensure_visible(&record, caller.as_deref(), &config, now)?;

            let record = match transform(record, now)? {
                RecordUpdate::Changed(updated) => {
                    guard.rewrite(&encode(&updated)?)?;
                    updated
                },
                RecordUpdate::Unchanged(record) => record,
            };
            Ok(record.with_effective_status(now))
        })
        .await
    }

    /// Locks the task file, retrying while another handle holds it.
    async fn acquire(
        &self,
        task_id: &str,
        mode: LockMode,
        cancel: &CancellationToken,
    ) -> Result<TaskFileGuard, TaskError> {
        let path = self.record_path(task_id)?;
        let policy = &self.config.lock_retry;

        match retry_with_delay(policy, cancel, |_| TaskFileGuard::try_acquire(&path, mode)).await
        {
            Ok(guard) => Ok(guard),
            Err(RetryError::Exhausted { attempts }) => {
                tracing::warn!(
                    task_id,
                    attempts,
                    mode = ?mode,
                    "task file lock contention, giving up"
                );
                Err(TaskError::LockContention {
                    task_id: task_id.to_string(),
                    attempts,
                })
            },
            Err(RetryError::Cancelled) => Err(TaskError::Cancelled),
            Err(RetryError::Failed(err)) if err.kind() == io::ErrorKind::NotFound => {
                Err(TaskError::not_found(task_id))
            },
            Err(RetryError::Failed(err)) => Err(TaskError::Io(err)),
        }
    }
}

// ---- TaskStore delegation impl ----

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn create(
        &self,
        policy: TaskExecutionPolicy,
        request_id: Value,
        request_payload: Value,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        FileTaskStore::create(self, policy, request_id, request_payload, session_id, cancel).await
    }

    async fn get(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        FileTaskStore::get(self, task_id, session_id, cancel).await
    }

    async fn get_result(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, TaskError> {
        FileTaskStore::get_result(self, task_id, session_id, cancel).await
    }

    async fn store_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        FileTaskStore::store_result(self, task_id, status, result, session_id, cancel).await
    }

    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        FileTaskStore::update_status(self, task_id, status, status_message, session_id, cancel)
            .await
    }

    async fn cancel(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        FileTaskStore::cancel(self, task_id, session_id, cancel).await
    }

    async fn list(
        &self,
        options: ListTasksOptions,
        cancel: &CancellationToken,
    ) -> Result<TaskPage, TaskError> {
        FileTaskStore::list(self, options, cancel).await
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }
}

/// Runs blocking file work on the tokio blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, TaskError>
where
    F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| TaskError::StoreError(format!("blocking file task failed: {e}")))?
}

fn is_valid_task_id(task_id: &str) -> bool {
    !task_id.is_empty()
        && task_id.len() <= MAX_TASK_ID_LEN
        && task_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn encode(record: &TaskRecord) -> Result<Vec<u8>, TaskError> {
    serde_json::to_vec_pretty(record)
        .map_err(|e| TaskError::StoreError(format!("failed to serialize task record: {e}")))
}

/// Parses a record file. Corrupt or mismatched files yield `None`.
fn parse_record(task_id: &str, bytes: &[u8]) -> Option<TaskRecord> {
    match serde_json::from_slice::<TaskRecord>(bytes) {
        Ok(record) if record.task_id == task_id => Some(record),
        Ok(record) => {
            tracing::warn!(
                task_id,
                stored_task_id = %record.task_id,
                "task file holds a different task id, treating as absent"
            );
            None
        },
        Err(err) => {
            tracing::warn!(task_id, error = %err, "corrupt task file, treating as absent");
            None
        },
    }
}

/// Writes `bytes` to `staging`, syncs, and renames it to `target`.
fn write_new_file(staging: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging)?;
    let written = file.write_all(bytes).and_then(|()| file.sync_all());
    drop(file);

    if let Err(err) = written.and_then(|()| fs::rename(staging, target)) {
        let _ = fs::remove_file(staging);
        return Err(err);
    }
    Ok(())
}

/// Collects the task IDs of every record file under `root`.
fn scan_task_ids(root: &Path, extension: &str) -> io::Result<Vec<String>> {
    let mut task_ids = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if let Some(task_id) = name.strip_suffix(extension) {
            if is_valid_task_id(task_id) {
                task_ids.push(task_id.to_string());
            }
        }
    }
    Ok(task_ids)
}
