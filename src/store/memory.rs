//! In-memory task store.
//!
//! [`InMemoryTaskStore`] keeps records in a `DashMap<String, TaskRecord>`
//! keyed by task ID. It shares every lifecycle rule with
//! [`FileTaskStore`](super::file::FileTaskStore) (session visibility, TTL,
//! effective status, terminal protection) but nothing survives a restart.
//! Useful as a test double and for deployments that do not need durability.
//!
//! # Concurrency
//!
//! Mutations run under the map's per-shard write guard, so read, transform
//! and write of one task are atomic with respect to other callers. No lock
//! is ever waited on across an `.await`, so the retry policy in
//! [`StoreConfig`] is unused here.
//!
//! # Examples
//!
//! ```
//! use pmcp_tasks_fs::store::memory::InMemoryTaskStore;
//! use pmcp_tasks_fs::store::StoreConfig;
//!
//! let store = InMemoryTaskStore::new().with_config(StoreConfig {
//!     session_isolation: false,
//!     ..StoreConfig::default()
//! });
//! assert!(store.is_empty());
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::domain::{RecordUpdate, TaskRecord};
use crate::error::TaskError;
use crate::types::execution::TaskExecutionPolicy;
use crate::types::task::TaskStatus;

use super::{
    ensure_visible, result_of, sort_newest_first, ListTasksOptions, StoreConfig, TaskPage,
    TaskStore,
};

/// Thread-safe, non-durable task store.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    records: DashMap<String, TaskRecord>,
    config: StoreConfig,
}

impl InMemoryTaskStore {
    /// Creates an empty store with [`StoreConfig::default()`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store configuration.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of records held, including expired ones.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn visible(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, TaskError> {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        let record = self
            .records
            .get(task_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TaskError::not_found(task_id))?;
        ensure_visible(&record, session_id, &self.config, now)?;
        Ok(record)
    }

    fn update<F>(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
        transform: F,
    ) -> Result<TaskRecord, TaskError>
    where
        F: FnOnce(TaskRecord, DateTime<Utc>) -> Result<RecordUpdate, TaskError>,
    {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        let mut entry = self
            .records
            .get_mut(task_id)
            .ok_or_else(|| TaskError::not_found(task_id))?;
        let now = Utc::now();
        ensure_visible(entry.value(), session_id, &self.config, now)?;

        let record = match transform(entry.value().clone(), now)? {
            RecordUpdate::Changed(updated) => {
                *entry.value_mut() = updated.clone();
                updated
            },
            RecordUpdate::Unchanged(record) => record,
        };
        Ok(record.with_effective_status(now))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(
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
        self.records.insert(record.task_id.clone(), record.clone());
        tracing::debug!(task_id = %record.task_id, session_id = ?record.session_id, "task created");
        Ok(record)
    }

    async fn get(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        let now = Utc::now();
        self.visible(task_id, session_id, cancel, now)
            .map(|record| record.with_effective_status(now))
    }

    async fn get_result(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, TaskError> {
        let now = Utc::now();
        let record = self.visible(task_id, session_id, cancel, now)?;
        result_of(record, now)
    }

    async fn store_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        self.update(task_id, session_id, cancel, |record, now| {
            record
                .apply_result(status, result, now)
                .map(RecordUpdate::Changed)
        })
    }

    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        self.update(task_id, session_id, cancel, |record, now| {
            Ok(RecordUpdate::Changed(
                record.apply_status(status, status_message, now),
            ))
        })
    }

    async fn cancel(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, TaskError> {
        self.update(task_id, session_id, cancel, |record, now| {
            Ok(record.apply_cancel(now))
        })
    }

    async fn list(
        &self,
        options: ListTasksOptions,
        cancel: &CancellationToken,
    ) -> Result<TaskPage, TaskError> {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        let now = Utc::now();
        let caller = options.session_id.as_deref();
        let mut tasks: Vec<TaskRecord> = self
            .records
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .is_visible_to(caller, self.config.session_isolation, now)
            })
            .map(|entry| entry.value().clone().with_effective_status(now))
            .collect();
        sort_newest_first(&mut tasks);
        Ok(TaskPage {
            tasks,
            next_cursor: None,
        })
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }
}
