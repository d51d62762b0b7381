//! Durable, file-backed MCP task lifecycle store for the PMCP SDK.
//!
//! An MCP server hands long-running requests off as *tasks*: the client gets
//! a task ID back immediately, polls for status, and fetches the result once
//! the task has finished. This crate tracks those tasks durably on a local
//! filesystem so status survives restarts and is shared between processes
//! pointed at the same directory.
//!
//! # Overview
//!
//! A task starts `working` and ends `completed`, `failed` or `cancelled`
//! (with `input_required` as an intermediate state). On top of the stored
//! status the store applies three rules on every access:
//!
//! - **Effective status** -- a non-terminal task whose execution time has
//!   elapsed is reported as `completed`.
//! - **TTL** -- a task older than its TTL is treated as if it never existed.
//! - **Session isolation** -- a task created under a session is invisible to
//!   other sessions (reported as not found).
//!
//! # Module Organization
//!
//! - [`store`] - The [`TaskStore`] trait, [`FileTaskStore`], [`InMemoryTaskStore`],
//!   and the lock/retry machinery
//! - [`domain`] - [`TaskRecord`] and the lifecycle rules shared by all stores
//! - [`types`] - Status, wire task and execution policy types
//! - [`error`] - [`TaskError`] with JSON-RPC error code mapping
//! - [`security`] - Session visibility check
//! - [`constants`] - Store-wide defaults
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use pmcp_tasks_fs::{InMemoryTaskStore, TaskExecutionPolicy, TaskStatus, TaskStore};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), pmcp_tasks_fs::TaskError> {
//! let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
//! let cancel = CancellationToken::new();
//!
//! let task = store
//!     .create(TaskExecutionPolicy::new(60_000), json!(1), json!({}), None, &cancel)
//!     .await?;
//! store
//!     .store_result(&task.task_id, TaskStatus::Completed, json!({"ok": true}), None, &cancel)
//!     .await?;
//! assert_eq!(store.get_result(&task.task_id, None, &cancel).await?, json!({"ok": true}));
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod error;
pub mod security;
pub mod types;

/// Task record and the lifecycle rules every store applies.
pub mod domain;

pub mod store;

// Re-exports for ergonomic access
pub use domain::TaskRecord;
pub use error::TaskError;
pub use store::{
    FileTaskStore, InMemoryTaskStore, ListTasksOptions, StoreConfig, TaskPage, TaskStore,
};
pub use types::*;
