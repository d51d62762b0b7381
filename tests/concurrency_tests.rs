//! Concurrency tests for FileTaskStore.
//!
//! Exercises many writers racing on one task, several store instances sharing
//! a root directory, lock contention exhaustion, and cancellation while a
//! caller waits for a lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use pmcp_tasks_fs::store::lock::{LockMode, TaskFileGuard};
use pmcp_tasks_fs::store::{FileTaskStore, ListTasksOptions, RetryPolicy, StoreConfig};
use pmcp_tasks_fs::{TaskError, TaskExecutionPolicy, TaskRecord, TaskStatus};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn store_with_retry(lock_retry: RetryPolicy) -> (TempDir, FileTaskStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTaskStore::new(
        dir.path(),
        StoreConfig {
            lock_retry,
            ..StoreConfig::default()
        },
    )
    .unwrap();
    (dir, store)
}

/// Generous budget so racing writers always get their turn.
fn patient() -> RetryPolicy {
    RetryPolicy::new(500, Duration::from_millis(2))
}

async fn create(store: &FileTaskStore) -> TaskRecord {
    store
        .create(
            TaskExecutionPolicy::new(3_600_000),
            json!(1),
            json!(null),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap()
}

fn read_on_disk(store: &FileTaskStore, task_id: &str) -> TaskRecord {
    let bytes = std::fs::read(store.record_path(task_id).unwrap()).unwrap();
    serde_json::from_slice(&bytes).expect("record file must always parse")
}

// ─── Racing Writers ─────────────────────────────────────────────────────────

mod racing_writer_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exactly_one_store_result_wins() {
        let (_dir, store) = store_with_retry(patient());
        let store = Arc::new(store);
        let created = create(&store).await;

        let attempts = (0..16).map(|i| {
            let store = Arc::clone(&store);
            let task_id = created.task_id.clone();
            tokio::spawn(async move {
                let status = if i % 2 == 0 {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                store
                    .store_result(&task_id, status, json!({"writer": i}), None, &CancellationToken::new())
                    .await
            })
        });
        let outcomes: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let winners: Vec<&TaskRecord> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        for outcome in &outcomes {
            if let Err(err) = outcome {
                assert!(
                    matches!(err, TaskError::InvalidTransition { .. }),
                    "unexpected error: {err}"
                );
            }
        }

        let on_disk = read_on_disk(&store, &created.task_id);
        assert_eq!(on_disk.status, winners[0].status);
        assert_eq!(on_disk.result, winners[0].result);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_status_updates_leave_a_parseable_record() {
        let (_dir, store) = store_with_retry(patient());
        let store = Arc::new(store);
        let created = create(&store).await;

        let updates = (0..32).map(|i| {
            let store = Arc::clone(&store);
            let task_id = created.task_id.clone();
            tokio::spawn(async move {
                store
                    .update_status(
                        &task_id,
                        TaskStatus::Working,
                        Some(format!("step {i}")),
                        None,
                        &CancellationToken::new(),
                    )
                    .await
            })
        });
        let reads = (0..32).map(|_| {
            let store = Arc::clone(&store);
            let task_id = created.task_id.clone();
            tokio::spawn(async move { store.get(&task_id, None, &CancellationToken::new()).await })
        });

        for joined in join_all(updates).await {
            joined.unwrap().unwrap();
        }
        for joined in join_all(reads).await {
            let record = joined.unwrap().unwrap();
            assert_eq!(record.task_id, created.task_id);
        }

        let on_disk = read_on_disk(&store, &created.task_id);
        assert_eq!(on_disk.status, TaskStatus::Working);
        assert!(on_disk
            .status_message
            .as_deref()
            .is_some_and(|m| m.starts_with("step ")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_produce_distinct_tasks() {
        let (_dir, store) = store_with_retry(patient());
        let store = Arc::new(store);

        let creates = (0..20).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { create(&store).await })
        });
        let mut ids: Vec<String> = join_all(creates)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().task_id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);

        let page = store
            .list(ListTasksOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(page.tasks.len(), 20);
    }
}

// ─── Shared Root ────────────────────────────────────────────────────────────

mod shared_root_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_two_stores_on_one_root_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileTaskStore::with_defaults(dir.path()).unwrap();
        let reader = FileTaskStore::with_defaults(dir.path()).unwrap();
        let cancel = CancellationToken::new();

        let created = create(&writer).await;
        assert_eq!(
            reader.get(&created.task_id, None, &cancel).await.unwrap(),
            created
        );

        reader
            .store_result(&created.task_id, TaskStatus::Completed, json!("from reader"), None, &cancel)
            .await
            .unwrap();
        assert_eq!(
            writer.get_result(&created.task_id, None, &cancel).await.unwrap(),
            json!("from reader")
        );
        let err = writer
            .store_result(&created.task_id, TaskStatus::Failed, json!("too late"), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { .. }));
    }
}

// ─── Lock Contention ────────────────────────────────────────────────────────

mod contention_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_held_lock_exhausts_retry_budget() {
        let (_dir, store) = store_with_retry(RetryPolicy::new(3, Duration::from_millis(10)));
        let created = create(&store).await;
        let path = store.record_path(&created.task_id).unwrap();
        let _held = TaskFileGuard::try_acquire(&path, LockMode::Exclusive)
            .unwrap()
            .unwrap();

        let started = Instant::now();
        let err = store
            .cancel(&created.task_id, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), -32603);
        match err {
            TaskError::LockContention { task_id, attempts } => {
                assert_eq!(task_id, created.task_id);
                assert_eq!(attempts, 3);
            },
            other => panic!("expected LockContention, got: {other}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(20));

        // Reads also wait for the writer.
        let err = store
            .get(&created.task_id, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::LockContention { .. }));
    }

    #[tokio::test]
    async fn test_shared_lock_allows_reads_but_blocks_writes() {
        let (_dir, store) = store_with_retry(RetryPolicy::new(2, Duration::from_millis(5)));
        let created = create(&store).await;
        let path = store.record_path(&created.task_id).unwrap();
        let _reader = TaskFileGuard::try_acquire(&path, LockMode::Shared)
            .unwrap()
            .unwrap();

        let cancel = CancellationToken::new();
        assert!(store.get(&created.task_id, None, &cancel).await.is_ok());
        let err = store
            .update_status(&created.task_id, TaskStatus::Failed, None, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::LockContention { .. }));
        assert_eq!(read_on_disk(&store, &created.task_id).status, TaskStatus::Working);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_writer_proceeds_once_lock_is_released() {
        let (_dir, store) = store_with_retry(RetryPolicy::new(100, Duration::from_millis(10)));
        let created = create(&store).await;
        let path = store.record_path(&created.task_id).unwrap();
        let held = TaskFileGuard::try_acquire(&path, LockMode::Exclusive)
            .unwrap()
            .unwrap();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(held);
        });
        let cancelled = store
            .cancel(&created.task_id, None, &CancellationToken::new())
            .await
            .unwrap();
        release.await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
    }
}

// ─── Cancellation ───────────────────────────────────────────────────────────

mod cancellation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_token_aborts_lock_wait() {
        let (_dir, store) = store_with_retry(RetryPolicy::new(1_000, Duration::from_secs(5)));
        let created = create(&store).await;
        let path = store.record_path(&created.task_id).unwrap();
        let _held = TaskFileGuard::try_acquire(&path, LockMode::Exclusive)
            .unwrap()
            .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = store
            .store_result(&created.task_id, TaskStatus::Completed, json!(1), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Cancelled));
        assert_eq!(err.error_code(), -32800);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_touches_nothing() {
        let (dir, store) = store_with_retry(patient());
        let created = create(&store).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            store.get(&created.task_id, None, &cancel).await,
            Err(TaskError::Cancelled)
        ));
        assert!(matches!(
            store.cancel(&created.task_id, None, &cancel).await,
            Err(TaskError::Cancelled)
        ));
        assert!(matches!(
            store.list(ListTasksOptions::default(), &cancel).await,
            Err(TaskError::Cancelled)
        ));
        assert_eq!(read_on_disk(&store, &created.task_id), created);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
