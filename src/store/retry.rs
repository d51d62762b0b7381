//! Bounded retry with a fixed delay and cooperative cancellation.
//!
//! [`retry_with_delay`] drives a non-blocking attempt function until it
//! reports success, fails hard, the attempt budget runs out, or the caller's
//! [`CancellationToken`] fires. The file store uses it to acquire task file
//! locks; nothing in here knows about files.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::constants::{DEFAULT_LOCK_ATTEMPTS, DEFAULT_LOCK_RETRY_DELAY_MS};

/// How many times to attempt an operation and how long to wait in between.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pmcp_tasks_fs::store::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 10);
/// assert_eq!(policy.delay, Duration::from_millis(50));
///
/// let quick = RetryPolicy::new(3, Duration::from_millis(5));
/// assert_eq!(quick.max_attempts, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Values below 1 are treated as 1.
    pub max_attempts: u32,

    /// Fixed wait between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given budget.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_LOCK_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_LOCK_RETRY_DELAY_MS),
        }
    }
}

/// Why [`retry_with_delay`] stopped without a value.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt reported the resource as busy.
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
    },
    /// The cancellation token fired before or between attempts.
    Cancelled,
    /// An attempt failed with a non-retryable error.
    Failed(E),
}

/// Runs `attempt` until it yields a value, retrying while it reports busy.
///
/// `attempt` receives the 1-based attempt number and returns:
/// - `Ok(Some(value))` on success,
/// - `Ok(None)` when the resource is busy and the attempt should be retried,
/// - `Err(e)` for failures that must not be retried.
///
/// Between attempts the helper sleeps for `policy.delay`, racing the sleep
/// against `cancel`. A token that is already cancelled aborts before the
/// first attempt.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pmcp_tasks_fs::store::{retry_with_delay, RetryPolicy};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let policy = RetryPolicy::new(5, Duration::from_millis(1));
/// let cancel = CancellationToken::new();
/// let value = retry_with_delay(&policy, &cancel, |attempt| {
///     Ok::<_, std::io::Error>(if attempt < 3 { None } else { Some(attempt) })
/// })
/// .await
/// .unwrap();
/// assert_eq!(value, 3);
/// # }
/// ```
pub async fn retry_with_delay<T, E, F>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Result<Option<T>, E>,
{
    let max_attempts = policy.max_attempts.max(1);

    for n in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match attempt(n) {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {},
            Err(err) => return Err(RetryError::Failed(err)),
        }

        if n < max_attempts {
            tracing::debug!(
                attempt = n,
                max_attempts,
                delay_ms = policy.delay.as_millis() as u64,
                "resource busy, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(policy.delay) => {},
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            }
        }
    }

    Err(RetryError::Exhausted {
        attempts: max_attempts,
    })
}
