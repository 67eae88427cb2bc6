//! Bounded retry with randomized backoff for transient storage conflicts
//!
//! Both strategy call sites (the submit path and the partition workers) wrap
//! their storage work in the same retry discipline: a transient conflict
//! (optimistic version mismatch, or a lock/deadlock/timeout signaled by the
//! backend) sleeps a uniformly random duration and tries again; any other
//! error aborts immediately; exhausting the attempts surfaces a terminal
//! result distinguishing lock exhaustion from version-conflict exhaustion.
//!
//! Classification is typed: an error is retryable exactly when
//! [`EngineError::conflict_kind`] is `Some`, so both call sites cannot
//! drift apart.

use crate::types::{ConflictKind, EngineError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

/// Terminal result of an exhausted or aborted retry loop
#[derive(Debug)]
pub enum RetryError {
    /// Lock/deadlock conflicts persisted through every attempt
    LockExhausted,

    /// Optimistic version conflicts persisted through every attempt
    ConflictExhausted,

    /// A non-retryable error aborted the loop on first occurrence
    Fatal(EngineError),
}

/// Retry configuration shared by both strategy call sites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before giving up
    pub max_attempts: u32,

    /// Lower bound of the randomized backoff, milliseconds
    pub min_backoff_ms: u64,

    /// Upper bound of the randomized backoff, milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 10,
            min_backoff_ms: 50,
            max_backoff_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom bounds
    pub fn new(max_attempts: u32, min_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        RetryPolicy {
            max_attempts,
            min_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Execute `op`, retrying transient storage conflicts
    ///
    /// # Arguments
    ///
    /// * `context` - short operation name for log lines
    /// * `op` - closure producing a fresh attempt future each call
    ///
    /// # Returns
    ///
    /// * `Ok(value)` on the first successful attempt
    /// * `Err(RetryError::Fatal)` as soon as a non-retryable error occurs
    /// * `Err(RetryError::LockExhausted | ConflictExhausted)` after the
    ///   attempts run out, keyed by the kind of the last conflict
    pub async fn run<T, F, Fut>(&self, context: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut remaining = self.max_attempts.max(1);

        while remaining > 0 {
            remaining -= 1;

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let Some(kind) = e.conflict_kind() else {
                        error!(context, error = %e, "non-retryable failure");
                        return Err(RetryError::Fatal(e));
                    };

                    if remaining == 0 {
                        error!(
                            context,
                            error = %e,
                            attempts = self.max_attempts,
                            "transient conflict persisted through every retry"
                        );
                        return Err(match kind {
                            ConflictKind::Lock => RetryError::LockExhausted,
                            ConflictKind::Version => RetryError::ConflictExhausted,
                        });
                    }

                    let backoff = self.backoff();
                    warn!(
                        context,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        remaining,
                        "transient conflict, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }

        // Not reached while max_attempts >= 1; kept as the terminal result
        // of an empty loop.
        error!(context, "retry attempts exhausted");
        Err(RetryError::ConflictExhausted)
    }

    /// A uniformly random backoff within the configured range
    fn backoff(&self) -> Duration {
        let ms = if self.max_backoff_ms > self.min_backoff_ms {
            rand::thread_rng().gen_range(self.min_backoff_ms..self.max_backoff_ms)
        } else {
            self.min_backoff_ms
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BrokerError, StorageError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, 1, 2)
    }

    fn version_conflict() -> EngineError {
        EngineError::Storage(StorageError::VersionConflict {
            number: 1,
            snapshot: 0,
        })
    }

    fn lock_conflict() -> EngineError {
        EngineError::Storage(StorageError::Lock {
            message: "deadlock victim".to_string(),
        })
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let result = fast_policy(3).run("test", || async { Ok::<_, EngineError>(42) }).await;

        assert!(matches!(result, Ok(42)));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_conflicts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = Arc::clone(&calls);

        let result = fast_policy(5)
            .run("test", move || {
                let calls = Arc::clone(&calls_in_op);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(version_conflict())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert!(matches!(result, Ok(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_version_exhaustion_is_conflict_exhausted() {
        let result = fast_policy(3)
            .run("test", || async { Err::<(), _>(version_conflict()) })
            .await;

        assert!(matches!(result, Err(RetryError::ConflictExhausted)));
    }

    #[tokio::test]
    async fn test_lock_exhaustion_is_lock_exhausted() {
        let result = fast_policy(3)
            .run("test", || async { Err::<(), _>(lock_conflict()) })
            .await;

        assert!(matches!(result, Err(RetryError::LockExhausted)));
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_without_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = Arc::clone(&calls);

        let result = fast_policy(5)
            .run("test", move || {
                let calls = Arc::clone(&calls_in_op);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(EngineError::Broker(BrokerError::Closed {
                        queue: "queue_1".to_string(),
                    }))
                }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = Arc::clone(&calls);

        let result = fast_policy(0)
            .run("test", move || {
                let calls = Arc::clone(&calls_in_op);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, EngineError>(1)
                }
            })
            .await;

        assert!(matches!(result, Ok(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_stays_in_range() {
        let policy = RetryPolicy::new(10, 50, 100);

        for _ in 0..100 {
            let backoff = policy.backoff();
            assert!(backoff >= Duration::from_millis(50));
            assert!(backoff < Duration::from_millis(100));
        }
    }

    #[test]
    fn test_backoff_with_degenerate_range() {
        let policy = RetryPolicy::new(10, 50, 50);

        assert_eq!(policy.backoff(), Duration::from_millis(50));
    }
}
