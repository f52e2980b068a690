//! Retry driver for transient failures.
//!
//! Three attempts with fixed 1s/3s/5s backoff. Only errors that classify as
//! retryable (see [`VigilError::is_retryable`]) consume additional attempts;
//! everything else surfaces immediately.

use crate::error::{Result, VigilError};
use std::future::Future;
use std::time::Duration;

/// Attempt schedule: the delay before each re-attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: vec![Duration::from_secs(1), Duration::from_secs(3), Duration::from_secs(5)],
        }
    }
}

impl RetryPolicy {
    /// Total attempts made: the initial one plus one per delay slot, capped
    /// at three overall.
    pub fn max_attempts(&self) -> usize {
        self.delays.len()
    }
}

/// Run `op` under `policy`, sleeping between retryable failures.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last = VigilError::Internal("retry with no attempts".into());
    for attempt in 0..policy.max_attempts() {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "retryable failure");
                last = e;
            }
        }
        if attempt + 1 < policy.max_attempts() {
            tokio::time::sleep(policy.delays[attempt]).await;
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            delays: vec![Duration::from_millis(1), Duration::from_millis(1), Duration::from_millis(1)],
        }
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let out = with_retry(&quick_policy(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, VigilError>(42)
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let out = with_retry(&quick_policy(), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(VigilError::Transport { reason: "refused".into() })
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let err = with_retry(&quick_policy(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(VigilError::Transport { reason: "refused".into() })
        })
        .await
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let err = with_retry(&quick_policy(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(VigilError::HashMismatch)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, VigilError::HashMismatch));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
