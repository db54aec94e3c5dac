//! Retry loop for transfer operations.

use std::future::Future;

use tracing::warn;

use super::config::RetryPolicy;
use super::error::TransferError;

impl RetryPolicy {
    /// Runs `attempt_fn` until it succeeds, fails permanently, or the
    /// attempt budget is exhausted. The closure receives the 1-based
    /// attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> Result<T, TransferError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match attempt_fn(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient transfer failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> TransferError {
        TransferError::from_download("in", "movie.mov", StoreError::Timeout)
    }

    fn permanent() -> TransferError {
        TransferError::from_download("in", "movie.mov", StoreError::Unauthorized("no".into()))
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default().with_delays(1, 1);

        let result = policy
            .run("download", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(transient())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default()
            .with_max_attempts(2)
            .with_delays(1, 1);

        let result: Result<(), _> = policy
            .run("upload", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default().with_delays(1, 1);

        let result: Result<(), _> = policy
            .run("download", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(permanent()) }
            })
            .await;

        assert!(matches!(result, Err(TransferError::RemoteRead { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
