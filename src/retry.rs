use std::future::Future;

use tokio::time::sleep;

use crate::{Result, RetryPolicy};

/// Runs `operation`, re-running it after retryable failures.
///
/// Makes at most `1 + policy.max_retries` calls, waiting
/// `policy.delay_for(n)` before retry `n`. Non-retryable errors (see
/// [`PortalError::is_retryable`](crate::PortalError::is_retryable)) propagate
/// on first sight; otherwise the last error is returned once the budget is
/// spent.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if retry >= policy.max_retries {
            #[cfg(feature = "tracing")]
            tracing::error!(retries = policy.max_retries, error = %err, "all retries failed");
            return Err(err);
        }

        retry += 1;
        let delay = policy.delay_for(retry);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            retry,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after failure"
        );

        sleep(delay).await;
    }
}

/// Shorthand for `(base_delay_ms, max_retries)` call sites.
pub async fn retry_with_delay<T, F, Fut>(
    operation: F,
    base_delay_ms: u64,
    max_retries: u32,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_backoff(&RetryPolicy::new(base_delay_ms, max_retries), operation).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{retry_with_backoff, retry_with_delay};
    use crate::{PortalError, RetryPolicy};

    fn server_error() -> PortalError {
        PortalError::from_status(503, "unavailable".to_owned())
    }

    #[tokio::test(start_paused = true)]
    async fn generic_failure_is_retried_with_growing_delays() {
        let started = Instant::now();
        let calls = Mutex::new(Vec::new());

        let err = retry_with_delay(
            || {
                calls.lock().expect("calls lock").push(started.elapsed());
                async { Err::<(), _>(server_error()) }
            },
            3_000,
            3,
        )
        .await
        .expect_err("operation always fails");

        assert_eq!(err.status(), Some(503));
        let calls = calls.into_inner().expect("calls lock");
        assert_eq!(calls.len(), 4);
        let gaps: Vec<u64> = calls
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![3_000, 4_500, 6_750]);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let mut calls = 0;
        let err = retry_with_backoff(&RetryPolicy::new(10, 10), || {
            calls += 1;
            async { Err::<(), _>(PortalError::from_status(404, String::new())) }
        })
        .await
        .expect_err("404 is final");

        assert_eq!(calls, 1);
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_not_retried() {
        let mut calls = 0;
        let err = retry_with_backoff(&RetryPolicy::default(), || {
            calls += 1;
            async { Err::<(), _>(PortalError::Timeout { after_ms: 5_000 }) }
        })
        .await
        .expect_err("timeout is final");

        assert_eq!(calls, 1);
        assert!(matches!(err, PortalError::Timeout { after_ms: 5_000 }));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let mut calls = 0;
        let started = Instant::now();
        let value = retry_with_backoff(&RetryPolicy::default(), || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt < 3 {
                    Err(server_error())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .expect("third call succeeds");

        assert_eq!(value, 3);
        assert!(started.elapsed() >= Duration::from_millis(7_500));
    }
}
