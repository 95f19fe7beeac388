//! Construction-time retry helper.
//!
//! Adapters probe their backend once at construction through an
//! exponential-backoff retrier. Per-call retries are intentionally absent;
//! an adapter stays a thin pass-through to its driver.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

const TRACING_TARGET: &str = "strata_core::retry";

/// Per-attempt timeout for connectivity probes.
pub const TIMEOUT_PING: Duration = Duration::from_secs(10);

/// Number of connectivity probe attempts at construction time.
pub const PING_ATTEMPTS: u32 = 3;

/// Initial delay between probe attempts. Doubles per attempt, bounded by
/// [`TIMEOUT_PING`].
pub const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Runs `op` up to `attempts` times with exponentially increasing delays.
///
/// Returns the first success, or the last error once attempts are
/// exhausted.
pub async fn retry<T, F, Fut>(attempts: u32, initial_delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut last_err = None;

    for attempt in 1..=attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    attempt,
                    attempts,
                    error = %err,
                    "Attempt failed"
                );

                last_err = Some(err);

                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(TIMEOUT_PING);
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::connection("no attempts were made")))
}

/// Runs a connectivity probe through the standard retry schedule, bounding
/// each attempt by [`TIMEOUT_PING`].
pub async fn probe<F, Fut>(mut ping: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    retry(PING_ATTEMPTS, RETRY_INITIAL_DELAY, || {
        let fut = ping();
        async move {
            match tokio::time::timeout(TIMEOUT_PING, fut).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout("ping")),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_retry_returns_first_success() {
        let calls = AtomicU32::new(0);

        let result = retry(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    Err(Error::connection("still warming up"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::connection("down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_probe_succeeds() {
        let result = probe(|| async { Ok(()) }).await;
        assert!(result.is_ok());
    }
}
