// Startup resync
//
// After the process registers its agents and functions it asks the Soma
// server to pick them up. The server may still be starting, so the request
// is retried with a linear backoff. Errors the server will keep returning
// (bad credentials, malformed requests) stop the loop early. Giving up is
// logged, never fatal.

use std::fmt::Display;
use std::future::Future;

use soma_durable::RetryPolicy;
use tracing::{error, info, warn};

use crate::api::HttpSomaApi;
use crate::config::SomaConfig;
use crate::error::ApiError;

/// Call `attempt_fn` until it succeeds or the policy runs out of attempts
///
/// After failed attempt `n` the call waits `policy.delay_for_attempt(n + 1)`.
/// Returns whether any attempt succeeded.
pub async fn resync_with_backoff<F, Fut, E>(policy: &RetryPolicy, attempt_fn: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    resync_with_backoff_if(policy, attempt_fn, |_| true).await
}

/// Like [`resync_with_backoff`], but gives up at once on errors for which
/// `is_retryable` returns false
pub async fn resync_with_backoff_if<F, Fut, E, R>(
    policy: &RetryPolicy,
    mut attempt_fn: F,
    is_retryable: R,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match attempt_fn().await {
            Ok(()) => {
                info!(attempt, "Resync with Soma server succeeded");
                return true;
            }
            Err(e) if !is_retryable(&e) => {
                error!(attempt, error = %e, "Resync rejected, not retrying");
                return false;
            }
            Err(e) if policy.has_attempts_remaining(attempt) => {
                let delay = policy.delay_for_attempt(attempt + 1);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Resync failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(attempt, error = %e, "Resync failed, giving up");
            }
        }
    }

    false
}

/// Resync with the server described by `config`
pub async fn resync_sdk(config: &SomaConfig) -> bool {
    let api = match HttpSomaApi::new(config) {
        Ok(api) => api,
        Err(e) => {
            error!(error = %e, "Failed to build Soma API client for resync");
            return false;
        }
    };
    resync_with_backoff_if(
        &config.resync_policy(),
        || api.resync_sdk(),
        ApiError::is_retryable,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(Duration::from_millis(500), 10);
        let started = Instant::now();

        let ok = resync_with_backoff(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("server starting")
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 500ms after the first failure, 1000ms after the second
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(Duration::from_millis(10), 4);

        let ok = resync_with_backoff(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("connection refused") }
        })
        .await;

        assert!(!ok);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(Duration::from_millis(10), 5);

        let ok = resync_with_backoff_if(
            &policy,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    let status = if n == 1 { 503 } else { 401 };
                    Err::<(), _>(ApiError::Status {
                        status,
                        body: String::new(),
                    })
                }
            },
            ApiError::is_retryable,
        )
        .await;

        assert!(!ok);
        // 503 is retried, 401 ends the loop
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
