//! Retry with exponential backoff and jitter.
//!
//! Only transient failures are retried: network errors, timeouts, 429
//! rate limiting, and 5xx server errors. Auth and schema problems fail
//! fast so a misconfiguration never burns the whole retry budget.

use std::time::Duration;

use kg_domain::Error;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retry attempts after the initial one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base · 2^(n-1)`,
    /// capped at `max_delay`, with ±25% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis() as f64 * 2f64.powi(attempt.saturating_sub(1) as i32);
        let capped = Duration::from_millis(exp as u64).min(self.max_delay);
        jitter(capped)
    }
}

fn jitter(delay: Duration) -> Duration {
    use rand::Rng;
    let factor = rand::thread_rng().gen_range(0.75..1.25);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

/// Whether an error is worth retrying.
pub(crate) fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Timeout(_) | Error::Disconnected(_) => true,
        Error::Http(message) => {
            let msg = message.to_lowercase();
            msg.contains("status 5")
                || msg.contains("status 429")
                || msg.contains("connection refused")
                || msg.contains("connection reset")
                || msg.contains("connect")
                || msg.contains("timed out")
        }
        _ => false,
    }
}

/// Run `operation` under `policy`, sleeping between attempts.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    backend: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && is_retryable(&e) => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    backend = %backend,
                    attempt,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient LLM failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn delay_grows_exponentially_under_the_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        };
        // Jitter is ±25%, so compare against the envelope.
        let d1 = policy.delay_for(1).as_millis() as f64;
        let d3 = policy.delay_for(3).as_millis() as f64;
        assert!((75.0..=125.0).contains(&d1), "d1 = {d1}");
        assert!((300.0..=500.0).contains(&d3), "d3 = {d3}");
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 8,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(2),
        };
        assert!(policy.delay_for(8) <= Duration::from_millis(2500));
    }

    #[test]
    fn classification() {
        assert!(is_retryable(&Error::Timeout("t".into())));
        assert!(is_retryable(&Error::Http("status 503: unavailable".into())));
        assert!(is_retryable(&Error::Http("status 429: slow down".into())));
        assert!(!is_retryable(&Error::Http("status 401: unauthorized".into())));
        assert!(!is_retryable(&Error::Config("bad".into())));
        assert!(!is_retryable(&Error::Json(
            serde_json::from_str::<serde_json::Value>("nope").unwrap_err()
        )));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let calls_in = calls.clone();
        let result = with_retry(&policy, "test", move || {
            let calls = calls_in.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Http("status 500: oops".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();
        let calls_in = calls.clone();
        let result: Result<i32, Error> = with_retry(&policy, "test", move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Http("status 401: unauthorized".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
