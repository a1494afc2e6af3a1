//! Retry policy for transient upstream failures.
//!
//! Realized as the generic [`with_retry`] function: repeat a fallible async
//! closure up to `max_retries` times with exponential backoff, honoring a
//! cancellation token at every sleep.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tuning profile for one retry call site. Separate profiles exist for default
/// HTTP calls, tool-call dispatch, vector-store lookups, and LLM provider calls,
/// since the latter needs a larger base delay/multiplier and treats 429
/// as retryable with a longer initial backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryConfig {
    /// General-purpose default: small, fast backoff for short-lived collaborator
    /// calls (message/agent repository, learning store).
    pub fn default_profile() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    /// Tool-call dispatch: tool services are expected to be fast and local, so
    /// keep the ceiling low to avoid stalling a turn.
    pub fn tool_call() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(150),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }

    /// Vector-store (RAG retriever) lookups.
    pub fn vector_store() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(3),
            multiplier: 2.0,
        }
    }

    /// LLM provider calls: larger base delay and multiplier, longer initial
    /// backoff specifically for 429s.
    pub fn llm() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            multiplier: 3.0,
        }
    }
}

/// Classify an error as retryable: network timeout, connection
/// refused/reset, EOF, DNS failure, or HTTP status 429/502/503/504.
pub fn is_retryable(message: &str, status: Option<u16>) -> bool {
    if let Some(code) = status {
        if matches!(code, 429 | 502 | 503 | 504) {
            return true;
        }
    }
    let lower = message.to_lowercase();
    lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("unexpected eof")
        || lower.contains("eof")
        || lower.contains("dns")
        || lower.contains("failed to lookup address")
}

/// Outcome of a retry attempt, used internally to decide whether to keep
/// looping.
enum Attempt<T, E> {
    Done(Result<T, E>),
    Retry(E),
}

/// Run `fn_` up to `config.max_retries` additional times on retryable failures,
/// sleeping with exponential backoff between attempts. `classify` decides
/// whether a given error is retryable (e.g. [`is_retryable`] applied to the
/// error's rendered message and an optional status code extracted by the
/// caller).
///
/// The backoff sleep races against `token.cancelled()`; cancellation aborts the
/// loop immediately and returns the last error observed.
pub async fn with_retry<T, E, F, Fut>(
    config: RetryConfig,
    token: &CancellationToken,
    mut classify: impl FnMut(&E) -> bool,
    mut fn_: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = config.initial_delay;
    let mut last_err: Option<E> = None;

    for attempt in 0..=config.max_retries {
        if token.is_cancelled() {
            // Cancellation during a prior sleep; surface the last known error.
            if let Some(err) = last_err {
                return Err(err);
            }
        }

        let outcome = match fn_().await {
            Ok(value) => Attempt::Done(Ok(value)),
            Err(err) => {
                if attempt == config.max_retries || !classify(&err) {
                    Attempt::Done(Err(err))
                } else {
                    Attempt::Retry(err)
                }
            }
        };

        match outcome {
            Attempt::Done(result) => return result,
            Attempt::Retry(err) => {
                last_err = Some(err);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => {
                        return Err(last_err.unwrap());
                    }
                }
                delay = Duration::from_secs_f64((delay.as_secs_f64() * config.multiplier).min(config.max_delay.as_secs_f64()));
            }
        }
    }

    // Unreachable in practice: the loop above always returns on the final
    // attempt, but the compiler needs an exhaustive path.
    Err(last_err.expect("retry loop exited without an attempt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let config = RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        };

        let result: Result<&str, String> = with_retry(
            config,
            &token,
            |_e: &String| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("503".to_string())
                    } else {
                        Ok("ok")
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        };

        let result: Result<&str, String> = with_retry(
            config,
            &token,
            |e: &String| e != "terminal",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("terminal".to_string()) }
            },
        )
        .await;

        assert_eq!(result, Err("terminal".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retry_budget() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let config = RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        };

        let result: Result<&str, String> = with_retry(config, &token, |_e: &String| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("503".to_string()) }
        })
        .await;

        assert_eq!(result, Err("503".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }

    #[test]
    fn classifies_retryable_statuses() {
        assert!(is_retryable("boom", Some(429)));
        assert!(is_retryable("boom", Some(503)));
        assert!(!is_retryable("boom", Some(404)));
        assert!(is_retryable("Connection reset by peer", None));
        assert!(!is_retryable("invalid api key", None));
    }
}
