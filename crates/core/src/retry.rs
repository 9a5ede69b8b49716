//! Exponential-backoff retry for calls into the tracking engine and its store.
//!
//! Schedule: with `max_retries = n`, the operation runs at most `n` times.
//! After failed attempt `k` (1-based, `k < n`) the caller sleeps
//! `initial_delay * 2^max(0, k - 2)`, i.e. `d, d, 2d, 4d, ...`. There is no
//! sleep after the final attempt. `max_retries` counts attempts, not retries,
//! so the default of 3 sleeps twice rather than three times.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Whether a successful result should count as "nothing yet".
pub trait Emptiness {
    fn is_empty_result(&self) -> bool;
}

impl<T> Emptiness for Option<T> {
    fn is_empty_result(&self) -> bool {
        self.is_none()
    }
}

impl<T> Emptiness for Vec<T> {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

impl Emptiness for String {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

impl Emptiness for bool {
    fn is_empty_result(&self) -> bool {
        !*self
    }
}

impl Emptiness for () {
    fn is_empty_result(&self) -> bool {
        false
    }
}

impl<K, V, S> Emptiness for HashMap<K, V, S> {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Emptiness for BTreeMap<K, V> {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

impl Emptiness for serde_json::Value {
    fn is_empty_result(&self) -> bool {
        match self {
            serde_json::Value::Null => true,
            serde_json::Value::Bool(b) => !b,
            serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(a) => a.is_empty(),
            serde_json::Value::Object(o) => o.is_empty(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts (values below 1 behave as 1).
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Treat an empty successful result as a soft failure and try again.
    pub retry_on_empty: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            retry_on_empty: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            retry_on_empty: false,
        }
    }

    pub fn retry_on_empty(mut self, enabled: bool) -> Self {
        self.retry_on_empty = enabled;
        self
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Sleep following failed attempt `attempt` (1-based). Zero after the last one.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || attempt >= self.attempts() {
            return Duration::ZERO;
        }
        let doublings = attempt.saturating_sub(2);
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(doublings))
    }

    /// Every sleep an always-failing operation would incur, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.attempts())
            .map(|attempt| self.delay_after_attempt(attempt))
            .collect()
    }

    /// Run `op`, retrying every error.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, E>
    where
        T: Emptiness,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_if(operation, op, |_| true).await
    }

    /// Run `op`, retrying only errors for which `should_retry` holds.
    /// Other errors are returned immediately.
    pub async fn run_if<T, E, F, Fut, R>(
        &self,
        operation: &str,
        mut op: F,
        should_retry: R,
    ) -> Result<T, E>
    where
        T: Emptiness,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) if self.retry_on_empty && value.is_empty_result() => {
                    if attempt >= attempts {
                        warn!(operation, attempts, "result still empty after final attempt");
                        return Ok(value);
                    }
                    debug!(operation, attempt, "empty result, retrying");
                }
                Ok(value) => return Ok(value),
                Err(err) if !should_retry(&err) => return Err(err),
                Err(err) => {
                    if attempt >= attempts {
                        error!(operation, attempts, error = %err, "all attempts failed");
                        return Err(err);
                    }
                    warn!(operation, attempt, max_attempts = attempts, error = %err, "attempt failed, retrying");
                }
            }

            tokio::time::sleep(self.delay_after_attempt(attempt)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use tokio::time::Instant;

    #[test]
    fn schedule_reuses_initial_delay_before_doubling() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
        assert_eq!(policy.delay_after_attempt(5), Duration::ZERO);
    }

    #[test]
    fn default_policy_matches_client_contract() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert!(!policy.retry_on_empty);
        assert_eq!(policy.schedule(), vec![Duration::from_secs(1), Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_operation_reraises_last_error_without_trailing_sleep() {
        let policy = RetryPolicy::default();
        let start = Instant::now();
        let calls = RefCell::new(Vec::new());

        let result: Result<(), String> = policy
            .run("always-fails", || {
                let n = {
                    let mut calls = calls.borrow_mut();
                    calls.push(start.elapsed());
                    calls.len()
                };
                async move { Err(format!("boom {n}")) }
            })
            .await;

        assert_eq!(result, Err("boom 3".to_string()));
        let calls = calls.into_inner();
        assert_eq!(
            calls,
            vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn success_returns_immediately() {
        let calls = Cell::new(0);
        let result: Result<Vec<u8>, String> = RetryPolicy::default()
            .run("ok", || {
                calls.set(calls.get() + 1);
                async { Ok(vec![]) }
            })
            .await;
        assert_eq!(result, Ok(vec![]));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<String, String> = RetryPolicy::default()
            .run("flaky", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err("transient".to_string())
                    } else {
                        Ok("done".to_string())
                    }
                }
            })
            .await;
        assert_eq!(result.as_deref(), Ok("done"));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_results_are_retried_when_enabled_then_returned() {
        let policy = RetryPolicy::default().retry_on_empty(true);
        let calls = Cell::new(0);
        let start = Instant::now();

        let result: Result<Option<u32>, String> = policy
            .run("empty", || {
                calls.set(calls.get() + 1);
                async { Ok(None) }
            })
            .await;

        assert_eq!(result, Ok(None));
        assert_eq!(calls.get(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_then_present_result_stops_retrying() {
        let policy = RetryPolicy::default().retry_on_empty(true);
        let calls = Cell::new(0);
        let result: Result<Option<u32>, String> = policy
            .run("eventually", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Ok(if n == 2 { Some(7) } else { None }) }
            })
            .await;
        assert_eq!(result, Ok(Some(7)));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_short_circuit() {
        let calls = Cell::new(0);
        let result: Result<(), String> = RetryPolicy::default()
            .run_if(
                "not-found",
                || {
                    calls.set(calls.get() + 1);
                    async { Err("404".to_string()) }
                },
                |e| e != "404",
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn json_emptiness() {
        assert!(serde_json::Value::Null.is_empty_result());
        assert!(serde_json::json!({}).is_empty_result());
        assert!(serde_json::json!([]).is_empty_result());
        assert!(!serde_json::json!({"a": 1}).is_empty_result());
    }
}
