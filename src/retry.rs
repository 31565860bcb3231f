//! Retry policy around a single external call.
//!
//! Two schedules exist: network failures retry quickly on a short fixed
//! table, usage-limit and server failures back off exponentially. Billing
//! failures are returned on the first occurrence, always.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, warn};

use crate::classifier::parse_retry_after;
use crate::config::RetrySettings;
use crate::error::{ClassifiedError, ErrorCategory};

/// Doubling backoff with a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
}

impl Backoff {
    /// delay = base_delay_ms * 2^(attempt - 1), capped at max_delay_ms.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms)
    }
}

/// How often and how long to wait before re-invoking a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional invocations allowed after the first one.
    pub max_retries: u32,
    /// Fixed delays for network failures; the last entry repeats.
    pub network_delays_ms: Vec<u64>,
    /// Schedule for usage-limit and server failures.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Inner layer: a couple of quick retries.
    pub fn fast() -> Self {
        Self {
            max_retries: 2,
            network_delays_ms: vec![300, 600, 900],
            backoff: Backoff {
                base_delay_ms: 500,
                max_delay_ms: 1_000,
            },
        }
    }

    /// Outer layer: waits out per-minute quotas (3s, 6s, ... 96s).
    pub fn patient() -> Self {
        Self {
            max_retries: 6,
            network_delays_ms: vec![300, 600, 900],
            backoff: Backoff {
                base_delay_ms: 3_000,
                max_delay_ms: 96_000,
            },
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::fast()
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` when the
    /// failure must not be retried at all.
    pub fn delay_for(&self, err: &ClassifiedError, attempt: u32) -> Option<Duration> {
        let ms = match err.category() {
            ErrorCategory::BillingQuota => return None,
            // Retried on their own schedule whatever the retryable flag says.
            ErrorCategory::NetworkFailure => match self.network_delays_ms.as_slice() {
                [] => self.backoff.delay_for_attempt(attempt),
                delays => {
                    let idx = (attempt.saturating_sub(1) as usize).min(delays.len() - 1);
                    delays[idx]
                }
            },
            _ if err.is_retryable() => self.backoff.delay_for_attempt(attempt),
            _ => return None,
        };
        Some(Duration::from_millis(ms))
    }

    /// Runs `operation`, re-invoking it while the failure is retryable and
    /// retries remain. The last error is returned unchanged apart from a
    /// retry hint recovered from its message.
    pub async fn execute<F, Fut, T>(&self, context: &str, operation: F) -> Result<T, ClassifiedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        let mut retries = 0u32;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.category() == ErrorCategory::BillingQuota {
                error!(context, status = ?err.http_status(), detail = err.message(), "billing failure, not retrying");
                return Err(err);
            }

            let Some(delay) = self.delay_for(&err, retries + 1) else {
                return Err(err);
            };

            if retries >= self.max_retries {
                warn!(
                    context,
                    category = %err.category(),
                    attempts = retries + 1,
                    "retries exhausted"
                );
                return Err(annotate_exhausted(err));
            }

            retries += 1;
            warn!(
                context,
                category = %err.category(),
                attempt = retries,
                max = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                "retrying after failure: {}",
                err.message()
            );
            sleep(delay).await;
        }
    }
}

fn annotate_exhausted(err: ClassifiedError) -> ClassifiedError {
    if err.retry_after_secs().is_some() {
        return err;
    }
    let hint = parse_retry_after(None, err.message());
    err.with_retry_after(hint)
}

/// Inner fast layer nested inside an outer slow layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryLayers {
    pub inner: RetryPolicy,
    pub outer: RetryPolicy,
}

impl Default for RetryLayers {
    fn default() -> Self {
        Self {
            inner: RetryPolicy::fast(),
            outer: RetryPolicy::patient(),
        }
    }
}

impl RetryLayers {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            inner: RetryPolicy {
                max_retries: settings.inner_max_retries,
                network_delays_ms: settings.network_delays_ms.clone(),
                backoff: Backoff {
                    base_delay_ms: settings.inner_base_delay_ms,
                    max_delay_ms: settings.inner_max_delay_ms,
                },
            },
            outer: RetryPolicy {
                max_retries: settings.outer_max_retries,
                network_delays_ms: settings.network_delays_ms.clone(),
                backoff: Backoff {
                    base_delay_ms: settings.outer_base_delay_ms,
                    max_delay_ms: settings.outer_max_delay_ms,
                },
            },
        }
    }

    /// Single layer, for callers that want exactly one schedule.
    pub fn single(policy: RetryPolicy) -> Self {
        Self {
            inner: RetryPolicy::none(),
            outer: policy,
        }
    }

    pub async fn execute<F, Fut, T>(&self, context: &str, operation: F) -> Result<T, ClassifiedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        let op = &operation;
        self.outer
            .execute(context, move || self.inner.execute(context, op))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn billing() -> ClassifiedError {
        classify(Some(402), &json!({ "error": { "message": "No payment method on file" } }))
    }

    fn usage_limit() -> ClassifiedError {
        classify(Some(429), &json!({ "error": { "message": "Rate limit reached. Please retry in 20 seconds." } }))
    }

    fn network() -> ClassifiedError {
        ClassifiedError::new(ErrorCategory::NetworkFailure, false, None, "connection refused", Value::Null)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let b = RetryPolicy::patient().backoff;
        let delays: Vec<u64> = (1..=7).map(|n| b.delay_for_attempt(n)).collect();
        assert_eq!(delays, vec![3_000, 6_000, 12_000, 24_000, 48_000, 96_000, 96_000]);

        let fast = RetryPolicy::fast().backoff;
        assert_eq!(fast.delay_for_attempt(1), 500);
        assert_eq!(fast.delay_for_attempt(2), 1_000);
        assert_eq!(fast.delay_for_attempt(30), 1_000);
    }

    #[test]
    fn network_schedule_repeats_last_entry() {
        let p = RetryPolicy::fast();
        let err = network();
        assert_eq!(p.delay_for(&err, 1), Some(Duration::from_millis(300)));
        assert_eq!(p.delay_for(&err, 3), Some(Duration::from_millis(900)));
        assert_eq!(p.delay_for(&err, 9), Some(Duration::from_millis(900)));
    }

    #[test]
    fn terminal_categories_have_no_delay() {
        let p = RetryPolicy::patient();
        assert_eq!(p.delay_for(&billing(), 1), None);
        assert_eq!(p.delay_for(&ClassifiedError::validation("bad"), 1), None);
    }

    #[tokio::test(start_paused = true)]
    async fn billing_failure_invokes_operation_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let layers = RetryLayers::default();

        let result: Result<(), _> = layers
            .execute("billing", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(billing())
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BillingQuota);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn usage_limit_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::patient();
        let start = Instant::now();

        let result = policy
            .execute("usage", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(usage_limit())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_usage_limit_carries_retry_hint() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fast();

        let result: Result<(), _> = policy
            .execute("usage", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(usage_limit())
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.category(), ErrorCategory::UsageLimit);
        assert_eq!(err.retry_after_secs(), Some(20));
    }

    #[tokio::test(start_paused = true)]
    async fn network_failure_retried_even_when_not_flagged_retryable() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fast();
        let start = Instant::now();

        let result: Result<(), _> = policy
            .execute("network", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(network())
                }
            })
            .await;

        assert_eq!(result.unwrap_err().status_code(), 503);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 300ms + 600ms, never the long schedule
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn client_failure_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = RetryLayers::default()
            .execute("client", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(classify(Some(400), &json!({ "error": { "message": "Invalid file format" } })))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().category(), ErrorCategory::ClientFailure);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn layers_multiply_attempts_for_server_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let layers = RetryLayers {
            inner: RetryPolicy::fast(),
            outer: RetryPolicy {
                max_retries: 1,
                ..RetryPolicy::patient()
            },
        };

        let result: Result<(), _> = layers
            .execute("server", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(classify(Some(503), &json!({ "error": { "message": "overloaded" } })))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().category(), ErrorCategory::ServerFailure);
        // (1 + 2 inner retries) * (1 + 1 outer retry)
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn layers_from_settings() {
        let layers = RetryLayers::from_settings(&RetrySettings::default());
        assert_eq!(layers, RetryLayers::default());
    }
}
