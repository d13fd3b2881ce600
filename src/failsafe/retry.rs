//! Retry logic with exponential backoff

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::debug;

use crate::Error;
use crate::config::RetryConfig;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Whether retries are enabled
    pub enabled: bool,
    /// Maximum attempts, the first call included
    pub max_attempts: u32,
    /// Initial backoff
    pub initial_backoff: Duration,
    /// Maximum backoff
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    /// A policy that never retries
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(&RetryConfig::default())
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        #[allow(clippy::cast_possible_truncation)]
        let factor = self.multiplier.max(1.0) as f32;
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(factor)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

/// Execute a future with retry logic
///
/// Only [`Error::is_retryable`] failures are retried, and only when
/// `retry_safe` is set: a non-idempotent call is attempted exactly once.
///
/// # Errors
///
/// Returns the last error from `f` if all retry attempts are exhausted or
/// the error is not retryable.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    name: &str,
    retry_safe: bool,
    f: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    if !policy.enabled || !retry_safe || policy.max_attempts <= 1 {
        let mut f = f;
        return f().await;
    }

    f.retry(policy.backoff())
        .when(Error::is_retryable)
        .notify(|err: &Error, delay: Duration| {
            debug!(
                operation = name,
                delay_ms = delay.as_millis(),
                error = %err,
                "Retrying after backoff"
            );
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            enabled: true,
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    async fn failing(calls: Arc<AtomicU32>, error: fn() -> Error) -> Result<u32, Error> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(error())
    }

    #[tokio::test]
    async fn retries_transport_errors_up_to_the_bound() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(&fast_policy(3), "op", true, || {
            failing(Arc::clone(&calls), || Error::Transport("reset".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(&fast_policy(3), "op", true, || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::Transport("timeout".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn upstream_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(&fast_policy(5), "op", true, || {
            failing(Arc::clone(&calls), || Error::Upstream {
                status: 503,
                body: String::new(),
            })
        })
        .await;

        assert!(matches!(result, Err(Error::Upstream { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsafe_methods_run_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let _ = with_retry(&fast_policy(5), "op", false, || {
            failing(Arc::clone(&calls), || Error::Transport("reset".into()))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_policy_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let _ = with_retry(&RetryPolicy::disabled(), "op", true, || {
            failing(Arc::clone(&calls), || Error::Transport("reset".into()))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
