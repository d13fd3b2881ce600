//! Per-operation admission control

use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::debug;

use crate::auth::{RateLimitDescriptor, RateWindow};
use crate::{Error, Result};

/// One window's limiter; `None` when the ceiling is zero
struct WindowLimiter {
    window: RateWindow,
    limiter: Option<DefaultDirectRateLimiter>,
}

struct OperationLimiter {
    limits: RateLimitDescriptor,
    windows: Vec<WindowLimiter>,
}

impl OperationLimiter {
    fn new(limits: &RateLimitDescriptor) -> Self {
        let windows = limits
            .ceilings()
            .map(|(window, ceiling)| WindowLimiter {
                window,
                limiter: NonZeroU32::new(ceiling).and_then(|n| {
                    Quota::with_period(window.period() / n.get())
                        .map(|quota| RateLimiter::direct(quota.allow_burst(n)))
                }),
            })
            .collect();
        Self {
            limits: limits.clone(),
            windows,
        }
    }

    fn check(&self) -> std::result::Result<(), RateWindow> {
        for window in &self.windows {
            let admitted = window
                .limiter
                .as_ref()
                .is_some_and(|limiter| limiter.check().is_ok());
            if !admitted {
                return Err(window.window);
            }
        }
        Ok(())
    }
}

/// Rate-limit admission keyed by operation id
///
/// Windows are checked minute, hour, day. A call rejected by a longer
/// window has already consumed a token from the shorter ones.
#[derive(Default)]
pub struct AdmissionControl {
    limiters: DashMap<String, Arc<OperationLimiter>>,
}

impl AdmissionControl {
    /// Create an empty admission controller
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one call of `operation` under `limits`.
    ///
    /// Limiter state survives re-registration as long as the ceilings are
    /// unchanged; changed ceilings start from a fresh window.
    pub fn admit(&self, operation: &str, limits: &RateLimitDescriptor) -> Result<()> {
        if limits.is_unbounded() {
            return Ok(());
        }

        let limiter = {
            let mut entry = self
                .limiters
                .entry(operation.to_string())
                .or_insert_with(|| Arc::new(OperationLimiter::new(limits)));
            if entry.limits != *limits {
                debug!(operation, "Rate limits changed; resetting limiter");
                *entry.value_mut() = Arc::new(OperationLimiter::new(limits));
            }
            Arc::clone(entry.value())
        };

        limiter.check().map_err(|window| {
            debug!(operation, %window, "Rate limit exceeded");
            Error::RateLimitExceeded {
                operation: operation.to_string(),
                window,
            }
        })
    }

    /// Drop the limiter state of `operation`
    pub fn forget(&self, operation: &str) {
        if self.limiters.remove(operation).is_some() {
            debug!(operation, "Dropped rate limiter");
        }
    }

    /// Number of operations with limiter state
    pub fn tracked(&self) -> usize {
        self.limiters.len()
    }
}
