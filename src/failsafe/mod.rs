//! Failsafe mechanisms: rate-limit admission and retry

mod rate_limiter;
mod retry;

pub use rate_limiter::AdmissionControl;
pub use retry::{RetryPolicy, with_retry};
