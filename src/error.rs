//! Error types for the API tool gateway

use thiserror::Error;

use crate::auth::RateWindow;
use crate::compiler::SpecKind;

/// Result type alias for the API tool gateway
pub type Result<T> = std::result::Result<T, Error>;

/// API tool gateway errors
///
/// Registration-time failures (`SpecFetch`, `UnsupportedSpecKind`,
/// `InvalidSpec`) mean nothing was registered. Invocation-time failures are
/// split so callers can tell a configuration mistake from a transient
/// transport problem from a genuine upstream answer.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (bad config file, missing credential material)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Spec document could not be fetched or was not JSON
    #[error("Spec fetch failed: {0}")]
    SpecFetch(String),

    /// Spec kind the compiler does not handle
    #[error("Spec kind not supported: {0}")]
    UnsupportedSpecKind(SpecKind),

    /// Spec document is structurally unusable
    #[error("Invalid spec document: {0}")]
    InvalidSpec(String),

    /// Caller arguments do not match the operation's parameters
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// No registered operation has this id
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Admission check rejected the call
    #[error("Rate limit exceeded for '{operation}': per-{window} ceiling reached")]
    RateLimitExceeded {
        /// Operation id
        operation: String,
        /// Window whose ceiling was hit
        window: RateWindow,
    },

    /// Timeout, connection or DNS failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx answer from the target API
    #[error("Upstream returned {status}: {body}")]
    Upstream {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },
}

impl Error {
    /// Whether an automatic retry may help
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Stable snake_case label for logs and CLI output
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration_error",
            Self::SpecFetch(_) => "spec_fetch_failure",
            Self::UnsupportedSpecKind(_) => "unsupported_spec_kind",
            Self::InvalidSpec(_) => "invalid_spec",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::Transport(_) => "transport_failure",
            Self::Upstream { .. } => "upstream_error",
        }
    }

    /// Map a reqwest failure to a transport error.
    ///
    /// The URL is stripped first: query strings may carry an API key.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::Transport(format!("connection failed: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
