//! Shared outbound HTTP client

use reqwest::Client;

use crate::config::HttpConfig;
use crate::{Error, Result};

/// Build the single client used for spec fetches and invocations.
///
/// The per-call timeout is applied on each request, not here, so the
/// connection pool can be shared by callers with different deadlines.
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(config.connect_timeout)
        .gzip(true)
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_defaults() {
        assert!(build_client(&HttpConfig::default()).is_ok());
    }
}
