//! Spec document retrieval
//!
//! `http(s)://` locations are fetched with the shared client and must
//! answer 2xx with a JSON body. `file://` URLs and plain paths are read from
//! disk and may be JSON or YAML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::failsafe::{RetryPolicy, with_retry};
use crate::{Error, Result};

/// Where a spec document lives
#[derive(Debug, Clone, PartialEq, Eq)]
enum SpecSource {
    Remote(Url),
    Local(PathBuf),
}

impl SpecSource {
    fn parse(location: &str) -> Result<Self> {
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Remote(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|()| Error::SpecFetch(format!("invalid file URL: {location}"))),
            // Single-letter schemes are Windows drive letters
            Ok(url) if url.scheme().len() > 1 => Err(Error::SpecFetch(format!(
                "unsupported URL scheme '{}' in {location}",
                url.scheme()
            ))),
            _ => Ok(Self::Local(PathBuf::from(location))),
        }
    }
}

/// Fetches spec documents
#[derive(Clone)]
pub struct SpecFetcher {
    client: Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl SpecFetcher {
    /// Create a fetcher over the shared client
    #[must_use]
    pub fn new(client: Client, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            client,
            timeout,
            retry,
        }
    }

    /// Fetch and parse the document at `location`
    pub async fn fetch(&self, location: &str) -> Result<Value> {
        match SpecSource::parse(location)? {
            SpecSource::Remote(url) => self.fetch_remote(url).await,
            SpecSource::Local(path) => read_local(&path).await,
        }
    }

    async fn fetch_remote(&self, url: Url) -> Result<Value> {
        debug!(spec = %url, "Fetching spec");
        let body = with_retry(&self.retry, url.as_str(), true, || {
            let url = url.clone();
            let request = self.client.get(url.clone()).timeout(self.timeout);
            async move {
                let response = request.send().await.map_err(Error::transport)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::SpecFetch(format!("GET {url} returned {status}")));
                }
                response.bytes().await.map_err(Error::transport)
            }
        })
        .await
        .map_err(|e| match e {
            Error::Transport(msg) => Error::SpecFetch(format!("GET {url} failed: {msg}")),
            other => other,
        })?;

        let document = serde_json::from_slice(&body)
            .map_err(|e| Error::SpecFetch(format!("{url} did not return JSON: {e}")))?;
        info!(spec = %url, bytes = body.len(), "Fetched spec");
        Ok(document)
    }
}

async fn read_local(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::SpecFetch(format!("cannot read {}: {e}", path.display())))?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let document = if is_yaml {
        serde_yaml::from_str(&text).map_err(|e| {
            Error::SpecFetch(format!("{} is not valid YAML: {e}", path.display()))
        })?
    } else {
        // JSON first, YAML as a fallback for extension-less files
        match serde_json::from_str(&text) {
            Ok(document) => document,
            Err(json_err) => serde_yaml::from_str(&text).map_err(|_| {
                Error::SpecFetch(format!("{} is not valid JSON: {json_err}", path.display()))
            })?,
        }
    };
    debug!(spec = %path.display(), "Read local spec");
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fetcher() -> SpecFetcher {
        SpecFetcher::new(Client::new(), Duration::from_secs(5), RetryPolicy::disabled())
    }

    #[test]
    fn classifies_locations() {
        assert!(matches!(
            SpecSource::parse("https://api.example.com/openapi.json").unwrap(),
            SpecSource::Remote(_)
        ));
        assert_eq!(
            SpecSource::parse("./specs/petstore.yaml").unwrap(),
            SpecSource::Local(PathBuf::from("./specs/petstore.yaml"))
        );
        assert_eq!(
            SpecSource::parse("file:///tmp/spec.json").unwrap(),
            SpecSource::Local(PathBuf::from("/tmp/spec.json"))
        );
        assert_eq!(
            SpecSource::parse("ftp://example.com/spec.json").unwrap_err().kind(),
            "spec_fetch_failure"
        );
    }

    #[tokio::test]
    async fn reads_json_and_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("spec.json");
        std::fs::write(&json_path, r#"{"openapi": "3.0.0", "paths": {}}"#).unwrap();
        let yaml_path = dir.path().join("spec.yaml");
        std::fs::write(&yaml_path, "openapi: 3.0.0\npaths: {}\n").unwrap();

        let from_json = fetcher().fetch(json_path.to_str().unwrap()).await.unwrap();
        assert_eq!(from_json, json!({"openapi": "3.0.0", "paths": {}}));

        let from_yaml = fetcher().fetch(yaml_path.to_str().unwrap()).await.unwrap();
        assert_eq!(from_yaml["paths"], json!({}));
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_error() {
        let err = fetcher().fetch("/nonexistent/spec.json").await.unwrap_err();
        assert_eq!(err.kind(), "spec_fetch_failure");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_fetch_error() {
        let err = fetcher()
            .fetch("http://127.0.0.1:1/openapi.json")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "spec_fetch_failure");
    }
}
