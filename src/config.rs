//! Configuration management

use std::{collections::HashMap, env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::{CredentialDescriptor, RateLimitDescriptor};
use crate::compiler::SpecKind;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Outbound HTTP settings
    pub http: HttpConfig,
    /// Retry policy for idempotent calls
    pub retry: RetryConfig,
    /// APIs to register
    pub apis: ApisConfig,
}

/// Outbound HTTP settings shared by spec fetch and invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-call timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// TCP connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// `User-Agent` header
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("api-tool-gateway/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum attempts, the first call included
    pub max_attempts: u32,
    /// Initial backoff
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// API registrations plus shared credentials and rate limits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApisConfig {
    /// Specs registered at startup
    pub specs: Vec<SpecConfig>,
    /// Named credentials referenced by specs
    pub auth: HashMap<String, CredentialDescriptor>,
    /// Named rate limits referenced by specs
    pub rate_limits: HashMap<String, RateLimitDescriptor>,
}

/// One spec registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecConfig {
    /// Display name
    pub name: String,
    /// Spec URL or local path
    pub url: String,
    /// Document kind
    #[serde(rename = "type", default)]
    pub kind: SpecKind,
    /// Inline credential or name of an `apis.auth` entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Reference<CredentialDescriptor>>,
    /// Inline rate limits or name of an `apis.rate_limits` entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<Reference<RateLimitDescriptor>>,
}

/// Either a value given inline or the name of a shared entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference<T> {
    /// Name of a shared entry
    Named(String),
    /// Inline value
    Inline(T),
}

impl<T: Clone> Reference<T> {
    fn resolve(&self, shared: &HashMap<String, T>, section: &str) -> Result<T> {
        match self {
            Self::Inline(value) => Ok(value.clone()),
            Self::Named(name) => shared.get(name).cloned().ok_or_else(|| {
                Error::Config(format!("unknown {section} entry '{name}'"))
            }),
        }
    }
}

impl ApisConfig {
    /// Credential for `spec`, resolving named references
    pub fn credential_for(&self, spec: &SpecConfig) -> Result<Option<CredentialDescriptor>> {
        spec.auth
            .as_ref()
            .map(|r| r.resolve(&self.auth, "apis.auth"))
            .transpose()
    }

    /// Rate limits for `spec`, resolving named references
    pub fn rate_limit_for(&self, spec: &SpecConfig) -> Result<Option<RateLimitDescriptor>> {
        spec.rate_limits
            .as_ref()
            .map(|r| r.resolve(&self.rate_limits, "apis.rate_limits"))
            .transpose()
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // API_TOOLS_HTTP__TIMEOUT=5s -> http.timeout
        figment = figment.merge(Env::prefixed("API_TOOLS_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files must be loaded before ${VAR} expansion
        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} in spec URLs and credential fields
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Config(format!("env pattern: {e}")))?;

        for credential in self.apis.auth.values_mut() {
            expand_credential(&re, credential);
        }
        for spec in &mut self.apis.specs {
            spec.url = expand_string(&re, &spec.url);
            if let Some(Reference::Inline(credential)) = &mut spec.auth {
                expand_credential(&re, credential);
            }
        }
        Ok(())
    }
}

fn expand_credential(re: &Regex, credential: &mut CredentialDescriptor) {
    match credential {
        CredentialDescriptor::ApiKey { key, .. } => *key = expand_string(re, key),
        CredentialDescriptor::Bearer { token } => *token = expand_string(re, token),
        CredentialDescriptor::OAuth2ClientCredentials {
            client_id,
            client_secret,
        } => {
            *client_id = expand_string(re, client_id);
            *client_secret = expand_string(re, client_secret);
        }
    }
}

/// Expand environment variables in a string
fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "1h", "100ms")
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(serde::de::Error::custom)
    }

    fn parse(s: &str) -> Result<Duration, std::num::ParseIntError> {
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim().parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim().parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim().parse::<u64>().map(|m| Duration::from_secs(m * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            hours.trim().parse::<u64>().map(|h| Duration::from_secs(h * 3_600))
        } else {
            // Bare number: seconds
            s.parse::<u64>().map(Duration::from_secs)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_units() {
            assert_eq!(parse("100ms").unwrap(), Duration::from_millis(100));
            assert_eq!(parse("30s").unwrap(), Duration::from_secs(30));
            assert_eq!(parse("5m").unwrap(), Duration::from_secs(300));
            assert_eq!(parse("2h").unwrap(), Duration::from_secs(7_200));
            assert_eq!(parse("15").unwrap(), Duration::from_secs(15));
            assert!(parse("soon").is_err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::KeyLocation;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.http.timeout, Duration::from_secs(30));
        assert_eq!(config.http.connect_timeout, Duration::from_secs(10));
        assert!(config.retry.enabled);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(100));
        assert!(config.apis.specs.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/api-tools.yaml"))).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn loads_specs_with_named_and_inline_references() {
        let file = write_config(
            r#"
http:
  timeout: 5s
retry:
  initial_backoff: 250ms
apis:
  auth:
    github:
      type: bearer
      token: ghp_123
  rate_limits:
    slow:
      requests_per_minute: 10
  specs:
    - name: github
      url: https://api.github.com/openapi.json
      auth: github
      rate_limits: slow
    - name: pets
      url: https://pets.example.com/swagger.json
      type: swagger
      auth:
        type: api_key
        key: k
        placement:
          in: query
          name: api_key
      rate_limits:
        requests_per_day: 1000
"#,
        );

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.http.timeout, Duration::from_secs(5));
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(250));

        let [github, pets] = config.apis.specs.as_slice() else {
            panic!("expected two specs");
        };
        assert_eq!(github.kind, SpecKind::OpenApi);
        assert_eq!(pets.kind, SpecKind::Swagger);

        let credential = config.apis.credential_for(github).unwrap().unwrap();
        assert_eq!(credential.kind(), "bearer");
        assert_eq!(
            config.apis.rate_limit_for(github).unwrap(),
            Some(RateLimitDescriptor::per_minute(10))
        );

        match config.apis.credential_for(pets).unwrap() {
            Some(CredentialDescriptor::ApiKey { placement: Some(p), .. }) => {
                assert_eq!(p.location, KeyLocation::Query);
                assert_eq!(p.name, "api_key");
            }
            other => panic!("unexpected credential: {other:?}"),
        }
        assert_eq!(
            config.apis.rate_limit_for(pets).unwrap().unwrap().requests_per_day,
            Some(1000)
        );
    }

    #[test]
    fn unknown_named_reference_is_a_config_error() {
        let spec = SpecConfig {
            name: "x".into(),
            url: "https://x.example.com/openapi.json".into(),
            kind: SpecKind::OpenApi,
            auth: Some(Reference::Named("missing".into())),
            rate_limits: None,
        };
        let err = ApisConfig::default().credential_for(&spec).unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(ApisConfig::default().rate_limit_for(&spec).unwrap().is_none());
    }

    #[test]
    fn env_files_feed_credential_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("secrets.env");
        std::fs::write(&env_path, "APITOOLS_TEST_TOKEN_7F3A=from-env-file\n").unwrap();

        let file = write_config(&format!(
            r#"
env_files:
  - {}
apis:
  specs:
    - name: svc
      url: "https://svc.example.com/${{APITOOLS_TEST_MISSING_9C1B:-v1}}/openapi.json"
      auth:
        type: bearer
        token: "${{APITOOLS_TEST_TOKEN_7F3A}}"
"#,
            env_path.display()
        ));

        let config = Config::load(Some(file.path())).unwrap();
        let spec = &config.apis.specs[0];
        assert_eq!(spec.url, "https://svc.example.com/v1/openapi.json");
        assert_eq!(
            config.apis.credential_for(spec).unwrap(),
            Some(CredentialDescriptor::Bearer {
                token: "from-env-file".into()
            })
        );
    }

    #[test]
    fn missing_env_files_are_skipped() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        config.load_env_files();
    }
}
