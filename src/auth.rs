//! Credential and rate-limit descriptors
//!
//! Both are immutable value objects shared (via `Arc`) by every operation
//! compiled from the same registration call.
//!
//! # Security
//!
//! Secret material is redacted from `Debug` output and is never logged.
//! It only leaves this module through [`CredentialDescriptor::materialize`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How to authenticate an outbound call
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialDescriptor {
    /// Static API key
    ApiKey {
        /// Key value
        key: String,
        /// Where to put the key; falls back to the spec's `apiKey` scheme,
        /// then to the `X-API-Key` header
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placement: Option<ApiKeyPlacement>,
    },
    /// Bearer token sent as `Authorization: Bearer <token>`
    Bearer {
        /// Token value
        token: String,
    },
    /// OAuth2 client credentials, carried as HTTP Basic auth
    #[serde(rename = "oauth2", alias = "oauth2_client_credentials")]
    OAuth2ClientCredentials {
        /// Client id
        client_id: String,
        /// Client secret
        client_secret: String,
    },
}

/// Where an API key goes in the outbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyPlacement {
    /// Header or query
    #[serde(rename = "in")]
    pub location: KeyLocation,
    /// Header name or query parameter name
    pub name: String,
}

/// Location of an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyLocation {
    /// Request header
    Header,
    /// Query string parameter
    Query,
}

impl ApiKeyPlacement {
    /// Key in a named header
    pub fn header(name: impl Into<String>) -> Self {
        Self {
            location: KeyLocation::Header,
            name: name.into(),
        }
    }

    /// Key in a named query parameter
    pub fn query(name: impl Into<String>) -> Self {
        Self {
            location: KeyLocation::Query,
            name: name.into(),
        }
    }
}

impl Default for ApiKeyPlacement {
    fn default() -> Self {
        Self::header("X-API-Key")
    }
}

/// Auth material ready to be applied to a request
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMaterial {
    /// Header to set
    Header {
        /// Header name
        name: String,
        /// Header value
        value: String,
    },
    /// Query parameter to append
    Query {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },
    /// HTTP Basic credentials
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },
}

impl fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header { name, .. } => write!(f, "Header({name}: ***)"),
            Self::Query { name, .. } => write!(f, "Query({name}=***)"),
            Self::Basic { .. } => f.write_str("Basic(***)"),
        }
    }
}

fn require(field: &str, value: &str, kind: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!(
            "{kind} credential requires a non-empty '{field}'"
        )));
    }
    Ok(())
}

impl CredentialDescriptor {
    /// Build a validated API key credential
    pub fn api_key(key: impl Into<String>, placement: Option<ApiKeyPlacement>) -> Result<Self> {
        let credential = Self::ApiKey {
            key: key.into(),
            placement,
        };
        credential.validate()?;
        Ok(credential)
    }

    /// Build a validated bearer credential
    pub fn bearer(token: impl Into<String>) -> Result<Self> {
        let credential = Self::Bearer {
            token: token.into(),
        };
        credential.validate()?;
        Ok(credential)
    }

    /// Build validated OAuth2 client credentials
    pub fn oauth2(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        let credential = Self::OAuth2ClientCredentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        };
        credential.validate()?;
        Ok(credential)
    }

    /// Kind label (`api_key`, `bearer`, `oauth2`)
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => "api_key",
            Self::Bearer { .. } => "bearer",
            Self::OAuth2ClientCredentials { .. } => "oauth2",
        }
    }

    /// Check that every field required by the kind is non-empty.
    ///
    /// Deserialized credentials are not validated on load; the invocation
    /// engine calls this before each outbound call.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::ApiKey { key, placement } => {
                require("key", key, "api_key")?;
                if let Some(placement) = placement {
                    require("placement.name", &placement.name, "api_key")?;
                }
                Ok(())
            }
            Self::Bearer { token } => require("token", token, "bearer"),
            Self::OAuth2ClientCredentials {
                client_id,
                client_secret,
            } => {
                require("client_id", client_id, "oauth2")?;
                require("client_secret", client_secret, "oauth2")
            }
        }
    }

    /// Turn the credential into request auth material.
    ///
    /// `spec_placement` is the placement declared by the spec's `apiKey`
    /// security scheme; an explicit placement on the credential wins.
    pub fn materialize(&self, spec_placement: Option<&ApiKeyPlacement>) -> Result<AuthMaterial> {
        self.validate()?;
        Ok(match self {
            Self::ApiKey { key, placement } => {
                let placement = placement
                    .as_ref()
                    .or(spec_placement)
                    .cloned()
                    .unwrap_or_default();
                match placement.location {
                    KeyLocation::Header => AuthMaterial::Header {
                        name: placement.name,
                        value: key.clone(),
                    },
                    KeyLocation::Query => AuthMaterial::Query {
                        name: placement.name,
                        value: key.clone(),
                    },
                }
            }
            Self::Bearer { token } => AuthMaterial::Header {
                name: "Authorization".to_string(),
                value: format!("Bearer {token}"),
            },
            Self::OAuth2ClientCredentials {
                client_id,
                client_secret,
            } => AuthMaterial::Basic {
                username: client_id.clone(),
                password: client_secret.clone(),
            },
        })
    }
}

impl fmt::Debug for CredentialDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey { placement, .. } => f
                .debug_struct("ApiKey")
                .field("key", &"***")
                .field("placement", placement)
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
            Self::OAuth2ClientCredentials { client_id, .. } => f
                .debug_struct("OAuth2ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"***")
                .finish(),
        }
    }
}

/// Per-minute/hour/day request ceilings. `None` means no ceiling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitDescriptor {
    /// Maximum requests per minute
    pub requests_per_minute: Option<u32>,
    /// Maximum requests per hour
    pub requests_per_hour: Option<u32>,
    /// Maximum requests per day
    pub requests_per_day: Option<u32>,
}

impl RateLimitDescriptor {
    /// Only a per-minute ceiling
    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self {
            requests_per_minute: Some(limit),
            ..Self::default()
        }
    }

    /// True when no ceiling is configured
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.requests_per_minute.is_none()
            && self.requests_per_hour.is_none()
            && self.requests_per_day.is_none()
    }

    /// Configured ceilings, shortest window first
    pub fn ceilings(&self) -> impl Iterator<Item = (RateWindow, u32)> + '_ {
        [
            (RateWindow::Minute, self.requests_per_minute),
            (RateWindow::Hour, self.requests_per_hour),
            (RateWindow::Day, self.requests_per_day),
        ]
        .into_iter()
        .filter_map(|(window, limit)| limit.map(|l| (window, l)))
    }
}

/// Rate-limit window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateWindow {
    /// 60 seconds
    Minute,
    /// 3600 seconds
    Hour,
    /// 86400 seconds
    Day,
}

impl RateWindow {
    /// Window length
    #[must_use]
    pub fn period(self) -> Duration {
        match self {
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(3_600),
            Self::Day => Duration::from_secs(86_400),
        }
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        })
    }
}
