//! API Tool Gateway Library
//!
//! Compiles OpenAPI 3.x and Swagger 2.0 documents into a live registry of
//! typed operation descriptors that can be invoked, authenticated and
//! rate-limited without hand-written per-endpoint bindings.
//!
//! # Features
//!
//! - **Spec compiler**: `$ref` resolution, Swagger 2.0 normalization, body flattening
//! - **Live registry**: add, replace, list and remove specs at runtime
//! - **Invocation**: argument validation, credential injection, per-operation rate limits
//! - **Failsafes**: per-call timeouts, exponential-backoff retries for GET
//!
//! # Example
//!
//! ```no_run
//! use api_tool_gateway::{compiler::SpecKind, config::Config, provider::ToolProvider};
//! use serde_json::json;
//!
//! # async fn run() -> api_tool_gateway::Result<()> {
//! let provider = ToolProvider::new(&Config::default())?;
//! provider
//!     .register_api_tools("https://api.example.com/openapi.json", SpecKind::OpenApi, None, None)
//!     .await?;
//! let widget = provider.invoke("getWidget", json!({"id": "w1"})).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod fetch;
pub mod invoke;
pub mod provider;
pub mod registry;
pub mod transport;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let initialized = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    initialized.map_err(|e| Error::Config(format!("Failed to initialize logging: {e}")))
}
