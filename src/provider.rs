//! Host-facing facade: fetch → compile → register, plus lookup and invoke
//!
//! ```text
//! ┌──────────────┐  fetch   ┌────────────┐  compile  ┌──────────────┐
//! │ ToolProvider │─────────▶│ SpecFetcher│──────────▶│ compile_spec │
//! └──────┬───────┘          └────────────┘           └──────┬───────┘
//!        │ invoke(id)                                       │ register
//!        ▼                                                  ▼
//! ┌─────────────────┐       find(id)              ┌──────────────┐
//! │ InvocationEngine│◀────────────────────────────│ ToolRegistry │
//! └─────────────────┘                             └──────────────┘
//! ```

use std::sync::Arc;

use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::{CredentialDescriptor, RateLimitDescriptor};
use crate::compiler::{CompileContext, OperationDescriptor, SpecIdentity, SpecKind, compile_spec};
use crate::config::{ApisConfig, Config, SpecConfig};
use crate::failsafe::RetryPolicy;
use crate::fetch::SpecFetcher;
use crate::invoke::InvocationEngine;
use crate::registry::ToolRegistry;
use crate::transport::build_client;
use crate::{Error, Result};

/// Outcome of registering one configured spec
#[derive(Debug)]
pub struct Registration {
    /// Configured name
    pub name: String,
    /// Spec URL
    pub url: String,
    /// Registered operation ids, or why registration failed
    pub result: Result<Vec<String>>,
}

/// Owns the registry and engine handles
pub struct ToolProvider {
    registry: Arc<ToolRegistry>,
    engine: Arc<InvocationEngine>,
    fetcher: SpecFetcher,
}

impl ToolProvider {
    /// Build a provider with its own HTTP client
    pub fn new(config: &Config) -> Result<Self> {
        let client = build_client(&config.http)?;
        Ok(Self::with_client(client, config))
    }

    /// Build a provider over an existing client
    #[must_use]
    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            registry: Arc::new(ToolRegistry::new()),
            engine: Arc::new(InvocationEngine::new(client.clone(), config)),
            fetcher: SpecFetcher::new(client, config.http.timeout, RetryPolicy::new(&config.retry)),
        }
    }

    /// Registry handle
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Engine handle
    #[must_use]
    pub fn engine(&self) -> &Arc<InvocationEngine> {
        &self.engine
    }

    /// Fetch, compile and register the spec at `spec_url`.
    ///
    /// Replaces whatever was registered under the same URL. Returns the
    /// registered operation ids in document order.
    pub async fn register_api_tools(
        &self,
        spec_url: &str,
        kind: SpecKind,
        credential: Option<CredentialDescriptor>,
        rate_limit: Option<RateLimitDescriptor>,
    ) -> Result<Vec<String>> {
        if kind == SpecKind::GraphQl {
            return Err(Error::UnsupportedSpecKind(kind));
        }

        let document = self.fetcher.fetch(spec_url).await?;
        let context = CompileContext::new(spec_url)
            .with_credential(credential)
            .with_rate_limit(rate_limit);
        let operations = compile_spec(&document, kind, &context)?;
        Ok(self.registry.register(context.origin, operations))
    }

    /// Registered tools of one spec, or of all specs in registration order
    pub fn get_registered_tools(&self, spec_url: Option<&str>) -> Vec<Arc<OperationDescriptor>> {
        let identity = spec_url.map(SpecIdentity::from);
        self.registry.list(identity.as_ref())
    }

    /// Remove the tools of one spec and their rate-limit state.
    /// Returns whether the spec was registered.
    pub fn unregister_tools(&self, spec_url: &str) -> bool {
        let identity = SpecIdentity::from(spec_url);
        let operations = self.registry.list(Some(&identity));
        let removed = self.registry.unregister(&identity);
        if removed {
            self.engine.forget(operations.iter().map(|op| op.id.as_str()));
        }
        removed
    }

    /// Invoke a registered operation by id
    pub async fn invoke(&self, operation_id: &str, arguments: Value) -> Result<Value> {
        let descriptor = self
            .registry
            .find(operation_id)
            .ok_or_else(|| Error::ToolNotFound(operation_id.to_string()))?;
        self.engine.invoke(&descriptor, arguments).await
    }

    /// Register every configured spec concurrently.
    ///
    /// One failing spec does not stop the others; results come back in
    /// configuration order.
    pub async fn register_configured(&self, apis: &ApisConfig) -> Vec<Registration> {
        let registrations = apis.specs.iter().map(|spec| async move {
            let result = self.register_spec(apis, spec).await;

            match &result {
                Ok(ids) => info!(api = %spec.name, tools = ids.len(), "API registered"),
                Err(e) => warn!(api = %spec.name, error = %e, kind = e.kind(), "API registration failed"),
            }
            Registration {
                name: spec.name.clone(),
                url: spec.url.clone(),
                result,
            }
        });
        join_all(registrations).await
    }

    async fn register_spec(&self, apis: &ApisConfig, spec: &SpecConfig) -> Result<Vec<String>> {
        let credential = apis.credential_for(spec)?;
        let rate_limit = apis.rate_limit_for(spec)?;
        self.register_api_tools(&spec.url, spec.kind, credential, rate_limit)
            .await
    }
}
