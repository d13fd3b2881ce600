//! Invocation engine - one HTTP call per tool invocation
//!
//! # Order of checks
//!
//! 1. arguments are validated against the descriptor's parameters
//! 2. the credential is materialized
//! 3. the request is built
//! 4. rate-limit admission runs
//!
//! A failure in any of these returns before anything is sent. Only a call
//! that is about to be sent consumes a rate-limit token.
//!
//! # Security
//!
//! Credentials are NEVER logged or included in error messages. Request
//! URLs are not logged either, since a query-placed API key would leak.

mod request;

use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::compiler::OperationDescriptor;
use crate::config::Config;
use crate::failsafe::{AdmissionControl, RetryPolicy, with_retry};
use crate::{Error, Result};

use request::RequestPlan;

/// Upstream error bodies are cut to this many characters
const MAX_ERROR_BODY: usize = 2000;

/// Executes operation descriptors
pub struct InvocationEngine {
    client: Client,
    timeout: Duration,
    retry: RetryPolicy,
    admission: AdmissionControl,
}

impl InvocationEngine {
    /// Create an engine over the shared client
    #[must_use]
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            timeout: config.http.timeout,
            retry: RetryPolicy::new(&config.retry),
            admission: AdmissionControl::new(),
        }
    }

    /// Invoke `descriptor` with `arguments` (a JSON object, or null for none)
    pub async fn invoke(&self, descriptor: &OperationDescriptor, arguments: Value) -> Result<Value> {
        let arguments = validate_arguments(descriptor, arguments)?;

        let auth = descriptor
            .credential
            .as_deref()
            .map(|credential| credential.materialize(descriptor.api_key_placement.as_ref()))
            .transpose()?;

        let plan = RequestPlan::build(descriptor, &arguments, auth.as_ref())?;

        if let Some(limits) = descriptor.rate_limit.as_deref() {
            self.admission.admit(&descriptor.id, limits)?;
        }

        debug!(
            operation = %descriptor.id,
            method = %descriptor.method,
            path = %descriptor.path_template,
            auth = descriptor.auth_kind().unwrap_or("none"),
            "Invoking operation"
        );

        let (status, body) = with_retry(
            &self.retry,
            &descriptor.id,
            descriptor.method.is_retry_safe(),
            || self.send(&plan),
        )
        .await?;

        info!(operation = %descriptor.id, status, bytes = body.len(), "Operation completed");

        let value = decode(&body);
        if !descriptor.response.matches(&value) {
            debug!(
                operation = %descriptor.id,
                expected = %descriptor.response,
                "Response does not match declared shape"
            );
        }
        Ok(value)
    }

    /// Drop rate-limit state kept for these operations
    pub fn forget<'a>(&self, operation_ids: impl IntoIterator<Item = &'a str>) {
        for id in operation_ids {
            self.admission.forget(id);
        }
    }

    async fn send(&self, plan: &RequestPlan) -> Result<(u16, Vec<u8>)> {
        let mut request = self
            .client
            .request(plan.method.clone(), plan.url.clone())
            .headers(plan.headers.clone())
            .timeout(self.timeout);
        if let Some((username, password)) = &plan.basic_auth {
            request = request.basic_auth(username, Some(password));
        }
        if let Some(body) = &plan.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(Error::transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(Error::transport)?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(Error::Upstream {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }
        Ok((status.as_u16(), bytes.to_vec()))
    }
}

/// Check `arguments` against the descriptor's parameters.
///
/// Null counts as no arguments. Unknown names are rejected, and a required
/// parameter given as null counts as missing.
pub fn validate_arguments(
    descriptor: &OperationDescriptor,
    arguments: Value,
) -> Result<Map<String, Value>> {
    let arguments = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidArguments(format!(
                "arguments for '{}' must be a JSON object, got {}",
                descriptor.id,
                json_type(&other)
            )));
        }
    };

    let unknown: Vec<&str> = arguments
        .keys()
        .filter(|name| descriptor.parameters.get(name).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(Error::InvalidArguments(format!(
            "unknown parameter(s) for '{}': {}",
            descriptor.id,
            unknown.join(", ")
        )));
    }

    let missing: Vec<&str> = descriptor
        .parameters
        .required()
        .filter(|param| arguments.get(&param.name).is_none_or(Value::is_null))
        .map(|param| param.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidArguments(format!(
            "missing required parameter(s) for '{}': {}",
            descriptor.id,
            missing.join(", ")
        )));
    }

    Ok(arguments)
}

/// Empty → null, JSON → parsed, anything else → string
fn decode(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
