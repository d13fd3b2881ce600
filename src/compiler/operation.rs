//! Single-operation compiler
//!
//! Turns one `paths.<path>.<method>` entry into an [`OperationDescriptor`].
//! The input is expected in OpenAPI 3 shape; Swagger 2.0 documents are
//! normalized beforehand by [`super::swagger::normalize`].

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use super::descriptor::{
    BodyStyle, HttpMethod, OperationDescriptor, Parameter, ParameterLocation, ParameterShape,
    SpecIdentity, TypeShape,
};
use super::schema::{deref, translate};
use crate::auth::{ApiKeyPlacement, CredentialDescriptor, KeyLocation, RateLimitDescriptor};

/// Registration-time inputs shared by every operation of one spec
#[derive(Debug, Clone)]
pub struct CompileContext {
    /// Spec identity (URL)
    pub origin: SpecIdentity,
    /// Credential attached to every operation
    pub credential: Option<Arc<CredentialDescriptor>>,
    /// Rate limits attached to every operation
    pub rate_limit: Option<Arc<RateLimitDescriptor>>,
}

impl CompileContext {
    /// Context with no credential or rate limit
    pub fn new(origin: impl Into<SpecIdentity>) -> Self {
        Self {
            origin: origin.into(),
            credential: None,
            rate_limit: None,
        }
    }

    /// Attach a credential
    #[must_use]
    pub fn with_credential(mut self, credential: Option<CredentialDescriptor>) -> Self {
        self.credential = credential.map(Arc::new);
        self
    }

    /// Attach rate limits
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimitDescriptor>) -> Self {
        self.rate_limit = rate_limit.map(Arc::new);
        self
    }
}

/// Compiles operations of one document
pub struct OperationCompiler<'a> {
    document: &'a Value,
    context: &'a CompileContext,
    base_url: String,
    api_key_placement: Option<ApiKeyPlacement>,
}

impl<'a> OperationCompiler<'a> {
    /// Prepare a compiler for `document` (OpenAPI 3 shape)
    #[must_use]
    pub fn new(document: &'a Value, context: &'a CompileContext) -> Self {
        Self {
            document,
            context,
            base_url: resolve_base_url(document, &context.origin),
            api_key_placement: api_key_placement(document),
        }
    }

    /// Base URL operations of this document are invoked against
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Compile one operation entry.
    ///
    /// `shared_parameters` are the path item's own `parameters`. Returns
    /// `None` when the entry has no `operationId`: an operation without a
    /// stable name is never exposed as a tool.
    #[must_use]
    pub fn compile(
        &self,
        entry: &Value,
        method: HttpMethod,
        path: &str,
        shared_parameters: &[Value],
    ) -> Option<OperationDescriptor> {
        let Some(operation) = entry.as_object() else {
            warn!(path, %method, "Skipping operation: entry is not a mapping");
            return None;
        };

        let Some(id) = operation
            .get("operationId")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            warn!(path, %method, "Skipping operation without operationId");
            return None;
        };

        debug!(operation = id, path, %method, "Compiling operation");

        let mut parameters = self.parameters(id, operation, shared_parameters);
        let body = self.request_body(id, operation, &mut parameters);

        Some(OperationDescriptor {
            id: id.to_string(),
            method,
            path_template: path.to_string(),
            base_url: self.base_url.clone(),
            parameters,
            response: self.response_shape(operation),
            body,
            description: describe(operation),
            credential: self.context.credential.clone(),
            rate_limit: self.context.rate_limit.clone(),
            api_key_placement: self.api_key_placement.clone(),
            origin: self.context.origin.clone(),
        })
    }

    /// Path-level and operation-level parameters, operation winning on
    /// `(name, in)` clashes.
    fn parameters(
        &self,
        id: &str,
        operation: &Map<String, Value>,
        shared_parameters: &[Value],
    ) -> ParameterShape {
        let own: &[Value] = operation
            .get("parameters")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice);

        let mut merged: Vec<&Map<String, Value>> = Vec::new();
        for raw in shared_parameters.iter().chain(own) {
            let Some(param) = deref(raw, self.document).and_then(Value::as_object) else {
                debug!(operation = id, "Ignoring unresolvable parameter");
                continue;
            };
            let key = param_key(param);
            match merged.iter().position(|p| param_key(p) == key) {
                Some(index) => merged[index] = param,
                None => merged.push(param),
            }
        }

        let mut shape = ParameterShape::default();
        for param in merged {
            let Some(name) = param.get("name").and_then(Value::as_str) else {
                debug!(operation = id, "Ignoring parameter without a name");
                continue;
            };
            let raw_location = param.get("in").and_then(Value::as_str).unwrap_or_default();
            let Some(location) = ParameterLocation::from_openapi(raw_location) else {
                debug!(operation = id, parameter = name, location = raw_location, "Ignoring unsupported parameter location");
                continue;
            };

            let schema = param
                .get("schema")
                .or_else(|| param.get("content").and_then(|c| pick_media(c)?.get("schema")));
            let required = location == ParameterLocation::Path
                || param.get("required").and_then(Value::as_bool).unwrap_or(false);

            let inserted = shape.insert(Parameter {
                name: name.to_string(),
                location,
                shape: schema.map_or(TypeShape::Opaque, |s| translate(s, self.document)),
                required,
                description: param
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
            if !inserted {
                debug!(operation = id, parameter = name, "Ignoring duplicate parameter name");
            }
        }
        shape
    }

    /// Flatten the JSON request body into body parameters.
    fn request_body(
        &self,
        id: &str,
        operation: &Map<String, Value>,
        parameters: &mut ParameterShape,
    ) -> Option<BodyStyle> {
        let body = deref(operation.get("requestBody")?, self.document)?;
        let body_required = body.get("required").and_then(Value::as_bool).unwrap_or(false);
        let shape = body
            .get("content")
            .and_then(pick_media)
            .and_then(|media| media.get("schema"))
            .map_or(TypeShape::Opaque, |schema| translate(schema, self.document));

        if let TypeShape::Object { fields } = shape {
            for field in fields {
                let name = field.name.clone();
                let inserted = parameters.insert(Parameter {
                    name: field.name,
                    location: ParameterLocation::Body,
                    shape: field.shape,
                    required: field.required && body_required,
                    description: None,
                });
                if !inserted {
                    debug!(operation = id, parameter = %name, "Body property shadowed by parameter");
                }
            }
            return Some(BodyStyle::Fields);
        }

        let inserted = parameters.insert(Parameter {
            name: "body".to_string(),
            location: ParameterLocation::Body,
            shape,
            required: body_required,
            description: body
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
        if inserted {
            Some(BodyStyle::Whole {
                parameter: "body".to_string(),
            })
        } else {
            warn!(operation = id, "Request body dropped: a parameter is already named 'body'");
            None
        }
    }

    /// Shape of the success response; opaque when undeclared.
    fn response_shape(&self, operation: &Map<String, Value>) -> TypeShape {
        let Some(responses) = operation.get("responses").and_then(Value::as_object) else {
            return TypeShape::Opaque;
        };

        let success = ["200", "201"]
            .iter()
            .find_map(|code| responses.get(*code))
            .or_else(|| {
                responses
                    .iter()
                    .find(|(code, _)| code.starts_with('2'))
                    .map(|(_, response)| response)
            });

        success
            .and_then(|response| deref(response, self.document))
            .and_then(|response| response.get("content"))
            .and_then(pick_media)
            .and_then(|media| media.get("schema"))
            .map_or(TypeShape::Opaque, |schema| translate(schema, self.document))
    }
}

fn param_key(param: &Map<String, Value>) -> (Option<&str>, Option<&str>) {
    (
        param.get("name").and_then(Value::as_str),
        param.get("in").and_then(Value::as_str),
    )
}

/// Prefer `application/json`, then any `+json` type, then whatever is first.
fn pick_media(content: &Value) -> Option<&Value> {
    let content = content.as_object()?;
    content
        .get("application/json")
        .or_else(|| {
            content
                .iter()
                .find(|(media, _)| media.ends_with("+json"))
                .map(|(_, v)| v)
        })
        .or_else(|| content.values().next())
}

fn describe(operation: &Map<String, Value>) -> String {
    ["description", "summary"]
        .iter()
        .find_map(|key| operation.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// First `servers[].url` (variables filled with defaults), resolved against
/// the spec URL when relative. Without servers, the spec URL's origin.
fn resolve_base_url(document: &Value, origin: &SpecIdentity) -> String {
    let spec_url = Url::parse(origin.as_str())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"));

    let server = document
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first());

    let Some(server) = server else {
        return spec_url
            .map(|url| url.origin().ascii_serialization())
            .unwrap_or_default();
    };

    let mut raw = server
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or("/")
        .to_string();
    if let Some(variables) = server.get("variables").and_then(Value::as_object) {
        for (name, variable) in variables {
            if let Some(default) = variable.get("default").and_then(Value::as_str) {
                raw = raw.replace(&format!("{{{name}}}"), default);
            }
        }
    }

    let resolved = match Url::parse(&raw) {
        Ok(url) => url.to_string(),
        Err(_) => match spec_url.and_then(|base| base.join(&raw).ok()) {
            Some(url) => url.to_string(),
            None => raw,
        },
    };
    resolved.trim_end_matches('/').to_string()
}

/// Placement declared by the document's first header/query `apiKey` scheme.
fn api_key_placement(document: &Value) -> Option<ApiKeyPlacement> {
    let schemes = document
        .pointer("/components/securitySchemes")?
        .as_object()?;
    schemes.values().find_map(|scheme| {
        let scheme = deref(scheme, document)?;
        if scheme.get("type").and_then(Value::as_str) != Some("apiKey") {
            return None;
        }
        let name = scheme.get("name").and_then(Value::as_str)?.to_string();
        let location = match scheme.get("in").and_then(Value::as_str)? {
            "header" => KeyLocation::Header,
            "query" => KeyLocation::Query,
            _ => return None,
        };
        Some(ApiKeyPlacement { location, name })
    })
}
