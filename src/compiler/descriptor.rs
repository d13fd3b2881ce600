//! Compiled operation descriptor types
//!
//! A descriptor is data, not a closure: it carries everything the
//! invocation engine needs to call one endpoint.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::auth::{ApiKeyPlacement, CredentialDescriptor, RateLimitDescriptor};

/// Stable key under which a spec's operations are registered (its URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SpecIdentity(String);

impl SpecIdentity {
    /// Wrap a spec URL
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The URL as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpecIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpecIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SpecIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// HTTP methods that compile to operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
}

impl HttpMethod {
    /// Parse a path-item key; anything outside the five supported methods is `None`
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "delete" => Some(Self::Delete),
            "patch" => Some(Self::Patch),
            _ => None,
        }
    }

    /// Whether transport failures may be retried automatically
    #[must_use]
    pub fn is_retry_safe(self) -> bool {
        self == Self::Get
    }

    /// Whether body parameters are sent
    #[must_use]
    pub fn allows_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    /// Uppercase method name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
            HttpMethod::Patch => Self::PATCH,
        }
    }
}

/// Type tag derived from a JSON-Schema fragment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TypeShape {
    /// `string`
    String,
    /// `integer`
    Integer,
    /// `number`
    Number,
    /// `boolean`
    Boolean,
    /// Sequence of one element type
    Array {
        /// Element type
        items: Box<TypeShape>,
    },
    /// Record with named fields
    Object {
        /// Fields in document order
        fields: Vec<Field>,
    },
    /// Opaque object: the schema was absent, unresolvable or unsupported
    #[serde(rename = "unknown")]
    Opaque,
}

/// Named field of an object shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    /// Property name
    pub name: String,
    /// Field type
    pub shape: TypeShape,
    /// Listed in the schema's `required`
    pub required: bool,
}

impl TypeShape {
    /// Short tag (`string`, `array`, `object`, `unknown`, ...)
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
            Self::Opaque => "unknown",
        }
    }

    /// Field by name, for object shapes
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        match self {
            Self::Object { fields } => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    /// Loose conformance check of a decoded value against this shape.
    ///
    /// Only used to flag mismatches; never rejects a response.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Opaque, _) | (Self::String, Value::String(_)) | (Self::Boolean, Value::Bool(_)) => {
                true
            }
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Number, Value::Number(_)) => true,
            (Self::Array { items }, Value::Array(values)) => values.iter().all(|v| items.matches(v)),
            (Self::Object { fields }, Value::Object(map)) => fields.iter().all(|field| {
                match map.get(&field.name) {
                    Some(Value::Null) | None => !field.required,
                    Some(v) => field.shape.matches(v),
                }
            }),
            _ => false,
        }
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array { items } => write!(f, "array<{items}>"),
            Self::Object { fields } => {
                f.write_str("object{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let marker = if field.required { "" } else { "?" };
                    write!(f, "{}{marker}: {}", field.name, field.shape)?;
                }
                f.write_str("}")
            }
            other => f.write_str(other.tag()),
        }
    }
}

/// Where a parameter goes in the outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Substituted into the path template
    Path,
    /// Appended to the query string
    Query,
    /// Sent as a request header
    Header,
    /// Serialized into the JSON body
    Body,
}

impl ParameterLocation {
    /// Parse an OpenAPI `in` value. `cookie` is not supported.
    #[must_use]
    pub fn from_openapi(value: &str) -> Option<Self> {
        match value {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "body" | "formData" => Some(Self::Body),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
        })
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    /// Parameter name (unique within the operation)
    pub name: String,
    /// Request location
    pub location: ParameterLocation,
    /// Declared type
    pub shape: TypeShape,
    /// Must be supplied by the caller
    pub required: bool,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Ordered parameter set, unique by name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParameterShape {
    params: Vec<Parameter>,
}

impl ParameterShape {
    /// Add a parameter; returns `false` (and keeps the first) on a name clash
    pub fn insert(&mut self, param: Parameter) -> bool {
        if self.get(&param.name).is_some() {
            return false;
        }
        self.params.push(param);
        true
    }

    /// Parameter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// All parameters in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Required parameters
    pub fn required(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter().filter(|p| p.required)
    }

    /// Parameters at one location
    pub fn at(&self, location: ParameterLocation) -> impl Iterator<Item = &Parameter> {
        self.params.iter().filter(move |p| p.location == location)
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True when the operation takes no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// How body parameters are serialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "style", rename_all = "lowercase")]
pub enum BodyStyle {
    /// Each body parameter is one property of a JSON object
    Fields,
    /// The single named parameter is the whole body
    Whole {
        /// Parameter carrying the body
        parameter: String,
    },
}

/// Everything needed to invoke one endpoint
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    /// `operationId` from the spec
    pub id: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Path template with `{param}` placeholders
    pub path_template: String,
    /// Server URL the path is appended to
    pub base_url: String,
    /// Declared parameters
    pub parameters: ParameterShape,
    /// Success-path response shape
    pub response: TypeShape,
    /// Body serialization, when the operation declares a body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyStyle>,
    /// Human-readable description
    pub description: String,
    /// Credential attached at registration
    #[serde(skip)]
    pub credential: Option<Arc<CredentialDescriptor>>,
    /// Rate limits attached at registration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<Arc<RateLimitDescriptor>>,
    /// API key placement declared by the spec's security schemes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_placement: Option<ApiKeyPlacement>,
    /// Spec this operation was compiled from
    pub origin: SpecIdentity,
}

impl OperationDescriptor {
    /// Credential kind, if any (never the secret itself)
    #[must_use]
    pub fn auth_kind(&self) -> Option<&'static str> {
        self.credential.as_deref().map(CredentialDescriptor::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> TypeShape {
        TypeShape::Object {
            fields: vec![
                Field {
                    name: "name".into(),
                    shape: TypeShape::String,
                    required: true,
                },
                Field {
                    name: "tags".into(),
                    shape: TypeShape::Array {
                        items: Box::new(TypeShape::String),
                    },
                    required: false,
                },
            ],
        }
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(record().to_string(), "object{name: string, tags?: array<string>}");
        assert_eq!(TypeShape::Opaque.to_string(), "unknown");
    }

    #[test]
    fn matches_is_lenient_but_checks_types() {
        let shape = record();
        assert!(shape.matches(&json!({"name": "w", "extra": 1})));
        assert!(shape.matches(&json!({"name": "w", "tags": ["a"]})));
        assert!(!shape.matches(&json!({"tags": []})));
        assert!(!shape.matches(&json!({"name": 5})));
        assert!(TypeShape::Opaque.matches(&json!([1, 2])));
        assert!(!TypeShape::Integer.matches(&json!(1.5)));
        assert!(TypeShape::Number.matches(&json!(1.5)));
    }

    #[test]
    fn parameter_names_are_unique() {
        let mut params = ParameterShape::default();
        let param = Parameter {
            name: "id".into(),
            location: ParameterLocation::Path,
            shape: TypeShape::String,
            required: true,
            description: None,
        };
        assert!(params.insert(param.clone()));
        assert!(!params.insert(Parameter {
            location: ParameterLocation::Query,
            ..param
        }));
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id").unwrap().location, ParameterLocation::Path);
    }

    #[test]
    fn shape_serializes_with_type_tag() {
        let value = serde_json::to_value(TypeShape::Array {
            items: Box::new(TypeShape::Opaque),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "array", "items": {"type": "unknown"}}));
    }

    #[test]
    fn only_get_is_retry_safe() {
        assert!(HttpMethod::Get.is_retry_safe());
        for method in [
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Patch,
            HttpMethod::Delete,
        ] {
            assert!(!method.is_retry_safe());
        }
        assert_eq!(HttpMethod::from_key("options"), None);
    }
}
