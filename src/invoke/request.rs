//! Outbound request construction

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::auth::AuthMaterial;
use crate::compiler::{BodyStyle, OperationDescriptor, ParameterLocation};
use crate::{Error, Result};

/// Everything needed to send one call, rebuilt into a request per attempt
#[derive(Debug, Clone)]
pub(crate) struct RequestPlan {
    pub method: reqwest::Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub basic_auth: Option<(String, String)>,
    pub body: Option<Value>,
}

impl RequestPlan {
    /// Lay out validated `arguments` according to `descriptor`, then apply
    /// the credential.
    pub fn build(
        descriptor: &OperationDescriptor,
        arguments: &Map<String, Value>,
        auth: Option<&AuthMaterial>,
    ) -> Result<Self> {
        let mut url = base_url(descriptor)?;
        append_path(&mut url, descriptor, arguments)?;

        let mut query: Vec<(String, String)> = Vec::new();
        for param in descriptor.parameters.at(ParameterLocation::Query) {
            match arguments.get(&param.name) {
                Some(Value::Array(items)) => query.extend(
                    items
                        .iter()
                        .filter_map(render)
                        .map(|value| (param.name.clone(), value)),
                ),
                Some(value) => {
                    if let Some(value) = render(value) {
                        query.push((param.name.clone(), value));
                    }
                }
                None => {}
            }
        }

        let mut headers = HeaderMap::new();
        for param in descriptor.parameters.at(ParameterLocation::Header) {
            let Some(value) = arguments.get(&param.name).and_then(render) else {
                continue;
            };
            let name = HeaderName::from_bytes(param.name.as_bytes()).map_err(|_| {
                Error::InvalidArguments(format!("'{}' is not a valid header name", param.name))
            })?;
            let value = HeaderValue::from_str(&value).map_err(|_| {
                Error::InvalidArguments(format!("value of header '{}' is not valid", param.name))
            })?;
            headers.insert(name, value);
        }

        let mut basic_auth = None;
        match auth {
            Some(AuthMaterial::Header { name, value }) => {
                // Never echo the credential in errors
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| Error::Config(format!("invalid credential header name '{name}'")))?;
                let mut value = HeaderValue::from_str(value)
                    .map_err(|_| Error::Config("credential is not a valid header value".into()))?;
                value.set_sensitive(true);
                headers.insert(name, value);
            }
            Some(AuthMaterial::Query { name, value }) => query.push((name.clone(), value.clone())),
            Some(AuthMaterial::Basic { username, password }) => {
                basic_auth = Some((username.clone(), password.clone()));
            }
            None => {}
        }

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(&query);
        }

        Ok(Self {
            method: descriptor.method.into(),
            url,
            headers,
            basic_auth,
            body: body(descriptor, arguments),
        })
    }
}

fn base_url(descriptor: &OperationDescriptor) -> Result<Url> {
    if descriptor.base_url.is_empty() {
        return Err(Error::Config(format!(
            "operation '{}' has no base URL (spec {} declares no absolute server)",
            descriptor.id, descriptor.origin
        )));
    }
    Url::parse(&descriptor.base_url).map_err(|e| {
        Error::Config(format!(
            "operation '{}' has an invalid base URL '{}': {e}",
            descriptor.id, descriptor.base_url
        ))
    })
}

/// Append the path template, substituting `{param}` placeholders. Each
/// segment is percent-encoded as a whole.
///
/// A segment that resolves to `.` or `..` is rejected: `Url` drops dot
/// segments, which would send the call to a different resource.
fn append_path(
    url: &mut Url,
    descriptor: &OperationDescriptor,
    arguments: &Map<String, Value>,
) -> Result<()> {
    let segments: Vec<String> = descriptor
        .path_template
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| substitute(segment, descriptor, arguments))
        .collect::<Result<_>>()?;

    if let Some(dots) = segments.iter().find(|segment| matches!(segment.as_str(), "." | "..")) {
        return Err(Error::InvalidArguments(format!(
            "path segment '{dots}' is not allowed in '{}'",
            descriptor.id
        )));
    }

    let mut path = url.path_segments_mut().map_err(|()| {
        Error::Config(format!(
            "base URL '{}' of '{}' cannot take a path",
            descriptor.base_url, descriptor.id
        ))
    })?;
    path.pop_if_empty();
    path.extend(&segments);
    Ok(())
}

fn substitute(
    segment: &str,
    descriptor: &OperationDescriptor,
    arguments: &Map<String, Value>,
) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|i| open + i) else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..close];
        let value = arguments.get(name).and_then(render).ok_or_else(|| {
            Error::InvalidArguments(format!(
                "missing path parameter '{name}' for '{}'",
                descriptor.id
            ))
        })?;
        out.push_str(&value);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn body(descriptor: &OperationDescriptor, arguments: &Map<String, Value>) -> Option<Value> {
    let style = descriptor.body.as_ref()?;
    if !descriptor.method.allows_body() {
        debug!(operation = %descriptor.id, method = %descriptor.method, "Body parameters ignored for method");
        return None;
    }
    match style {
        BodyStyle::Whole { parameter } => arguments.get(parameter).cloned(),
        BodyStyle::Fields => {
            let fields: Map<String, Value> = descriptor
                .parameters
                .at(ParameterLocation::Body)
                .filter_map(|param| {
                    arguments
                        .get(&param.name)
                        .map(|value| (param.name.clone(), value.clone()))
                })
                .collect();
            (!fields.is_empty()).then_some(Value::Object(fields))
        }
    }
}

/// String form of a scalar argument; `None` for null
fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{
        HttpMethod, Parameter, ParameterShape, SpecIdentity, TypeShape,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn param(name: &str, location: ParameterLocation) -> Parameter {
        Parameter {
            name: name.to_string(),
            location,
            shape: TypeShape::String,
            required: false,
            description: None,
        }
    }

    fn descriptor(method: HttpMethod, path: &str, params: Vec<Parameter>, body: Option<BodyStyle>) -> OperationDescriptor {
        let mut parameters = ParameterShape::default();
        for p in params {
            parameters.insert(p);
        }
        OperationDescriptor {
            id: "op".into(),
            method,
            path_template: path.into(),
            base_url: "https://api.example.com/v1".into(),
            parameters,
            response: TypeShape::Opaque,
            body,
            description: String::new(),
            credential: None,
            rate_limit: None,
            api_key_placement: None,
            origin: SpecIdentity::new("https://api.example.com/openapi.json"),
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn substitutes_and_encodes_path_segments() {
        let op = descriptor(
            HttpMethod::Get,
            "/files/{name}/versions/{rev}.json",
            vec![param("name", ParameterLocation::Path), param("rev", ParameterLocation::Path)],
            None,
        );
        let plan = RequestPlan::build(&op, &args(json!({"name": "a b/c", "rev": 3})), None).unwrap();
        assert_eq!(
            plan.url.as_str(),
            "https://api.example.com/v1/files/a%20b%2Fc/versions/3.json"
        );
        assert_eq!(plan.method, reqwest::Method::GET);
    }

    #[test]
    fn dot_segment_arguments_are_rejected() {
        let op = descriptor(
            HttpMethod::Delete,
            "/users/{id}/keys",
            vec![param("id", ParameterLocation::Path)],
            None,
        );
        for dots in ["..", "."] {
            let err = RequestPlan::build(&op, &args(json!({"id": dots})), None).unwrap_err();
            assert_eq!(err.kind(), "invalid_arguments");
        }

        // Dots inside a segment are ordinary characters
        let plan = RequestPlan::build(&op, &args(json!({"id": "..a"})), None).unwrap();
        assert_eq!(plan.url.as_str(), "https://api.example.com/v1/users/..a/keys");
    }

    #[test]
    fn repeats_array_query_values() {
        let op = descriptor(
            HttpMethod::Get,
            "/search",
            vec![param("tag", ParameterLocation::Query), param("q", ParameterLocation::Query)],
            None,
        );
        let plan = RequestPlan::build(&op, &args(json!({"tag": ["x", "y"], "q": null})), None).unwrap();
        assert_eq!(plan.url.query(), Some("tag=x&tag=y"));
    }

    #[test]
    fn applies_credentials() {
        let op = descriptor(HttpMethod::Get, "/me", vec![param("X-Trace", ParameterLocation::Header)], None);

        let bearer = AuthMaterial::Header {
            name: "Authorization".into(),
            value: "Bearer t0k".into(),
        };
        let plan = RequestPlan::build(&op, &args(json!({"X-Trace": "abc"})), Some(&bearer)).unwrap();
        assert_eq!(plan.headers["authorization"], "Bearer t0k");
        assert_eq!(plan.headers["x-trace"], "abc");
        assert!(plan.url.query().is_none());

        let query = AuthMaterial::Query {
            name: "api_key".into(),
            value: "k 1".into(),
        };
        let plan = RequestPlan::build(&op, &Map::new(), Some(&query)).unwrap();
        assert_eq!(plan.url.query(), Some("api_key=k+1"));

        let basic = AuthMaterial::Basic {
            username: "id".into(),
            password: "secret".into(),
        };
        let plan = RequestPlan::build(&op, &Map::new(), Some(&basic)).unwrap();
        assert_eq!(plan.basic_auth, Some(("id".into(), "secret".into())));
    }

    #[test]
    fn body_fields_form_an_object() {
        let op = descriptor(
            HttpMethod::Post,
            "/widgets",
            vec![
                param("tenant", ParameterLocation::Query),
                param("name", ParameterLocation::Body),
                param("size", ParameterLocation::Body),
            ],
            Some(BodyStyle::Fields),
        );
        let plan = RequestPlan::build(&op, &args(json!({"tenant": "t", "name": "w"})), None).unwrap();
        assert_eq!(plan.body, Some(json!({"name": "w"})));
        assert_eq!(plan.url.query(), Some("tenant=t"));
    }

    #[test]
    fn whole_body_is_sent_as_is() {
        let op = descriptor(
            HttpMethod::Put,
            "/tags",
            vec![param("body", ParameterLocation::Body)],
            Some(BodyStyle::Whole { parameter: "body".into() }),
        );
        let plan = RequestPlan::build(&op, &args(json!({"body": ["a", "b"]})), None).unwrap();
        assert_eq!(plan.body, Some(json!(["a", "b"])));
    }

    #[test]
    fn missing_base_url_is_a_config_error() {
        let mut op = descriptor(HttpMethod::Get, "/x", Vec::new(), None);
        op.base_url = String::new();
        let err = RequestPlan::build(&op, &Map::new(), None).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }
}
