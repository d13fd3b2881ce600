//! Swagger 2.0 → OpenAPI 3 structural normalization
//!
//! Only the parts the operation compiler reads are rewritten:
//!
//! | Swagger 2.0                          | OpenAPI 3                               |
//! |--------------------------------------|-----------------------------------------|
//! | `definitions`                        | `components.schemas`                    |
//! | `securityDefinitions`                | `components.securitySchemes`            |
//! | `host` + `basePath` + `schemes`      | `servers[0].url`                        |
//! | parameter `type`/`items`/`format`    | parameter `schema`                      |
//! | `in: body` parameter                 | `requestBody` (JSON)                    |
//! | `in: formData` parameters            | `requestBody` object schema (JSON)      |
//! | response `schema`                    | `content.application/json.schema`       |
//!
//! Parameter `$ref`s are inlined against the original document so body
//! parameters can be recognized, then every `#/definitions/...` style
//! reference is rewritten to its `#/components/...` counterpart.

use serde_json::{Map, Value, json};

use super::schema::deref;

/// Fields of a non-body Swagger parameter that belong in its `schema`
const SCHEMA_KEYS: &[&str] = &[
    "type",
    "format",
    "items",
    "enum",
    "default",
    "minimum",
    "maximum",
    "pattern",
    "collectionFormat",
];

const METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch"];

/// Normalize a Swagger 2.0 document into OpenAPI 3 shape.
///
/// Non-mapping input is returned unchanged; the spec compiler rejects it.
#[must_use]
pub fn normalize(document: &Value) -> Value {
    let Some(source) = document.as_object() else {
        return document.clone();
    };

    let mut target = Map::new();
    for (key, value) in source {
        match key.as_str() {
            "swagger" | "host" | "basePath" | "schemes" | "definitions" | "securityDefinitions"
            | "parameters" | "responses" | "paths" | "consumes" | "produces" => {}
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    target.insert("openapi".to_string(), json!("3.0.3"));

    if let Some(server) = server_url(source) {
        target.insert("servers".to_string(), json!([{ "url": server }]));
    }

    let mut components = Map::new();
    if let Some(definitions) = source.get("definitions") {
        components.insert("schemas".to_string(), definitions.clone());
    }
    if let Some(schemes) = source.get("securityDefinitions").and_then(Value::as_object) {
        let converted: Map<String, Value> = schemes
            .iter()
            .map(|(name, scheme)| (name.clone(), security_scheme(scheme)))
            .collect();
        components.insert("securitySchemes".to_string(), Value::Object(converted));
    }
    if let Some(responses) = source.get("responses").and_then(Value::as_object) {
        let converted: Map<String, Value> = responses
            .iter()
            .map(|(name, response)| (name.clone(), convert_response(response, document)))
            .collect();
        components.insert("responses".to_string(), Value::Object(converted));
    }
    if !components.is_empty() {
        target.insert("components".to_string(), Value::Object(components));
    }

    if let Some(paths) = source.get("paths") {
        let converted = match paths.as_object() {
            Some(paths) => Value::Object(
                paths
                    .iter()
                    .map(|(path, item)| (path.clone(), convert_path_item(item, document)))
                    .collect(),
            ),
            None => paths.clone(),
        };
        target.insert("paths".to_string(), converted);
    }

    let mut normalized = Value::Object(target);
    rewrite_refs(&mut normalized);
    normalized
}

fn server_url(source: &Map<String, Value>) -> Option<String> {
    let base_path = source
        .get("basePath")
        .and_then(Value::as_str)
        .unwrap_or_default();
    match source.get("host").and_then(Value::as_str) {
        Some(host) => {
            let scheme = source
                .get("schemes")
                .and_then(Value::as_array)
                .and_then(|schemes| {
                    schemes
                        .iter()
                        .filter_map(Value::as_str)
                        .find(|s| *s == "https")
                        .or_else(|| schemes.first().and_then(Value::as_str))
                })
                .unwrap_or("https");
            Some(format!("{scheme}://{host}{base_path}"))
        }
        None if !base_path.is_empty() => Some(base_path.to_string()),
        None => None,
    }
}

fn security_scheme(scheme: &Value) -> Value {
    match scheme.get("type").and_then(Value::as_str) {
        Some("basic") => json!({"type": "http", "scheme": "basic"}),
        _ => scheme.clone(),
    }
}

fn convert_path_item(item: &Value, document: &Value) -> Value {
    let Some(item) = item.as_object() else {
        return item.clone();
    };

    let shared = inline_parameters(item.get("parameters"), document);
    let (shared_body, shared_plain): (Vec<Value>, Vec<Value>) =
        shared.into_iter().partition(is_body_parameter);

    let mut converted = Map::new();
    for (key, value) in item {
        if key == "parameters" {
            if !shared_plain.is_empty() {
                converted.insert(
                    key.clone(),
                    Value::Array(shared_plain.iter().map(convert_parameter).collect()),
                );
            }
        } else if METHODS.contains(&key.as_str()) {
            converted.insert(key.clone(), convert_operation(value, &shared_body, document));
        } else {
            converted.insert(key.clone(), value.clone());
        }
    }
    Value::Object(converted)
}

fn convert_operation(operation: &Value, shared_body: &[Value], document: &Value) -> Value {
    let Some(source) = operation.as_object() else {
        return operation.clone();
    };
    let mut target = source.clone();
    target.remove("consumes");
    target.remove("produces");

    let mut params = shared_body.to_vec();
    params.extend(inline_parameters(source.get("parameters"), document));
    let (body, plain): (Vec<Value>, Vec<Value>) = params.into_iter().partition(is_body_parameter);

    if plain.is_empty() {
        target.remove("parameters");
    } else {
        target.insert(
            "parameters".to_string(),
            Value::Array(plain.iter().map(convert_parameter).collect()),
        );
    }

    if let Some(request_body) = request_body(&body) {
        target.insert("requestBody".to_string(), request_body);
    }

    if let Some(responses) = source.get("responses").and_then(Value::as_object) {
        let converted: Map<String, Value> = responses
            .iter()
            .map(|(code, response)| (code.clone(), convert_response(response, document)))
            .collect();
        target.insert("responses".to_string(), Value::Object(converted));
    }

    Value::Object(target)
}

/// Resolve parameter `$ref`s against the Swagger document.
fn inline_parameters(parameters: Option<&Value>, document: &Value) -> Vec<Value> {
    parameters
        .and_then(Value::as_array)
        .map(|params| {
            params
                .iter()
                .filter_map(|p| deref(p, document).cloned())
                .collect()
        })
        .unwrap_or_default()
}

fn is_body_parameter(param: &Value) -> bool {
    matches!(
        param.get("in").and_then(Value::as_str),
        Some("body" | "formData")
    )
}

fn convert_parameter(param: &Value) -> Value {
    let Some(source) = param.as_object() else {
        return param.clone();
    };
    if source.contains_key("schema") {
        return param.clone();
    }

    let mut target = Map::new();
    let mut schema = Map::new();
    for (key, value) in source {
        if SCHEMA_KEYS.contains(&key.as_str()) {
            if key != "collectionFormat" {
                schema.insert(key.clone(), value.clone());
            }
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
    if !schema.is_empty() {
        target.insert("schema".to_string(), Value::Object(schema));
    }
    Value::Object(target)
}

/// `in: body` wins over `formData`; form fields become an object schema.
fn request_body(params: &[Value]) -> Option<Value> {
    if let Some(body) = params
        .iter()
        .find(|p| p.get("in").and_then(Value::as_str) == Some("body"))
    {
        let mut request = Map::new();
        if let Some(description) = body.get("description") {
            request.insert("description".to_string(), description.clone());
        }
        request.insert(
            "required".to_string(),
            json!(body.get("required").and_then(Value::as_bool).unwrap_or(false)),
        );
        let schema = body.get("schema").cloned().unwrap_or_else(|| json!({}));
        request.insert(
            "content".to_string(),
            json!({"application/json": {"schema": schema}}),
        );
        return Some(Value::Object(request));
    }

    if params.is_empty() {
        return None;
    }

    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in params {
        let Some(name) = field.get("name").and_then(Value::as_str) else {
            continue;
        };
        let converted = convert_parameter(field);
        let schema = converted.get("schema").cloned().unwrap_or_else(|| json!({}));
        properties.insert(name.to_string(), schema);
        if field.get("required").and_then(Value::as_bool).unwrap_or(false) {
            required.push(json!(name));
        }
    }
    let any_required = !required.is_empty();
    Some(json!({
        "required": any_required,
        "content": {"application/json": {"schema": {
            "type": "object",
            "properties": properties,
            "required": required
        }}}
    }))
}

fn convert_response(response: &Value, document: &Value) -> Value {
    let Some(resolved) = deref(response, document).and_then(Value::as_object) else {
        return response.clone();
    };
    let mut target = resolved.clone();
    if let Some(schema) = target.remove("schema") {
        target.insert(
            "content".to_string(),
            json!({"application/json": {"schema": schema}}),
        );
    }
    Value::Object(target)
}

fn rewrite_refs(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "$ref" {
                    if let Value::String(reference) = child {
                        *reference = rewrite_ref(reference);
                    }
                } else {
                    rewrite_refs(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(rewrite_refs),
        _ => {}
    }
}

fn rewrite_ref(reference: &str) -> String {
    for (from, to) in [
        ("#/definitions/", "#/components/schemas/"),
        ("#/responses/", "#/components/responses/"),
        ("#/parameters/", "#/components/parameters/"),
        ("#/securityDefinitions/", "#/components/securitySchemes/"),
    ] {
        if let Some(rest) = reference.strip_prefix(from) {
            return format!("{to}{rest}");
        }
    }
    reference.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn petstore() -> Value {
        json!({
            "swagger": "2.0",
            "info": {"title": "Pets", "version": "1"},
            "host": "pets.example.com",
            "basePath": "/v1",
            "schemes": ["http", "https"],
            "securityDefinitions": {
                "key": {"type": "apiKey", "in": "header", "name": "X-Pet-Key"}
            },
            "parameters": {
                "Limit": {"name": "limit", "in": "query", "type": "integer"}
            },
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "parameters": [{"$ref": "#/parameters/Limit"}],
                        "responses": {"200": {
                            "description": "ok",
                            "schema": {"type": "array", "items": {"$ref": "#/definitions/Pet"}}
                        }}
                    },
                    "post": {
                        "operationId": "createPet",
                        "parameters": [{
                            "name": "pet", "in": "body", "required": true,
                            "schema": {"$ref": "#/definitions/Pet"}
                        }],
                        "responses": {"201": {"description": "created"}}
                    }
                }
            },
            "definitions": {
                "Pet": {"type": "object", "properties": {"name": {"type": "string"}}}
            }
        })
    }

    #[test]
    fn builds_server_from_host_and_base_path() {
        let doc = normalize(&petstore());
        assert_eq!(doc["servers"][0]["url"], "https://pets.example.com/v1");
        assert_eq!(doc["openapi"], "3.0.3");
        assert!(doc.get("swagger").is_none());
    }

    #[test]
    fn moves_definitions_and_rewrites_refs() {
        let doc = normalize(&petstore());
        assert!(doc.pointer("/components/schemas/Pet").is_some());
        assert_eq!(
            doc.pointer("/paths/~1pets/get/responses/200/content/application~1json/schema/items/$ref"),
            Some(&json!("#/components/schemas/Pet"))
        );
        assert_eq!(
            doc.pointer("/components/securitySchemes/key/name"),
            Some(&json!("X-Pet-Key"))
        );
    }

    #[test]
    fn inlines_and_converts_parameters() {
        let doc = normalize(&petstore());
        let limit = doc.pointer("/paths/~1pets/get/parameters/0").unwrap();
        assert_eq!(
            limit,
            &json!({"name": "limit", "in": "query", "schema": {"type": "integer"}})
        );
    }

    #[test]
    fn body_parameter_becomes_request_body() {
        let doc = normalize(&petstore());
        let post = doc.pointer("/paths/~1pets/post").unwrap();
        assert!(post.get("parameters").is_none());
        assert_eq!(post["requestBody"]["required"], true);
        assert_eq!(
            post["requestBody"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/Pet"
        );
    }

    #[test]
    fn form_fields_become_object_body() {
        let doc = normalize(&json!({
            "swagger": "2.0",
            "paths": {"/upload": {"post": {
                "operationId": "upload",
                "parameters": [
                    {"name": "title", "in": "formData", "type": "string", "required": true},
                    {"name": "count", "in": "formData", "type": "integer"}
                ]
            }}}
        }));
        let schema = doc
            .pointer("/paths/~1upload/post/requestBody/content/application~1json/schema")
            .unwrap();
        assert_eq!(schema["properties"]["title"], json!({"type": "string"}));
        assert_eq!(schema["required"], json!(["title"]));
        assert!(doc.get("servers").is_none());
    }

    #[test]
    fn non_mapping_passes_through() {
        assert_eq!(normalize(&json!([1, 2])), json!([1, 2]));
    }
}
