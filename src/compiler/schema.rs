//! JSON-Schema fragment to [`TypeShape`] translation
//!
//! Translation never fails. Real-world specs are routinely partial or
//! irregular, so anything that cannot be resolved to a concrete shape
//! (dangling `$ref`, reference cycle, `oneOf`, free-form object) becomes
//! [`TypeShape::Opaque`].

use serde_json::{Map, Value};
use tracing::debug;

use super::descriptor::{Field, TypeShape};

/// Nesting bound for recursive translation
const MAX_DEPTH: usize = 32;

/// Maximum `$ref` hops followed by [`deref`]
const MAX_REF_HOPS: usize = 16;

/// Translate a schema fragment, resolving `$ref`s against `document`.
#[must_use]
pub fn translate(fragment: &Value, document: &Value) -> TypeShape {
    Translator {
        document,
        in_progress: Vec::new(),
    }
    .translate(fragment, 0)
}

/// Resolve a local JSON pointer reference (`#/components/schemas/Pet`).
///
/// External references (`other.yaml#/Pet`) are not followed.
#[must_use]
pub fn resolve_pointer<'a>(reference: &str, document: &'a Value) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    if pointer.is_empty() {
        return Some(document);
    }
    document.pointer(pointer)
}

/// Follow a chain of `$ref` objects (parameters, responses, request bodies)
/// to the first non-reference value.
#[must_use]
pub fn deref<'a>(value: &'a Value, document: &'a Value) -> Option<&'a Value> {
    let mut current = value;
    for _ in 0..MAX_REF_HOPS {
        match current.get("$ref").and_then(Value::as_str) {
            Some(reference) => current = resolve_pointer(reference, document)?,
            None => return Some(current),
        }
    }
    debug!("Reference chain too long");
    None
}

struct Translator<'a> {
    document: &'a Value,
    /// `$ref` targets currently being expanded (cycle detection)
    in_progress: Vec<&'a str>,
}

impl<'a> Translator<'a> {
    fn translate(&mut self, fragment: &'a Value, depth: usize) -> TypeShape {
        if depth > MAX_DEPTH {
            debug!(depth, "Schema nesting too deep");
            return TypeShape::Opaque;
        }
        let Some(schema) = fragment.as_object() else {
            return TypeShape::Opaque;
        };

        if let Some(reference) = schema.get("$ref") {
            return self.translate_ref(reference, depth);
        }

        if let Some(members) = schema.get("allOf").and_then(Value::as_array) {
            return self.translate_all_of(schema, members, depth);
        }

        match schema_type(schema) {
            Some("string") => TypeShape::String,
            Some("integer") => TypeShape::Integer,
            Some("number") => TypeShape::Number,
            Some("boolean") => TypeShape::Boolean,
            Some("array") => {
                let items = schema
                    .get("items")
                    .map_or(TypeShape::Opaque, |items| self.translate(items, depth + 1));
                TypeShape::Array {
                    items: Box::new(items),
                }
            }
            Some("object") | None => self.translate_record(schema, depth),
            Some(_) => TypeShape::Opaque,
        }
    }

    fn translate_ref(&mut self, reference: &'a Value, depth: usize) -> TypeShape {
        let Some(reference) = reference.as_str() else {
            return TypeShape::Opaque;
        };
        if self.in_progress.contains(&reference) {
            debug!(reference, "Reference cycle");
            return TypeShape::Opaque;
        }
        let Some(target) = resolve_pointer(reference, self.document) else {
            debug!(reference, "Unresolved reference");
            return TypeShape::Opaque;
        };

        self.in_progress.push(reference);
        let shape = self.translate(target, depth + 1);
        self.in_progress.pop();
        shape
    }

    /// Records with `properties`; everything else is opaque.
    fn translate_record(&mut self, schema: &'a Map<String, Value>, depth: usize) -> TypeShape {
        match self.record_fields(schema, depth) {
            Some(fields) => TypeShape::Object { fields },
            None => TypeShape::Opaque,
        }
    }

    fn record_fields(&mut self, schema: &'a Map<String, Value>, depth: usize) -> Option<Vec<Field>> {
        let properties = schema.get("properties")?.as_object()?;
        if properties.is_empty() {
            return None;
        }

        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        Some(
            properties
                .iter()
                .map(|(name, property)| Field {
                    name: name.clone(),
                    shape: self.translate(property, depth + 1),
                    required: required.contains(&name.as_str()),
                })
                .collect(),
        )
    }

    /// `allOf` of records merges into one record; a single member is
    /// transparent; any other mix is opaque.
    fn translate_all_of(
        &mut self,
        schema: &'a Map<String, Value>,
        members: &'a [Value],
        depth: usize,
    ) -> TypeShape {
        let mut shapes: Vec<TypeShape> = members
            .iter()
            .map(|member| self.translate(member, depth + 1))
            .collect();
        if let Some(own) = self.record_fields(schema, depth) {
            shapes.push(TypeShape::Object { fields: own });
        }

        if shapes.len() == 1 {
            return shapes.remove(0);
        }

        let mut merged: Vec<Field> = Vec::new();
        for shape in shapes {
            let TypeShape::Object { fields } = shape else {
                return TypeShape::Opaque;
            };
            for field in fields {
                match merged.iter_mut().find(|f| f.name == field.name) {
                    Some(existing) => existing.required |= field.required,
                    None => merged.push(field),
                }
            }
        }

        if merged.is_empty() {
            TypeShape::Opaque
        } else {
            TypeShape::Object { fields: merged }
        }
    }
}

/// The schema's `type`, reading 3.1-style `["string", "null"]` arrays as
/// their first non-null member. Composite `oneOf`/`anyOf` schemas report an
/// unsupported type so they fall through to opaque.
fn schema_type(schema: &Map<String, Value>) -> Option<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(types)) => Some(
            types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .unwrap_or("null"),
        ),
        Some(_) => Some("invalid"),
        None if schema.contains_key("oneOf") || schema.contains_key("anyOf") => Some("composite"),
        None => None,
    }
}
