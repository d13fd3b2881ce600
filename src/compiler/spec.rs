//! Whole-document compilation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::descriptor::{HttpMethod, OperationDescriptor};
use super::operation::{CompileContext, OperationCompiler};
use super::swagger;
use crate::{Error, Result};

/// Kind of API description document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    /// OpenAPI 3.x
    #[default]
    #[serde(rename = "openapi")]
    OpenApi,
    /// Swagger 2.0
    Swagger,
    /// GraphQL (not compiled)
    #[serde(rename = "graphql")]
    GraphQl,
}

impl SpecKind {
    /// Lowercase name as used in configuration
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenApi => "openapi",
            Self::Swagger => "swagger",
            Self::GraphQl => "graphql",
        }
    }
}

impl fmt::Display for SpecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openapi" => Ok(Self::OpenApi),
            "swagger" => Ok(Self::Swagger),
            "graphql" => Ok(Self::GraphQl),
            other => Err(Error::Config(format!(
                "unknown spec type '{other}' (expected openapi, swagger or graphql)"
            ))),
        }
    }
}

/// Compile every operation of `document`, in document order.
///
/// Operations that cannot be compiled are skipped with a warning. The call
/// only fails when the document itself is unusable.
pub fn compile_spec(
    document: &Value,
    kind: SpecKind,
    context: &CompileContext,
) -> Result<Vec<OperationDescriptor>> {
    if kind == SpecKind::GraphQl {
        return Err(Error::UnsupportedSpecKind(kind));
    }
    if !document.is_object() {
        return Err(Error::InvalidSpec(format!(
            "document from {} is not a mapping",
            context.origin
        )));
    }

    let normalized;
    let document = if kind == SpecKind::Swagger || document.get("swagger").is_some() {
        debug!(spec = %context.origin, "Normalizing Swagger 2.0 document");
        normalized = swagger::normalize(document);
        &normalized
    } else {
        document
    };

    let Some(paths) = document.get("paths") else {
        warn!(spec = %context.origin, "Spec has no paths; nothing to compile");
        return Ok(Vec::new());
    };
    let Some(paths) = paths.as_object() else {
        return Err(Error::InvalidSpec(format!(
            "'paths' in {} is not a mapping",
            context.origin
        )));
    };

    let compiler = OperationCompiler::new(document, context);
    let mut operations: Vec<OperationDescriptor> = Vec::new();
    let mut skipped = 0usize;

    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            warn!(spec = %context.origin, path, "Skipping path item: not a mapping");
            continue;
        };
        let shared: &[Value] = item
            .get("parameters")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice);

        for (key, entry) in item {
            let Some(method) = HttpMethod::from_key(key) else {
                continue;
            };
            match compiler.compile(entry, method, path, shared) {
                Some(op) if operations.iter().any(|existing| existing.id == op.id) => {
                    warn!(
                        spec = %context.origin,
                        operation = %op.id,
                        path,
                        "Skipping duplicate operationId"
                    );
                    skipped += 1;
                }
                Some(op) => operations.push(op),
                None => skipped += 1,
            }
        }
    }

    info!(
        spec = %context.origin,
        kind = %kind,
        base_url = compiler.base_url(),
        compiled = operations.len(),
        skipped,
        "Compiled spec"
    );
    Ok(operations)
}
