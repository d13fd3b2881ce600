//! Live tool registry
//!
//! Maps each [`SpecIdentity`] to the operations compiled from it, in
//! registration order. Writers replace a whole identity at once under the
//! write lock, so readers see either the old or the new set, never a mix.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::compiler::{OperationDescriptor, SpecIdentity};

type Entry = (SpecIdentity, Vec<Arc<OperationDescriptor>>);

/// Concurrency-safe `SpecIdentity → operations` store
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl ToolRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `operations` under `identity`, replacing any previous set.
    ///
    /// A replaced identity keeps its position in registration order.
    /// Operation ids are unique across the registry: an operation whose id
    /// another identity already owns is skipped. Returns the registered ids.
    pub fn register(
        &self,
        identity: SpecIdentity,
        operations: Vec<OperationDescriptor>,
    ) -> Vec<String> {
        let mut entries = self.entries.write();

        let operations: Vec<Arc<OperationDescriptor>> = operations
            .into_iter()
            .filter(|op| {
                let owner = entries
                    .iter()
                    .filter(|(other, _)| *other != identity)
                    .find(|(_, ops)| ops.iter().any(|existing| existing.id == op.id));
                match owner {
                    Some((other, _)) => {
                        warn!(
                            operation = %op.id,
                            spec = %identity,
                            registered_by = %other,
                            "Operation id already registered by another spec; skipping"
                        );
                        false
                    }
                    None => true,
                }
            })
            .map(Arc::new)
            .collect();
        let ids: Vec<String> = operations.iter().map(|op| op.id.clone()).collect();

        match entries.iter_mut().find(|(existing, _)| *existing == identity) {
            Some((_, existing)) => {
                debug!(spec = %identity, previous = existing.len(), "Replacing registered operations");
                *existing = operations;
            }
            None => entries.push((identity.clone(), operations)),
        }
        drop(entries);

        info!(spec = %identity, operations = ids.len(), "Registered tools");
        ids
    }

    /// Operations of one identity, or of all identities in registration
    /// order. Unknown identities yield an empty list.
    pub fn list(&self, identity: Option<&SpecIdentity>) -> Vec<Arc<OperationDescriptor>> {
        let entries = self.entries.read();
        match identity {
            Some(identity) => entries
                .iter()
                .find(|(existing, _)| existing == identity)
                .map(|(_, ops)| ops.clone())
                .unwrap_or_default(),
            None => entries
                .iter()
                .flat_map(|(_, ops)| ops.iter().cloned())
                .collect(),
        }
    }

    /// Remove an identity. Returns whether anything was removed.
    pub fn unregister(&self, identity: &SpecIdentity) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| existing != identity);
        let removed = entries.len() != before;
        drop(entries);

        if removed {
            info!(spec = %identity, "Unregistered tools");
        } else {
            debug!(spec = %identity, "Unregister of unknown spec ignored");
        }
        removed
    }

    /// Operation with this id
    pub fn find(&self, operation_id: &str) -> Option<Arc<OperationDescriptor>> {
        self.entries
            .read()
            .iter()
            .flat_map(|(_, ops)| ops.iter())
            .find(|op| op.id == operation_id)
            .cloned()
    }

    /// Registered identities in registration order
    pub fn identities(&self) -> Vec<SpecIdentity> {
        self.entries
            .read()
            .iter()
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    /// Total number of registered operations
    pub fn len(&self) -> usize {
        self.entries.read().iter().map(|(_, ops)| ops.len()).sum()
    }

    /// True when no operation is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{HttpMethod, ParameterShape, TypeShape};
    use pretty_assertions::assert_eq;

    fn op(id: &str, origin: &str) -> OperationDescriptor {
        OperationDescriptor {
            id: id.to_string(),
            method: HttpMethod::Get,
            path_template: format!("/{id}"),
            base_url: "https://api.example.com".to_string(),
            parameters: ParameterShape::default(),
            response: TypeShape::Opaque,
            body: None,
            description: String::new(),
            credential: None,
            rate_limit: None,
            api_key_placement: None,
            origin: SpecIdentity::new(origin),
        }
    }

    fn ids(ops: &[Arc<OperationDescriptor>]) -> Vec<String> {
        ops.iter().map(|op| op.id.clone()).collect()
    }

    #[test]
    fn lists_in_registration_order() {
        let registry = ToolRegistry::new();
        registry.register("b".into(), vec![op("b1", "b"), op("b2", "b")]);
        registry.register("a".into(), vec![op("a1", "a")]);

        assert_eq!(ids(&registry.list(None)), vec!["b1", "b2", "a1"]);
        assert_eq!(ids(&registry.list(Some(&"a".into()))), vec!["a1"]);
        assert!(registry.list(Some(&"missing".into())).is_empty());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn reregistration_replaces_in_place() {
        let registry = ToolRegistry::new();
        registry.register("a".into(), vec![op("old", "a")]);
        registry.register("b".into(), vec![op("b1", "b")]);
        let ids_returned = registry.register("a".into(), vec![op("new1", "a"), op("new2", "a")]);

        assert_eq!(ids_returned, vec!["new1", "new2"]);
        assert_eq!(ids(&registry.list(None)), vec!["new1", "new2", "b1"]);
        assert!(registry.find("old").is_none());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ToolRegistry::new();
        registry.register("a".into(), vec![op("a1", "a")]);
        registry.register("b".into(), vec![op("b1", "b")]);

        assert!(registry.unregister(&"a".into()));
        assert!(!registry.unregister(&"a".into()));
        assert!(!registry.unregister(&"never".into()));

        registry.register("a".into(), vec![op("a1", "a")]);
        assert_eq!(
            registry.identities(),
            vec![SpecIdentity::new("b"), SpecIdentity::new("a")]
        );
    }

    #[test]
    fn ids_owned_by_another_spec_are_skipped() {
        let registry = ToolRegistry::new();
        registry.register("first".into(), vec![op("shared", "first")]);
        let registered = registry.register(
            "second".into(),
            vec![op("shared", "second"), op("own", "second")],
        );

        assert_eq!(registered, vec!["own"]);
        assert_eq!(ids(&registry.list(None)), vec!["shared", "own"]);
        assert_eq!(registry.find("shared").unwrap().origin.as_str(), "first");
        assert!(registry.find("nope").is_none());

        // Once the owner is gone the id is free again
        assert!(registry.unregister(&"first".into()));
        let registered = registry.register(
            "second".into(),
            vec![op("shared", "second"), op("own", "second")],
        );
        assert_eq!(registered, vec!["shared", "own"]);
    }

    #[test]
    fn reregistering_the_owner_keeps_its_ids() {
        let registry = ToolRegistry::new();
        registry.register("a".into(), vec![op("x", "a")]);
        assert_eq!(registry.register("a".into(), vec![op("x", "a")]), vec!["x"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_registration_keeps_identity() {
        let registry = ToolRegistry::new();
        registry.register("a".into(), Vec::new());
        assert!(registry.is_empty());
        assert_eq!(registry.identities().len(), 1);
    }

    #[test]
    fn readers_never_see_partial_sets() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register("a".into(), vec![op("x1", "a"), op("x2", "a")]);

        let writer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for round in 0..200 {
                    let tag = if round % 2 == 0 { "y" } else { "x" };
                    registry.register(
                        "a".into(),
                        vec![op(&format!("{tag}1"), "a"), op(&format!("{tag}2"), "a")],
                    );
                }
            })
        };

        for _ in 0..200 {
            let seen = ids(&registry.list(Some(&"a".into())));
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0][..1], seen[1][..1]);
        }
        writer.join().unwrap();
    }
}
