//! Substitution of references and variables with concrete values

use crate::error::ResolveError;
use crate::graph::DependencyGraph;
use crate::model::{Reference, Value, Variables};
use indexmap::IndexMap;
use std::fmt;

/// A concrete value together with its secret classification
#[derive(Clone, PartialEq)]
pub struct Resolved {
    pub value: serde_json::Value,
    pub secret: bool,
}

impl Resolved {
    pub fn plain(value: serde_json::Value) -> Self {
        Self {
            value,
            secret: false,
        }
    }

    pub fn secret(value: serde_json::Value) -> Self {
        Self {
            value,
            secret: true,
        }
    }

    /// String form used by derived functions: strings as-is, everything
    /// else as compact JSON
    pub fn as_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.secret {
            f.debug_struct("Resolved")
                .field("value", &"[secret]")
                .field("secret", &true)
                .finish()
        } else {
            f.debug_struct("Resolved")
                .field("value", &self.value)
                .field("secret", &false)
                .finish()
        }
    }
}

/// Source of values for references and variables
pub trait Scope {
    fn variable(&self, name: &str) -> Option<&serde_json::Value>;

    fn attribute(&self, reference: &Reference) -> Result<Resolved, ResolveError>;
}

/// Resolve a declared value against `scope`.
///
/// The result is secret when any contributing reference is secret.
pub fn resolve_value(value: &Value, scope: &dyn Scope) -> Result<Resolved, ResolveError> {
    match value {
        Value::Literal(v) => Ok(Resolved::plain(v.clone())),
        Value::Var(name) => scope
            .variable(name)
            .cloned()
            .map(Resolved::plain)
            .ok_or_else(|| ResolveError::UnknownVariable(name.clone())),
        Value::Reference(r) => scope.attribute(r),
        Value::List(items) => {
            let mut secret = false;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let resolved = resolve_value(item, scope)?;
                secret |= resolved.secret;
                out.push(resolved.value);
            }
            Ok(Resolved {
                value: serde_json::Value::Array(out),
                secret,
            })
        }
        Value::Map(entries) => {
            let mut secret = false;
            let mut out = serde_json::Map::new();
            for (key, item) in entries {
                let resolved = resolve_value(item, scope)?;
                secret |= resolved.secret;
                out.insert(key.clone(), resolved.value);
            }
            Ok(Resolved {
                value: serde_json::Value::Object(out),
                secret,
            })
        }
    }
}

/// Concrete inputs of one resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    pub values: IndexMap<String, serde_json::Value>,

    /// Input keys whose value came from a secret attribute
    pub secret_keys: Vec<String>,
}

impl ResolvedInputs {
    pub fn contains_secret(&self) -> bool {
        !self.secret_keys.is_empty()
    }
}

/// Resolve every input of a resource
pub fn resolve_inputs(
    inputs: &IndexMap<String, Value>,
    scope: &dyn Scope,
) -> Result<ResolvedInputs, ResolveError> {
    let mut resolved = ResolvedInputs::default();
    for (key, value) in inputs {
        let r = resolve_value(value, scope)?;
        if r.secret {
            resolved.secret_keys.push(key.clone());
        }
        resolved.values.insert(key.clone(), r.value);
    }
    Ok(resolved)
}

/// Scope over the applied nodes of a graph plus declaration variables
pub struct GraphScope<'a> {
    graph: &'a DependencyGraph,
    variables: &'a Variables,
}

impl<'a> GraphScope<'a> {
    pub fn new(graph: &'a DependencyGraph, variables: &'a Variables) -> Self {
        Self { graph, variables }
    }
}

impl Scope for GraphScope<'_> {
    fn variable(&self, name: &str) -> Option<&serde_json::Value> {
        self.variables.get(name)
    }

    fn attribute(&self, reference: &Reference) -> Result<Resolved, ResolveError> {
        let node = self
            .graph
            .node(&reference.target)
            .ok_or_else(|| ResolveError::UnknownResource(reference.target.clone()))?;

        let live = node
            .live_state()
            .ok_or_else(|| ResolveError::UnresolvedReference(reference.target.clone()))?;

        live.lookup(&reference.path)
            .map(|(value, secret)| Resolved { value, secret })
            .ok_or_else(|| ResolveError::MissingAttribute {
                target: reference.target.clone(),
                path: reference.path_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::LiveState;
    use crate::model::ResourceDescriptor;
    use serde_json::json;

    fn graph() -> DependencyGraph {
        DependencyGraph::build(&[
            ResourceDescriptor::new("a", "test"),
            ResourceDescriptor::new("b", "test").with_input("ref", Value::reference("a", "id")),
        ])
        .unwrap()
    }

    #[test]
    fn test_reference_before_apply_fails() {
        let graph = graph();
        let vars = Variables::new();
        let scope = GraphScope::new(&graph, &vars);

        let b = graph.node("b").unwrap();
        let err = resolve_inputs(&b.descriptor().inputs, &scope).unwrap_err();
        assert_eq!(err, ResolveError::UnresolvedReference("a".to_string()));
    }

    #[test]
    fn test_reference_after_apply() {
        let mut graph = graph();
        graph
            .node_mut("a")
            .unwrap()
            .mark_applied(LiveState::new("abc"))
            .unwrap();

        let vars = Variables::new();
        let scope = GraphScope::new(&graph, &vars);
        let b = graph.node("b").unwrap();
        let inputs = resolve_inputs(&b.descriptor().inputs, &scope).unwrap();

        assert_eq!(inputs.values["ref"], json!("abc"));
        assert!(!inputs.contains_secret());
    }

    #[test]
    fn test_secret_propagates_through_nesting() {
        let mut graph = DependencyGraph::build(&[ResourceDescriptor::new("tok", "api-token")]).unwrap();
        graph
            .node_mut("tok")
            .unwrap()
            .mark_applied(LiveState::new("t1").with_secret_attribute("value", json!("s3cret")))
            .unwrap();

        let vars = Variables::from([("region".to_string(), json!("WEUR"))]);
        let scope = GraphScope::new(&graph, &vars);
        let value: Value = serde_json::from_value(json!({
            "headers": [{ "ref": "tok.value" }],
            "region": { "var": "region" },
        }))
        .unwrap();

        let resolved = resolve_value(&value, &scope).unwrap();
        assert!(resolved.secret);
        assert_eq!(
            resolved.value,
            json!({ "headers": ["s3cret"], "region": "WEUR" })
        );
        assert!(!format!("{:?}", resolved).contains("s3cret"));
    }

    #[test]
    fn test_missing_attribute_and_variable() {
        let mut graph = graph();
        graph
            .node_mut("a")
            .unwrap()
            .mark_applied(LiveState::new("abc"))
            .unwrap();
        let vars = Variables::new();
        let scope = GraphScope::new(&graph, &vars);

        let err = resolve_value(&Value::reference("a", "nope"), &scope).unwrap_err();
        assert!(matches!(err, ResolveError::MissingAttribute { .. }));

        let err = resolve_value(&Value::var("accountId"), &scope).unwrap_err();
        assert_eq!(err, ResolveError::UnknownVariable("accountId".to_string()));
    }
}
