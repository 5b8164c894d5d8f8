//! Output export set

use crate::derive::{DerivedScope, DerivedValues, compute_derived, export_resolve_error};
use crate::error::ExportError;
use crate::graph::DependencyGraph;
use crate::model::{Declaration, ExportDef};
use crate::resolve::{GraphScope, Scope, resolve_value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Placeholder shown instead of secret values
pub const REDACTED: &str = "[secret]";

/// Named outputs of a run.
///
/// Entries listed in `secret` must never be logged or displayed in
/// plaintext; use [`ExportSet::redacted`] for display.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSet {
    values: IndexMap<String, serde_json::Value>,
    secret: BTreeSet<String>,
}

impl ExportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: serde_json::Value, secret: bool) {
        let name = name.into();
        if secret {
            self.secret.insert(name.clone());
        } else {
            self.secret.remove(&name);
        }
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.values.get(name)
    }

    pub fn is_secret(&self, name: &str) -> bool {
        self.secret.contains(name)
    }

    /// Names of secret entries
    pub fn secret_names(&self) -> impl Iterator<Item = &str> {
        self.secret.iter().map(String::as_str)
    }

    /// Entries in export order with their secret flag
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value, bool)> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str(), v, self.is_secret(k)))
    }

    /// Display form: secret entries replaced by [`REDACTED`]
    pub fn redacted(&self) -> IndexMap<String, serde_json::Value> {
        self.values
            .iter()
            .map(|(k, v)| {
                let shown = if self.is_secret(k) {
                    serde_json::Value::String(REDACTED.to_string())
                } else {
                    v.clone()
                };
                (k.clone(), shown)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ExportSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportSet")
            .field("values", &self.redacted())
            .field("secret", &self.secret)
            .finish()
    }
}

/// Resolve each export definition into an [`ExportSet`]
pub fn export(defs: &[ExportDef], scope: &dyn Scope) -> Result<ExportSet, ExportError> {
    let mut set = ExportSet::new();
    for def in defs {
        let resolved =
            resolve_value(&def.value, scope).map_err(|e| export_resolve_error(&def.name, e))?;
        set.insert(def.name.clone(), resolved.value, resolved.secret);
    }
    Ok(set)
}

/// Compute derived outputs and exports of a declaration over an applied graph
pub fn materialize(
    declaration: &Declaration,
    graph: &DependencyGraph,
) -> Result<(DerivedValues, ExportSet), ExportError> {
    let scope = GraphScope::new(graph, &declaration.variables);
    let derived = compute_derived(&declaration.derived, &scope)?;
    let exports = export(&declaration.exports, &DerivedScope::new(&scope, &derived))?;

    tracing::debug!(
        "Materialized {} exports ({} secret)",
        exports.len(),
        exports.secret.len()
    );
    Ok((derived, exports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::sha256_hex;
    use crate::live::LiveState;
    use crate::model::{DeriveFn, DerivedOutput, ResourceDescriptor, Value};
    use serde_json::json;

    fn declaration() -> Declaration {
        Declaration::new("docx")
            .with_variable("accountId", json!("acct"))
            .with_resource(ResourceDescriptor::new("bucket", "r2-bucket"))
            .with_resource(ResourceDescriptor::new("token", "api-token"))
            .with_derived(
                DerivedOutput::new(
                    "secret_access_key",
                    DeriveFn::Sha256Hex,
                    vec![Value::reference("token", "value")],
                ),
            )
            .with_export(ExportDef::new("account_id", Value::var("accountId")))
            .with_export(ExportDef::new("bucket_name", Value::reference("bucket", "name")))
            .with_export(ExportDef::new("access_key_id", Value::reference("token", "id")))
            .with_export(ExportDef::new(
                "secret_access_key",
                Value::reference("derived", "secret_access_key"),
            ))
    }

    fn applied_graph(decl: &Declaration) -> DependencyGraph {
        let mut graph = DependencyGraph::build(&decl.resources).unwrap();
        graph
            .node_mut("bucket")
            .unwrap()
            .mark_applied(LiveState::new("docx-mcp-storage").with_attribute("name", json!("docx-mcp-storage")))
            .unwrap();
        graph
            .node_mut("token")
            .unwrap()
            .mark_applied(LiveState::new("tok-1").with_secret_attribute("value", json!("t0ken")))
            .unwrap();
        graph
    }

    #[test]
    fn test_materialize() {
        let decl = declaration();
        let graph = applied_graph(&decl);

        let (derived, exports) = materialize(&decl, &graph).unwrap();
        assert_eq!(derived.len(), 1);
        assert_eq!(exports.len(), 4);
        assert_eq!(exports.get("account_id"), Some(&json!("acct")));
        assert_eq!(exports.get("bucket_name"), Some(&json!("docx-mcp-storage")));
        assert_eq!(exports.get("access_key_id"), Some(&json!("tok-1")));
        assert_eq!(
            exports.get("secret_access_key"),
            Some(&json!(sha256_hex("t0ken")))
        );

        // derived from a secret attribute, so secret without being declared so
        assert!(exports.is_secret("secret_access_key"));
        assert!(!exports.is_secret("access_key_id"));
        assert_eq!(exports.secret_names().collect::<Vec<_>>(), vec!["secret_access_key"]);
    }

    #[test]
    fn test_materialize_is_deterministic() {
        let decl = declaration();
        let first = materialize(&decl, &applied_graph(&decl)).unwrap().1;
        let second = materialize(&decl, &applied_graph(&decl)).unwrap().1;
        assert_eq!(first, second);
    }

    #[test]
    fn test_redacted_view() {
        let decl = declaration();
        let (_, exports) = materialize(&decl, &applied_graph(&decl)).unwrap();

        let shown = exports.redacted();
        assert_eq!(shown["secret_access_key"], json!(REDACTED));
        assert_eq!(shown["bucket_name"], json!("docx-mcp-storage"));
        assert!(!format!("{:?}", exports).contains(&sha256_hex("t0ken")));
    }

    #[test]
    fn test_unapplied_source_is_unresolved_export() {
        let decl = declaration();
        let mut graph = DependencyGraph::build(&decl.resources).unwrap();
        graph
            .node_mut("bucket")
            .unwrap()
            .mark_applied(LiveState::new("b").with_attribute("name", json!("b")))
            .unwrap();
        graph.node_mut("token").unwrap().mark_failed();

        let err = materialize(&decl, &graph).unwrap_err();
        assert_eq!(
            err,
            ExportError::UnresolvedExport {
                export: "secret_access_key".to_string(),
                source_name: "token".to_string(),
            }
        );
    }
}
