//! Declaration documents
//!
//! A declaration is the complete input of one run: variables, resources in
//! declaration order, derived outputs and exports.

use super::resource::{DerivedOutput, ExportDef, ResourceDescriptor};
use super::value::{DERIVED_TARGET, Value};
use crate::error::{DeclarationError, GraphError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Variables available to `{ var: ... }` values
pub type Variables = IndexMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// Stack name
    pub name: String,

    #[serde(default)]
    pub variables: Variables,

    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,

    #[serde(default)]
    pub derived: Vec<DerivedOutput>,

    #[serde(default)]
    pub exports: Vec<ExportDef>,
}

impl Declaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, DeclarationError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, DeclarationError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a declaration file; `.json` files are parsed as JSON, anything else as YAML
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DeclarationError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DeclarationError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!("Loading declaration from {}", path.display());
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn with_resource(mut self, resource: ResourceDescriptor) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_derived(mut self, derived: DerivedOutput) -> Self {
        self.derived.push(derived);
        self
    }

    pub fn with_export(mut self, export: ExportDef) -> Self {
        self.exports.push(export);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Define a variable unless the declaration already does
    pub fn default_variable(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.variables.entry(name.into()).or_insert(value);
    }

    /// Apply `key=value` overrides on top of the declared variables.
    ///
    /// Values that parse as JSON (numbers, booleans) keep their type,
    /// everything else is taken as a string.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, overrides: &[S]) -> Result<(), DeclarationError> {
        for entry in overrides {
            let entry = entry.as_ref();
            let (key, raw) = entry
                .split_once('=')
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| DeclarationError::InvalidOverride(entry.to_string()))?;

            let value = serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
            self.variables.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Check that every variable used anywhere is defined and that derived
    /// references point at derived outputs declared earlier
    pub fn validate(&self) -> Result<(), GraphError> {
        let check_vars = |owner: &str, value: &Value| -> Result<(), GraphError> {
            for name in value.variables() {
                if !self.variables.contains_key(name) {
                    return Err(GraphError::UnknownVariable {
                        owner: owner.to_string(),
                        name: name.to_string(),
                    });
                }
            }
            Ok(())
        };

        for resource in &self.resources {
            for value in resource.inputs.values() {
                check_vars(&resource.name, value)?;
            }
        }

        let known_resources: Vec<&str> = self.resources.iter().map(|r| r.name.as_str()).collect();
        let mut known_derived: Vec<&str> = Vec::new();

        let check_refs = |owner: &str, value: &Value, known_derived: &[&str]| {
            for r in value.references() {
                let known = if r.is_derived() {
                    r.path.len() == 1 && known_derived.contains(&r.path[0].as_str())
                } else {
                    known_resources.contains(&r.target.as_str())
                };
                if !known {
                    return Err(GraphError::UnknownReference {
                        source_name: owner.to_string(),
                        target: r.to_string(),
                    });
                }
            }
            Ok(())
        };

        for derived in &self.derived {
            for arg in &derived.args {
                check_vars(&derived.name, arg)?;
                check_refs(&derived.name, arg, &known_derived)?;
            }
            known_derived.push(derived.name.as_str());
        }

        for export in &self.exports {
            check_vars(&export.name, &export.value)?;
            check_refs(&export.name, &export.value, &known_derived)?;
        }

        if let Some(reserved) = self.resources.iter().find(|r| r.name == DERIVED_TARGET) {
            return Err(GraphError::ReservedName(reserved.name.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeriveFn, Policy};

    const DOCX_STACK: &str = r#"
name: docx-mcp
variables:
  accountId: "0123456789abcdef"
resources:
  - name: docx-storage
    kind: r2-bucket
    inputs:
      name: docx-mcp-storage
      location: WEUR
  - name: docx-r2-token
    kind: api-token
    inputs:
      name: docx-mcp-storage-r2
      permission_groups: ["Workers R2 Storage Write"]
  - name: docx-auth-db
    kind: d1-database
    policy:
      import-only:
        id: 609c7a5e-34d2-4ca3-974c-8ea81bd7897b
    inputs:
      name: docx-mcp-auth
      read_replication:
        mode: disabled
derived:
  - name: r2_secret_access_key
    function: sha256-hex
    args: [{ ref: docx-r2-token.value }]
    secret: true
  - name: r2_endpoint
    function: concat
    args: ["https://", { var: accountId }, ".r2.cloudflarestorage.com"]
exports:
  - name: r2_bucket_name
    value: { ref: docx-storage.name }
  - name: r2_secret_access_key
    value: { ref: derived.r2_secret_access_key }
"#;

    #[test]
    fn test_parse_declaration() {
        let decl = Declaration::from_yaml_str(DOCX_STACK).unwrap();
        assert_eq!(decl.name, "docx-mcp");
        assert_eq!(decl.resources.len(), 3);
        assert_eq!(decl.resources[0].kind, "r2-bucket");
        assert_eq!(
            decl.resources[2].policy,
            Policy::ImportOnly {
                id: "609c7a5e-34d2-4ca3-974c-8ea81bd7897b".to_string()
            }
        );
        assert_eq!(decl.derived[0].function, DeriveFn::Sha256Hex);
        assert!(decl.derived[0].secret);
        assert_eq!(decl.exports.len(), 2);
        decl.validate().unwrap();
    }

    #[test]
    fn test_validate_unknown_variable() {
        let mut decl = Declaration::from_yaml_str(DOCX_STACK).unwrap();
        decl.variables.clear();

        let err = decl.validate().unwrap_err();
        assert!(matches!(err, GraphError::UnknownVariable { ref name, .. } if name == "accountId"));
    }

    #[test]
    fn test_validate_derived_must_be_declared_first() {
        let decl = Declaration::new("x")
            .with_derived(DerivedOutput::new(
                "a",
                DeriveFn::Secret,
                vec![Value::reference("derived", "b")],
            ))
            .with_derived(DerivedOutput::new("b", DeriveFn::Concat, vec![]));

        assert!(matches!(
            decl.validate(),
            Err(GraphError::UnknownReference { .. })
        ));
    }

    #[test]
    fn test_apply_overrides() {
        let mut decl = Declaration::from_yaml_str(DOCX_STACK).unwrap();
        decl.apply_overrides(&["accountId=feedface", "retries=3"]).unwrap();

        assert_eq!(decl.variables["accountId"], serde_json::json!("feedface"));
        assert_eq!(decl.variables["retries"], serde_json::json!(3));
        assert!(decl.apply_overrides(&["novalue"]).is_err());
        assert!(decl.apply_overrides(&["=x"]).is_err());
    }

    #[test]
    fn test_default_variable_keeps_declared_value() {
        let mut decl = Declaration::from_yaml_str(DOCX_STACK).unwrap();
        decl.default_variable("accountId", serde_json::json!("from-env"));
        decl.default_variable("region", serde_json::json!("weur"));

        assert_eq!(decl.variables["accountId"], serde_json::json!("0123456789abcdef"));
        assert_eq!(decl.variables["region"], serde_json::json!("weur"));
    }

    #[test]
    fn test_from_path_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.json");
        std::fs::write(&path, r#"{"name": "json-stack", "resources": []}"#).unwrap();

        let decl = Declaration::from_path(&path).unwrap();
        assert_eq!(decl.name, "json-stack");
    }
}
