//! Resource descriptors and their lifecycle policy

use super::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declaration of one desired resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Logical name, unique within the graph
    pub name: String,

    /// Resource kind (e.g. "r2-bucket", "kv-namespace")
    pub kind: String,

    /// Input attributes; may reference other resources
    #[serde(default)]
    pub inputs: IndexMap<String, Value>,

    /// Lifecycle policy
    #[serde(default)]
    pub policy: Policy,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            inputs: IndexMap::new(),
            policy: Policy::Fresh,
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Logical names this descriptor references, in input order, deduplicated
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for value in self.inputs.values() {
            for r in value.references() {
                if !names.contains(&r.target.as_str()) {
                    names.push(r.target.as_str());
                }
            }
        }
        names
    }
}

/// Lifecycle policy of a resource.
///
/// `Protected` and `ImportOnly` both forbid deletion and destructive
/// replacement. An imported resource is managed from then on, but only
/// through in-place updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Fully managed: created, updated, replaced and destroyed by the engine
    #[default]
    Fresh,
    /// Created if missing, never replaced or destroyed
    Protected,
    /// Adopted from an existing backend resource with the given id
    ImportOnly { id: String },
}

impl Policy {
    /// Whether destructive operations are forbidden
    pub fn is_protected(&self) -> bool {
        !matches!(self, Policy::Fresh)
    }

    pub fn import_id(&self) -> Option<&str> {
        match self {
            Policy::ImportOnly { id } => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Fresh => write!(f, "fresh"),
            Policy::Protected => write!(f, "protected"),
            Policy::ImportOnly { id } => write!(f, "import-only({})", id),
        }
    }
}

/// A value computed from live states after apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedOutput {
    pub name: String,

    pub function: DeriveFn,

    #[serde(default)]
    pub args: Vec<Value>,

    /// Force the result to be secret regardless of its inputs
    #[serde(default)]
    pub secret: bool,
}

impl DerivedOutput {
    pub fn new(name: impl Into<String>, function: DeriveFn, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            function,
            args,
            secret: false,
        }
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// Pure functions available to derived outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeriveFn {
    /// Lowercase hex SHA-256 digest of a single argument
    Sha256Hex,
    /// String concatenation of all arguments
    Concat,
    /// Passes a single argument through, classified secret
    Secret,
}

impl fmt::Display for DeriveFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeriveFn::Sha256Hex => write!(f, "sha256-hex"),
            DeriveFn::Concat => write!(f, "concat"),
            DeriveFn::Secret => write!(f, "secret"),
        }
    }
}

/// A named top-level output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDef {
    pub name: String,

    /// Source: a reference (`node.attr` or `derived.<name>`), a variable or a literal
    pub value: Value,
}

impl ExportDef {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_yaml() {
        let fresh: Policy = serde_yaml::from_str("fresh").unwrap();
        assert_eq!(fresh, Policy::Fresh);

        let protected: Policy = serde_yaml::from_str("protected").unwrap();
        assert!(protected.is_protected());
        assert_eq!(protected.import_id(), None);

        let import: Policy =
            serde_yaml::from_str("import-only:\n  id: ab2f243e258b4eb2b3be9dfaf7665b38").unwrap();
        assert!(import.is_protected());
        assert_eq!(import.import_id(), Some("ab2f243e258b4eb2b3be9dfaf7665b38"));
    }

    #[test]
    fn test_referenced_names_deduplicated() {
        let descriptor = ResourceDescriptor::new("app", "kv-namespace")
            .with_input("a", Value::reference("token", "id"))
            .with_input("b", Value::reference("token", "value"))
            .with_input("c", Value::reference("bucket", "name"));

        assert_eq!(descriptor.referenced_names(), vec!["token", "bucket"]);
    }
}
